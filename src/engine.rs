//! The persona engine: one `process` call per inbound message.
//!
//! Wires the catalog store/cache, dispatcher, state machine and importer
//! together behind the narrow interface the hosting chat application consumes.
//! The host calls `process` once per user message, inserts the returned system
//! prompt ahead of its model call, and surfaces any notice as user-visible
//! feedback.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cache::CatalogCache;
use crate::catalog::default_catalog;
use crate::config::{EngineConfig, BACKUP_DIR_NAME};
use crate::dispatch::{Action, Dispatcher};
use crate::http_client::build_http_client;
use crate::importer::{ImportPolicy, ImportReport, Importer};
use crate::patterns::CompileKey;
use crate::state::{
    apply, assemble_prompt, ConversationState, ConversationStore, InMemoryConversationStore,
};
use crate::store::CatalogStore;

/// One row of a `!list` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaListing {
    pub key: String,
    pub name: String,
    pub description: String,
}

/// User-visible feedback produced by command handling.
#[derive(Debug, Clone)]
pub enum Notice {
    List(Vec<PersonaListing>),
    Import(ImportReport),
    Error(String),
}

/// Persona activated this turn, surfaced once so the host can trigger an
/// introduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntroducedPersona {
    pub key: String,
    pub name: String,
    pub description: String,
}

/// Result of processing one inbound message.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Assembled system prompt: always-active personas plus the active one.
    pub system_prompt: String,
    pub introduced_persona: Option<IntroducedPersona>,
    pub notice: Option<Notice>,
}

pub struct PersonaEngine {
    config: EngineConfig,
    cache: Arc<CatalogCache>,
    dispatcher: Dispatcher,
    importer: Importer,
    conversations: Arc<dyn ConversationStore>,
}

impl PersonaEngine {
    /// Build an engine from configuration, with the default in-memory
    /// conversation store.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_conversation_store(config, Arc::new(InMemoryConversationStore::new()))
    }

    pub fn with_conversation_store(
        config: EngineConfig,
        conversations: Arc<dyn ConversationStore>,
    ) -> Result<Self> {
        let catalog_path = config.resolved_catalog_path();
        let backup_dir = catalog_path
            .parent()
            .map(|parent| parent.join(BACKUP_DIR_NAME))
            .unwrap_or_else(|| EngineConfig::base_dir().join(BACKUP_DIR_NAME));

        let store = Arc::new(CatalogStore::new(
            catalog_path,
            backup_dir,
            config.backup_count,
        ));

        if config.create_default_config && !store.exists() {
            store
                .write(&default_catalog())
                .context("Failed to write default persona catalog")?;
            tracing::info!("Wrote default persona catalog to {:?}", store.path());
        }

        let cache = Arc::new(CatalogCache::new(Arc::clone(&store)));
        let http = build_http_client(Duration::from_secs(config.download_timeout_secs))?;
        let importer = Importer::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            http,
            ImportPolicy {
                trusted_domains: config.trusted_domain_list(),
                timeout: Duration::from_secs(config.download_timeout_secs),
                max_bytes: config.max_download_bytes,
                lenient: config.lenient_import,
            },
        );

        Ok(Self {
            config,
            cache,
            dispatcher: Dispatcher::new(),
            importer,
            conversations,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process one inbound message for one conversation.
    ///
    /// Per-conversation ordering is the host's side of the contract: it must
    /// not issue overlapping calls for the same conversation id.
    pub async fn process(&self, message: &str, conversation_id: &str) -> ProcessOutcome {
        let mut catalog = self.cache.get();
        let action = self.dispatcher.dispatch(message, self.compile_key(&catalog.keys()));

        let mut notice = None;
        match &action {
            Action::ListRequest => {
                notice = Some(Notice::List(self.list_personas()));
            }
            Action::DownloadRequest { url, replace } => {
                let source = url
                    .clone()
                    .or_else(|| self.config.default_repository_url.clone());
                match source {
                    Some(source) => match self.importer.import(&source, *replace).await {
                        Ok(report) => {
                            // Dispatch against the imported catalog from now on.
                            catalog = self.cache.get();
                            notice = Some(Notice::Import(report));
                        }
                        Err(e) => {
                            tracing::warn!("Persona import failed: {e}");
                            notice = Some(Notice::Error(e.to_string()));
                        }
                    },
                    None => {
                        notice = Some(Notice::Error(
                            "no URL given and no default repository configured".to_string(),
                        ));
                    }
                }
            }
            _ => {}
        }

        let state = self
            .conversations
            .get(conversation_id)
            .unwrap_or_default();
        let outcome = apply(state, &action, &catalog);

        let system_prompt = assemble_prompt(&catalog, &outcome.state);
        let introduced_persona = outcome.introduced.as_ref().and_then(|key| {
            catalog.get(key).map(|persona| IntroducedPersona {
                key: key.clone(),
                name: persona.name.clone(),
                description: persona.description.clone(),
            })
        });

        // Without persistence the override lasts exactly one turn.
        let stored = if self.config.persistent_persona {
            outcome.state
        } else {
            ConversationState::default()
        };
        self.conversations.put(conversation_id, stored);

        ProcessOutcome {
            system_prompt,
            introduced_persona,
            notice,
        }
    }

    /// Non-hidden personas with key, name and description.
    pub fn list_personas(&self) -> Vec<PersonaListing> {
        self.cache
            .get()
            .visible()
            .map(|(key, persona)| PersonaListing {
                key: key.to_string(),
                name: persona.name.clone(),
                description: persona.description.clone(),
            })
            .collect()
    }

    /// Administrative import entry point, equivalent to the download command.
    pub async fn import(&self, source: &str, replace: bool) -> Result<ImportReport, crate::error::EngineError> {
        self.importer.import(source, replace).await
    }

    fn compile_key(&self, persona_keys: &[String]) -> CompileKey {
        CompileKey {
            prefix: self.config.keyword_prefix.clone(),
            case_sensitive: self.config.case_sensitive,
            persona_keys: persona_keys.to_vec(),
            reset_keywords: self.config.reset_keyword_list(),
            list_keyword: self.config.list_keyword.clone(),
            download_keyword: self.config.download_keyword.clone(),
        }
    }
}
