//! Remote catalog imports.
//!
//! Each step is a hard gate: trust check, bounded fetch, schema validation,
//! backup, apply, cache invalidation. A failure at any step aborts the import
//! with no mutation to the catalog store. Imports are serialized behind an
//! async mutex so two concurrent imports can never interleave writes.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use crate::cache::CatalogCache;
use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::store::CatalogStore;

/// Import policy, derived from the engine configuration.
#[derive(Debug, Clone)]
pub struct ImportPolicy {
    pub trusted_domains: Vec<String>,
    pub timeout: Duration,
    pub max_bytes: usize,
    pub lenient: bool,
}

/// Outcome of a successful import.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub added: usize,
    pub overwritten: usize,
    /// Identifier of the pre-import backup, if a catalog existed to back up.
    pub backup: Option<String>,
    /// Entries skipped by lenient validation; empty in the default
    /// all-or-nothing mode.
    pub rejected: Vec<String>,
}

pub struct Importer {
    store: Arc<CatalogStore>,
    cache: Arc<CatalogCache>,
    http: reqwest::Client,
    policy: ImportPolicy,
    in_flight: tokio::sync::Mutex<()>,
}

impl Importer {
    pub fn new(
        store: Arc<CatalogStore>,
        cache: Arc<CatalogCache>,
        http: reqwest::Client,
        policy: ImportPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            http,
            policy,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Validate and apply a remote catalog document. `replace` discards the
    /// existing catalog; the default merge adds/overwrites individual entries.
    pub async fn import(&self, source: &str, replace: bool) -> Result<ImportReport, EngineError> {
        // One import at a time; a second caller waits here instead of
        // interleaving writes.
        let _guard = self.in_flight.lock().await;

        let url = self.check_source(source)?;
        tracing::info!("Importing persona catalog from {url} (replace={replace})");

        let body = self.fetch_bounded(url).await?;
        self.apply_document(&body, replace)
    }

    /// Trust gate: secure transport and a whitelisted host, checked before
    /// any network access.
    fn check_source(&self, source: &str) -> Result<Url, EngineError> {
        let url = Url::parse(source)
            .map_err(|e| EngineError::UntrustedSource(format!("invalid URL '{source}': {e}")))?;

        if url.scheme() != "https" {
            return Err(EngineError::UntrustedSource(format!(
                "insecure scheme '{}', only https is allowed",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| EngineError::UntrustedSource("URL has no host".to_string()))?;

        let trusted = self
            .policy
            .trusted_domains
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{domain}")));
        if !trusted {
            return Err(EngineError::UntrustedSource(format!(
                "host '{host}' is not in the trusted domain list"
            )));
        }

        Ok(url)
    }

    /// Fetch with an enforced deadline and byte cap. Exceeding either discards
    /// the partial content and fails the import.
    async fn fetch_bounded(&self, url: Url) -> Result<String, EngineError> {
        let max_bytes = self.policy.max_bytes;

        let fetch = async {
            let response = self
                .http
                .get(url.clone())
                .send()
                .await
                .map_err(|e| EngineError::Fetch(e.to_string()))?
                .error_for_status()
                .map_err(|e| EngineError::Fetch(e.to_string()))?;

            if let Some(length) = response.content_length() {
                if length as usize > max_bytes {
                    return Err(EngineError::Fetch(format!(
                        "response of {length} bytes exceeds limit of {max_bytes}"
                    )));
                }
            }

            let mut body: Vec<u8> = Vec::new();
            let mut response = response;
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| EngineError::Fetch(e.to_string()))?
            {
                if body.len() + chunk.len() > max_bytes {
                    return Err(EngineError::Fetch(format!(
                        "response exceeds limit of {max_bytes} bytes"
                    )));
                }
                body.extend_from_slice(&chunk);
            }

            String::from_utf8(body)
                .map_err(|_| EngineError::Fetch("response is not valid UTF-8".to_string()))
        };

        tokio::time::timeout(self.policy.timeout, fetch)
            .await
            .map_err(|_| {
                EngineError::Fetch(format!(
                    "timed out after {}s fetching {url}",
                    self.policy.timeout.as_secs()
                ))
            })?
    }

    /// Validate a fetched document and apply it to the store. Split from the
    /// network path so the apply pipeline is directly testable.
    pub(crate) fn apply_document(
        &self,
        text: &str,
        replace: bool,
    ) -> Result<ImportReport, EngineError> {
        let (incoming, rejected) = Catalog::parse_document(text, self.policy.lenient)?;

        let current = if self.store.exists() {
            Some(self.store.read()?.0)
        } else {
            None
        };

        // Backup of the pre-import catalog; a backup failure aborts the import.
        let backup = match &current {
            Some(_) => Some(self.store.snapshot()?.id),
            None => None,
        };

        let mut added = 0;
        let mut overwritten = 0;
        let merged = if replace {
            for (key, _) in incoming.iter() {
                match &current {
                    Some(current) if current.contains_key(key) => overwritten += 1,
                    _ => added += 1,
                }
            }
            incoming
        } else {
            let mut merged = current.unwrap_or_default();
            for (key, persona) in incoming.iter() {
                if merged.upsert(key.to_string(), persona.clone()) {
                    overwritten += 1;
                } else {
                    added += 1;
                }
            }
            merged
        };

        self.store.write(&merged)?;
        self.cache.invalidate();

        tracing::info!(
            "Catalog import applied: {added} added, {overwritten} overwritten, {} rejected",
            rejected.len()
        );

        Ok(ImportReport {
            added,
            overwritten,
            backup,
            rejected: rejected.iter().map(|r| r.key.clone()).collect(),
        })
    }
}
