//! Per-conversation persona state and outbound prompt assembly.
//!
//! The state machine re-validates switch targets against the live catalog:
//! the dispatcher's matchers already guard against unknown keys, but a catalog
//! mutation can race pattern recompilation, so an invalid key is simply
//! rejected here and the state left unchanged.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::catalog::Catalog;
use crate::dispatch::Action;

/// Per-conversation record. `active == None` means no override: only
/// always-active personas are injected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    pub active: Option<String>,
    pub last_switch: DateTime<Utc>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            active: None,
            last_switch: Utc::now(),
        }
    }
}

/// Injected key-value store for conversation state. The engine only needs
/// get/put; whether the backing store is in-memory or durable is the host's
/// concern.
pub trait ConversationStore: Send + Sync {
    fn get(&self, conversation_id: &str) -> Option<ConversationState>;
    fn put(&self, conversation_id: &str, state: ConversationState);
}

/// Default process-lifetime store.
#[derive(Default)]
pub struct InMemoryConversationStore {
    states: Mutex<HashMap<String, ConversationState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn get(&self, conversation_id: &str) -> Option<ConversationState> {
        self.states
            .lock()
            .expect("conversation store poisoned")
            .get(conversation_id)
            .cloned()
    }

    fn put(&self, conversation_id: &str, state: ConversationState) {
        self.states
            .lock()
            .expect("conversation store poisoned")
            .insert(conversation_id.to_string(), state);
    }
}

/// Result of applying one action to one conversation's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub state: ConversationState,
    /// Set exactly once per activation: a transition into a persona that was
    /// not active on the previous turn.
    pub introduced: Option<String>,
}

/// Apply a dispatcher action. List and download requests are side-channel
/// requests handled by the engine; they never transition state.
pub fn apply(state: ConversationState, action: &Action, catalog: &Catalog) -> TransitionOutcome {
    match action {
        Action::SwitchPersona(key) => {
            if !catalog.contains_key(key) {
                tracing::debug!("Rejected switch to unknown persona '{key}'");
                return TransitionOutcome {
                    state,
                    introduced: None,
                };
            }
            if state.active.as_deref() == Some(key.as_str()) {
                // Already active: no transition, no re-introduction.
                return TransitionOutcome {
                    state,
                    introduced: None,
                };
            }
            TransitionOutcome {
                state: ConversationState {
                    active: Some(key.clone()),
                    last_switch: Utc::now(),
                },
                introduced: Some(key.clone()),
            }
        }
        Action::Reset => TransitionOutcome {
            state: ConversationState {
                active: None,
                last_switch: Utc::now(),
            },
            introduced: None,
        },
        Action::ListRequest | Action::DownloadRequest { .. } | Action::NoAction => {
            TransitionOutcome {
                state,
                introduced: None,
            }
        }
    }
}

/// Assemble the outbound system prompt: always-active personas in ascending
/// priority, then the active persona unless it is itself always-active.
pub fn assemble_prompt(catalog: &Catalog, state: &ConversationState) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for (_, persona) in catalog.always_active() {
        parts.push(persona.prompt.as_str());
    }

    if let Some(active_key) = &state.active {
        if let Some(persona) = catalog.get(active_key) {
            if !persona.always_active {
                parts.push(persona.prompt.as_str());
            }
        }
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Persona;

    fn persona(name: &str, always: bool, priority: i64) -> Persona {
        Persona {
            name: name.to_string(),
            prompt: format!("{name} prompt"),
            description: format!("{name} description"),
            rules: vec![],
            hidden: false,
            always_active: always,
            priority,
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(
            None,
            vec![
                ("controller".to_string(), persona("Controller", true, 0)),
                ("aux".to_string(), persona("Aux", true, 1)),
                ("coder".to_string(), persona("Coder", false, 0)),
                ("writer".to_string(), persona("Writer", false, 0)),
            ],
        )
    }

    #[test]
    fn switch_activates_valid_key_and_introduces_once() {
        let catalog = catalog();
        let first = apply(
            ConversationState::default(),
            &Action::SwitchPersona("coder".to_string()),
            &catalog,
        );
        assert_eq!(first.state.active.as_deref(), Some("coder"));
        assert_eq!(first.introduced.as_deref(), Some("coder"));

        // Same switch again: state unchanged, no re-introduction.
        let second = apply(
            first.state.clone(),
            &Action::SwitchPersona("coder".to_string()),
            &catalog,
        );
        assert_eq!(second.state, first.state);
        assert!(second.introduced.is_none());
    }

    #[test]
    fn switch_to_unknown_key_is_rejected() {
        let catalog = catalog();
        let active = apply(
            ConversationState::default(),
            &Action::SwitchPersona("coder".to_string()),
            &catalog,
        )
        .state;

        let outcome = apply(
            active.clone(),
            &Action::SwitchPersona("ghost".to_string()),
            &catalog,
        );
        assert_eq!(outcome.state, active);
        assert!(outcome.introduced.is_none());
    }

    #[test]
    fn reset_clears_any_active_persona() {
        let catalog = catalog();
        for key in ["coder", "writer"] {
            let active = apply(
                ConversationState::default(),
                &Action::SwitchPersona(key.to_string()),
                &catalog,
            )
            .state;
            let outcome = apply(active, &Action::Reset, &catalog);
            assert!(outcome.state.active.is_none());
            assert!(outcome.introduced.is_none());
        }
    }

    #[test]
    fn side_channel_actions_do_not_transition() {
        let catalog = catalog();
        let active = apply(
            ConversationState::default(),
            &Action::SwitchPersona("writer".to_string()),
            &catalog,
        )
        .state;

        for action in [
            Action::ListRequest,
            Action::DownloadRequest {
                url: None,
                replace: false,
            },
            Action::NoAction,
        ] {
            let outcome = apply(active.clone(), &action, &catalog);
            assert_eq!(outcome.state, active);
            assert!(outcome.introduced.is_none());
        }
    }

    #[test]
    fn prompt_orders_always_active_by_priority_then_active() {
        let catalog = catalog();
        let state = apply(
            ConversationState::default(),
            &Action::SwitchPersona("coder".to_string()),
            &catalog,
        )
        .state;

        let prompt = assemble_prompt(&catalog, &state);
        let controller_pos = prompt.find("Controller prompt").unwrap();
        let aux_pos = prompt.find("Aux prompt").unwrap();
        let coder_pos = prompt.find("Coder prompt").unwrap();
        assert!(controller_pos < aux_pos);
        assert!(aux_pos < coder_pos);
    }

    #[test]
    fn default_state_still_gets_always_active_prompts() {
        let catalog = catalog();
        let prompt = assemble_prompt(&catalog, &ConversationState::default());
        assert!(prompt.contains("Controller prompt"));
        assert!(prompt.contains("Aux prompt"));
        assert!(!prompt.contains("Coder prompt"));
    }

    #[test]
    fn always_active_persona_is_not_duplicated_when_selected() {
        let catalog = catalog();
        let state = ConversationState {
            active: Some("aux".to_string()),
            last_switch: Utc::now(),
        };
        let prompt = assemble_prompt(&catalog, &state);
        assert_eq!(prompt.matches("Aux prompt").count(), 1);
    }

    #[test]
    fn in_memory_store_round_trips_state() {
        let store = InMemoryConversationStore::new();
        assert!(store.get("conv-1").is_none());

        let state = ConversationState {
            active: Some("coder".to_string()),
            last_switch: Utc::now(),
        };
        store.put("conv-1", state.clone());
        assert_eq!(store.get("conv-1"), Some(state));
        assert!(store.get("conv-2").is_none());
    }
}
