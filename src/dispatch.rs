//! Command dispatcher: scans an inbound message against the compiled matcher
//! set and resolves exactly one action per message.
//!
//! Resolution order: system commands (reset, list, download) are checked
//! before persona switches; among system commands the earliest occurrence in
//! the text wins; among persona matches the earliest occurrence wins, with the
//! longest key taking precedence at equal positions. Pattern compilation
//! failures degrade to `NoAction` so a bad prefix can never break message
//! processing.

use std::sync::{Arc, Mutex};

use crate::patterns::{CompileKey, CompiledMatchers};

/// Single resolved action for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SwitchPersona(String),
    Reset,
    ListRequest,
    DownloadRequest { url: Option<String>, replace: bool },
    NoAction,
}

#[derive(Default)]
pub struct Dispatcher {
    compiled: Mutex<Option<Arc<CompiledMatchers>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the action for a message. `key` describes the current prefix,
    /// case mode and catalog key set; matchers are recompiled only when it
    /// differs from the cached compilation.
    pub fn dispatch(&self, text: &str, key: CompileKey) -> Action {
        if text.is_empty() {
            return Action::NoAction;
        }

        let matchers = match self.matchers_for(key) {
            Some(matchers) => matchers,
            None => return Action::NoAction,
        };

        // System commands first, earliest occurrence wins among them.
        let mut system: Option<(usize, Action)> = None;
        if let Some(pos) = matchers.find_reset(text) {
            system = Some((pos, Action::Reset));
        }
        if let Some(pos) = matchers.find_list(text) {
            if system.as_ref().map_or(true, |(best, _)| pos < *best) {
                system = Some((pos, Action::ListRequest));
            }
        }
        if let Some((pos, end)) = matchers.find_download(text) {
            if system.as_ref().map_or(true, |(best, _)| pos < *best) {
                let (url, replace) = parse_download_args(&text[end..]);
                system = Some((pos, Action::DownloadRequest { url, replace }));
            }
        }
        if let Some((_, action)) = system {
            return action;
        }

        // Persona switches: earliest position, longest key at equal positions
        // (matchers are ordered longest first, and `<` keeps the earlier hit).
        let mut best: Option<(usize, &str)> = None;
        for matcher in &matchers.personas {
            if let Some(pos) = matcher.find(text) {
                if best.map_or(true, |(best_pos, _)| pos < best_pos) {
                    best = Some((pos, &matcher.key));
                }
            }
        }

        match best {
            Some((_, key)) => Action::SwitchPersona(key.to_string()),
            None => Action::NoAction,
        }
    }

    fn matchers_for(&self, key: CompileKey) -> Option<Arc<CompiledMatchers>> {
        let mut slot = self.compiled.lock().expect("dispatcher matcher slot poisoned");

        if let Some(existing) = slot.as_ref() {
            if *existing.key() == key {
                return Some(Arc::clone(existing));
            }
        }

        match CompiledMatchers::compile(key) {
            Ok(matchers) => {
                let matchers = Arc::new(matchers);
                *slot = Some(Arc::clone(&matchers));
                Some(matchers)
            }
            Err(e) => {
                tracing::warn!("Command pattern compilation failed: {e}");
                *slot = None;
                None
            }
        }
    }
}

/// Parse the optional `[url] [--replace]` tokens following a download command,
/// bounded to the same line.
fn parse_download_args(rest: &str) -> (Option<String>, bool) {
    let line = rest.lines().next().unwrap_or("");
    let mut url = None;
    let mut replace = false;
    for token in line.split_whitespace().take(2) {
        if token == "--replace" {
            replace = true;
        } else if url.is_none() {
            url = Some(token.to_string());
        }
    }
    (url, replace)
}
