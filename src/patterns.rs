//! Compiled command matchers.
//!
//! Matchers are a derived value keyed by the composite of prefix, case flag
//! and the ordered persona key set; the dispatcher recompiles lazily whenever
//! that key changes, so matchers for removed personas can never fire. Persona
//! matchers are ordered longest key first (declaration order on ties) so a
//! key that is a textual prefix of another never shadows it.

use regex_lite::Regex;

use crate::error::EngineError;

/// Composite key identifying one compiled matcher set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileKey {
    pub prefix: String,
    pub case_sensitive: bool,
    /// Persona keys in catalog declaration order.
    pub persona_keys: Vec<String>,
    pub reset_keywords: Vec<String>,
    pub list_keyword: String,
    pub download_keyword: String,
}

pub struct PersonaMatcher {
    pub key: String,
    regex: Regex,
}

impl PersonaMatcher {
    pub fn find(&self, text: &str) -> Option<usize> {
        self.regex.find(text).map(|m| m.start())
    }
}

pub struct CompiledMatchers {
    key: CompileKey,
    /// Longest persona key first; stable for declaration-order ties.
    pub personas: Vec<PersonaMatcher>,
    reset: Regex,
    list: Regex,
    download: Regex,
}

impl CompiledMatchers {
    pub fn compile(key: CompileKey) -> Result<Self, EngineError> {
        if key.prefix.trim().is_empty() {
            return Err(EngineError::Config(
                "keyword_prefix cannot be empty".to_string(),
            ));
        }
        if key.reset_keywords.is_empty() {
            return Err(EngineError::Config(
                "reset_keywords cannot be empty".to_string(),
            ));
        }

        let flags = if key.case_sensitive { "" } else { "(?i)" };
        let prefix = escape_pattern(&key.prefix);

        let mut persona_keys: Vec<&String> = key.persona_keys.iter().collect();
        persona_keys.sort_by_key(|k| std::cmp::Reverse(k.len()));

        let mut personas = Vec::with_capacity(persona_keys.len());
        for persona_key in persona_keys {
            let pattern = format!("{flags}{prefix}{}\\b", escape_pattern(persona_key));
            let regex = Regex::new(&pattern).map_err(|e| {
                EngineError::Config(format!("bad pattern for persona '{persona_key}': {e}"))
            })?;
            personas.push(PersonaMatcher {
                key: persona_key.clone(),
                regex,
            });
        }

        let reset_alternation = key
            .reset_keywords
            .iter()
            .map(|word| escape_pattern(word))
            .collect::<Vec<_>>()
            .join("|");
        let reset = Regex::new(&format!("{flags}{prefix}(?:{reset_alternation})\\b"))
            .map_err(|e| EngineError::Config(format!("bad reset pattern: {e}")))?;

        let list = Regex::new(&format!(
            "{flags}{prefix}{}\\b",
            escape_pattern(&key.list_keyword)
        ))
        .map_err(|e| EngineError::Config(format!("bad list pattern: {e}")))?;

        let download = Regex::new(&format!(
            "{flags}{prefix}{}\\b",
            escape_pattern(&key.download_keyword)
        ))
        .map_err(|e| EngineError::Config(format!("bad download pattern: {e}")))?;

        Ok(Self {
            key,
            personas,
            reset,
            list,
            download,
        })
    }

    pub fn key(&self) -> &CompileKey {
        &self.key
    }

    pub fn find_reset(&self, text: &str) -> Option<usize> {
        self.reset.find(text).map(|m| m.start())
    }

    pub fn find_list(&self, text: &str) -> Option<usize> {
        self.list.find(text).map(|m| m.start())
    }

    /// Start and end of the download command token, arguments excluded.
    pub fn find_download(&self, text: &str) -> Option<(usize, usize)> {
        self.download.find(text).map(|m| (m.start(), m.end()))
    }
}

/// Escape regex metacharacters so configured prefixes and catalog keys are
/// always matched literally.
fn escape_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_key(keys: &[&str]) -> CompileKey {
        CompileKey {
            prefix: "!".to_string(),
            case_sensitive: false,
            persona_keys: keys.iter().map(|k| k.to_string()).collect(),
            reset_keywords: vec![
                "reset".to_string(),
                "default".to_string(),
                "normal".to_string(),
            ],
            list_keyword: "list".to_string(),
            download_keyword: "download_personas".to_string(),
        }
    }

    #[test]
    fn word_boundary_stops_prefix_keys_matching_longer_ones() {
        let matchers = CompiledMatchers::compile(compile_key(&["code", "coder"])).unwrap();

        // Longest key checked first.
        assert_eq!(matchers.personas[0].key, "coder");

        let coder = matchers.personas.iter().find(|m| m.key == "coder").unwrap();
        let code = matchers.personas.iter().find(|m| m.key == "code").unwrap();

        assert_eq!(coder.find("!coder help"), Some(0));
        assert_eq!(code.find("!coder help"), None);
        assert_eq!(code.find("please !code this"), Some(7));
    }

    #[test]
    fn case_insensitive_by_default_sensitive_on_request() {
        let matchers = CompiledMatchers::compile(compile_key(&["coder"])).unwrap();
        assert!(matchers.personas[0].find("!CODER").is_some());
        assert!(matchers.find_reset("!Reset now").is_some());

        let mut key = compile_key(&["coder"]);
        key.case_sensitive = true;
        let strict = CompiledMatchers::compile(key).unwrap();
        assert!(strict.personas[0].find("!CODER").is_none());
        assert!(strict.personas[0].find("!coder").is_some());
    }

    #[test]
    fn reset_alias_group_matches_all_aliases() {
        let matchers = CompiledMatchers::compile(compile_key(&[])).unwrap();
        for alias in ["!reset", "!default", "!normal"] {
            assert!(matchers.find_reset(alias).is_some(), "{alias}");
        }
        assert!(matchers.find_reset("!defaults").is_none());
    }

    #[test]
    fn download_match_reports_command_span() {
        let matchers = CompiledMatchers::compile(compile_key(&[])).unwrap();
        let (start, end) = matchers
            .find_download("!download_personas https://x --replace")
            .unwrap();
        assert_eq!(start, 0);
        assert_eq!(end, "!download_personas".len());
    }

    #[test]
    fn metacharacter_prefix_is_matched_literally() {
        let mut key = compile_key(&["coder"]);
        key.prefix = "$.".to_string();
        let matchers = CompiledMatchers::compile(key).unwrap();
        assert!(matchers.personas[0].find("$.coder").is_some());
        assert!(matchers.personas[0].find("xxcoder").is_none());
    }

    #[test]
    fn empty_prefix_is_a_config_error() {
        let mut key = compile_key(&[]);
        key.prefix = "  ".to_string();
        assert!(matches!(
            CompiledMatchers::compile(key),
            Err(EngineError::Config(_))
        ));
    }
}
