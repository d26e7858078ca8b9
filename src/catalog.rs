//! Persona catalog data model.
//!
//! A catalog document is either a flat `key -> persona` JSON object or a
//! `{meta, personas}` envelope (the shape used by importable collections).
//! Both resolve at parse time into the single canonical [`Catalog`]
//! representation, which preserves declaration order; matcher tie-breaks and
//! stable priority sorts depend on it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// A named bundle of prompt, description and rules defining an assistant role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub prompt: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,
    /// Excluded from listings.
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    /// Merged into every outbound prompt regardless of selection.
    #[serde(default, skip_serializing_if = "is_false")]
    pub always_active: bool,
    /// Lower loads first when multiple always-active personas exist.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub priority: i64,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

fn is_zero(priority: &i64) -> bool {
    *priority == 0
}

/// Catalog-level metadata carried by importable collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The full set of personas known to the system, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub meta: Option<CatalogMeta>,
    entries: Vec<(String, Persona)>,
}

/// Entry rejected during lenient parsing, with the reasons.
#[derive(Debug, Clone)]
pub struct RejectedEntry {
    pub key: String,
    pub errors: Vec<String>,
}

impl Catalog {
    pub fn new(meta: Option<CatalogMeta>, entries: Vec<(String, Persona)>) -> Self {
        Self { meta, entries }
    }

    pub fn get(&self, key: &str) -> Option<&Persona> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, persona)| persona)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Persona keys in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Persona)> {
        self.entries
            .iter()
            .map(|(key, persona)| (key.as_str(), persona))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or overwrite an entry. An overwrite keeps the original position
    /// so declaration order stays stable across merges.
    pub fn upsert(&mut self, key: String, persona: Persona) -> bool {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| *existing == key)
        {
            slot.1 = persona;
            true
        } else {
            self.entries.push((key, persona));
            false
        }
    }

    /// Non-hidden personas, for listings.
    pub fn visible(&self) -> impl Iterator<Item = (&str, &Persona)> {
        self.iter().filter(|(_, persona)| !persona.hidden)
    }

    /// Always-active personas in ascending priority, declaration order on ties.
    pub fn always_active(&self) -> Vec<(&str, &Persona)> {
        let mut personas: Vec<(&str, &Persona)> = self
            .iter()
            .filter(|(_, persona)| persona.always_active)
            .collect();
        personas.sort_by_key(|(_, persona)| persona.priority);
        personas
    }

    /// Parse a catalog document, accepting both supported shapes.
    ///
    /// Strict mode fails the whole document on any invalid entry. Lenient mode
    /// keeps the valid entries and reports the rest.
    pub fn parse_document(
        text: &str,
        lenient: bool,
    ) -> Result<(Catalog, Vec<RejectedEntry>), EngineError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EngineError::Schema(vec![format!("invalid JSON: {e}")]))?;

        let Value::Object(root) = value else {
            return Err(EngineError::Schema(vec![
                "catalog document must be a JSON object".to_string(),
            ]));
        };

        // Envelope shape: {meta?, personas: {...}}. Anything else is a flat map.
        let (meta, personas_obj) = match root.get("personas") {
            Some(Value::Object(personas)) => {
                let meta = match root.get("meta") {
                    Some(meta_value) => Some(
                        serde_json::from_value::<CatalogMeta>(meta_value.clone()).map_err(
                            |e| EngineError::Schema(vec![format!("invalid meta block: {e}")]),
                        )?,
                    ),
                    None => None,
                };
                (meta, personas.clone())
            }
            Some(other) => {
                return Err(EngineError::Schema(vec![format!(
                    "'personas' must be an object, got {}",
                    json_type_name(other)
                )]));
            }
            None => (None, root),
        };

        if personas_obj.is_empty() {
            return Err(EngineError::Schema(vec![
                "catalog contains no personas".to_string(),
            ]));
        }

        let mut entries = Vec::with_capacity(personas_obj.len());
        let mut rejected = Vec::new();
        let mut all_errors = Vec::new();

        for (key, value) in personas_obj {
            let mut errors = validate_key(&key);
            match serde_json::from_value::<Persona>(value) {
                Ok(persona) => {
                    errors.extend(validate_persona(&persona));
                    if errors.is_empty() {
                        entries.push((key, persona));
                        continue;
                    }
                }
                Err(e) => errors.push(format!("not a valid persona object: {e}")),
            }

            for error in &errors {
                all_errors.push(format!("persona '{key}': {error}"));
            }
            rejected.push(RejectedEntry { key, errors });
        }

        if !all_errors.is_empty() && !lenient {
            return Err(EngineError::Schema(all_errors));
        }

        if entries.is_empty() {
            return Err(EngineError::Schema(if all_errors.is_empty() {
                vec!["catalog contains no personas".to_string()]
            } else {
                all_errors
            }));
        }

        Ok((Catalog::new(meta, entries), rejected))
    }

    /// Serialize back to the persisted document shape: flat when there is no
    /// metadata, envelope otherwise.
    pub fn to_document_string(&self) -> Result<String, EngineError> {
        let mut personas = serde_json::Map::new();
        for (key, persona) in &self.entries {
            let value = serde_json::to_value(persona)
                .map_err(|e| EngineError::Schema(vec![format!("serialization failed: {e}")]))?;
            personas.insert(key.clone(), value);
        }

        let document = match &self.meta {
            Some(meta) => {
                let meta_value = serde_json::to_value(meta)
                    .map_err(|e| EngineError::Schema(vec![format!("serialization failed: {e}")]))?;
                let mut envelope = serde_json::Map::new();
                envelope.insert("meta".to_string(), meta_value);
                envelope.insert("personas".to_string(), Value::Object(personas));
                Value::Object(envelope)
            }
            None => Value::Object(personas),
        };

        serde_json::to_string_pretty(&document)
            .map_err(|e| EngineError::Schema(vec![format!("serialization failed: {e}")]))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn validate_key(key: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if key.trim().is_empty() {
        errors.push("key cannot be empty".to_string());
    } else if !key
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        errors.push("key must be a lowercase token (a-z, 0-9, _)".to_string());
    }
    errors
}

fn validate_persona(persona: &Persona) -> Vec<String> {
    let mut errors = Vec::new();
    for (field, value) in [
        ("name", &persona.name),
        ("prompt", &persona.prompt),
        ("description", &persona.description),
    ] {
        if value.trim().is_empty() {
            errors.push(format!("field '{field}' cannot be empty"));
        }
    }
    errors
}

/// Built-in catalog: the hidden always-active controller plus two starter
/// personas. Written to disk on first use when `create_default_config` is set,
/// and used as the in-memory fallback when no valid catalog can be loaded.
pub fn default_catalog() -> Catalog {
    let controller = Persona {
        name: "Controller".to_string(),
        prompt: "You are the platform controller. Follow the host application's \
                 baseline instructions: answer helpfully, format output as Markdown, \
                 and honor any additional persona instructions that follow this message."
            .to_string(),
        description: "Always-active foundation supplying baseline platform capabilities."
            .to_string(),
        rules: vec![],
        hidden: true,
        always_active: true,
        priority: 0,
    };

    let coder = Persona {
        name: "Code Assistant".to_string(),
        prompt: "You are the Code Assistant. Provide clean, efficient, well-documented \
                 code, explain the reasoning behind design choices, and take a systematic \
                 approach to debugging."
            .to_string(),
        description: "Expert programming and development assistance.".to_string(),
        rules: vec![
            "Prioritize clean, efficient, well-documented solutions.".to_string(),
            "Consider security, performance and maintainability.".to_string(),
        ],
        hidden: false,
        always_active: false,
        priority: 0,
    };

    let writer = Persona {
        name: "Creative Writer".to_string(),
        prompt: "You are the Creative Writer. Craft engaging, well-structured content \
                 with a strong, adaptable voice, and assist with brainstorming, drafting, \
                 editing and polishing."
            .to_string(),
        description: "Creative writing and content creation specialist.".to_string(),
        rules: vec!["Focus on clarity, impact and creative expression.".to_string()],
        hidden: false,
        always_active: false,
        priority: 0,
    };

    Catalog::new(
        None,
        vec![
            ("controller".to_string(), controller),
            ("coder".to_string(), coder),
            ("writer".to_string(), writer),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona(name: &str) -> Persona {
        Persona {
            name: name.to_string(),
            prompt: format!("You are {name}."),
            description: format!("{name} persona"),
            rules: vec![],
            hidden: false,
            always_active: false,
            priority: 0,
        }
    }

    #[test]
    fn parses_flat_document() {
        let text = r#"{
            "coder": {"name": "Coder", "prompt": "p", "description": "d"},
            "writer": {"name": "Writer", "prompt": "p", "description": "d", "rules": ["r1"]}
        }"#;
        let (catalog, rejected) = Catalog::parse_document(text, false).unwrap();
        assert!(rejected.is_empty());
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.keys(), vec!["coder", "writer"]);
        assert_eq!(catalog.get("writer").unwrap().rules, vec!["r1"]);
        assert!(catalog.meta.is_none());
    }

    #[test]
    fn parses_envelope_document() {
        let text = r#"{
            "meta": {"version": "1.0", "author": "someone"},
            "personas": {
                "analyst": {"name": "Analyst", "prompt": "p", "description": "d"}
            }
        }"#;
        let (catalog, _) = Catalog::parse_document(text, false).unwrap();
        assert_eq!(catalog.len(), 1);
        let meta = catalog.meta.as_ref().unwrap();
        assert_eq!(meta.version.as_deref(), Some("1.0"));
        assert_eq!(meta.author.as_deref(), Some("someone"));
    }

    #[test]
    fn strict_mode_rejects_whole_document_on_one_bad_entry() {
        let text = r#"{
            "x": {"name": "X", "prompt": "p", "description": "d"},
            "y": {"name": "Y", "description": "d"}
        }"#;
        let err = Catalog::parse_document(text, false).unwrap_err();
        match err {
            EngineError::Schema(errors) => {
                assert!(errors.iter().any(|e| e.contains("'y'")), "{errors:?}");
            }
            other => panic!("expected Schema error, got {other:?}"),
        }
    }

    #[test]
    fn lenient_mode_keeps_valid_entries_and_reports_rest() {
        let text = r#"{
            "x": {"name": "X", "prompt": "p", "description": "d"},
            "y": {"name": "Y", "prompt": "", "description": "d"}
        }"#;
        let (catalog, rejected) = Catalog::parse_document(text, true).unwrap();
        assert_eq!(catalog.keys(), vec!["x"]);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].key, "y");
    }

    #[test]
    fn rejects_invalid_keys() {
        let text = r#"{"Bad Key!": {"name": "X", "prompt": "p", "description": "d"}}"#;
        assert!(matches!(
            Catalog::parse_document(text, false),
            Err(EngineError::Schema(_))
        ));
    }

    #[test]
    fn rejects_empty_and_non_object_documents() {
        assert!(Catalog::parse_document("{}", false).is_err());
        assert!(Catalog::parse_document("[1,2]", false).is_err());
        assert!(Catalog::parse_document("not json", false).is_err());
        assert!(Catalog::parse_document(r#"{"personas": 3}"#, false).is_err());
    }

    #[test]
    fn document_round_trip_preserves_order_and_meta() {
        let mut catalog = Catalog::new(
            Some(CatalogMeta {
                version: Some("2".to_string()),
                author: None,
                description: None,
            }),
            vec![
                ("zeta".to_string(), persona("Zeta")),
                ("alpha".to_string(), persona("Alpha")),
            ],
        );
        catalog.upsert("mid".to_string(), persona("Mid"));

        let text = catalog.to_document_string().unwrap();
        let (parsed, _) = Catalog::parse_document(&text, false).unwrap();
        assert_eq!(parsed.keys(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(parsed.meta.as_ref().unwrap().version.as_deref(), Some("2"));
    }

    #[test]
    fn upsert_overwrites_in_place() {
        let mut catalog = Catalog::new(
            None,
            vec![
                ("a".to_string(), persona("A")),
                ("b".to_string(), persona("B")),
            ],
        );
        let overwritten = catalog.upsert("a".to_string(), persona("A2"));
        assert!(overwritten);
        assert_eq!(catalog.keys(), vec!["a", "b"]);
        assert_eq!(catalog.get("a").unwrap().name, "A2");
    }

    #[test]
    fn always_active_sorted_by_priority_stable() {
        let mut second = persona("Second");
        second.always_active = true;
        second.priority = 1;
        let mut first = persona("First");
        first.always_active = true;
        first.priority = 0;
        let mut tie = persona("Tie");
        tie.always_active = true;
        tie.priority = 1;

        let catalog = Catalog::new(
            None,
            vec![
                ("second".to_string(), second),
                ("plain".to_string(), persona("Plain")),
                ("first".to_string(), first),
                ("tie".to_string(), tie),
            ],
        );
        let keys: Vec<&str> = catalog.always_active().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["first", "second", "tie"]);
    }

    #[test]
    fn default_catalog_has_hidden_always_active_controller() {
        let catalog = default_catalog();
        let controller = catalog.get("controller").unwrap();
        assert!(controller.hidden);
        assert!(controller.always_active);
        assert_eq!(controller.priority, 0);
        let visible: Vec<&str> = catalog.visible().map(|(k, _)| k).collect();
        assert!(!visible.contains(&"controller"));
        assert!(visible.contains(&"coder"));
    }
}
