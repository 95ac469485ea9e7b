//! Structured classifier output.
//!
//! The LLM is an untrusted collaborator: everything it returns passes
//! through [`Analysis::from_value`], which defaults any missing or garbled
//! field instead of erroring.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What the user wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Create,
    Get,
    Update,
    Unknown,
}

impl Intent {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "create" => Intent::Create,
            "get" | "list" | "show" => Intent::Get,
            "update" => Intent::Update,
            _ => Intent::Unknown,
        }
    }
}

/// Which entity family a request concerns.
///
/// The classifier distinguishes task/reminder and order/product, but the
/// router collapses each pair via [`EntityKind::is_task_like`] and
/// [`EntityKind::is_order_like`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Task,
    Reminder,
    Order,
    Product,
    None,
}

impl EntityKind {
    pub fn is_task_like(self) -> bool {
        matches!(self, EntityKind::Task | EntityKind::Reminder)
    }

    pub fn is_order_like(self) -> bool {
        matches!(self, EntityKind::Order | EntityKind::Product)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Task => "task",
            EntityKind::Reminder => "reminder",
            EntityKind::Order => "order",
            EntityKind::Product => "product",
            EntityKind::None => "none",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "task" => EntityKind::Task,
            "reminder" => EntityKind::Reminder,
            "order" => EntityKind::Order,
            "product" => EntityKind::Product,
            _ => EntityKind::None,
        }
    }
}

/// One classified message: intent, entity family, and an opaque parameter bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub intent: Intent,
    pub entity: EntityKind,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Analysis {
    /// The "I could not make sense of that" value.
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            entity: EntityKind::None,
            params: Map::new(),
        }
    }

    /// Build from a raw JSON value, defaulting anything malformed.
    ///
    /// Accepts both `entity_type` and `entityType` spellings since models
    /// drift between the two regardless of prompting.
    pub fn from_value(v: &Value) -> Self {
        let obj = match v.as_object() {
            Some(o) => o,
            None => return Self::unknown(),
        };

        let intent = obj
            .get("intent")
            .and_then(Value::as_str)
            .map(Intent::parse)
            .unwrap_or(Intent::Unknown);

        let entity = obj
            .get("entity_type")
            .or_else(|| obj.get("entityType"))
            .and_then(Value::as_str)
            .map(EntityKind::parse)
            .unwrap_or(EntityKind::None);

        let params = obj
            .get("parameters")
            .or_else(|| obj.get("params"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Self {
            intent,
            entity,
            params,
        }
    }

    /// String parameter, trimmed; empty strings count as absent.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Integer parameter; tolerates the model emitting `"3"` instead of `3`.
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
