//! Runtime values exchanged between modules.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A function or class binding. Only its name and source are known to the
/// loader; calling it is the host's business.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRef {
    pub name: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    Function(FunctionRef),
    /// Another module's export container (namespace import).
    Module(Exports),
    /// An expression the evaluator did not reduce, kept as source text.
    Opaque(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<&Exports> {
        match self {
            Value::Module(exports) => Some(exports),
            _ => None,
        }
    }

    /// Property lookup as a member access would see it.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => map.get(key).cloned().unwrap_or_default(),
            Value::Module(exports) => exports.get(key).unwrap_or_default(),
            Value::Array(items) => match key {
                "length" => Value::Number(items.len() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default(),
            },
            Value::String(s) if key == "length" => Value::Number(s.chars().count() as f64),
            _ => Value::Undefined,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a.same_instance(b),
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPORT CONTAINER
// ═══════════════════════════════════════════════════════════════════════════════

/// The mutable mapping a module body fills in while it runs.
///
/// Clones share one underlying map, so every importer observes the same
/// container instance.
#[derive(Clone, Default)]
pub struct Exports {
    slots: Arc<RwLock<IndexMap<String, Value>>>,
}

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Container for a data document: `{ default: value }`.
    pub fn with_default(value: Value) -> Self {
        let exports = Self::new();
        exports.set("default", value);
        exports
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.slots.read().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.slots.write().insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.read().contains_key(name)
    }

    /// Export names in the order they were first assigned.
    pub fn names(&self) -> Vec<String> {
        self.slots.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Copies every export of `other` into `self`, overwriting same-named slots.
    pub fn assign_from(&self, other: &Exports) {
        if self.same_instance(other) {
            return;
        }
        let source = other.slots.read().clone();
        let mut slots = self.slots.write();
        for (name, value) in source {
            slots.insert(name, value);
        }
    }

    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.slots.read().clone()
    }

    pub fn same_instance(&self, other: &Exports) -> bool {
        Arc::ptr_eq(&self.slots, &other.slots)
    }
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Names only: a namespace may contain itself.
        f.debug_struct("Exports")
            .field("names", &self.names())
            .finish()
    }
}
