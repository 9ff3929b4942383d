/*!
 * Bindings
 * Caller-visible named slots that receive decoded task results
 */

use crate::core::errors::BindingError;
use crate::core::serialization::json;
use serde::de::DeserializeOwned;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Contents of one binding
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Placeholder set when a background task was spawned
    Unresolved,
    Resolved(Value),
}

/// Bindings shared between an executor and its pending background tasks
pub type SharedBindings = Arc<Mutex<Bindings>>;

/// Named result slots
///
/// The executor is the only writer; values arrive exclusively from decoded
/// task results.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    slots: HashMap<String, Slot>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a binding as a concrete type
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, BindingError> {
        match self.slots.get(name) {
            None => Err(BindingError::NotFound(name.to_string())),
            Some(Slot::Unresolved) => Err(BindingError::Unresolved(name.to_string())),
            Some(Slot::Resolved(value)) => {
                json::from_value(value.clone()).map_err(|e| BindingError::TypeMismatch {
                    name: name.to_string(),
                    message: std::error::Error::source(&e)
                        .map(|source| source.to_string())
                        .unwrap_or_else(|| e.to_string()),
                })
            }
        }
    }

    /// Raw resolved value, if any
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.slots.get(name) {
            Some(Slot::Resolved(value)) => Some(value),
            _ => None,
        }
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    /// True while a background result has not been joined
    pub fn is_unresolved(&self, name: &str) -> bool {
        matches!(self.slots.get(name), Some(Slot::Unresolved))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn mark_unresolved(&mut self, name: &str) {
        self.slots.insert(name.to_string(), Slot::Unresolved);
    }

    pub(crate) fn resolve(&mut self, name: &str, value: Value) {
        self.slots.insert(name.to_string(), Slot::Resolved(value));
    }
}
