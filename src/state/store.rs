// SPDX-License-Identifier: MIT

//! Runtime state storage

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{StateError, StateValidationError};
use crate::state::schema::StateSchema;

/// Schema-checked key/value container with transactional edits.
///
/// Cloning deep-copies owned values, so clones evolve independently.
/// Keys designated as shared are the exception: every clone keeps
/// pointing at the same cell, which is how forked conversations share
/// things like connection handles.
#[derive(Debug, Clone, Default)]
pub struct State {
    fields: HashMap<String, Value>,
    shared: HashMap<String, Arc<RwLock<Value>>>,
    shared_keys: HashSet<String>,
    schema: Option<Arc<StateSchema>>,
}

struct Snapshot {
    fields: HashMap<String, Value>,
    shared: HashMap<String, Arc<RwLock<Value>>>,
}

impl State {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a state from initial data, binding shared-designated keys
    /// to aliased cells. Validates immediately when a schema is given.
    pub fn new(
        data: Map<String, Value>,
        schema: Option<StateSchema>,
        shared_keys: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, StateError> {
        let mut state = Self {
            fields: HashMap::new(),
            shared: HashMap::new(),
            shared_keys: shared_keys.into_iter().map(Into::into).collect(),
            schema: schema.map(Arc::new),
        };
        for (key, value) in data {
            state.bind(key, value);
        }
        if state.schema.is_some() {
            state.validate()?;
        }
        Ok(state)
    }

    /// A schema-less state holding the given data.
    pub fn with_data(data: Map<String, Value>) -> Self {
        let mut state = Self::default();
        for (key, value) in data {
            state.bind(key, value);
        }
        state
    }

    fn bind(&mut self, key: String, value: Value) {
        if self.shared_keys.contains(&key) {
            self.shared.insert(key, Arc::new(RwLock::new(value)));
        } else {
            self.fields.insert(key, value);
        }
    }

    pub fn schema(&self) -> Option<&StateSchema> {
        self.schema.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(cell) = self.shared.get(key) {
            return Some(read_cell(cell));
        }
        self.fields.get(key).cloned()
    }

    /// Binds a key to a value. A shared-designated key gets a fresh
    /// cell, so existing clones keep seeing the old one.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.bind(key.into(), value);
    }

    /// Writes through an existing shared cell so aliases observe the new
    /// value; other keys are plain binds.
    fn put_in_place(&mut self, key: &str, value: Value) {
        if let Some(cell) = self.shared.get(key) {
            write_cell(cell, value);
        } else {
            self.bind(key.to_string(), value);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if let Some(cell) = self.shared.remove(key) {
            return Some(read_cell(&cell));
        }
        self.fields.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key) || self.shared.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len() + self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.shared.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys().chain(self.shared.keys())
    }

    /// Plain JSON rendering of every key, shared cells included.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.clone());
        }
        for (key, cell) in &self.shared {
            map.insert(key.clone(), read_cell(cell));
        }
        Value::Object(map)
    }

    /// The aliased cell behind a shared key, if the key is bound.
    pub fn shared_handle(&self, key: &str) -> Option<Arc<RwLock<Value>>> {
        self.shared.get(key).cloned()
    }

    /// Reads a key the way attribute access would. Missing keys and
    /// reserved (underscore-prefixed) keys both read as absent.
    pub fn attr(&self, key: &str) -> Result<Value, StateError> {
        if key.starts_with('_') {
            return Err(StateError::AttributeNotFound(key.to_string()));
        }
        self.get(key)
            .ok_or_else(|| StateError::AttributeNotFound(key.to_string()))
    }

    pub fn get_str(&self, key: &str) -> Result<String, StateError> {
        match self.attr(key)? {
            Value::String(text) => Ok(text),
            _ => Err(mismatch(key, "string")),
        }
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, StateError> {
        match self.attr(key)? {
            Value::Number(n) => n.as_i64().ok_or_else(|| mismatch(key, "integer")),
            _ => Err(mismatch(key, "integer")),
        }
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, StateError> {
        match self.attr(key)? {
            Value::Number(n) => n.as_f64().ok_or_else(|| mismatch(key, "number")),
            _ => Err(mismatch(key, "number")),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, StateError> {
        match self.attr(key)? {
            Value::Bool(b) => Ok(b),
            _ => Err(mismatch(key, "boolean")),
        }
    }

    pub fn get_array(&self, key: &str) -> Result<Vec<Value>, StateError> {
        match self.attr(key)? {
            Value::Array(items) => Ok(items),
            _ => Err(mismatch(key, "array")),
        }
    }

    pub fn get_object(&self, key: &str) -> Result<Map<String, Value>, StateError> {
        match self.attr(key)? {
            Value::Object(map) => Ok(map),
            _ => Err(mismatch(key, "object")),
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            fields: self.fields.clone(),
            shared: self.shared.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.fields = snapshot.fields;
        self.shared = snapshot.shared;
    }

    /// Runs `f` as a transaction. On success the schema, if any, is
    /// re-validated and the changes stay; on failure, including a failed
    /// re-validation, every binding is restored. In-place writes through
    /// shared handles are outside the transaction; only bindings roll
    /// back.
    pub fn atomic<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StateError>,
    {
        let snapshot = self.snapshot();
        let result = f(self).and_then(|value| match self.validate() {
            Ok(()) => Ok(value),
            Err(err) => Err(E::from(StateError::from(err))),
        });
        if result.is_err() {
            self.restore(snapshot);
        }
        result
    }

    /// Runs `f` against the state and restores the previous bindings
    /// afterwards, whatever happened. For what-if evaluation.
    pub fn fork<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        let snapshot = self.snapshot();
        let result = f(self);
        self.restore(snapshot);
        result
    }

    /// Checks every schema field and collects all problems rather than
    /// stopping at the first. Missing fields with defaults are filled
    /// in, and lossless coercions (numeric and boolean strings) are
    /// applied in place.
    pub fn validate(&mut self) -> Result<(), StateValidationError> {
        let schema = match &self.schema {
            Some(schema) => schema.clone(),
            None => return Ok(()),
        };
        let mut errors = Vec::new();
        for (key, def) in &schema.fields {
            match self.get(key) {
                None => match &def.default {
                    Some(default) => self.put_in_place(key, default.clone()),
                    None => errors.push(format!("Missing required field '{key}'")),
                },
                Some(value) => match def.check(key, &value) {
                    Ok(None) => {}
                    Ok(Some(coerced)) => self.put_in_place(key, coerced),
                    Err(message) => errors.push(message),
                },
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StateValidationError::new(errors))
        }
    }
}

fn mismatch(key: &str, expected: &'static str) -> StateError {
    StateError::TypeMismatch {
        key: key.to_string(),
        expected,
    }
}

fn read_cell(cell: &Arc<RwLock<Value>>) -> Value {
    cell.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write_cell(cell: &Arc<RwLock<Value>>, value: Value) {
    *cell.write().unwrap_or_else(PoisonError::into_inner) = value;
}
