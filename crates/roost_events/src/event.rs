//! The per-firing event object and the contexts it is assembled from.

use hashbrown::HashMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::HookError;
use crate::hook::Hook;

// ─────────────────────────────────────────────────────────────────────────────
// Context
// ─────────────────────────────────────────────────────────────────────────────

/// One mapping merged into the event at fire time.
///
/// Holds plain data plus named hook references, so a firing can hand other
/// hooks to its handlers.
#[derive(Debug, Clone, Default)]
pub struct Context {
    data: Map<String, Value>,
    hooks: HashMap<String, Hook>,
}

impl Context {
    /// An empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a data entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Adds a named hook reference.
    #[must_use]
    pub fn with_hook(mut self, key: impl Into<String>, hook: &Hook) -> Self {
        self.hooks.insert(key.into(), hook.clone());
        self
    }

    /// Merges `contexts` left to right into one context.
    #[must_use]
    pub fn merged(contexts: impl IntoIterator<Item = Context>) -> Self {
        contexts.into_iter().fold(Self::new(), |mut merged, context| {
            merged.data.extend(context.data);
            merged.hooks.extend(context.hooks);
            merged
        })
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(key.into(), value.into())
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Returns the string stored under `key`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(data: Map<String, Value>) -> Self {
        Self {
            data,
            hooks: HashMap::new(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Context {
    fn from(entries: [(K, V); N]) -> Self {
        entries
            .into_iter()
            .fold(Self::new(), |context, (key, value)| context.with(key, value))
    }
}

impl From<Event> for Context {
    fn from(event: Event) -> Self {
        event.into_context()
    }
}

impl TryFrom<Value> for Context {
    type Error = HookError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(data) => Ok(data.into()),
            other => Err(HookError::InvalidContext(other.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event
// ─────────────────────────────────────────────────────────────────────────────

/// Mutable data shared by every handler of one firing.
///
/// Built fresh for each `fire`: contexts are merged left to right (later
/// keys win), then the back-reference to the firing hook is set. Handlers see
/// mutations made by the handlers before them.
#[derive(Debug, Clone, Default)]
pub struct Event {
    data: Map<String, Value>,
    hooks: HashMap<String, Hook>,
    calling_hook: Option<Hook>,
    cancelled: bool,
}

impl Event {
    pub(crate) fn assemble(contexts: impl IntoIterator<Item = Context>, calling_hook: &Hook) -> Self {
        let Context { data, hooks } = Context::merged(contexts);
        Self {
            data,
            hooks,
            calling_hook: Some(calling_hook.clone()),
            cancelled: false,
        }
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.data.get_mut(key)
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(key.into(), value.into())
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Returns true if `key` holds a value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Deserializes the value stored under `key`.
    ///
    /// Returns `None` when the key is absent or the value has another shape.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Returns the string stored under `key`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Returns the boolean stored under `key`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }

    /// Returns the integer stored under `key`.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }

    /// All data entries.
    #[must_use]
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Returns the hook stored under `key`.
    #[must_use]
    pub fn hook(&self, key: &str) -> Option<&Hook> {
        self.hooks.get(key)
    }

    /// Stores a hook reference under `key`.
    pub fn insert_hook(&mut self, key: impl Into<String>, hook: &Hook) {
        self.hooks.insert(key.into(), hook.clone());
    }

    /// The hook currently dispatching this event.
    #[must_use]
    pub fn calling_hook(&self) -> Option<&Hook> {
        self.calling_hook.as_ref()
    }

    /// Stops a cancellable firing after the current handler returns.
    ///
    /// Hooks that are not cancellable ignore the flag.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Returns true once [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Converts the event back into a context, dropping the firing state.
    ///
    /// Used to forward one firing's data into another hook.
    #[must_use]
    pub fn into_context(self) -> Context {
        Context {
            data: self.data,
            hooks: self.hooks,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn contexts_merge_left_to_right() {
        let hook = Hook::new("merge");
        let first = Context::from([("a", 1), ("b", 1)]);
        let second = Context::new().with("b", 2).with("c", "three");

        let event = Event::assemble([first, second], &hook);

        assert_eq!(event.get_i64("a"), Some(1));
        assert_eq!(event.get_i64("b"), Some(2));
        assert_eq!(event.get_str("c"), Some("three"));
        assert!(event.calling_hook().is_some_and(|h| h.ptr_eq(&hook)));
    }

    #[test]
    fn non_object_context_is_rejected() {
        let err = Context::try_from(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, HookError::InvalidContext(_)));

        let ok = Context::try_from(json!({"x": true})).unwrap();
        assert_eq!(ok.data.get("x"), Some(&json!(true)));
    }

    #[test]
    fn typed_access() {
        let mut event = Event::default();
        event.insert("list", json!([1, 2, 3]));
        let list: Vec<u32> = event.get_as("list").unwrap();
        assert_eq!(list, vec![1, 2, 3]);
        assert_eq!(event.get_as::<String>("list"), None);
        assert_eq!(event.remove("list"), Some(json!([1, 2, 3])));
        assert!(!event.contains("list"));
    }

    #[test]
    fn cancellation_flag() {
        let mut event = Event::default();
        assert!(!event.is_cancelled());
        event.cancel();
        assert!(event.is_cancelled());
    }

    #[test]
    fn into_context_keeps_hooks() {
        let hook = Hook::new("carried");
        let mut event = Event::default();
        event.insert("k", "v");
        event.insert_hook("next", &hook);

        let context = event.into_context();
        let rebuilt = Event::assemble([context], &Hook::new("other"));
        assert_eq!(rebuilt.get_str("k"), Some("v"));
        assert!(rebuilt.hook("next").is_some_and(|h| h.ptr_eq(&hook)));
    }
}
