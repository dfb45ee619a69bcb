//! Per-hook configuration.

/// What a hook does when a handler returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Abort the firing and return the error to the caller.
    #[default]
    Propagate,
    /// Log the error and keep dispatching the remaining handlers.
    LogAndContinue,
}

/// Configuration applied when a hook is created.
///
/// # Example
///
/// ```
/// use roost_events::{ErrorPolicy, Hook, HookConfig};
///
/// let config = HookConfig::new()
///     .with_default_tags(["early", "normal", "late"])
///     .with_error_policy(ErrorPolicy::LogAndContinue)
///     .cancellable();
/// let hook = Hook::with_config("message", config);
/// assert!(hook.has_tag("normal"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookConfig {
    /// Tags created up front, each ordered after the previous one.
    pub default_tags: Vec<String>,
    /// Handler error behaviour.
    pub error_policy: ErrorPolicy,
    /// Whether handlers can stop the firing via [`Event::cancel`](crate::Event::cancel).
    pub cancellable: bool,
    /// Tag implicitly given to unordered handlers (command hooks).
    pub main_tag: Option<String>,
}

impl HookConfig {
    /// Default configuration: no tags, errors propagate, not cancellable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chained default tags.
    #[must_use]
    pub fn with_default_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the handler error policy.
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Makes the hook cancellable.
    #[must_use]
    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    /// Makes the hook a command hook.
    ///
    /// An unordered, untagged handler is placed in the `"main"` tag, and a
    /// second such handler is rejected while the first is registered.
    #[must_use]
    pub fn command(self) -> Self {
        self.with_main_tag("main")
    }

    /// Makes the hook a command hook with a custom main tag.
    #[must_use]
    pub fn with_main_tag(mut self, tag: impl Into<String>) -> Self {
        self.main_tag = Some(tag.into());
        self
    }
}
