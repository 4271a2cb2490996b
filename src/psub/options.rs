//! Subscription and subscriber options.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NAME_ID: AtomicU64 = AtomicU64::new(0);

/// Returns `"<prefix>-<n>"` with a process-wide increasing `n`.
pub(crate) fn generate_name(prefix: &str) -> String {
    format!("{}-{}", prefix, NEXT_NAME_ID.fetch_add(1, Ordering::Relaxed) + 1)
}

/// Per-subscription settings.
///
/// Every field is optional; [`SubscriptionOptions::merged`] overlays one set on
/// another field by field, which is how per-call options override a
/// subscriber's defaults.
///
/// ## Defaults
/// - name: `"<prefix>-<n>"`, prefix `"subscription"`
/// - buffer: 1 (`0` is clamped to 1)
/// - blocking: `false` (a full buffer drops the value)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub name: Option<String>,
    pub name_prefix: Option<String>,
    pub buffer: Option<usize>,
    pub blocking: Option<bool>,
}

impl SubscriptionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn with_buffer(mut self, size: usize) -> Self {
        self.buffer = Some(size);
        self
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = Some(blocking);
        self
    }

    /// `self` with every field set in `over` replaced.
    ///
    /// # Example
    /// ```
    /// use feedvisor::SubscriptionOptions;
    ///
    /// let defaults = SubscriptionOptions::new().with_blocking(true).with_buffer(8);
    /// let opts = defaults.merged(&SubscriptionOptions::new().with_buffer(2));
    ///
    /// assert_eq!(opts.blocking, Some(true));
    /// assert_eq!(opts.buffer, Some(2));
    /// ```
    pub fn merged(&self, over: &SubscriptionOptions) -> SubscriptionOptions {
        SubscriptionOptions {
            name: over.name.clone().or_else(|| self.name.clone()),
            name_prefix: over.name_prefix.clone().or_else(|| self.name_prefix.clone()),
            buffer: over.buffer.or(self.buffer),
            blocking: over.blocking.or(self.blocking),
        }
    }

    pub(crate) fn resolve_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => generate_name(self.name_prefix.as_deref().unwrap_or("subscription")),
        }
    }

    /// Channel capacity, at least 1.
    pub(crate) fn capacity(&self) -> usize {
        self.buffer.unwrap_or(0).max(1)
    }

    pub(crate) fn is_blocking(&self) -> bool {
        self.blocking.unwrap_or(false)
    }
}

/// Settings of a [`Subscriber`](crate::Subscriber).
#[derive(Clone, Debug, Default)]
pub struct SubscriberOptions {
    /// Subscriber name; generated as `"subscriber-<n>"` when unset.
    pub name: Option<String>,
    /// Defaults applied to every subscription.
    pub subscription: SubscriptionOptions,
}

impl SubscriberOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_subscription_options(mut self, opts: SubscriptionOptions) -> Self {
        self.subscription = opts;
        self
    }
}
