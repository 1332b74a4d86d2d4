//! Priority-ordered hook registry.
//!
//! Third parties extend the pipeline by registering [`Hook`]s against a key
//! (a check type, an effect stage). Hooks for a key run sequentially, highest
//! priority first, ties in registration order, so a later hook always sees
//! what an earlier one did to the payload.
//!
//! `run_all` drains the key it ran: registrations are one-shot. The pipeline
//! keeps a template registry and runs each check against a fresh clone.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

/// What to do when a hook fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookMode {
    /// Log the failure and keep running the remaining hooks.
    #[default]
    Lenient,
    /// Stop at the first failure and return it to the caller.
    Strict,
}

/// Returned by a hook to continue or to veto the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFlow {
    Continue,
    /// Stop the remaining hooks. Abortable stages treat this as a veto.
    Prevent,
}

/// A hook callback failed (returned an error or panicked).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("hook '{hook}' failed: {message}")]
pub struct HookError {
    pub hook: String,
    pub message: String,
}

impl HookError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            hook: String::new(),
            message: message.into(),
        }
    }
}

/// A callback run by a [`HookRegistry`].
#[async_trait]
pub trait Hook<P: Send>: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn call(&self, payload: &mut P) -> Result<HookFlow, HookError>;
}

/// Adapter turning a synchronous closure into a [`Hook`].
pub struct FnHook<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a hook.
pub fn hook_fn<P, F>(name: impl Into<String>, f: F) -> Arc<dyn Hook<P>>
where
    P: Send + 'static,
    F: Fn(&mut P) -> Result<HookFlow, HookError> + Send + Sync + 'static,
{
    Arc::new(FnHook {
        name: name.into(),
        f,
    })
}

#[async_trait]
impl<P, F> Hook<P> for FnHook<F>
where
    P: Send,
    F: Fn(&mut P) -> Result<HookFlow, HookError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, payload: &mut P) -> Result<HookFlow, HookError> {
        (self.f)(payload)
    }
}

struct Registration<P> {
    hook: Arc<dyn Hook<P>>,
    priority: i32,
}

impl<P> Clone for Registration<P> {
    fn clone(&self) -> Self {
        Self {
            hook: Arc::clone(&self.hook),
            priority: self.priority,
        }
    }
}

/// Summary of one `run_all` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookReport {
    pub ran: usize,
    pub failed: usize,
    /// Name of the hook that returned [`HookFlow::Prevent`], if any.
    pub prevented_by: Option<String>,
}

impl HookReport {
    pub fn is_prevented(&self) -> bool {
        self.prevented_by.is_some()
    }
}

/// One-shot, priority-ordered hook store keyed by `K`, carrying payload `P`.
pub struct HookRegistry<K, P> {
    entries: HashMap<K, Vec<Registration<P>>>,
    mode: HookMode,
}

impl<K, P> HookRegistry<K, P>
where
    K: Eq + Hash + Copy + fmt::Debug + Send + Sync,
    P: Send,
{
    pub fn new(mode: HookMode) -> Self {
        Self {
            entries: HashMap::new(),
            mode,
        }
    }

    pub fn mode(&self) -> HookMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: HookMode) {
        self.mode = mode;
    }

    /// Register a hook. Higher priorities run first; ties keep insertion order.
    pub fn register(&mut self, key: K, hook: Arc<dyn Hook<P>>, priority: i32) -> &mut Self {
        let hooks = self.entries.entry(key).or_default();
        hooks.push(Registration { hook, priority });
        // Vec::sort_by is stable.
        hooks.sort_by(|a, b| b.priority.cmp(&a.priority));
        self
    }

    /// Number of hooks currently registered for `key`.
    pub fn len(&self, key: K) -> usize {
        self.entries.get(&key).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Run every hook for `key` in order, then discard them.
    pub async fn run_all(&mut self, key: K, payload: &mut P) -> Result<HookReport, HookError> {
        let registrations = self.entries.remove(&key).unwrap_or_default();
        let mut report = HookReport::default();

        for registration in registrations {
            let name = registration.hook.name().to_string();
            let outcome = AssertUnwindSafe(registration.hook.call(payload))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(HookError::msg("hook panicked")));

            match outcome {
                Ok(HookFlow::Continue) => report.ran += 1,
                Ok(HookFlow::Prevent) => {
                    report.ran += 1;
                    tracing::debug!(hook = %name, key = ?key, "hook prevented operation");
                    report.prevented_by = Some(name);
                    break;
                }
                Err(mut err) => {
                    if err.hook.is_empty() {
                        err.hook = name;
                    }
                    match self.mode {
                        HookMode::Strict => return Err(err),
                        HookMode::Lenient => {
                            tracing::warn!(
                                hook = %err.hook,
                                key = ?key,
                                error = %err.message,
                                "hook failed; continuing"
                            );
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}

impl<K: Clone, P> Clone for HookRegistry<K, P> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            mode: self.mode,
        }
    }
}

impl<K: fmt::Debug, P> fmt::Debug for HookRegistry<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Counts<'a, K, P>(&'a HashMap<K, Vec<Registration<P>>>);

        impl<K: fmt::Debug, P> fmt::Debug for Counts<'_, K, P> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_map()
                    .entries(self.0.iter().map(|(k, v)| (k, v.len())))
                    .finish()
            }
        }

        f.debug_struct("HookRegistry")
            .field("mode", &self.mode)
            .field("hooks", &Counts(&self.entries))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Key {
        Prepare,
        Other,
    }

    fn recorder(label: &'static str) -> Arc<dyn Hook<Vec<String>>> {
        hook_fn(label, move |log: &mut Vec<String>| {
            log.push(label.to_string());
            Ok(HookFlow::Continue)
        })
    }

    fn failing(label: &'static str) -> Arc<dyn Hook<Vec<String>>> {
        hook_fn(label, |_: &mut Vec<String>| Err(HookError::msg("boom")))
    }

    #[tokio::test]
    async fn test_priority_order_descending() {
        let mut registry = HookRegistry::new(HookMode::Lenient);
        registry.register(Key::Prepare, recorder("five"), 5);
        registry.register(Key::Prepare, recorder("ten"), 10);

        let mut log = Vec::new();
        registry.run_all(Key::Prepare, &mut log).await.unwrap();
        assert_eq!(log, vec!["ten", "five"]);
    }

    #[tokio::test]
    async fn test_ties_keep_registration_order() {
        let mut registry = HookRegistry::new(HookMode::Lenient);
        registry
            .register(Key::Prepare, recorder("a"), 0)
            .register(Key::Prepare, recorder("b"), 0)
            .register(Key::Prepare, recorder("high"), 1)
            .register(Key::Prepare, recorder("c"), 0);

        let mut log = Vec::new();
        registry.run_all(Key::Prepare, &mut log).await.unwrap();
        assert_eq!(log, vec!["high", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failing_hook_does_not_stop_siblings() {
        let mut registry = HookRegistry::new(HookMode::Lenient);
        registry.register(Key::Prepare, failing("ten"), 10);
        registry.register(Key::Prepare, recorder("five"), 5);

        let mut log = Vec::new();
        let report = registry.run_all(Key::Prepare, &mut log).await.unwrap();
        assert_eq!(log, vec!["five"]);
        assert_eq!(report.failed, 1);
        assert_eq!(report.ran, 1);
    }

    #[tokio::test]
    async fn test_panicking_hook_is_caught() {
        let mut registry = HookRegistry::new(HookMode::Lenient);
        registry.register(
            Key::Prepare,
            hook_fn("panics", |_: &mut Vec<String>| panic!("hook exploded")),
            10,
        );
        registry.register(Key::Prepare, recorder("after"), 0);

        let mut log = Vec::new();
        let report = registry.run_all(Key::Prepare, &mut log).await.unwrap();
        assert_eq!(log, vec!["after"]);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_strict_mode_returns_error() {
        let mut registry = HookRegistry::new(HookMode::Strict);
        registry.register(Key::Prepare, failing("bad"), 10);
        registry.register(Key::Prepare, recorder("never"), 5);

        let mut log = Vec::new();
        let err = registry.run_all(Key::Prepare, &mut log).await.unwrap_err();
        assert_eq!(err.hook, "bad");
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_prevent_stops_remaining_hooks() {
        let mut registry = HookRegistry::new(HookMode::Lenient);
        registry.register(
            Key::Prepare,
            hook_fn("veto", |_: &mut Vec<String>| Ok(HookFlow::Prevent)),
            10,
        );
        registry.register(Key::Prepare, recorder("skipped"), 0);

        let mut log = Vec::new();
        let report = registry.run_all(Key::Prepare, &mut log).await.unwrap();
        assert_eq!(report.prevented_by.as_deref(), Some("veto"));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_run_all_is_one_shot_per_key() {
        let mut registry = HookRegistry::new(HookMode::Lenient);
        registry.register(Key::Prepare, recorder("p"), 0);
        registry.register(Key::Other, recorder("o"), 0);

        let mut log = Vec::new();
        registry.run_all(Key::Prepare, &mut log).await.unwrap();
        registry.run_all(Key::Prepare, &mut log).await.unwrap();
        assert_eq!(log, vec!["p"]);
        assert_eq!(registry.len(Key::Prepare), 0);
        assert_eq!(registry.len(Key::Other), 1);
    }

    #[tokio::test]
    async fn test_clone_leaves_template_intact() {
        let mut template = HookRegistry::new(HookMode::Lenient);
        template.register(Key::Prepare, recorder("p"), 0);

        for _ in 0..2 {
            let mut per_check = template.clone();
            let mut log = Vec::new();
            per_check.run_all(Key::Prepare, &mut log).await.unwrap();
            assert_eq!(log, vec!["p"]);
        }
        assert_eq!(template.len(Key::Prepare), 1);
    }

    #[test]
    fn test_debug_lists_hook_counts() {
        let mut registry: HookRegistry<Key, Vec<String>> = HookRegistry::new(HookMode::Strict);
        registry.register(Key::Prepare, recorder("a"), 0);
        registry.register(Key::Prepare, recorder("b"), 1);

        let debug = format!("{registry:?}");
        assert!(debug.contains("Strict"));
        assert!(debug.contains("Prepare: 2"));
    }
}
