//! Observation provider interface
//!
//! The core never talks to a platform directly. Everything it observes goes
//! through an [`ObservationProvider`], wrapped by an [`Observer`] that
//! bounds each call with a timeout and retries transient failures.

use crate::entity::ObservedEntity;
use crate::error::ObservationError;
use crate::retry::{RetryPolicy, with_retry};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

/// How a provider call selects resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A single resource by exact name
    Name(String),
    /// Every resource whose name matches a regular expression
    Pattern(String),
}

impl Selector {
    /// Exact-name selector
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Pattern selector
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::Pattern(pattern.into())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Pattern(pattern) => write!(f, "/{pattern}/"),
        }
    }
}

/// Read-only access to observed platform state
///
/// Implementations must be safe to call from several threads at once.
pub trait ObservationProvider: Send + Sync {
    /// Fetch one resource
    fn get(&self, kind: &str, selector: &Selector) -> Result<ObservedEntity, ObservationError>;

    /// Fetch every resource matching the selector
    fn list(&self, kind: &str, selector: &Selector)
    -> Result<Vec<ObservedEntity>, ObservationError>;

    /// Whether a resource exists
    fn exists(&self, kind: &str, selector: &Selector) -> Result<bool, ObservationError>;
}

/// Time and retry budget for every observation call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallPolicy {
    /// Upper bound on a single attempt
    pub timeout: Duration,
    /// Retry policy for transient failures
    pub retry: RetryPolicy,
    /// Expired calls allowed to keep running before new calls are refused
    pub max_stalled: usize,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            max_stalled: 8,
        }
    }
}

const RUNNING: u8 = 0;
const DONE: u8 = 1;
const ABANDONED: u8 = 2;

/// Provider wrapper applying [`CallPolicy`] to each call
///
/// Providers cannot be interrupted, so an attempt that outlives its timeout
/// keeps running on its worker thread until the provider returns. Those
/// stalled workers are counted, and once `max_stalled` of them are still
/// running every new call fails with [`ObservationError::Unresponsive`]
/// instead of spawning another thread.
#[derive(Clone)]
pub struct Observer {
    provider: Arc<dyn ObservationProvider>,
    policy: CallPolicy,
    stalled: Arc<AtomicUsize>,
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("policy", &self.policy)
            .field("stalled", &self.stalled())
            .finish_non_exhaustive()
    }
}

impl Observer {
    /// Wrap a provider
    pub fn new(provider: Arc<dyn ObservationProvider>, policy: CallPolicy) -> Self {
        Self {
            provider,
            policy,
            stalled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Active call policy
    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    /// Expired calls whose workers have not returned yet
    pub fn stalled(&self) -> usize {
        self.stalled.load(Ordering::Acquire)
    }

    /// Fetch one resource
    pub fn get(&self, kind: &str, selector: &Selector) -> Result<ObservedEntity, ObservationError> {
        self.call("get", kind, selector, |p, k, s| p.get(k, s))
    }

    /// Fetch every matching resource
    pub fn list(
        &self,
        kind: &str,
        selector: &Selector,
    ) -> Result<Vec<ObservedEntity>, ObservationError> {
        self.call("list", kind, selector, |p, k, s| p.list(k, s))
    }

    /// Whether a resource exists
    pub fn exists(&self, kind: &str, selector: &Selector) -> Result<bool, ObservationError> {
        self.call("exists", kind, selector, |p, k, s| p.exists(k, s))
    }

    fn call<T, F>(
        &self,
        op: &str,
        kind: &str,
        selector: &Selector,
        f: F,
    ) -> Result<T, ObservationError>
    where
        T: Send + 'static,
        F: Fn(&dyn ObservationProvider, &str, &Selector) -> Result<T, ObservationError>
            + Copy
            + Send
            + 'static,
    {
        let what = format!("{op} {kind} {selector}");
        with_retry(&self.policy.retry, &what, || {
            log::trace!("Observing: {what}");
            self.attempt(kind, selector, f)
        })
    }

    /// Run one attempt on a worker thread; an expired attempt is abandoned
    fn attempt<T, F>(&self, kind: &str, selector: &Selector, f: F) -> Result<T, ObservationError>
    where
        T: Send + 'static,
        F: Fn(&dyn ObservationProvider, &str, &Selector) -> Result<T, ObservationError>
            + Send
            + 'static,
    {
        let stalled = self.stalled();
        if stalled >= self.policy.max_stalled {
            return Err(ObservationError::Unresponsive {
                kind: kind.to_string(),
                stalled,
            });
        }

        let (tx, rx) = mpsc::channel();
        let state = Arc::new(AtomicU8::new(RUNNING));
        let provider = Arc::clone(&self.provider);
        let owned_kind = kind.to_string();
        let owned_selector = selector.clone();
        let worker_state = Arc::clone(&state);
        let worker_stalled = Arc::clone(&self.stalled);
        thread::spawn(move || {
            let result = f(provider.as_ref(), &owned_kind, &owned_selector);
            let finished =
                worker_state.compare_exchange(RUNNING, DONE, Ordering::AcqRel, Ordering::Acquire);
            if finished.is_err() {
                worker_stalled.fetch_sub(1, Ordering::AcqRel);
                log::debug!("Stalled call for {owned_kind} returned");
            }
            // receiver is gone when the attempt timed out
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.policy.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // must precede the RUNNING -> ABANDONED swap the worker decrements on
                self.stalled.fetch_add(1, Ordering::AcqRel);
                let abandoned = state
                    .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                if !abandoned {
                    self.stalled.fetch_sub(1, Ordering::AcqRel);
                    // finished right at the deadline
                    if let Ok(result) = rx.recv() {
                        return result;
                    }
                }
                Err(ObservationError::Timeout {
                    kind: kind.to_string(),
                    millis: u64::try_from(self.policy.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ObservationError::Other(format!(
                "provider call for {kind} terminated without a result"
            ))),
        }
    }
}

/// In-memory provider, used for snapshots and tests
///
/// Entities are grouped by kind and addressed by their `name` attribute.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    entities: BTreeMap<String, Vec<ObservedEntity>>,
    failures: Mutex<BTreeMap<String, VecDeque<ObservationError>>>,
    delay: Option<Duration>,
}

impl MemoryProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a `{kind: [entity, ..]}` document
    pub fn from_snapshot(snapshot: &Value) -> Result<Self, ObservationError> {
        let Some(kinds) = snapshot.as_object() else {
            return Err(ObservationError::Other(
                "snapshot must be an object keyed by resource kind".to_string(),
            ));
        };
        let mut provider = Self::new();
        for (kind, entities) in kinds {
            let Some(entities) = entities.as_array() else {
                return Err(ObservationError::Other(format!(
                    "snapshot entry '{kind}' must be a list"
                )));
            };
            for entity in entities {
                provider.insert(kind, entity.clone());
            }
        }
        Ok(provider)
    }

    /// Add an entity
    pub fn insert(&mut self, kind: &str, entity: Value) {
        self.entities
            .entry(kind.to_string())
            .or_default()
            .push(ObservedEntity::new(entity));
    }

    /// Builder-style insert
    pub fn with(mut self, kind: &str, entity: Value) -> Self {
        self.insert(kind, entity);
        self
    }

    /// Make every call sleep first, to exercise timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Script the next call for `kind` to fail with `error`
    pub fn fail_next(&self, kind: &str, error: ObservationError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures
                .entry(kind.to_string())
                .or_default()
                .push_back(error);
        }
    }

    /// Kinds present in the provider
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    fn prepare(&self, kind: &str) -> Result<(), ObservationError> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let scripted = self
            .failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.get_mut(kind).and_then(VecDeque::pop_front));
        match scripted {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn select(
        &self,
        kind: &str,
        selector: &Selector,
    ) -> Result<Vec<&ObservedEntity>, ObservationError> {
        let entities = self.entities.get(kind).map_or(&[][..], Vec::as_slice);
        match selector {
            Selector::Name(name) => Ok(entities
                .iter()
                .filter(|e| e.name() == Some(name.as_str()))
                .collect()),
            Selector::Pattern(pattern) => {
                let re = Regex::new(pattern)
                    .map_err(|e| ObservationError::Other(format!("invalid selector: {e}")))?;
                Ok(entities
                    .iter()
                    .filter(|e| e.name().is_some_and(|n| re.is_match(n)))
                    .collect())
            }
        }
    }
}

impl ObservationProvider for MemoryProvider {
    fn get(&self, kind: &str, selector: &Selector) -> Result<ObservedEntity, ObservationError> {
        self.prepare(kind)?;
        self.select(kind, selector)?
            .into_iter()
            .next()
            .cloned()
            .ok_or_else(|| ObservationError::NotFound {
                kind: kind.to_string(),
                selector: selector.to_string(),
            })
    }

    fn list(
        &self,
        kind: &str,
        selector: &Selector,
    ) -> Result<Vec<ObservedEntity>, ObservationError> {
        self.prepare(kind)?;
        Ok(self
            .select(kind, selector)?
            .into_iter()
            .cloned()
            .collect())
    }

    fn exists(&self, kind: &str, selector: &Selector) -> Result<bool, ObservationError> {
        self.prepare(kind)?;
        Ok(!self.select(kind, selector)?.is_empty())
    }
}
