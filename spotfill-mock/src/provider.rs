use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use spotfill_core::{PricePoint, PriceProvider, ProviderError};

/// Instruction for how a `fetch` call should behave.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return the points of this series that fall inside the requested range.
    Serve(Vec<PricePoint>),
    /// Return these points verbatim, regardless of the requested range.
    Return(Vec<PricePoint>),
    /// Fail immediately with the provided error.
    Fail(ProviderError),
    /// Hang indefinitely (simulate a timeout).
    Hang,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self::Return(Vec::new())
    }
}

#[derive(Default)]
struct InternalState {
    default_behavior: MockBehavior,
    queued: VecDeque<MockBehavior>,
    calls: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Controller handle used by tests to drive a [`MockProvider`] from the outside.
#[derive(Clone)]
pub struct MockController {
    state: Arc<Mutex<InternalState>>,
    available: Arc<AtomicBool>,
}

impl MockController {
    /// Behavior used once the one-shot queue is drained.
    pub async fn set_behavior(&self, behavior: MockBehavior) {
        let mut guard = self.state.lock().await;
        guard.default_behavior = behavior;
    }

    /// Queue a behavior for the next unanswered call only.
    pub async fn push_once(&self, behavior: MockBehavior) {
        let mut guard = self.state.lock().await;
        guard.queued.push_back(behavior);
    }

    /// Toggle `is_available`.
    pub fn set_available(&self, yes: bool) {
        self.available.store(yes, Ordering::SeqCst);
    }

    /// Every `(start, end)` the provider was asked for, in call order.
    pub async fn calls(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.state.lock().await.calls.clone()
    }

    /// Number of `fetch` calls received.
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls.len()
    }

    /// Clear behaviors and the call log.
    pub async fn reset(&self) {
        let mut guard = self.state.lock().await;
        *guard = InternalState::default();
    }
}

/// A provider that defers all behavior to an external controller.
pub struct MockProvider {
    name: &'static str,
    priority: i32,
    state: Arc<Mutex<InternalState>>,
    available: Arc<AtomicBool>,
}

impl MockProvider {
    /// Create a new mock provider and its controller.
    ///
    /// The provider starts available and answers every call with an empty series.
    #[must_use]
    pub fn new_with_controller(
        name: &'static str,
        priority: i32,
    ) -> (Arc<dyn PriceProvider>, MockController) {
        let state = Arc::new(Mutex::new(InternalState::default()));
        let available = Arc::new(AtomicBool::new(true));
        let controller = MockController {
            state: Arc::clone(&state),
            available: Arc::clone(&available),
        };
        let me = Arc::new(Self {
            name,
            priority,
            state,
            available,
        });
        (me as Arc<dyn PriceProvider>, controller)
    }

    /// Convenience: a provider that serves `series` for every call.
    pub async fn serving(
        name: &'static str,
        priority: i32,
        series: Vec<PricePoint>,
    ) -> (Arc<dyn PriceProvider>, MockController) {
        let (p, c) = Self::new_with_controller(name, priority);
        c.set_behavior(MockBehavior::Serve(series)).await;
        (p, c)
    }

    /// Convenience: a provider that fails every call with `err`.
    pub async fn failing(
        name: &'static str,
        priority: i32,
        err: ProviderError,
    ) -> (Arc<dyn PriceProvider>, MockController) {
        let (p, c) = Self::new_with_controller(name, priority);
        c.set_behavior(MockBehavior::Fail(err)).await;
        (p, c)
    }
}

#[async_trait]
impl PriceProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        // Snapshot the behavior without holding the lock across await points
        let behavior = {
            let mut guard = self.state.lock().await;
            guard.calls.push((start, end));
            guard
                .queued
                .pop_front()
                .unwrap_or_else(|| guard.default_behavior.clone())
        };

        match behavior {
            MockBehavior::Serve(series) => Ok(series
                .into_iter()
                .filter(|p| p.timestamp >= start && p.timestamp <= end)
                .collect()),
            MockBehavior::Return(points) => Ok(points),
            MockBehavior::Fail(e) => Err(e),
            MockBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        }
    }
}
