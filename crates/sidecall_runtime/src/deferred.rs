use std::future::{Future, IntoFuture};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::codec::PayloadCodec;
use crate::errors::InvokeError;
use crate::metrics::InvocationMetrics;

/// Outcome of one invocation: the response payload or a typed failure.
pub type InvocationResult = Result<Bytes, InvokeError>;

/// Slot state. Leaves `Pending` exactly once and never changes afterwards.
enum CallState {
    Pending,
    Resolved(InvocationResult),
    TimedOut(InvokeError),
}

impl CallState {
    fn outcome(&self) -> Option<InvocationResult> {
        match self {
            Self::Pending => None,
            Self::Resolved(outcome) => Some(outcome.clone()),
            Self::TimedOut(err) => Some(Err(err.clone())),
        }
    }
}

/// Shared between one [`Resolver`] and one [`DeferredCall`].
/// The mutex is never held across an await point.
struct CallSlot {
    state: Mutex<CallState>,
    settled: Condvar,
    notify: Notify,
}

impl CallSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(CallState::Pending),
            settled: Condvar::new(),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<InvocationResult> {
        self.lock().outcome()
    }

    fn wake_all(&self) {
        self.settled.notify_all();
        self.notify.notify_waiters();
    }

    /// Returns false when the slot already left `Pending`.
    fn settle(&self, outcome: InvocationResult) -> bool {
        let mut state = self.lock();
        if !matches!(*state, CallState::Pending) {
            return false;
        }
        *state = CallState::Resolved(outcome);
        drop(state);
        self.wake_all();
        true
    }
}

/// In-flight invocation handle with a single producer and a single consumer.
///
/// The outcome is cached: waiting again after resolution (or after a timeout)
/// returns the same result without dispatching anything.
pub struct DeferredCall {
    id: Uuid,
    slot: Arc<CallSlot>,
    metrics: Arc<InvocationMetrics>,
}

/// Producer half, owned by the dispatch task.
pub(crate) struct Resolver {
    id: Uuid,
    slot: Option<Arc<CallSlot>>,
    metrics: Arc<InvocationMetrics>,
}

pub(crate) fn deferred_pair(metrics: Arc<InvocationMetrics>) -> (DeferredCall, Resolver) {
    let id = Uuid::new_v4();
    let slot = Arc::new(CallSlot::new());
    metrics.record_dispatch();
    (
        DeferredCall {
            id,
            slot: Arc::clone(&slot),
            metrics: Arc::clone(&metrics),
        },
        Resolver {
            id,
            slot: Some(slot),
            metrics,
        },
    )
}

impl Resolver {
    /// Deliver the transport outcome. Returns false when the waiter already gave up.
    pub(crate) fn resolve(mut self, outcome: InvocationResult) -> bool {
        let Some(slot) = self.slot.take() else {
            return false;
        };
        deliver(self.id, &slot, &self.metrics, outcome)
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            deliver(
                self.id,
                &slot,
                &self.metrics,
                Err(InvokeError::unavailable(
                    "dispatch task ended before the call resolved",
                )),
            );
        }
    }
}

fn deliver(
    id: Uuid,
    slot: &CallSlot,
    metrics: &InvocationMetrics,
    outcome: InvocationResult,
) -> bool {
    metrics.record_outcome(&outcome);
    let delivered = slot.settle(outcome);
    if !delivered {
        metrics.record_late_resolution();
        tracing::debug!(call_id = %id, "discarding late resolution after timeout");
    }
    delivered
}

impl DeferredCall {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.current().is_some()
    }

    /// Cached outcome, if the call already left the pending state.
    pub fn try_outcome(&self) -> Option<InvocationResult> {
        self.slot.current()
    }

    /// Wait asynchronously, optionally bounded by `timeout`.
    ///
    /// When the deadline passes first the call is marked timed out and the
    /// error renders the requested duration in nanoseconds.
    pub async fn wait(&self, timeout: Option<Duration>) -> InvocationResult {
        if let Some(outcome) = self.slot.current() {
            return outcome;
        }
        // A deadline past the clock's range is no deadline.
        let deadline = timeout.and_then(|requested| {
            tokio::time::Instant::now()
                .checked_add(requested)
                .map(|at| (requested, at))
        });
        loop {
            let notified = self.slot.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.slot.current() {
                return outcome;
            }

            match deadline {
                None => notified.await,
                Some((requested, at)) => {
                    if tokio::time::timeout_at(at, notified).await.is_err() {
                        let mut state = self.slot.lock();
                        return self.expire(&mut state, requested);
                    }
                }
            }
        }
    }

    /// Block the current thread, optionally bounded by `timeout`.
    ///
    /// Must not be called from a thread that drives the runtime resolving this
    /// call (for example inside a current-thread runtime); use [`DeferredCall::wait`] there.
    pub fn block(&self, timeout: Option<Duration>) -> InvocationResult {
        let mut state = self.slot.lock();
        if let Some(outcome) = state.outcome() {
            return outcome;
        }
        let deadline = timeout.and_then(|requested| {
            Instant::now()
                .checked_add(requested)
                .map(|at| (requested, at))
        });
        let Some((requested, deadline)) = deadline else {
            loop {
                if let Some(outcome) = state.outcome() {
                    return outcome;
                }
                state = self
                    .slot
                    .settled
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        loop {
            if let Some(outcome) = state.outcome() {
                return outcome;
            }
            let now = Instant::now();
            if now >= deadline {
                return self.expire(&mut state, requested);
            }
            state = self
                .slot
                .settled
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Transition `Pending -> TimedOut` under the held lock; a call that
    /// resolved in the meantime keeps its real outcome.
    fn expire(&self, state: &mut MutexGuard<'_, CallState>, requested: Duration) -> InvocationResult {
        if let Some(outcome) = state.outcome() {
            return outcome;
        }
        let err = InvokeError::Timeout { waited: requested };
        **state = CallState::TimedOut(err.clone());
        self.metrics.record_timeout();
        tracing::debug!(
            call_id = %self.id,
            timeout_nanos = saturating_nanos(requested),
            "invocation wait timed out"
        );
        self.slot.wake_all();
        Err(err)
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for DeferredCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredCall")
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl IntoFuture for DeferredCall {
    type Output = InvocationResult;
    type IntoFuture = Pin<Box<dyn Future<Output = InvocationResult> + Send>>;

    /// Unbounded wait.
    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait(None).await })
    }
}

/// [`DeferredCall`] whose payload is decoded with codec `C` on success.
pub struct TypedCall<T, C> {
    call: DeferredCall,
    _marker: PhantomData<fn() -> (T, C)>,
}

impl<T, C> TypedCall<T, C>
where
    C: PayloadCodec<T>,
{
    pub(crate) fn new(call: DeferredCall) -> Self {
        Self {
            call,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> Uuid {
        self.call.id()
    }

    pub async fn wait(&self, timeout: Option<Duration>) -> Result<T, InvokeError> {
        let payload = self.call.wait(timeout).await?;
        C::decode(&payload)
    }

    pub fn block(&self, timeout: Option<Duration>) -> Result<T, InvokeError> {
        let payload = self.call.block(timeout)?;
        C::decode(&payload)
    }

    pub fn into_inner(self) -> DeferredCall {
        self.call
    }
}

impl<T, C> std::fmt::Debug for TypedCall<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TypedCall").field(&self.call).finish()
    }
}
