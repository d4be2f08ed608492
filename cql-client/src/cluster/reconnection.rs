//! Retry-with-backoff reconnection sessions.
//!
//! A session repeatedly runs an attempt, sleeping between attempts according
//! to a [`ReconnectionSchedule`], until an attempt succeeds, a failure
//! callback gives up, or the session is cancelled. At most one session per
//! [`ReconnectionSlot`] is active at any time.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cql_core::{CqlError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::policy::ReconnectionSchedule;

/// Handle to a reconnection session occupying a [`ReconnectionSlot`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    token: CancellationToken,
}

impl SessionHandle {
    /// Returns the session's identifier, unique within its slot.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns `true` once the session has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until the session is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Outcome of a finished reconnection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// An attempt succeeded and the success callback ran.
    Reconnected,
    /// A failure callback asked to stop retrying.
    Abandoned,
    /// The session was cancelled.
    Cancelled,
}

/// Holds the handle of the active reconnection session, if any.
///
/// Occupying the slot is atomic: of several concurrent callers, exactly one
/// gets a [`SessionHandle`].
#[derive(Debug)]
pub struct ReconnectionSlot {
    current: Mutex<Option<SessionHandle>>,
    next_id: AtomicU64,
    parent: CancellationToken,
}

impl ReconnectionSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::with_parent(CancellationToken::new())
    }

    /// Creates an empty slot whose sessions are cancelled along with `parent`.
    pub fn with_parent(parent: CancellationToken) -> Self {
        Self {
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            parent,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Occupies the slot if it is empty.
    pub fn try_occupy(&self) -> Option<SessionHandle> {
        let mut current = self.lock();
        if current.is_some() || self.parent.is_cancelled() {
            return None;
        }
        let session = SessionHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: self.parent.child_token(),
        };
        *current = Some(session.clone());
        Some(session)
    }

    /// Empties the slot if `session` still occupies it.
    pub fn release(&self, session: &SessionHandle) -> bool {
        let mut current = self.lock();
        if current.as_ref().map(SessionHandle::id) == Some(session.id) {
            *current = None;
            true
        } else {
            false
        }
    }

    /// Returns `true` while a session occupies the slot.
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Cancels and evicts the active session. Returns `false` if the slot
    /// was empty.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(session) => {
                session.token.cancel();
                debug!(session = session.id, "reconnection session cancelled");
                true
            }
            None => false,
        }
    }
}

impl Default for ReconnectionSlot {
    fn default() -> Self {
        Self::new()
    }
}

type Attempt<T> = Box<dyn FnMut() -> BoxFuture<'static, Result<T>> + Send>;
type OnSuccess<T> = Box<dyn FnOnce(T) -> BoxFuture<'static, ()> + Send>;
type OnFailure = Box<dyn FnMut(&CqlError, Duration) -> bool + Send>;

/// Builder and driver for one reconnection session.
///
/// Failure callbacks receive the error and the delay before the next
/// attempt; returning `false` abandons the session. Errors for which
/// [`CqlError::is_connection_error`] holds go to the known-failure callback,
/// everything else to the unknown-failure callback. Both default to
/// retrying.
pub struct ReconnectionHandler<T> {
    schedule: Box<dyn ReconnectionSchedule>,
    scheduler: Option<Handle>,
    attempt: Attempt<T>,
    on_success: OnSuccess<T>,
    on_known_failure: OnFailure,
    on_unknown_failure: OnFailure,
}

impl<T> fmt::Debug for ReconnectionHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectionHandler")
            .field("scheduler", &self.scheduler.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> ReconnectionHandler<T> {
    /// Creates a handler running `attempt` on the delays of `schedule`.
    pub fn new<A, Fut>(schedule: Box<dyn ReconnectionSchedule>, mut attempt: A) -> Self
    where
        A: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            schedule,
            scheduler: None,
            attempt: Box::new(move || attempt().boxed()),
            on_success: Box::new(|_| async {}.boxed()),
            on_known_failure: Box::new(|_, _| true),
            on_unknown_failure: Box::new(|_, _| true),
        }
    }

    /// Sets the callback run with the value of the successful attempt.
    pub fn on_success<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_success = Box::new(move |value| f(value).boxed());
        self
    }

    /// Sets the callback for connection failures.
    pub fn on_known_failure<F>(mut self, f: F) -> Self
    where
        F: FnMut(&CqlError, Duration) -> bool + Send + 'static,
    {
        self.on_known_failure = Box::new(f);
        self
    }

    /// Sets the callback for any other failure.
    pub fn on_unknown_failure<F>(mut self, f: F) -> Self
    where
        F: FnMut(&CqlError, Duration) -> bool + Send + 'static,
    {
        self.on_unknown_failure = Box::new(f);
        self
    }

    /// Sets the runtime the session task is spawned on.
    pub fn scheduler(mut self, handle: Handle) -> Self {
        self.scheduler = Some(handle);
        self
    }

    /// Occupies `slot` and starts the session.
    ///
    /// Returns `None` without doing anything if another session already
    /// occupies the slot.
    ///
    /// # Panics
    ///
    /// Panics if no scheduler was set and this is called outside a Tokio
    /// runtime.
    pub fn start(self, slot: &Arc<ReconnectionSlot>) -> Option<JoinHandle<SessionOutcome>> {
        let Some(session) = slot.try_occupy() else {
            debug!("reconnection session already active");
            return None;
        };
        Some(self.resume(Arc::clone(slot), session))
    }

    /// Starts the session under a handle the caller already obtained from
    /// `slot`.
    ///
    /// # Panics
    ///
    /// Panics if no scheduler was set and this is called outside a Tokio
    /// runtime.
    pub fn resume(
        mut self,
        slot: Arc<ReconnectionSlot>,
        session: SessionHandle,
    ) -> JoinHandle<SessionOutcome> {
        let scheduler = self.scheduler.take().unwrap_or_else(Handle::current);
        scheduler.spawn(async move {
            let outcome = self.run(&session).await;
            slot.release(&session);
            debug!(session = session.id, outcome = ?outcome, "reconnection session ended");
            outcome
        })
    }

    async fn run(self, session: &SessionHandle) -> SessionOutcome {
        let Self {
            mut schedule,
            mut attempt,
            on_success,
            mut on_known_failure,
            mut on_unknown_failure,
            ..
        } = self;

        let mut delay = schedule.next_delay();
        let mut attempts = 0u32;
        loop {
            trace!(
                session = session.id,
                delay = ?delay,
                "reconnection attempt scheduled"
            );
            tokio::select! {
                biased;
                _ = session.cancelled() => return SessionOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }

            attempts += 1;
            match attempt().await {
                Ok(value) => {
                    debug!(session = session.id, attempts, "reconnection attempt succeeded");
                    on_success(value).await;
                    return SessionOutcome::Reconnected;
                }
                Err(error) => {
                    if session.is_cancelled() {
                        return SessionOutcome::Cancelled;
                    }
                    let next_delay = schedule.next_delay();
                    let keep_going = if error.is_connection_error() {
                        on_known_failure(&error, next_delay)
                    } else {
                        on_unknown_failure(&error, next_delay)
                    };
                    if !keep_going {
                        debug!(session = session.id, attempts, error = %error, "reconnection abandoned");
                        return SessionOutcome::Abandoned;
                    }
                    delay = next_delay;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ExponentialReconnectionPolicy, ReconnectionPolicy};
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;

    fn schedule() -> Box<dyn ReconnectionSchedule> {
        ExponentialReconnectionPolicy::new(Duration::from_millis(100), Duration::from_millis(1000))
            .unwrap()
            .new_schedule()
    }

    fn refused() -> CqlError {
        CqlError::connection("10.0.0.1:9042".parse().unwrap(), "connection refused")
    }

    #[test]
    fn test_slot_occupies_once() {
        let slot = ReconnectionSlot::new();
        let first = slot.try_occupy().unwrap();
        assert!(slot.try_occupy().is_none());
        assert!(slot.is_active());
        assert!(slot.release(&first));
        assert!(!slot.is_active());
        assert!(slot.try_occupy().is_some());
    }

    #[test]
    fn test_slot_release_ignores_stale_handle() {
        let slot = ReconnectionSlot::new();
        let stale = slot.try_occupy().unwrap();
        assert!(slot.cancel());
        assert!(stale.is_cancelled());

        let fresh = slot.try_occupy().unwrap();
        assert_ne!(stale.id(), fresh.id());
        assert!(!slot.release(&stale));
        assert!(slot.is_active());
    }

    #[test]
    fn test_slot_refuses_after_parent_cancelled() {
        let parent = CancellationToken::new();
        let slot = ReconnectionSlot::with_parent(parent.clone());
        let session = slot.try_occupy().unwrap();
        parent.cancel();
        assert!(session.is_cancelled());
        slot.release(&session);
        assert!(slot.try_occupy().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_on_schedule_until_success() {
        let slot = Arc::new(ReconnectionSlot::new());
        let start = Instant::now();
        let times = Arc::new(Mutex::new(Vec::new()));
        let succeeded = Arc::new(Mutex::new(None));

        let recorded = Arc::clone(&times);
        let result = Arc::clone(&succeeded);
        let handle = ReconnectionHandler::new(schedule(), move || {
            let times = Arc::clone(&recorded);
            async move {
                let mut times = times.lock().unwrap();
                times.push(start.elapsed().as_millis() as u64);
                if times.len() < 3 {
                    Err(refused())
                } else {
                    Ok(42)
                }
            }
        })
        .on_success(move |value| async move {
            *result.lock().unwrap() = Some(value);
        })
        .start(&slot)
        .unwrap();

        assert_eq!(handle.await.unwrap(), SessionOutcome::Reconnected);
        assert_eq!(*times.lock().unwrap(), vec![100, 300, 700]);
        assert_eq!(*succeeded.lock().unwrap(), Some(42));
        assert!(!slot.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let slot = Arc::new(ReconnectionSlot::new());
        let first = ReconnectionHandler::new(schedule(), || async { Ok(()) })
            .start(&slot)
            .unwrap();
        let second = ReconnectionHandler::new(schedule(), || async { Ok(()) }).start(&slot);
        assert!(second.is_none());
        assert_eq!(first.await.unwrap(), SessionOutcome::Reconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_classified() {
        let slot = Arc::new(ReconnectionSlot::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let known = Arc::new(AtomicUsize::new(0));
        let unknown = Arc::new(Mutex::new(Vec::new()));

        let counter = Arc::clone(&calls);
        let known_seen = Arc::clone(&known);
        let unknown_seen = Arc::clone(&unknown);
        let handle = ReconnectionHandler::<()>::new(schedule(), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(refused())
                } else {
                    Err(CqlError::Protocol("garbled".to_string()))
                }
            }
        })
        .on_known_failure(move |_, _| {
            known_seen.fetch_add(1, Ordering::SeqCst);
            true
        })
        .on_unknown_failure(move |error, next_delay| {
            unknown_seen.lock().unwrap().push((error.to_string(), next_delay));
            false
        })
        .start(&slot)
        .unwrap();

        assert_eq!(handle.await.unwrap(), SessionOutcome::Abandoned);
        assert_eq!(known.load(Ordering::SeqCst), 1);
        let unknown = unknown.lock().unwrap();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].1, Duration::from_millis(400));
        assert!(!slot.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_rescheduling() {
        let slot = Arc::new(ReconnectionSlot::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = ReconnectionHandler::<()>::new(schedule(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(refused()) }
        })
        .start(&slot)
        .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.cancel());

        assert_eq!(handle.await.unwrap(), SessionOutcome::Cancelled);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!slot.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_attempt_prevents_reschedule() {
        let slot = Arc::new(ReconnectionSlot::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let canceller = Arc::clone(&slot);
        let handle = ReconnectionHandler::<()>::new(schedule(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let slot = Arc::clone(&canceller);
            async move {
                slot.cancel();
                Err(refused())
            }
        })
        .start(&slot)
        .unwrap();

        assert_eq!(handle.await.unwrap(), SessionOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct Unbounded {
        first: bool,
    }

    impl ReconnectionSchedule for Unbounded {
        fn next_delay(&mut self) -> Duration {
            if std::mem::take(&mut self.first) {
                Duration::from_millis(100)
            } else {
                Duration::MAX
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_delay_is_reported_and_cancellable() {
        let slot = Arc::new(ReconnectionSlot::new());
        let reported = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&reported);
        let handle = ReconnectionHandler::<()>::new(Box::new(Unbounded { first: true }), || async {
            Err(refused())
        })
        .on_known_failure(move |_, next_delay| {
            seen.lock().unwrap().push(next_delay);
            true
        })
        .start(&slot)
        .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*reported.lock().unwrap(), vec![Duration::MAX]);
        assert!(slot.is_active());

        assert!(slot.cancel());
        assert_eq!(handle.await.unwrap(), SessionOutcome::Cancelled);
        assert_eq!(reported.lock().unwrap().len(), 1);
    }
}
