//! Single-shot readiness signal shared by every consumer of a collection.

use std::sync::Arc;

use tokio::sync::watch;

/// Outcome observed by every waiter of a [`ReadinessGate`].
///
/// Failures are shared through an [`Arc`] so each waiter sees the same error
/// value.
pub type GateOutcome<E> = Result<(), Arc<E>>;

/// Asynchronous completion signal that resolves exactly once.
///
/// Waiters that arrive before resolution park until it happens; waiters that
/// arrive afterwards return immediately. Later calls to
/// [`ReadinessGate::resolve`] are ignored.
///
/// # Examples
///
/// ```
/// use heroes_core::ReadinessGate;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let gate: ReadinessGate<std::io::Error> = ReadinessGate::new();
/// assert!(gate.resolve(Ok(())));
/// assert!(!gate.resolve(Err(std::io::Error::other("late"))));
/// assert!(gate.wait().await.is_ok());
/// # });
/// ```
#[derive(Debug)]
pub struct ReadinessGate<E> {
    state: watch::Sender<Option<GateOutcome<E>>>,
}

impl<E> Default for ReadinessGate<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ReadinessGate<E> {
    /// Create an unresolved gate.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self { state }
    }

    /// Resolve the gate with `outcome`.
    ///
    /// Returns `true` when this call resolved the gate and `false` when it had
    /// already been resolved, in which case `outcome` is discarded.
    pub fn resolve(&self, outcome: Result<(), E>) -> bool {
        let shared = outcome.map_err(Arc::new);
        self.state.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(shared);
            true
        })
    }

    /// Whether the gate has been resolved, successfully or not.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Return the outcome without waiting, if the gate has resolved.
    #[must_use]
    pub fn outcome(&self) -> Option<GateOutcome<E>> {
        self.state.borrow().clone()
    }

    /// Wait until the gate resolves and return the shared outcome.
    pub async fn wait(&self) -> GateOutcome<E> {
        let mut receiver = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        receiver
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|state| state.clone())
            .unwrap_or(Ok(()))
    }
}
