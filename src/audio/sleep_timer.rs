//! Single-slot deferred action.
//!
//! At most one action is pending. Scheduling a new one aborts the previous
//! task before the new one is stored.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering::SeqCst},
};

use {
    parking_lot::Mutex,
    tokio::{
        runtime::Handle,
        task::JoinHandle,
        time::{Duration, Instant, sleep_until},
    },
    tracing::debug,
};

use crate::error::PlayerError;

/// The task currently occupying the slot.
#[derive(Debug)]
struct Pending {
    id: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// Cancel-and-replace timer slot.
#[derive(Debug, Default)]
pub struct SleepTimer {
    slot: Arc<Mutex<Option<Pending>>>,
    next_id: AtomicU64,
}

impl SleepTimer {
    /// Creates an empty timer slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `action` once `after` has elapsed, replacing any pending action.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::NoRuntime` if called outside a tokio runtime.
    pub fn schedule<F>(&self, after: Duration, action: F) -> Result<(), PlayerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| PlayerError::NoRuntime)?;
        let id = self.next_id.fetch_add(1, SeqCst);
        let deadline = Instant::now() + after;
        let slot = Arc::clone(&self.slot);

        let mut guard = self.slot.lock();
        if let Some(previous) = guard.take() {
            debug!("SleepTimer: Replacing pending timer");
            previous.handle.abort();
        }

        let handle = runtime.spawn(async move {
            sleep_until(deadline).await;
            {
                let mut guard = slot.lock();
                if guard.as_ref().is_some_and(|pending| pending.id == id) {
                    guard.take();
                }
            }
            action.await;
        });

        *guard = Some(Pending {
            id,
            deadline,
            handle,
        });
        Ok(())
    }

    /// Aborts the pending action, if any.
    ///
    /// # Returns
    ///
    /// `true` if an action was pending.
    pub fn cancel(&self) -> bool {
        match self.slot.lock().take() {
            Some(pending) => {
                debug!("SleepTimer: Cancelled pending timer");
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Whether an action is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Time left until the pending action fires.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.slot
            .lock()
            .as_ref()
            .map(|pending| pending.deadline.saturating_duration_since(Instant::now()))
    }
}
