use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{runtime::Handle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::models::{ToastKind, ToastMessage};

use super::ids::{generate_id, TOAST_PREFIX};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

pub const DEFAULT_TOAST_TTL: Duration = Duration::from_millis(2500);

struct PendingToast {
    message: ToastMessage,
    expires_at: Instant,
}

#[derive(Default)]
struct QueueState {
    toasts: Vec<PendingToast>,
    timers: HashMap<String, CancellationToken>,
}

impl QueueState {
    /// Drop every toast whose deadline has passed, cancelling its timer.
    fn prune_expired(&mut self, now: Instant) {
        let timers = &mut self.timers;
        self.toasts.retain(|t| {
            if t.expires_at > now {
                return true;
            }
            if let Some(token) = timers.remove(&t.message.id) {
                token.cancel();
            }
            false
        });
    }
}

/// Pending notifications, each removed `ttl` after it was queued.
///
/// Inside a tokio runtime a timer task removes the toast on time. Without one
/// the deadline is enforced whenever the queue is read.
pub struct ToastQueue {
    state: Arc<Mutex<QueueState>>,
    ttl: Duration,
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ToastQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            ttl,
        }
    }

    /// Queue a toast and schedule its expiry.
    pub fn push(&self, kind: ToastKind, message: impl Into<String>) -> String {
        let toast = ToastMessage {
            id: generate_id(TOAST_PREFIX),
            kind,
            message: message.into(),
        };
        let id = toast.id.clone();

        let mut state = lock(&self.state);
        state.prune_expired(Instant::now());
        state.toasts.push(PendingToast {
            message: toast,
            expires_at: Instant::now() + self.ttl,
        });

        match Handle::try_current() {
            Ok(runtime) => {
                let token = CancellationToken::new();
                state.timers.insert(id.clone(), token.clone());

                let shared = Arc::clone(&self.state);
                let ttl = self.ttl;
                let toast_id = id.clone();
                runtime.spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(ttl) => {
                            let mut state = lock(&shared);
                            state.toasts.retain(|t| t.message.id != toast_id);
                            state.timers.remove(&toast_id);
                            log_debug!("Toast {toast_id} expired");
                        }
                        _ = token.cancelled() => {}
                    }
                });
            }
            Err(_) => {
                log_debug!("No async runtime, toast {id} expires on the next read");
            }
        }

        id
    }

    fn live(&self) -> MutexGuard<'_, QueueState> {
        let mut state = lock(&self.state);
        state.prune_expired(Instant::now());
        state
    }

    pub fn snapshot(&self) -> Vec<ToastMessage> {
        self.live().toasts.iter().map(|t| t.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.live().toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a toast early and cancel its timer.
    pub fn dismiss(&self, id: &str) -> bool {
        let mut state = self.live();
        if let Some(token) = state.timers.remove(id) {
            token.cancel();
        }
        let before = state.toasts.len();
        state.toasts.retain(|t| t.message.id != id);
        state.toasts.len() != before
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        for (_, token) in state.timers.drain() {
            token.cancel();
        }
        state.toasts.clear();
    }
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TOAST_TTL)
    }
}

impl Drop for ToastQueue {
    fn drop(&mut self) {
        let state = lock(&self.state);
        for token in state.timers.values() {
            token.cancel();
        }
    }
}
