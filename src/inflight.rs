use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::oneshot;

/// The leader for a key went away before its computation settled.
/// Callers are free to retry; the key has already been released.
#[derive(Debug, thiserror::Error)]
#[error("in-flight computation was interrupted before settling")]
pub struct Interrupted;

enum Role<T> {
    Leader,
    Follower(oneshot::Receiver<T>),
}

/// Collapses concurrent identical requests into a single computation.
///
/// The first caller for a key runs the future; callers arriving before
/// it settles receive a clone of the same outcome, success or failure.
/// The key is released when the computation settles, so later calls
/// start fresh (and may hit the TTL cache instead).
pub struct InFlightRegistry<T> {
    pending: Mutex<HashMap<String, Vec<oneshot::Sender<T>>>>,
}

impl<T: Clone> InFlightRegistry<T> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_run<F>(&self, key: &str, fut: F) -> Result<T, Interrupted>
    where
        F: Future<Output = T>,
    {
        // Check-and-register under one lock acquisition, with no await
        // between the check and the insert.
        let role = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(waiters) = pending.get_mut(key) {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Role::Follower(rx)
            } else {
                pending.insert(key.to_string(), Vec::new());
                Role::Leader
            }
        };

        match role {
            Role::Follower(rx) => rx.await.map_err(|_| Interrupted),
            Role::Leader => {
                // If this future is dropped mid-computation (client
                // disconnect cancels the handler), the guard releases
                // the key and the dropped senders wake all followers.
                let guard = ReleaseGuard {
                    registry: self,
                    key,
                    armed: true,
                };
                let result = fut.await;
                guard.release_and_notify(result.clone());
                Ok(result)
            }
        }
    }

    fn take_waiters(&self, key: &str) -> Vec<oneshot::Sender<T>> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(key).unwrap_or_default()
    }
}

struct ReleaseGuard<'a, T: Clone> {
    registry: &'a InFlightRegistry<T>,
    key: &'a str,
    armed: bool,
}

impl<'a, T: Clone> ReleaseGuard<'a, T> {
    fn release_and_notify(mut self, result: T) {
        self.armed = false;
        for tx in self.registry.take_waiters(self.key) {
            let _ = tx.send(result.clone());
        }
    }
}

impl<'a, T: Clone> Drop for ReleaseGuard<'a, T> {
    fn drop(&mut self) {
        if self.armed {
            drop(self.registry.take_waiters(self.key));
        }
    }
}
