use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

type Waiters<T> = Mutex<HashMap<String, Vec<oneshot::Sender<T>>>>;

/// Collapses concurrent operations for the same logical key: the first caller
/// runs the operation, later callers are queued and receive a clone of the
/// shared outcome in enqueue order once it resolves. Nothing is cached here;
/// a call after resolution always starts a fresh operation.
pub struct SingleFlight<T> {
    inflight: Arc<Waiters<T>>,
}

impl<T> Clone for SingleFlight<T> {
    fn clone(&self) -> Self {
        Self {
            inflight: self.inflight.clone(),
        }
    }
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Clone + Send + 'static> SingleFlight<T> {
    pub async fn run<F, Fut>(&self, key: &str, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut operation = Some(operation);
        loop {
            let waiter = {
                let mut inflight = self.inflight.lock().expect("single flight lock");
                match inflight.get_mut(key) {
                    Some(waiters) => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        Some(rx)
                    }
                    None => {
                        inflight.insert(key.to_string(), Vec::new());
                        None
                    }
                }
            };

            let Some(rx) = waiter else {
                let mut guard = LeaderSlot {
                    inflight: &self.inflight,
                    key,
                    armed: true,
                };
                let run = operation.take().expect("leader runs the operation once");
                let outcome = run().await;
                let waiters = {
                    let mut inflight = self.inflight.lock().expect("single flight lock");
                    guard.armed = false;
                    inflight.remove(key).unwrap_or_default()
                };
                for tx in waiters {
                    // A waiter that went away simply misses delivery.
                    let _ = tx.send(outcome.clone());
                }
                return outcome;
            };

            match rx.await {
                Ok(outcome) => return outcome,
                // The leader was torn down before resolving; start fresh.
                Err(_) => continue,
            }
        }
    }
}

/// Removes the key slot if the leader is dropped mid-operation, closing the
/// queued channels so every waiter wakes up and retries.
struct LeaderSlot<'a, T> {
    inflight: &'a Waiters<T>,
    key: &'a str,
    armed: bool,
}

impl<T> Drop for LeaderSlot<'_, T> {
    fn drop(&mut self) {
        if self.armed
            && let Ok(mut inflight) = self.inflight.lock()
        {
            inflight.remove(self.key);
        }
    }
}
