//! Collapses concurrent calls for the same key into one execution.
//!
//! Each in-flight key maps to a `watch` receiver that resolves to the leader's
//! result. The map mutex is only held for map access, never across an await.
//! Results are not cached: once the leader publishes, the key is free again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

struct InFlight<T> {
    id: u64,
    result: watch::Receiver<Option<T>>,
}

type FlightMap<T> = Arc<Mutex<HashMap<String, InFlight<T>>>>;

/// Per-key single-flight coordinator.
pub struct SingleFlight<T> {
    in_flight: FlightMap<T>,
    next_id: AtomicU64,
}

enum Role<T> {
    Leader(watch::Sender<Option<T>>, u64),
    Follower(watch::Receiver<Option<T>>),
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `f` for `key`, or wait for and share the result of the call already
    /// running for `key`.
    ///
    /// The leader's future runs on its own task, so it completes and publishes
    /// even if the caller that started it is dropped. If it panics instead,
    /// waiters retry and one of them runs its own `f`.
    pub async fn execute<F, Fut>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (sender, id) = loop {
            let role = {
                let mut in_flight = lock(&self.in_flight);
                match in_flight.get(key) {
                    Some(entry) => Role::Follower(entry.result.clone()),
                    None => {
                        let (sender, receiver) = watch::channel(None);
                        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                        in_flight.insert(key.to_string(), InFlight { id, result: receiver });
                        Role::Leader(sender, id)
                    }
                }
            };

            match role {
                Role::Leader(sender, id) => break (sender, id),
                Role::Follower(mut receiver) => {
                    let published = match receiver.wait_for(Option::is_some).await {
                        Ok(value) => value.clone(),
                        Err(_) => None,
                    };
                    if let Some(value) = published {
                        return value;
                    }
                }
            }
        };

        let marker = FlightMarker {
            in_flight: Arc::clone(&self.in_flight),
            key: key.to_string(),
            id,
        };
        let flight = f();
        let handle = tokio::spawn(async move {
            let value = flight.await;

            // Clear the marker before publishing so later arrivals start a new call
            drop(marker);
            let _ = sender.send(Some(value.clone()));

            value
        });

        match handle.await {
            Ok(value) => value,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // Only cancelled by runtime shutdown, which drops this task as well
            Err(_) => std::future::pending().await,
        }
    }

    /// Whether a call for `key` is currently running.
    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.in_flight).contains_key(key)
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(
    in_flight: &Mutex<HashMap<String, InFlight<T>>>,
) -> MutexGuard<'_, HashMap<String, InFlight<T>>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the in-flight entry when the leader's task finishes or unwinds.
struct FlightMarker<T> {
    in_flight: FlightMap<T>,
    key: String,
    id: u64,
}

impl<T> Drop for FlightMarker<T> {
    fn drop(&mut self) {
        let mut in_flight = lock(&self.in_flight);
        if in_flight.get(&self.key).is_some_and(|entry| entry.id == self.id) {
            in_flight.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_concurrent_calls_collapse() {
        let flight = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let results = futures::future::join_all((0..10).map(|_| {
            let calls = calls.clone();
            flight.execute("key", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                42
            })
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == 42));
        assert!(!flight.is_in_flight("key"));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_collapse() {
        let flight = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let results = futures::future::join_all(["a", "b"].map(|key| {
            let calls = calls.clone();
            flight.execute(key, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                key.to_string()
            })
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(results, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_results_are_not_cached() {
        let flight = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in 1..=3 {
            let calls = calls.clone();
            let result = flight
                .execute("key", || async move { calls.fetch_add(1, Ordering::SeqCst) + 1 })
                .await;
            assert_eq!(result, expected);
        }
    }

    #[tokio::test]
    async fn test_dropped_leader_still_publishes() {
        let flight = Arc::new(SingleFlight::new());
        let release = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let flight = flight.clone();
            let release = release.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                flight
                    .execute("key", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        release.notified().await;
                        "leader"
                    })
                    .await
            })
        };

        while !flight.is_in_flight("key") {
            tokio::task::yield_now().await;
        }

        let follower = {
            let flight = flight.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                flight
                    .execute("key", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        "follower"
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        leader.abort();
        release.notify_one();

        assert_eq!(follower.await.unwrap(), "leader");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!flight.is_in_flight("key"));
    }

    #[tokio::test]
    async fn test_panicking_leader_hands_over() {
        let flight: Arc<SingleFlight<&'static str>> = Arc::new(SingleFlight::new());
        let release = Arc::new(Notify::new());

        let leader = {
            let flight = flight.clone();
            let release = release.clone();
            tokio::spawn(async move {
                flight
                    .execute("key", || async move {
                        release.notified().await;
                        panic!("leader failed");
                    })
                    .await
            })
        };

        while !flight.is_in_flight("key") {
            tokio::task::yield_now().await;
        }

        let follower = {
            let flight = flight.clone();
            tokio::spawn(async move { flight.execute("key", || async { "follower" }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        release.notify_one();

        assert!(leader.await.unwrap_err().is_panic());
        assert_eq!(follower.await.unwrap(), "follower");
        assert!(!flight.is_in_flight("key"));
    }
}
