use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

use super::error::ControlError;

/// Time source for cache expiry decisions. Injected so tests can drive it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

type SharedFill<V> = Shared<BoxFuture<'static, Result<(V, DateTime<Utc>), ControlError>>>;

enum Slot<V> {
    Ready {
        value: V,
        expires_at: DateTime<Utc>,
    },
    Filling(SharedFill<V>),
}

/// Time-bounded cache with single-flight fills: at most one fetch per key is
/// in flight, and concurrent callers for that key await the same future.
/// Entries are never served past their expiry.
pub struct TtlCache<V: Clone> {
    slots: Mutex<HashMap<String, Slot<V>>>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new(ttl: std::time::Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(300)),
            capacity: capacity.max(1),
            clock,
        }
    }

    /// Look up `key`, filling via `fetch` on a miss or an expired entry.
    ///
    /// `fetch` may return an expiry of its own (an upstream token's, say);
    /// the effective expiry is the earlier of that and the cache TTL. A
    /// failed fill is not cached: the error propagates to every waiter and
    /// the next caller retries.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<V, ControlError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(V, Option<DateTime<Utc>>), ControlError>>
            + Send
            + 'static,
    {
        let now = self.clock.now();
        let default_expiry = now + self.ttl;

        let fill = {
            let mut slots = self.slots.lock().await;
            match slots.get(key) {
                Some(Slot::Ready { value, expires_at }) if *expires_at > now => {
                    return Ok(value.clone());
                }
                Some(Slot::Filling(fill)) => fill.clone(),
                _ => {
                    // First caller for this key starts the fetch; the future
                    // is polled only after the lock is released.
                    let fill: SharedFill<V> = fetch()
                        .map(move |result| {
                            result.map(|(value, upstream_expiry)| {
                                let expires_at = match upstream_expiry {
                                    Some(upstream) => upstream.min(default_expiry),
                                    None => default_expiry,
                                };
                                (value, expires_at)
                            })
                        })
                        .boxed()
                        .shared();
                    slots.insert(key.to_string(), Slot::Filling(fill.clone()));
                    fill
                }
            }
        };

        let outcome = fill.clone().await;

        let mut slots = self.slots.lock().await;
        match &outcome {
            Ok((value, expires_at)) => {
                slots.insert(
                    key.to_string(),
                    Slot::Ready {
                        value: value.clone(),
                        expires_at: *expires_at,
                    },
                );
                self.evict(&mut slots);
            }
            Err(_) => {
                // Drop the failed fill, but only if it is still ours: a
                // later caller may have started a fresh one.
                if let Some(Slot::Filling(current)) = slots.get(key) {
                    if current.ptr_eq(&fill) {
                        slots.remove(key);
                    }
                }
            }
        }

        outcome.map(|(value, _)| value)
    }

    fn evict(&self, slots: &mut HashMap<String, Slot<V>>) {
        if slots.len() <= self.capacity {
            return;
        }

        let now = self.clock.now();
        slots.retain(|_, slot| match slot {
            Slot::Ready { expires_at, .. } => *expires_at > now,
            Slot::Filling(_) => true,
        });

        while slots.len() > self.capacity {
            let victim = slots
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Ready { expires_at, .. } => Some((key.clone(), *expires_at)),
                    Slot::Filling(_) => None,
                })
                .min_by_key(|(_, expires_at)| *expires_at)
                .map(|(key, _)| key);

            match victim {
                Some(key) => {
                    slots.remove(&key);
                }
                None => break,
            }
        }
    }
}
