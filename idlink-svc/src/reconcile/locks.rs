//! Per-identity-key mutual exclusion
//!
//! Two `identify` calls touching the same email or phone must not interleave
//! their find-then-act sequences, otherwise both can observe "no match" and
//! create two primaries for one customer. Each call locks every key it
//! carries plus the keys of every contact it will read or write, in sorted
//! order, for the whole sequence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock keys for a request: `email:<value>` and/or `phone:<value>`, sorted
pub(crate) fn identity_keys(email: Option<&str>, phone: Option<&str>) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    if let Some(e) = email {
        keys.push(format!("email:{}", e));
    }
    if let Some(p) = phone {
        keys.push(format!("phone:{}", p));
    }
    keys.sort();
    keys.dedup();
    keys
}

/// Table of async mutexes keyed by identity key
///
/// Entries are weak: a key's mutex is dropped once no guard holds it and
/// the slot is pruned on the next acquisition.
#[derive(Default)]
pub(crate) struct KeyLocks {
    table: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

/// Holds the locks of one request until dropped
pub(crate) struct KeyGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every key, in lexicographic order
    pub async fn acquire(&self, keys: &[String]) -> KeyGuard {
        let mut sorted: Vec<&String> = keys.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table.retain(|_, slot| slot.strong_count() > 0);
            sorted
                .into_iter()
                .map(|key| match table.get(key).and_then(Weak::upgrade) {
                    Some(existing) => existing,
                    None => {
                        let fresh = Arc::new(AsyncMutex::new(()));
                        table.insert(key.clone(), Arc::downgrade(&fresh));
                        fresh
                    }
                })
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for m in mutexes {
            guards.push(m.lock_owned().await);
        }
        KeyGuard { _guards: guards }
    }

    /// Number of keys currently tracked (held or not yet pruned)
    #[cfg(test)]
    fn tracked(&self) -> usize {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.values().filter(|slot| slot.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_identity_keys_sorted() {
        assert_eq!(
            identity_keys(Some("z@x"), Some("1")),
            vec!["email:z@x".to_string(), "phone:1".to_string()]
        );
        assert_eq!(identity_keys(None, Some("1")), vec!["phone:1".to_string()]);
        assert!(identity_keys(None, None).is_empty());
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let keys = identity_keys(Some("a@x"), None);

        let guard = locks.acquire(&keys).await;

        let contender = {
            let locks = locks.clone();
            let keys = keys.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&keys).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_disjoint_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.acquire(&identity_keys(Some("a@x"), None)).await;
        let b = tokio::time::timeout(
            Duration::from_millis(200),
            locks.acquire(&identity_keys(Some("b@x"), None)),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_released_keys_are_pruned() {
        let locks = KeyLocks::new();
        {
            let _g = locks.acquire(&identity_keys(Some("a@x"), Some("1"))).await;
            assert_eq!(locks.tracked(), 2);
        }
        assert_eq!(locks.tracked(), 0);
    }
}
