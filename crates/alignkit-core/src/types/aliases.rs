//! Type aliases for shared state that crosses task boundaries.
//!
//! All locks are `parking_lot` locks. They are held for short, synchronous
//! sections only and never across an `.await`.
//!
//! ```rust,ignore
//! use alignkit_core::types::*;
//!
//! let plans: ThreadSafeMap<String, u32> = thread_safe_map();
//! plans.lock().insert("CCD1".into(), 3);
//! ```

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// A thread-safe, mutex-protected value.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe hash map behind a mutex, for write-heavy maps such as in-progress plans.
pub type ThreadSafeMap<K, V> = Arc<Mutex<HashMap<K, V>>>;

/// A thread-safe reader-writer lock wrapper for read-heavy workloads.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

/// A thread-safe reader-writer hash map.
pub type ThreadSafeRwMap<K, V> = Arc<RwLock<HashMap<K, V>>>;

/// Create a new `ThreadSafe<T>` from a value.
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create an empty `ThreadSafeMap<K, V>`.
pub fn thread_safe_map<K, V>() -> ThreadSafeMap<K, V> {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Create a new `ThreadSafeRw<T>` from a value.
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}

/// Create an empty `ThreadSafeRwMap<K, V>`.
pub fn thread_safe_rw_map<K, V>() -> ThreadSafeRwMap<K, V> {
    Arc::new(RwLock::new(HashMap::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_share_state() {
        let counter = thread_safe(0u32);
        let clone = counter.clone();
        *clone.lock() += 2;
        assert_eq!(*counter.lock(), 2);

        let map: ThreadSafeRwMap<&str, i32> = thread_safe_rw_map();
        map.write().insert("a", 1);
        assert_eq!(map.read().get("a"), Some(&1));

        let flag = thread_safe_rw(false);
        *flag.write() = true;
        assert!(*flag.read());

        let m: ThreadSafeMap<u8, u8> = thread_safe_map();
        assert!(m.lock().is_empty());
    }
}
