use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Per-chat async write locks.
///
/// A chat's entry lives only while someone holds or waits for its lock, so the
/// map stays as large as the number of chats being written right now.
#[derive(Default)]
pub struct ChatLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `chat_id`
    pub async fn acquire(&self, chat_id: &str) -> ChatLockGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(chat_id.to_string()).or_default())
        };
        ChatLockGuard {
            guard: Some(lock.lock_owned().await),
            chat_id: chat_id.to_string(),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of chats with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ChatLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    chat_id: String,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for ChatLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the map still references it: nobody holds or waits
        let idle = locks
            .get(&self.chat_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.chat_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_dropped_after_release() {
        let locks = ChatLocks::new();
        for i in 0..100 {
            let _guard = locks.acquire(&format!("chat-{}", i)).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_another_writer_waits() {
        let locks = Arc::new(ChatLocks::new());
        let first = locks.acquire("c1").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("c1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        // The waiter still references the lock, so the entry survives
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_chats_do_not_contend() {
        let locks = Arc::new(ChatLocks::new());
        let guard = locks.acquire("c1").await;

        let other = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("c2").await;
            })
        };
        other.await.unwrap();
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }
}
