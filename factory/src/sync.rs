//! Cooperative mutual exclusion for single-writer resources.
//!
//! The working directory and its active branch are a single-writer resource:
//! two interleaved command sequences (say, two finalizes checking out
//! conflicting branches) would corrupt each other. Callers wrap such
//! sequences in a [`Mutex`].

use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;

use anyhow::{Result, anyhow};
use tokio::sync::oneshot;

struct LockState {
    held: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Cooperative, non-reentrant FIFO mutex with explicit release.
///
/// `lock().await` completes with exclusive ownership; `unlock()` releases it
/// and promotes the oldest waiter. Unlike a guard-based lock, release is
/// explicit so ownership can span non-lexical scopes; the trade-off is that
/// callers must release on every exit path, including error paths.
///
/// Non-reentrant: a holder that calls `lock()` again before `unlock()`
/// deadlocks.
pub struct Mutex {
    state: StdMutex<LockState>,
}

impl Mutex {
    pub fn new() -> Self {
        Self {
            state: StdMutex::new(LockState {
                held: false,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Acquire exclusive ownership, waiting in FIFO order behind any
    /// earlier callers.
    pub async fn lock(&self) {
        let waiter = {
            let mut state = self.lock_state();
            if !state.held {
                state.held = true;
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        // The sender lives in the waiter queue, which cannot be dropped
        // while `&self` is borrowed, so this only resolves on promotion.
        let _ = waiter.await;
    }

    /// Release ownership, promoting exactly one waiter in FIFO order.
    ///
    /// Calling this while the mutex is not held indicates a broken
    /// acquire/release pairing and returns an error.
    pub fn unlock(&self) -> Result<()> {
        let mut state = self.lock_state();
        if !state.held {
            return Err(anyhow!("unlock called while mutex is not held"));
        }
        // A waiter whose future was dropped leaves a dead sender behind;
        // skip it and promote the next one.
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                return Ok(());
            }
        }
        state.held = false;
        Ok(())
    }

    /// Whether the mutex is currently held.
    pub fn is_locked(&self) -> bool {
        self.lock_state().held
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[tokio::test]
    async fn lock_then_unlock_round_trips() {
        let mutex = Mutex::new();
        mutex.lock().await;
        assert!(mutex.is_locked());
        mutex.unlock().expect("unlock");
        assert!(!mutex.is_locked());
    }

    #[tokio::test]
    async fn unlock_without_hold_is_a_state_error() {
        let mutex = Mutex::new();
        let err = mutex.unlock().expect_err("must fail");
        assert!(err.to_string().contains("not held"));
    }

    #[tokio::test]
    async fn unlock_after_release_is_a_state_error() {
        let mutex = Mutex::new();
        mutex.lock().await;
        mutex.unlock().expect("first unlock");
        assert!(mutex.unlock().is_err());
    }

    #[tokio::test]
    async fn waiters_are_granted_in_fifo_order() {
        let mutex = Arc::new(Mutex::new());
        let order = Arc::new(StdMutex::new(Vec::new()));

        mutex.lock().await;

        let mut handles = Vec::new();
        for i in 0..3 {
            let mutex = mutex.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                mutex.lock().await;
                order.lock().unwrap().push(i);
                mutex.unlock().unwrap();
            }));
            // Let the task enqueue before spawning the next one.
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
        }

        mutex.unlock().expect("release");
        for handle in handles {
            handle.await.expect("join");
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn at_most_one_task_holds_the_lock() {
        let mutex = Arc::new(Mutex::new());
        let inside = Arc::new(StdMutex::new(0u32));
        let max_inside = Arc::new(StdMutex::new(0u32));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mutex = mutex.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                mutex.lock().await;
                {
                    let mut n = inside.lock().unwrap();
                    *n += 1;
                    let mut max = max_inside.lock().unwrap();
                    *max = (*max).max(*n);
                }
                tokio::task::yield_now().await;
                *inside.lock().unwrap() -= 1;
                mutex.unlock().unwrap();
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        assert_eq!(*max_inside.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn dropped_waiter_is_skipped_at_promotion() {
        let mutex = Arc::new(Mutex::new());
        mutex.lock().await;

        // Enqueue a waiter, then drop its future before promotion.
        let abandoned = {
            let mutex = mutex.clone();
            tokio::spawn(async move { mutex.lock().await })
        };
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        abandoned.abort();
        let _ = abandoned.await;

        let granted = {
            let mutex = mutex.clone();
            tokio::spawn(async move {
                mutex.lock().await;
                mutex.unlock().unwrap();
            })
        };
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        mutex.unlock().expect("release");
        granted.await.expect("second waiter runs");
    }
}
