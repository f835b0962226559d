//! Cancellable one-shot and periodic timers.
//!
//! Firings are not callbacks: each one is delivered as an event into the
//! owner's own queue, so the owner processes timers and external events in a
//! single FIFO order. Every start bumps a generation counter; a firing whose
//! generation no longer matches the running timer is stale and
//! [`TimerService::accept`] rejects it.
//!
//! ```
//! use acs_core::timer::{TimerFired, TimerService};
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Tick { Blink }
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let (tx, mut rx) = mpsc::channel::<TimerFired<Tick>>(4);
//! let mut timers = TimerService::new(tx);
//!
//! timers.start_once(Tick::Blink, Duration::from_millis(500));
//! let fired = rx.recv().await.unwrap();
//! assert!(timers.accept(&fired));
//! assert!(!timers.is_running(Tick::Blink));
//! # }
//! ```

use crate::queue::send_or_drop;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

/// A timer expiry as delivered into the owner's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired<K> {
    pub key: K,
    generation: u64,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    periodic: bool,
    task: JoinHandle<()>,
}

/// Keyed set of timers whose firings are sent as `E` into one queue.
pub struct TimerService<K, E> {
    tx: mpsc::Sender<E>,
    slots: HashMap<K, Slot>,
    next_generation: u64,
}

impl<K, E> TimerService<K, E>
where
    K: Copy + Eq + Hash + Send + fmt::Debug + 'static,
    E: From<TimerFired<K>> + Send + 'static,
{
    pub fn new(tx: mpsc::Sender<E>) -> Self {
        Self {
            tx,
            slots: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Fire once after `after`. Restarts the timer if it is already running.
    pub fn start_once(&mut self, key: K, after: Duration) {
        self.start(key, after, false);
    }

    /// Fire every `every`, first after one period. Restarts a running timer.
    pub fn start_periodic(&mut self, key: K, every: Duration) {
        self.start(key, every, true);
    }

    /// Cancel the timer. Stopping a timer that is not running does nothing.
    pub fn stop(&mut self, key: K) {
        if let Some(slot) = self.slots.remove(&key) {
            slot.task.abort();
            trace!(timer = ?key, "timer stopped");
        }
    }

    pub fn is_running(&self, key: K) -> bool {
        self.slots.contains_key(&key)
    }

    /// Check a firing taken from the queue against the running timer.
    ///
    /// Returns false for stale firings (the timer was stopped or restarted
    /// after this firing was queued). An accepted one-shot firing retires the
    /// timer.
    pub fn accept(&mut self, fired: &TimerFired<K>) -> bool {
        match self.slots.get(&fired.key) {
            Some(slot) if slot.generation == fired.generation => {
                if !slot.periodic {
                    self.slots.remove(&fired.key);
                }
                true
            }
            _ => {
                trace!(timer = ?fired.key, "discarding stale timer firing");
                false
            }
        }
    }

    fn start(&mut self, key: K, period: Duration, periodic: bool) {
        self.stop(key);
        self.next_generation += 1;
        let fired = TimerFired {
            key,
            generation: self.next_generation,
        };
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            if periodic {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if send_or_drop(&tx, E::from(fired), "timer").await.is_err() && tx.is_closed()
                    {
                        break;
                    }
                }
            } else {
                tokio::time::sleep(period).await;
                let _ = send_or_drop(&tx, E::from(fired), "timer").await;
            }
        });

        trace!(timer = ?key, ?period, periodic, "timer started");
        self.slots.insert(
            key,
            Slot {
                generation: fired.generation,
                periodic,
                task,
            },
        );
    }
}

impl<K, E> Drop for TimerService<K, E> {
    fn drop(&mut self) {
        for slot in self.slots.values() {
            slot.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Key {
        A,
        B,
    }

    fn service() -> (TimerService<Key, TimerFired<Key>>, mpsc::Receiver<TimerFired<Key>>) {
        let (tx, rx) = mpsc::channel(16);
        (TimerService::new(tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_once() {
        let (mut timers, mut rx) = service();
        timers.start_once(Key::A, Duration::from_secs(5));

        let start = Instant::now();
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.key, Key::A);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(timers.accept(&fired));
        assert!(!timers.is_running(Key::A));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_deadline() {
        let (mut timers, mut rx) = service();
        timers.start_once(Key::A, Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(4)).await;
        timers.start_once(Key::A, Duration::from_secs(5));

        let start = Instant::now();
        let fired = rx.recv().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(timers.accept(&fired));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_cancels() {
        let (mut timers, mut rx) = service();
        timers.stop(Key::A);
        timers.start_once(Key::A, Duration::from_secs(1));
        timers.stop(Key::A);
        timers.stop(Key::A);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert!(!timers.is_running(Key::A));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_firing_is_rejected() {
        let (mut timers, mut rx) = service();
        timers.start_once(Key::A, Duration::from_secs(1));
        let stale = rx.recv().await.unwrap();

        // Restarted before the queued firing was processed.
        timers.start_once(Key::A, Duration::from_secs(1));
        assert!(!timers.accept(&stale));
        assert!(timers.is_running(Key::A));

        let fresh = rx.recv().await.unwrap();
        assert!(timers.accept(&fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_keeps_firing() {
        let (mut timers, mut rx) = service();
        timers.start_periodic(Key::B, Duration::from_secs(10));

        for _ in 0..3 {
            let fired = rx.recv().await.unwrap();
            assert_eq!(fired.key, Key::B);
            assert!(timers.accept(&fired));
        }
        assert!(timers.is_running(Key::B));

        timers.stop(Key::B);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_keys() {
        let (mut timers, mut rx) = service();
        timers.start_once(Key::A, Duration::from_secs(2));
        timers.start_once(Key::B, Duration::from_secs(1));

        assert_eq!(rx.recv().await.unwrap().key, Key::B);
        assert_eq!(rx.recv().await.unwrap().key, Key::A);
    }
}
