//! Frequency Signal Pipeline
//!
//! Background consumer that drains access events and applies them to the
//! admission policy, so that reads and writes never wait on sketch
//! maintenance. The queue is bounded: when it is full new events are
//! dropped rather than blocking the producer.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use tracing::{debug, info};

use crate::cache::Policy;

/// One access event awaiting incorporation into the policy.
#[derive(Debug)]
pub enum Signal {
    /// A read found the key
    Hit(u64),
    /// A read did not find the key
    Miss(u64),
    /// A write was admitted
    Insert(u64),
    /// A key was deleted or evicted
    Delete(u64),
    /// Acknowledged once every earlier signal has been applied
    Barrier(Sender<()>),
}

// == Signal Sender ==
/// Producer half of the pipeline. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: Sender<Signal>,
}

impl SignalSender {
    /// Enqueues a signal without blocking. Returns false if it was dropped.
    pub fn offer(&self, signal: Signal) -> bool {
        match self.tx.try_send(signal) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Blocks until every signal offered before this call has been applied.
    pub fn sync(&self) {
        let (ack_tx, ack_rx) = channel::bounded(1);
        if self.tx.send(Signal::Barrier(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

/// Spawns the thread that applies signals to `policy`.
///
/// The thread exits once every [`SignalSender`] has been dropped.
///
/// # Arguments
/// * `policy` - Policy whose frequency signal is updated
/// * `buffer` - Maximum number of pending signals
pub fn spawn_signal_task(policy: Arc<Policy>, buffer: usize) -> (SignalSender, JoinHandle<()>) {
    let (tx, rx) = channel::bounded(buffer.max(1));
    let handle = thread::Builder::new()
        .name("doppio-signals".to_string())
        .spawn(move || run(policy, rx))
        .expect("Failed to spawn signal thread");
    (SignalSender { tx }, handle)
}

fn run(policy: Arc<Policy>, rx: Receiver<Signal>) {
    debug!("Signal pipeline started");

    // Single consumer: signals for one key are applied in enqueue order.
    for signal in rx.iter() {
        let decayed = match signal {
            Signal::Hit(hash) => policy.record_access(hash),
            Signal::Miss(hash) => policy.record_miss(hash),
            Signal::Insert(hash) => {
                policy.record_insert(hash);
                false
            }
            Signal::Delete(hash) => {
                policy.forget(hash);
                false
            }
            Signal::Barrier(ack) => {
                let _ = ack.send(());
                false
            }
        };
        if decayed {
            debug!("Frequency sketch decayed");
        }
    }

    info!("Signal pipeline stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_SAMPLE_SIZE;

    #[test]
    fn test_signals_reach_policy_after_sync() {
        let policy = Arc::new(Policy::new(1024, DEFAULT_SAMPLE_SIZE));
        let (sender, _handle) = spawn_signal_task(policy.clone(), 64);

        assert!(sender.offer(Signal::Hit(5)));
        assert!(sender.offer(Signal::Hit(5)));
        assert!(sender.offer(Signal::Miss(5)));
        sender.sync();

        assert_eq!(policy.estimate(5), 3);
    }

    #[test]
    fn test_full_queue_drops_signals() {
        // Build the channel by hand so nothing drains it.
        let (tx, _rx) = channel::bounded(2);
        let sender = SignalSender { tx };

        assert!(sender.offer(Signal::Hit(1)));
        assert!(sender.offer(Signal::Hit(2)));
        assert!(!sender.offer(Signal::Hit(3)));
    }

    #[test]
    fn test_thread_exits_when_senders_dropped() {
        let policy = Arc::new(Policy::new(64, DEFAULT_SAMPLE_SIZE));
        let (sender, handle) = spawn_signal_task(policy, 8);

        drop(sender);
        handle.join().unwrap();
    }
}
