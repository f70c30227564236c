use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Handle to a scheduled timer. Carries the epoch its firing will be tagged
/// with, so a firing that was already queued when the timer was cancelled can
/// be recognized as stale and dropped. Aborts the underlying task on drop
/// unless detached.
#[derive(Debug)]
pub struct Countdown {
    epoch: u64,
    handle: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
    /// Stops the timer. Safe to call any number of times, including from the
    /// context the firing would have been delivered to.
    pub fn cancel(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
    /// Releases the timer to run to completion without a handle. Used when a
    /// newer timer supersedes this one but the older firing must still land.
    pub fn detach(mut self) {
        self.handle.take();
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Spawns sleep-then-post timer tasks onto a match's command channel. Every
/// timer gets a fresh epoch from a shared counter; receivers compare the
/// firing's epoch against the handle they kept to reject stale deliveries.
#[derive(Debug)]
pub struct Scheduler<T> {
    tx: UnboundedSender<T>,
    seq: u64,
}

impl<T: Send + 'static> Scheduler<T> {
    pub fn new(tx: UnboundedSender<T>) -> Self {
        Self { tx, seq: 0 }
    }

    /// A fresh endpoint posting onto the same channel.
    pub fn sender(&self) -> UnboundedSender<T> {
        self.tx.clone()
    }

    /// One-shot timer: sleep `after`, then post the command.
    pub fn once(&mut self, after: Duration, make: impl FnOnce(u64) -> T) -> Countdown {
        self.seq += 1;
        let epoch = self.seq;
        let cmd = make(epoch);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(cmd);
        });
        Countdown {
            epoch,
            handle: Some(handle),
        }
    }

    /// Repeating timer: post the command every `period` until cancelled or
    /// the receiving side goes away.
    pub fn every(&mut self, period: Duration, make: impl Fn(u64) -> T + Send + 'static) -> Countdown {
        self.seq += 1;
        let epoch = self.seq;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if tx.send(make(epoch)).is_err() {
                    break;
                }
            }
        });
        Countdown {
            epoch,
            handle: Some(handle),
        }
    }

    /// Fire-and-forget: no handle, no epoch check on the receiving side.
    pub fn after(&self, after: Duration, cmd: T) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(cmd);
        });
    }
}
