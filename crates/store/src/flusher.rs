/// Periodic background fsync worker.
///
/// Wakes every `fsync_interval`, takes the write lock briefly, flushes the
/// active segment's `.log` and `.index` to disk, and persists its hint. The
/// lock is held for one fsync cycle at most; the wait between cycles polls
/// a shutdown flag so `close` never blocks a full interval.
use crate::Inner;
use parking_lot::RwLock;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_TICK: Duration = Duration::from_millis(50);

pub(crate) struct Flusher {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    pub(crate) fn spawn(
        inner: Arc<RwLock<Inner>>,
        interval: Duration,
    ) -> io::Result<Flusher> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("driftkv-flusher".into())
            .spawn(move || run(&inner, &flag, interval))?;

        Ok(Flusher {
            shutdown,
            handle: Some(handle),
        })
    }

    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(inner: &RwLock<Inner>, shutdown: &AtomicBool, interval: Duration) {
    let tick = POLL_TICK.min(interval);
    let mut elapsed = Duration::ZERO;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        thread::sleep(tick);
        elapsed += tick;
        if elapsed < interval {
            continue;
        }
        elapsed = Duration::ZERO;

        let mut guard = inner.write();
        if guard.closed {
            return;
        }
        if let Err(err) = guard.manager.sync_active() {
            tracing::warn!(%err, "periodic fsync of active segment failed");
        }
    }
}
