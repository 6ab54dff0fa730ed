// Path: crates/telemetry/src/time.rs
use crate::sinks::KeyStoreMetricsSink;
use std::time::Instant;

/// RAII timer: on drop, reports the elapsed time as a transaction commit
/// observation. Held across a `begin`/`commit` pair.
pub struct CommitTimer<'a> {
    sink: &'a dyn KeyStoreMetricsSink,
    start: Instant,
}

impl<'a> CommitTimer<'a> {
    /// Starts timing against `sink`.
    pub fn new(sink: &'a dyn KeyStoreMetricsSink) -> Self {
        Self {
            sink,
            start: Instant::now(),
        }
    }
}

impl Drop for CommitTimer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_commit_duration(self.start.elapsed().as_secs_f64());
    }
}
