//! Per-item progress reporting for long-running stages.

/// Receiver of per-item progress. All methods default to no-ops.
pub trait Progress {
    fn set_total(&mut self, _total: usize) {}
    fn advance(&mut self, _done: usize) {}
    fn finish(&mut self) {}
}

/// Progress sink that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// Forwards updates only when completion has grown by at least one percent,
/// and always for the final item.
pub struct PercentThrottle<'a> {
    inner: &'a mut dyn Progress,
    total: usize,
    last_percent: usize,
}

impl<'a> PercentThrottle<'a> {
    pub fn new(inner: &'a mut dyn Progress, total: usize) -> Self {
        inner.set_total(total);
        Self {
            inner,
            total,
            last_percent: 0,
        }
    }

    /// Reports `done` items completed. Returns whether the update was forwarded.
    pub fn tick(&mut self, done: usize) -> bool {
        if self.total == 0 {
            return false;
        }
        let percent = done.saturating_mul(100) / self.total;
        if percent > self.last_percent || done == self.total {
            self.inner.advance(done);
            self.last_percent = percent;
            true
        } else {
            false
        }
    }

    pub fn finish(self) {
        self.inner.finish();
    }
}
