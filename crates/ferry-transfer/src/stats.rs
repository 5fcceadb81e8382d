/// Transfer statistics: byte and item counters, progress percentage and a
/// periodic speed sampler.
///
/// The engine is single-threaded, so plain integers are enough here; callers
/// read snapshots through `Transfer` accessors or change notifications.

use std::time::{Duration, Instant};

/// Default speed sampling period.
pub const SPEED_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Content bytes moved so far.
    pub bytes_transferred: u64,
    /// Content bytes announced for the whole transfer.
    pub bytes_total: u64,
    /// Items completed so far.
    pub item_index: u32,
    /// Items announced for the whole transfer.
    pub item_count: u32,
}

impl TransferStats {
    pub fn new(bytes_total: u64, item_count: u32) -> Self {
        Self {
            bytes_total,
            item_count,
            ..Self::default()
        }
    }

    /// Whole-number progress, 0 - 100.
    pub fn progress(&self) -> u8 {
        progress_percent(self.bytes_transferred, self.bytes_total)
    }

    pub fn all_items_done(&self) -> bool {
        self.item_index >= self.item_count
    }
}

/// `floor(100 * done / total)`, or 0 when nothing is announced.
pub fn progress_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (done as u128 * 100) / total as u128;
    pct.min(100) as u8
}

/// Samples bytes-per-second while running.
///
/// The caller owns the period: every `sample` call with time elapsed since
/// the previous one produces a reading, so a late or early tick only changes
/// the divisor.
#[derive(Debug, Clone)]
pub struct SpeedSampler {
    interval: Duration,
    last_sample: Option<(Instant, u64)>,
    speed: u64,
}

impl SpeedSampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sample: None,
            speed: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Begin sampling from `bytes` at `now`.
    pub fn start(&mut self, now: Instant, bytes: u64) {
        self.last_sample = Some((now, bytes));
    }

    pub fn stop(&mut self) {
        self.last_sample = None;
    }

    pub fn is_running(&self) -> bool {
        self.last_sample.is_some()
    }

    /// Last computed speed in bytes per second.
    pub fn speed(&self) -> u64 {
        self.speed
    }

    /// Take a sample over the time since the previous one.
    ///
    /// Returns the new speed only when it differs from the previous one.
    pub fn sample(&mut self, now: Instant, bytes: u64) -> Option<u64> {
        let (at, previous) = self.last_sample?;
        let elapsed = now.saturating_duration_since(at);
        if elapsed.is_zero() {
            return None;
        }

        let moved = bytes.saturating_sub(previous);
        let speed = (moved as f64 / elapsed.as_secs_f64()) as u64;
        self.last_sample = Some((now, bytes));

        if speed == self.speed {
            return None;
        }
        self.speed = speed;
        Some(speed)
    }
}

impl Default for SpeedSampler {
    fn default() -> Self {
        Self::new(SPEED_INTERVAL)
    }
}
