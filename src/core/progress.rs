use std::time::{Duration, Instant};

/// Elapsed / remaining-time bookkeeping for a scoring run. Advisory only.
#[derive(Debug, Clone)]
pub struct Progress {
    started: Instant,
    expected: u64,
    done: u64,
    chunk_started: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    pub done: u64,
    pub remaining: u64,
    pub last_chunk: Duration,
    pub per_trial: Duration,
    pub eta: Duration,
}

impl Progress {
    pub fn new(expected: u64) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            expected,
            done: 0,
            chunk_started: now,
        }
    }

    pub fn begin_chunk(&mut self) {
        self.chunk_started = Instant::now();
    }

    pub fn finish_chunk(&mut self) -> ProgressReport {
        self.done += 1;
        let now = Instant::now();
        self.report_at(now.duration_since(self.started), now.duration_since(self.chunk_started))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn report_at(&self, elapsed: Duration, last_chunk: Duration) -> ProgressReport {
        let per_trial = elapsed.div_f64(self.done.max(1) as f64);
        let remaining = self.expected.saturating_sub(self.done);
        let eta = per_trial.mul_f64(remaining as f64);
        ProgressReport {
            done: self.done,
            remaining,
            last_chunk,
            per_trial,
            eta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_scales_with_remaining_trials() {
        let mut p = Progress::new(10);
        p.done = 4;
        let r = p.report_at(Duration::from_secs(8), Duration::from_millis(1500));
        assert_eq!(r.per_trial, Duration::from_secs(2));
        assert_eq!(r.remaining, 6);
        assert_eq!(r.eta, Duration::from_secs(12));
        assert_eq!(r.last_chunk, Duration::from_millis(1500));
    }

    #[test]
    fn per_trial_holds_past_u32_trial_counts() {
        let mut p = Progress::new(0);
        p.done = 1 << 32;
        let r = p.report_at(Duration::from_secs(1 << 33), Duration::ZERO);
        assert_eq!(r.per_trial, Duration::from_secs(2));
    }

    #[test]
    fn overrun_clamps_to_zero_remaining() {
        let mut p = Progress::new(2);
        p.begin_chunk();
        p.finish_chunk();
        p.finish_chunk();
        let r = p.finish_chunk();
        assert_eq!(r.done, 3);
        assert_eq!(r.remaining, 0);
        assert_eq!(r.eta, Duration::ZERO);
    }
}
