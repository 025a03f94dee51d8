use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::models::CountSample;

/// Rolling mean of raw counts over a trailing time window.
///
/// Only used in live mode, where consecutive frames of the same tray jitter
/// by a pill or two.
#[derive(Debug, Clone)]
pub struct Smoother {
    window: Duration,
    history: VecDeque<CountSample>,
}

impl Smoother {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            history: VecDeque::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a sample and return the count to display.
    ///
    /// Samples more than `window` older than `timestamp` are evicted before
    /// the mean is taken.
    pub fn record(&mut self, timestamp: Instant, raw_count: u32) -> u32 {
        while let Some(oldest) = self.history.front() {
            if timestamp.saturating_duration_since(oldest.timestamp) > self.window {
                self.history.pop_front();
            } else {
                break;
            }
        }

        if self.history.is_empty() {
            self.history.push_back(CountSample { timestamp, raw_count });
            return raw_count;
        }

        self.history.push_back(CountSample { timestamp, raw_count });
        let sum: u64 = self.history.iter().map(|s| s.raw_count as u64).sum();
        (sum as f64 / self.history.len() as f64).round() as u32
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &CountSample> {
        self.history.iter()
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
