//! Smoothed round-trip estimation and retransmission timeout.

use std::time::Duration;

/// Tracks the smoothed round-trip time from acknowledgment samples and
/// derives the retransmission timeout from it.
///
/// The estimate is seeded by the first sample; every further sample folds in
/// with the classic 1/8 weighting. The timeout is twice the smoothed RTT,
/// floored at the configured minimum so a quiet link never retransmits
/// faster than once a second by default.
#[derive(Debug, Clone)]
pub struct RtoEstimator {
    srtt: Option<Duration>,
    last_sample: Option<Duration>,
    min_rto: Duration,
}

impl RtoEstimator {
    /// Creates an estimator with the given timeout floor.
    pub fn new(min_rto: Duration) -> Self {
        Self { srtt: None, last_sample: None, min_rto }
    }

    /// Folds one round-trip sample into the smoothed estimate.
    pub fn sample(&mut self, rtt: Duration) {
        self.last_sample = Some(rtt);
        self.srtt = Some(match self.srtt {
            None => rtt,
            Some(prev) => (prev * 7 + rtt) / 8,
        });
    }

    /// Returns the smoothed round-trip time, if any sample arrived yet.
    pub fn smoothed_rtt(&self) -> Option<Duration> {
        self.srtt
    }

    /// Returns the most recent raw sample.
    pub fn last_sample(&self) -> Option<Duration> {
        self.last_sample
    }

    /// Returns the retransmission timeout: `max(min_rto, 2 * SRTT)`.
    pub fn rto(&self) -> Duration {
        match self.srtt {
            None => self.min_rto,
            Some(srtt) => (srtt * 2).max(self.min_rto),
        }
    }
}
