//! RTT sampling from the window counter (RFC 4342, 8.1).
//!
//! The sender advances the 4-bit window counter once per quarter RTT, so two
//! packets whose counters differ by exactly 4 were sent one RTT apart. When
//! no such pair exists a nearer packet is kept as a candidate and the sample
//! is scaled from it.

use std::time::Duration;

use tracing::warn;

use crate::{
    constants::CCVAL_OPTIMAL_DELTA,
    packet::RxRecord,
    rx_history::RxHistory,
    seq::ccval_sub,
};

#[derive(Debug, Clone)]
pub(crate) struct RttSampler {
    /// Reference kept while a sample is deferred; otherwise the anchor is used.
    reference: Option<RxRecord>,
    candidate: Option<RxRecord>,
    sane_max_us: u32,
}

fn as_micros(d: Duration) -> u32 {
    u32::try_from(d.as_micros()).unwrap_or(u32::MAX)
}

impl RttSampler {
    pub(crate) fn new(sane_max_us: u32) -> Self {
        Self {
            reference: None,
            candidate: None,
            sane_max_us,
        }
    }

    fn reset(&mut self) {
        self.reference = None;
        self.candidate = None;
    }

    fn from_candidate(prev: &RxRecord, last: &RxRecord) -> Option<u32> {
        let raw = ccval_sub(prev.ccval, last.ccval);
        if raw == 0 {
            warn!(
                prev = prev.ccval,
                last = last.ccval,
                "RTT candidate has the reference window counter, dropping sample"
            );
            return None;
        }
        let elapsed = as_micros(prev.tstamp.saturating_duration_since(last.tstamp));
        Some(u32::from(CCVAL_OPTIMAL_DELTA / raw).saturating_mul(elapsed))
    }

    fn clamp(&self, sample: u32) -> u32 {
        if sample > self.sane_max_us {
            warn!(
                sample,
                max = self.sane_max_us,
                "RTT sample too large, using max"
            );
            return self.sane_max_us;
        }
        sample
    }
}

impl RxHistory {
    /// Sample the RTT using `record` against the reference entry.
    ///
    /// Returns microseconds, or 0 when no sample could be taken. The caller
    /// is expected to store `record` with [`RxHistory::add_packet`]
    /// afterwards; while a sample is deferred the reference is kept.
    pub fn sample_rtt(&mut self, record: &RxRecord) -> u32 {
        let last = self.rtt.reference.unwrap_or(*self.loss_prev());
        let delta_v = ccval_sub(record.ccval, last.ccval);

        let sample = if delta_v == CCVAL_OPTIMAL_DELTA {
            Some(as_micros(record.tstamp.saturating_duration_since(last.tstamp)))
        } else if let Some(prev) = self.rtt.candidate {
            RttSampler::from_candidate(&prev, &last)
        } else if delta_v < CCVAL_OPTIMAL_DELTA {
            // defer: keep the reference, remember a nearer candidate
            self.rtt.reference = Some(last);
            if delta_v > 0 {
                self.rtt.candidate = Some(*record);
            }
            return 0;
        } else {
            None
        };

        self.rtt.reset();
        sample.map_or(0, |s| self.rtt.clamp(s))
    }

    /// Is an RTT sample currently deferred?
    pub fn rtt_sample_pending(&self) -> bool {
        self.rtt.reference.is_some()
    }
}
