//! Per-packet receive control flow.

use tracing::trace;

use crate::{
    config::HistoryConfig,
    error::Result,
    loss::LossSink,
    packet::RxRecord,
    rx_history::RxHistory,
};

/// Outcome of feeding one packet into the receive side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxEvent {
    /// Seen before; nothing changed.
    Duplicate,
    /// A gap opened; the packet is held until the gap resolves.
    LossPending,
    /// The packet was applied to a pending gap.
    Loss {
        /// Did a new loss event begin?
        is_new_loss: bool,
    },
    /// In-order packet, stored as the new anchor.
    Received {
        /// Microseconds, 0 meaning no sample.
        rtt_sample: u32,
    },
}

impl RxEvent {
    /// Did this packet confirm a new loss event?
    pub fn is_new_loss(&self) -> bool {
        matches!(self, RxEvent::Loss { is_new_loss: true })
    }

    /// RTT sample in microseconds, if one was taken.
    pub fn rtt_sample(&self) -> Option<u32> {
        match *self {
            RxEvent::Received { rtt_sample } if rtt_sample > 0 => Some(rtt_sample),
            _ => None,
        }
    }
}

/// Receive-side history of one connection.
#[derive(Debug, Clone)]
pub struct RxEngine {
    history: RxHistory,
    started: bool,
}

impl RxEngine {
    /// Engine with an empty history; the first packet becomes the anchor.
    pub fn new(config: &HistoryConfig) -> Result<Self> {
        Ok(Self {
            history: RxHistory::with_config(config)?,
            started: false,
        })
    }

    /// The underlying receive history.
    pub fn history(&self) -> &RxHistory {
        &self.history
    }

    /// Process one received packet.
    ///
    /// `sink` records confirmed losses; `first_interval` supplies the length
    /// of the very first loss interval.
    pub fn on_packet<S, F>(&mut self, record: RxRecord, sink: &mut S, first_interval: F) -> RxEvent
    where
        S: LossSink,
        F: FnOnce() -> u32,
    {
        if !self.started {
            self.started = true;
            self.history.add_packet(record);
            return RxEvent::Received { rtt_sample: 0 };
        }

        if self.history.duplicate(record.seqno) {
            trace!(seqno = %record.seqno, "duplicate packet");
            return RxEvent::Duplicate;
        }

        if let Some(pending) = self.history.pending_loss() {
            let is_new_loss = pending.handle_loss(&record, sink, first_interval);
            return RxEvent::Loss { is_new_loss };
        }

        if self.history.new_loss_indicated(&record) {
            return RxEvent::LossPending;
        }

        let rtt_sample = if record.packet_type.is_data() {
            self.history.sample_rtt(&record)
        } else {
            0
        };
        sink.on_received(&record);
        self.history.add_packet(record);
        RxEvent::Received { rtt_sample }
    }
}
