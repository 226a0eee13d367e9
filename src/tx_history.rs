//! Sender-side packet history.

use std::collections::VecDeque;

use tokio::time::Instant;
use tracing::trace;

use crate::{config::HistoryConfig, constants::DEFAULT_TX_HISTORY_MAX_LEN, seq::SeqNo};

/// One sent packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxEntry {
    /// Sequence number sent.
    pub seqno: SeqNo,
    /// Send time.
    pub stamp: Instant,
}

/// Sent packets, newest first, for computing the RTT from echoed sequence
/// numbers.
///
/// Entries older than an acknowledged one are dropped on lookup. The chain
/// is also capped at `max_len`; the oldest entry goes first.
#[derive(Debug, Clone)]
pub struct TxHistory {
    entries: VecDeque<TxEntry>,
    max_len: usize,
}

impl Default for TxHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TX_HISTORY_MAX_LEN)
    }
}

impl TxHistory {
    /// Empty history bounded by `config.tx_history_max_len`.
    pub fn new(config: &HistoryConfig) -> Self {
        Self::with_capacity(config.tx_history_max_len)
    }

    /// Empty history remembering at most `max_len` packets.
    pub fn with_capacity(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            entries: VecDeque::with_capacity(max_len.min(DEFAULT_TX_HISTORY_MAX_LEN)),
            max_len,
        }
    }

    /// Remember `seqno` as sent now.
    pub fn add(&mut self, seqno: SeqNo) {
        self.add_at(seqno, Instant::now());
    }

    /// Remember `seqno` as sent at `stamp`.
    pub fn add_at(&mut self, seqno: SeqNo, stamp: Instant) {
        if self.entries.len() == self.max_len {
            if let Some(oldest) = self.entries.pop_back() {
                trace!(seqno = %oldest.seqno, "tx history full, dropping oldest");
            }
        }
        self.entries.push_front(TxEntry { seqno, stamp });
    }

    /// Entry for `seqno`, if still remembered.
    pub fn find(&self, seqno: SeqNo) -> Option<&TxEntry> {
        self.entries.iter().find(|e| e.seqno == seqno)
    }

    /// Microseconds since `seqno` was sent, or 0 if it is not remembered.
    /// Everything sent before `seqno` is forgotten.
    pub fn rtt(&mut self, seqno: SeqNo, now: Instant) -> u32 {
        let Some(pos) = self.entries.iter().position(|e| e.seqno == seqno) else {
            return 0;
        };

        let elapsed = now.saturating_duration_since(self.entries[pos].stamp);
        let purged = self.entries.len() - pos - 1;
        if purged > 0 {
            trace!(seqno = %seqno, purged, "purging older tx history");
        }
        self.entries.truncate(pos + 1);

        u32::try_from(elapsed.as_micros()).unwrap_or(u32::MAX)
    }

    /// Forget every sent packet.
    pub fn purge_all(&mut self) {
        self.entries.clear();
    }

    /// Number of packets remembered.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is nothing remembered?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &TxEntry> {
        self.entries.iter()
    }
}
