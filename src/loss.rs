//! The contract between receive history and the loss interval database.
//!
//! Receive history only decides *that* a loss interval begins; recording it
//! is delegated to a [`LossSink`]. [`LossIntervals`] is a small bounded
//! recorder that keeps the most recent intervals.

use std::collections::VecDeque;

use tracing::debug;

use crate::{
    constants::{CCVAL_OPTIMAL_DELTA, LIH_SIZE},
    packet::RxRecord,
    seq::{after, ccval_sub, delta, SeqNo},
};

/// Receive history as seen by a sink while a loss is being confirmed.
///
/// At that moment the anchor is followed by three tracked entries, the last
/// of which is the most recently received packet.
#[derive(Debug, Clone, Copy)]
pub struct LossView<'a> {
    /// The anchor: last packet received before the gap.
    pub loss_prev: &'a RxRecord,
    /// The three packets received beyond the gap, in sequence order.
    pub pending: [&'a RxRecord; 3],
}

impl<'a> LossView<'a> {
    /// The most recently received packet.
    pub fn last_rcv(&self) -> &'a RxRecord {
        self.pending[2]
    }
}

/// Records confirmed loss intervals.
pub trait LossSink {
    /// Called once per confirmed loss, before the history recycles its
    /// records. `first_interval` yields the synthetic length of the very first
    /// interval. Returns whether this starts a new loss event.
    fn interval_add<F>(&mut self, view: &LossView<'_>, first_interval: F) -> bool
    where
        F: FnOnce() -> u32;

    /// Called for every in-order packet accepted without pending loss.
    fn on_received(&mut self, _record: &RxRecord) {}
}

/// One loss interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossInterval {
    /// Sequence number of the last packet received before the loss.
    pub start: SeqNo,
    /// Window counter of that packet.
    pub ccval: u8,
    /// Interval length in packets.
    pub length: u32,
    /// Has a later loss ended this interval?
    pub is_closed: bool,
}

/// Bounded loss interval history, newest first.
#[derive(Debug, Clone, Default)]
pub struct LossIntervals {
    intervals: VecDeque<LossInterval>,
    counter: u64,
}

impl LossIntervals {
    /// An empty history.
    pub fn new() -> Self {
        Self {
            intervals: VecDeque::with_capacity(LIH_SIZE),
            counter: 0,
        }
    }

    /// Most recent interval.
    pub fn current(&self) -> Option<&LossInterval> {
        self.intervals.front()
    }

    /// Intervals, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &LossInterval> {
        self.intervals.iter()
    }

    /// Number of intervals kept.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Are no intervals kept?
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of loss events seen since creation.
    pub fn loss_events(&self) -> u64 {
        self.counter
    }

    /// A loss beginning after `loss_prev` is a new event unless it falls into
    /// the round trip of the open interval.
    fn is_new_loss(cur: &LossInterval, loss_prev: &RxRecord) -> bool {
        after(loss_prev.seqno, cur.start)
            && (cur.is_closed || ccval_sub(loss_prev.ccval, cur.ccval) > CCVAL_OPTIMAL_DELTA)
    }
}

fn clamp_len(d: u64) -> u32 {
    u32::try_from(d).unwrap_or(u32::MAX)
}

impl LossSink for LossIntervals {
    fn interval_add<F>(&mut self, view: &LossView<'_>, first_interval: F) -> bool
    where
        F: FnOnce() -> u32,
    {
        if let Some(cur) = self.intervals.front() {
            if !Self::is_new_loss(cur, view.loss_prev) {
                return false;
            }
        }

        let mut new = LossInterval {
            start: view.loss_prev.seqno,
            ccval: view.loss_prev.ccval,
            length: 0,
            is_closed: false,
        };

        self.counter += 1;
        match self.intervals.front_mut() {
            None => new.length = first_interval(),
            Some(cur) => {
                cur.length = clamp_len(delta(cur.start, new.start));
                cur.is_closed = true;
                new.length = clamp_len(delta(new.start, view.last_rcv().seqno));
            }
        }

        debug!(
            start = %new.start,
            length = new.length,
            events = self.counter,
            "recorded loss interval"
        );

        self.intervals.push_front(new);
        self.intervals.truncate(LIH_SIZE);
        true
    }

    fn on_received(&mut self, record: &RxRecord) {
        let Some(cur) = self.intervals.front_mut() else {
            return;
        };
        if cur.is_closed {
            return;
        }

        let len = clamp_len(delta(cur.start, record.seqno).saturating_add(1));
        if len <= cur.length {
            return;
        }
        if ccval_sub(record.ccval, cur.ccval) > CCVAL_OPTIMAL_DELTA {
            cur.is_closed = true;
        }
        // the synthetic first interval keeps its length
        if self.counter > 1 {
            cur.length = len;
        }
    }
}
