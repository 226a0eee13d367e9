//! Receive history and loss detection.
//!
//! The history keeps four records in a [`RecordRing`]. Position 0 is the
//! anchor: the most advanced packet known to have no gap before it. While a
//! gap is unresolved, positions 1 and 2 hold the packets that arrived beyond
//! it. A loss is only confirmed once three packets have been seen after the
//! gap (RFC 4342, 6.1), which is the moment a [`LossSink`] is told about it.
//!
//! In the transition comments `Si` is the sequence number of entry `i`, and
//! the packet being handled is always the highest-numbered one.

use tokio::time::Instant;
use tracing::debug;

use crate::{
    config::HistoryConfig,
    error::Result,
    loss::{LossSink, LossView},
    packet::RxRecord,
    ring::RecordRing,
    rtt::RttSampler,
    seq::{after, delta, SeqNo},
};

/// How many received packets are being held beyond an unresolved gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LossState {
    /// No gap after the anchor.
    #[default]
    Clean,
    /// One packet held beyond the gap.
    OnePending,
    /// Two packets held beyond the gap.
    TwoPending,
}

impl LossState {
    /// Number of packets held beyond the gap.
    pub fn loss_count(self) -> usize {
        match self {
            LossState::Clean => 0,
            LossState::OnePending => 1,
            LossState::TwoPending => 2,
        }
    }
}

/// Three packets held beyond the gap. Only exists between confirming a loss
/// and recycling the records.
#[derive(Debug)]
struct ThreePending;

#[derive(Debug)]
enum TwoAfterLoss {
    Resolved(LossState),
    Confirmed(ThreePending),
}

/// Per-connection receive history.
#[derive(Debug, Clone)]
pub struct RxHistory {
    ring: RecordRing,
    loss: LossState,
    pub(crate) rtt: RttSampler,
}

impl RxHistory {
    /// Allocate the history with default limits.
    pub fn alloc() -> Result<Self> {
        Self::with_config(&HistoryConfig::default())
    }

    /// Allocate the history, validating `config` first.
    pub fn with_config(config: &HistoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ring: RecordRing::alloc(Instant::now())?,
            loss: LossState::Clean,
            rtt: RttSampler::new(config.sane_rtt_max_us),
        })
    }

    /// Current loss state.
    pub fn loss_state(&self) -> LossState {
        self.loss
    }

    /// Number of packets held beyond the gap.
    pub fn loss_count(&self) -> usize {
        self.loss.loss_count()
    }

    /// Record at logical position `i`, 0 being the anchor.
    pub fn entry(&self, i: usize) -> &RxRecord {
        self.ring.entry(i)
    }

    /// The anchor.
    pub fn loss_prev(&self) -> &RxRecord {
        self.ring.entry(0)
    }

    /// The highest-numbered packet tracked.
    pub fn last_rcv(&self) -> &RxRecord {
        self.ring.entry(self.loss_count())
    }

    /// Sequence numbers of the anchor and every pending entry, in order.
    pub fn tracked(&self) -> impl Iterator<Item = SeqNo> + '_ {
        (0..=self.loss_count()).map(move |i| self.ring.entry(i).seqno)
    }

    /// Store `record` as the anchor.
    ///
    /// This overwrites position 0 whatever the loss state; callers only use
    /// it when no loss is pending.
    pub fn add_packet(&mut self, record: RxRecord) {
        self.ring.set(0, record);
    }

    /// Has a packet with `seq` been seen before?
    pub fn duplicate(&self, seq: SeqNo) -> bool {
        if !after(seq, self.loss_prev().seqno) {
            return true;
        }
        (1..=self.loss_count()).any(|i| self.ring.entry(i).seqno == seq)
    }

    /// Does `record` open a gap after the anchor that its NDP count cannot
    /// explain? If so, `record` becomes the first pending entry.
    pub fn new_loss_indicated(&mut self, record: &RxRecord) -> bool {
        if self.loss != LossState::Clean {
            return false;
        }

        let d = delta(self.loss_prev().seqno, record.seqno);
        if d > 1 && u64::from(record.ndp) < d {
            debug!(
                anchor = %self.loss_prev().seqno,
                seqno = %record.seqno,
                ndp = record.ndp,
                "gap after anchor, loss pending"
            );
            self.ring.set(1, *record);
            self.loss = LossState::OnePending;
            return true;
        }
        false
    }

    /// Access to loss handling, available only while a loss is pending.
    pub fn pending_loss(&mut self) -> Option<PendingLoss<'_>> {
        let stage = match self.loss {
            LossState::Clean => return None,
            LossState::OnePending => Stage::One,
            LossState::TwoPending => Stage::Two,
        };
        Some(PendingLoss {
            history: self,
            stage,
        })
    }

    fn set_loss(&mut self, next: LossState) {
        if next != self.loss {
            debug!(
                from = ?self.loss,
                to = ?next,
                anchor = %self.loss_prev().seqno,
                "loss state transition"
            );
        }
        self.loss = next;
    }

    fn one_after_loss(&mut self, r2: &RxRecord) -> LossState {
        let s0 = self.ring.entry(0).seqno;
        let e1 = *self.ring.entry(1);

        if after(r2.seqno, e1.seqno) {
            // S1 < S2
            self.ring.set(2, *r2);
            return LossState::TwoPending;
        }

        // S0 < S2 < S1
        if r2.follows_within(delta(s0, r2.seqno)) {
            if e1.follows_within(delta(r2.seqno, e1.seqno)) {
                // S0, S2, S1 are consecutive
                self.ring.rebase(1);
                LossState::Clean
            } else {
                // gap between S2 and S1
                self.ring.set(0, *r2);
                LossState::OnePending
            }
        } else {
            // hole between S0 and S2: insert S2 before S1
            self.ring.swap(0, 3);
            self.ring.rebase(3);
            self.ring.set(1, *r2);
            LossState::TwoPending
        }
    }

    fn two_after_loss(&mut self, r3: &RxRecord) -> TwoAfterLoss {
        let s0 = self.ring.entry(0).seqno;
        let e1 = *self.ring.entry(1);
        let e2 = *self.ring.entry(2);

        if after(r3.seqno, e2.seqno) {
            // S2 < S3
            self.ring.set(3, *r3);
            return TwoAfterLoss::Confirmed(ThreePending);
        }

        if after(r3.seqno, e1.seqno) {
            // S1 < S3 < S2
            self.ring.swap(2, 3);
            self.ring.set(2, *r3);
            return TwoAfterLoss::Confirmed(ThreePending);
        }

        // S0 < S3 < S1
        if r3.follows_within(delta(s0, r3.seqno)) {
            let next = if e1.follows_within(delta(r3.seqno, e1.seqno)) {
                if e2.follows_within(delta(e1.seqno, e2.seqno)) {
                    // S0, S3, S1, S2 are consecutive
                    self.ring.rebase(2);
                    LossState::Clean
                } else {
                    // gap remains between S1 and S2
                    self.ring.rebase(1);
                    LossState::OnePending
                }
            } else {
                // gap between S3 and S1
                self.ring.set(0, *r3);
                LossState::TwoPending
            };
            return TwoAfterLoss::Resolved(next);
        }

        // S0 < S3 < S1 < S2 with a hole before S3
        self.ring.swap(0, 3);
        self.ring.rebase(3);
        self.ring.set(1, *r3);
        TwoAfterLoss::Confirmed(ThreePending)
    }

    fn loss_view(&self, _: &ThreePending) -> LossView<'_> {
        LossView {
            loss_prev: self.ring.entry(0),
            pending: [self.ring.entry(1), self.ring.entry(2), self.ring.entry(3)],
        }
    }

    /// Recycle the records once the loss has been recorded. S1 is never a
    /// valid successor of S0 here, so only S1/S2 and S2/S3 need checking.
    fn three_after_loss(&mut self, _: ThreePending) -> LossState {
        let e1 = *self.ring.entry(1);
        let e2 = *self.ring.entry(2);
        let e3 = *self.ring.entry(3);

        if e2.follows_within(delta(e1.seqno, e2.seqno)) {
            if e3.follows_within(delta(e2.seqno, e3.seqno)) {
                self.ring.rebase(3);
                LossState::Clean
            } else {
                self.ring.rebase(2);
                LossState::OnePending
            }
        } else {
            self.ring.rebase(1);
            LossState::TwoPending
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    One,
    Two,
}

/// Receive history with one or two packets pending beyond a gap.
#[derive(Debug)]
pub struct PendingLoss<'a> {
    history: &'a mut RxHistory,
    stage: Stage,
}

impl PendingLoss<'_> {
    /// Number of packets held beyond the gap, 1 or 2.
    pub fn loss_count(&self) -> usize {
        match self.stage {
            Stage::One => 1,
            Stage::Two => 2,
        }
    }

    /// Feed `record` into the pending gap.
    ///
    /// `record` must already have passed [`RxHistory::duplicate`]. When a
    /// loss is confirmed, `sink` records it (using `first_interval` for the
    /// very first one) before the history is recycled. Returns the sink's
    /// verdict on whether a new loss event began.
    pub fn handle_loss<S, F>(self, record: &RxRecord, sink: &mut S, first_interval: F) -> bool
    where
        S: LossSink,
        F: FnOnce() -> u32,
    {
        let history = self.history;

        match self.stage {
            Stage::One => {
                let next = history.one_after_loss(record);
                history.set_loss(next);
                false
            }
            Stage::Two => match history.two_after_loss(record) {
                TwoAfterLoss::Resolved(next) => {
                    history.set_loss(next);
                    false
                }
                TwoAfterLoss::Confirmed(three) => {
                    let is_new_loss = sink.interval_add(&history.loss_view(&three), first_interval);
                    debug!(
                        anchor = %history.loss_prev().seqno,
                        last = %history.ring.entry(3).seqno,
                        is_new_loss,
                        "loss confirmed"
                    );
                    let next = history.three_after_loss(three);
                    history.set_loss(next);
                    is_new_loss
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{loss::LossIntervals, packet::PacketType};
    use tokio_test::assert_ok;

    fn rec(seq: u64) -> RxRecord {
        rec_ndp(seq, 0)
    }

    fn rec_ndp(seq: u64, ndp: u32) -> RxRecord {
        RxRecord::received(SeqNo::new(seq), 0, PacketType::Data, ndp)
    }

    fn seqs(h: &RxHistory) -> Vec<u64> {
        h.tracked().map(SeqNo::get).collect()
    }

    fn history_at(anchor: u64) -> RxHistory {
        let mut h = assert_ok!(RxHistory::alloc());
        h.add_packet(rec(anchor));
        h
    }

    /// Sink that remembers what it was shown and answers `true`.
    #[derive(Default)]
    struct Recorder {
        views: Vec<(u64, [u64; 3])>,
    }

    impl LossSink for Recorder {
        fn interval_add<F: FnOnce() -> u32>(&mut self, view: &LossView<'_>, first: F) -> bool {
            let _ = first();
            self.views.push((
                view.loss_prev.seqno.get(),
                view.pending.map(|r| r.seqno.get()),
            ));
            true
        }
    }

    fn feed(h: &mut RxHistory, r: RxRecord, sink: &mut Recorder) -> bool {
        assert!(!h.duplicate(r.seqno));
        match h.pending_loss() {
            Some(pending) => pending.handle_loss(&r, sink, || 1),
            None => {
                if !h.new_loss_indicated(&r) {
                    h.add_packet(r);
                }
                false
            }
        }
    }

    #[test]
    fn test_fresh_history_is_clean() {
        let mut h = assert_ok!(RxHistory::alloc());
        assert_eq!(h.loss_state(), LossState::Clean);
        assert_eq!(h.loss_count(), 0);
        assert!(h.pending_loss().is_none());
    }

    #[test]
    fn test_duplicate() {
        let mut h = history_at(100);
        assert!(h.duplicate(SeqNo::new(100)));
        assert!(h.duplicate(SeqNo::new(99)));
        assert!(!h.duplicate(SeqNo::new(101)));

        assert!(h.new_loss_indicated(&rec(105)));
        assert!(h.duplicate(SeqNo::new(105)));
        assert!(!h.duplicate(SeqNo::new(103)));
        // no side effects
        assert!(h.duplicate(SeqNo::new(105)));
        assert_eq!(h.loss_count(), 1);
    }

    #[test]
    fn test_duplicate_across_wrap() {
        let h = history_at(SeqNo::MAX.get());
        assert!(!h.duplicate(SeqNo::new(0)));
        assert!(h.duplicate(SeqNo::MAX));
    }

    #[test]
    fn test_ndp_explains_gap() {
        let mut h = history_at(100);
        assert!(!h.new_loss_indicated(&rec_ndp(103, 3)));
        assert_eq!(h.loss_count(), 0);
        assert!(h.new_loss_indicated(&rec_ndp(103, 2)));
        assert_eq!(seqs(&h), vec![100, 103]);
    }

    #[test]
    fn test_new_loss_indicated_only_from_clean() {
        let mut h = history_at(100);
        assert!(h.new_loss_indicated(&rec(103)));
        assert!(!h.new_loss_indicated(&rec(110)));
        assert_eq!(seqs(&h), vec![100, 103]);
    }

    #[test]
    fn test_one_pending_grows() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(102)));
        assert!(!feed(&mut h, rec(104), &mut sink));
        assert_eq!(h.loss_state(), LossState::TwoPending);
        assert_eq!(seqs(&h), vec![100, 102, 104]);
    }

    #[test]
    fn test_one_pending_filled() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(102)));
        assert!(!feed(&mut h, rec(101), &mut sink));
        assert_eq!(h.loss_state(), LossState::Clean);
        assert_eq!(h.loss_prev().seqno, SeqNo::new(102));
    }

    #[test]
    fn test_one_pending_partially_filled_moves_anchor() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(104)));
        assert!(!feed(&mut h, rec(101), &mut sink));
        assert_eq!(h.loss_state(), LossState::OnePending);
        assert_eq!(seqs(&h), vec![101, 104]);
    }

    #[test]
    fn test_two_pending_confirms_on_higher_packet() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(102)));
        feed(&mut h, rec(103), &mut sink);
        assert!(feed(&mut h, rec(104), &mut sink));
        assert_eq!(sink.views, vec![(100, [102, 103, 104])]);
        // 102, 103, 104 are consecutive: everything resolved
        assert_eq!(h.loss_state(), LossState::Clean);
        assert_eq!(h.loss_prev().seqno, SeqNo::new(104));
    }

    #[test]
    fn test_two_pending_insert_between() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(102)));
        feed(&mut h, rec(106), &mut sink);
        assert!(feed(&mut h, rec(104), &mut sink));
        assert_eq!(sink.views, vec![(100, [102, 104, 106])]);
        // gap between 102 and 104 remains
        assert_eq!(h.loss_state(), LossState::TwoPending);
        assert_eq!(seqs(&h), vec![102, 104, 106]);
    }

    #[test]
    fn test_two_pending_insert_before_first() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(104)));
        feed(&mut h, rec(105), &mut sink);
        assert!(feed(&mut h, rec(102), &mut sink));
        assert_eq!(sink.views, vec![(100, [102, 104, 105])]);
        assert_eq!(h.loss_state(), LossState::TwoPending);
        assert_eq!(seqs(&h), vec![102, 104, 105]);
    }

    #[test]
    fn test_two_pending_partial_fill_keeps_two() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(104)));
        feed(&mut h, rec(106), &mut sink);
        assert!(!feed(&mut h, rec(101), &mut sink));
        assert_eq!(h.loss_state(), LossState::TwoPending);
        assert_eq!(seqs(&h), vec![101, 104, 106]);
        assert!(sink.views.is_empty());
    }

    #[test]
    fn test_two_pending_fill_leaves_second_gap() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(102)));
        feed(&mut h, rec(105), &mut sink);
        assert!(!feed(&mut h, rec(101), &mut sink));
        assert_eq!(h.loss_state(), LossState::OnePending);
        assert_eq!(seqs(&h), vec![102, 105]);
    }

    #[test]
    fn test_one_pending_ndp_bridges_to_anchor_only() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(105)));

        // 102 follows 100 through its ndp, but 105 still misses 103..=104
        assert!(!feed(&mut h, rec_ndp(102, 2), &mut sink));
        assert_eq!(h.loss_state(), LossState::OnePending);
        assert_eq!(seqs(&h), vec![102, 105]);

        assert!(!feed(&mut h, rec(103), &mut sink));
        assert_eq!(seqs(&h), vec![103, 105]);
        assert!(sink.views.is_empty());
    }

    #[test]
    fn test_one_pending_ndp_closes_gap() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec_ndp(104, 3)));

        // 104 carries 3 non-data packets, so 101 leaves nothing missing
        assert!(!feed(&mut h, rec(101), &mut sink));
        assert_eq!(h.loss_state(), LossState::Clean);
        assert_eq!(h.loss_prev().seqno, SeqNo::new(104));
        assert!(sink.views.is_empty());
    }

    #[test]
    fn test_two_pending_ndp_bridges_to_anchor_only() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(104)));
        feed(&mut h, rec(106), &mut sink);
        assert_eq!(seqs(&h), vec![100, 104, 106]);

        assert!(!feed(&mut h, rec_ndp(102, 2), &mut sink));
        assert_eq!(h.loss_state(), LossState::TwoPending);
        assert_eq!(seqs(&h), vec![102, 104, 106]);
    }

    #[test]
    fn test_two_pending_ndp_closes_both_gaps() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec_ndp(103, 2)));
        feed(&mut h, rec_ndp(106, 3), &mut sink);
        assert_eq!(h.loss_state(), LossState::TwoPending);

        assert!(!feed(&mut h, rec(101), &mut sink));
        assert_eq!(h.loss_state(), LossState::Clean);
        assert_eq!(h.loss_prev().seqno, SeqNo::new(106));
    }

    #[test]
    fn test_two_pending_ndp_closes_first_gap() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec_ndp(103, 2)));
        feed(&mut h, rec(106), &mut sink);

        assert!(!feed(&mut h, rec(101), &mut sink));
        assert_eq!(h.loss_state(), LossState::OnePending);
        assert_eq!(seqs(&h), vec![103, 106]);
    }

    #[test]
    fn test_confirmed_loss_leaves_gap_before_newest() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(102)));
        feed(&mut h, rec(103), &mut sink);
        assert_eq!(seqs(&h), vec![100, 102, 103]);

        // 101 is lost for good; 104 and 105 are still missing before 106
        assert!(feed(&mut h, rec(106), &mut sink));
        assert_eq!(sink.views, vec![(100, [102, 103, 106])]);
        assert_eq!(h.loss_state(), LossState::OnePending);
        assert_eq!(seqs(&h), vec![103, 106]);
    }

    #[test]
    fn test_confirmed_loss_ndp_explains_later_gaps() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(102)));
        feed(&mut h, rec_ndp(105, 3), &mut sink);
        assert_eq!(h.loss_state(), LossState::TwoPending);

        assert!(feed(&mut h, rec_ndp(109, 4), &mut sink));
        assert_eq!(sink.views, vec![(100, [102, 105, 109])]);
        assert_eq!(h.loss_state(), LossState::Clean);
        assert_eq!(h.loss_prev().seqno, SeqNo::new(109));
    }

    #[test]
    fn test_confirmed_loss_ndp_explains_middle_gap_only() {
        let mut h = history_at(100);
        let mut sink = Recorder::default();
        assert!(h.new_loss_indicated(&rec(102)));
        feed(&mut h, rec_ndp(105, 3), &mut sink);

        assert!(feed(&mut h, rec(108), &mut sink));
        assert_eq!(h.loss_state(), LossState::OnePending);
        assert_eq!(seqs(&h), vec![105, 108]);
    }

    #[test]
    fn test_sink_verdict_is_returned() {
        struct Reject;
        impl LossSink for Reject {
            fn interval_add<F: FnOnce() -> u32>(&mut self, _: &LossView<'_>, _: F) -> bool {
                false
            }
        }

        let mut h = history_at(100);
        assert!(h.new_loss_indicated(&rec(102)));
        let pending = h.pending_loss();
        assert!(pending.is_some_and(|p| !p.handle_loss(&rec(103), &mut Reject, || 1)));
        let pending = h.pending_loss();
        assert!(pending.is_some_and(|p| !p.handle_loss(&rec(104), &mut Reject, || 1)));
        assert_eq!(h.loss_state(), LossState::Clean);
    }

    #[test]
    fn test_with_loss_intervals() {
        let mut h = history_at(100);
        let mut lh = LossIntervals::new();
        assert!(h.new_loss_indicated(&rec(102)));
        for seq in [103, 104] {
            if let Some(p) = h.pending_loss() {
                p.handle_loss(&rec(seq), &mut lh, || 7);
            }
        }
        assert_eq!(lh.len(), 1);
        assert_eq!(lh.current().map(|li| li.start), Some(SeqNo::new(100)));
        assert_eq!(lh.current().map(|li| li.length), Some(7));
    }

    #[test]
    fn test_add_packet_overwrites_anchor_even_when_pending() {
        // reference behaviour: position 0 is replaced, pending entries stay
        let mut h = history_at(100);
        assert!(h.new_loss_indicated(&rec(103)));
        h.add_packet(rec(101));
        assert_eq!(h.loss_state(), LossState::OnePending);
        assert_eq!(seqs(&h), vec![101, 103]);
    }
}
