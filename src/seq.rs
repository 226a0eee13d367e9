//! Circular 48-bit sequence number arithmetic.
//!
//! Sequence numbers live in `[0, 2^48)` and wrap. Every ordering question is
//! answered by shifting both operands into the top of a 64-bit register and
//! looking at the sign of the difference, so a forward distance of up to
//! `2^47` counts as "after".

use std::fmt;

use crate::constants::{CCVAL_MASK, CCVAL_MODULUS, MAX_SEQNO, SEQ_SHIFT};

/// A 48-bit sequence number.
///
/// There is intentionally no `PartialOrd`: use [`before`], [`after`] and
/// [`between`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeqNo(u64);

impl SeqNo {
    /// Largest representable sequence number.
    pub const MAX: SeqNo = SeqNo(MAX_SEQNO);

    /// Build a sequence number, discarding bits above 48.
    pub const fn new(value: u64) -> Self {
        SeqNo(value & MAX_SEQNO)
    }

    /// The raw 48-bit value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// `self + n` modulo 2^48.
    pub const fn advance(self, n: u64) -> Self {
        SeqNo::new(self.0.wrapping_add(n))
    }

    /// The following sequence number.
    pub const fn next(self) -> Self {
        self.advance(1)
    }

    /// Forward distance from `self` to `other`.
    pub const fn delta_to(self, other: SeqNo) -> u64 {
        delta(self, other)
    }

    /// See [`before`].
    pub const fn is_before(self, other: SeqNo) -> bool {
        before(self, other)
    }

    /// See [`after`].
    pub const fn is_after(self, other: SeqNo) -> bool {
        after(self, other)
    }
}

impl From<u64> for SeqNo {
    fn from(value: u64) -> Self {
        SeqNo::new(value)
    }
}

impl From<SeqNo> for u64 {
    fn from(seq: SeqNo) -> Self {
        seq.0
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const fn shifted(seq: SeqNo) -> u64 {
    seq.0 << SEQ_SHIFT
}

/// `(b - a) mod 2^48`.
pub const fn delta(a: SeqNo, b: SeqNo) -> u64 {
    shifted(b).wrapping_sub(shifted(a)) >> SEQ_SHIFT
}

/// Is `a` circularly before `b`?
pub const fn before(a: SeqNo, b: SeqNo) -> bool {
    (shifted(a).wrapping_sub(shifted(b)) as i64) < 0
}

/// Is `a` circularly after `b`?
pub const fn after(a: SeqNo, b: SeqNo) -> bool {
    (shifted(b).wrapping_sub(shifted(a)) as i64) < 0
}

/// Does `x` lie in the circular interval `[lo, hi]`?
pub const fn between(lo: SeqNo, x: SeqNo, hi: SeqNo) -> bool {
    shifted(hi).wrapping_sub(shifted(lo)) >= shifted(x).wrapping_sub(shifted(lo))
}

/// The circularly later of `a` and `b`.
pub const fn max48(a: SeqNo, b: SeqNo) -> SeqNo {
    if after(a, b) {
        a
    } else {
        b
    }
}

/// `(a - b) mod 16` for 4-bit window counter values.
pub const fn ccval_sub(a: u8, b: u8) -> u8 {
    (a.wrapping_add(CCVAL_MODULUS).wrapping_sub(b)) & CCVAL_MASK
}
