//! Protocol constants and default limits.

// Sequence space
/// Width of a sequence number.
pub const SEQ_BITS: u32 = 48;
/// Shift that moves a sequence number into the top of a `u64`.
pub const SEQ_SHIFT: u32 = 64 - SEQ_BITS;
/// Largest sequence number.
pub const MAX_SEQNO: u64 = (1 << SEQ_BITS) - 1;

// Window counter (RFC 4342, 8.1)
/// Bits of the window counter.
pub const CCVAL_MASK: u8 = 0x0F;
/// The window counter wraps at this value.
pub const CCVAL_MODULUS: u8 = 16;
/// Counter distance between two packets sent one RTT apart.
pub const CCVAL_OPTIMAL_DELTA: u8 = 4;

// Packets to wait after a missing packet (RFC 4342, 6.1)
/// Packets that must arrive after a gap before it counts as a loss.
pub const NDUPACK: usize = 3;
/// Records held by the receive history: the anchor plus `NDUPACK` more.
pub const RING_SIZE: usize = NDUPACK + 1;

// Loss interval history length (RFC 5348, 5.4)
/// Loss intervals kept by [`LossIntervals`](crate::LossIntervals).
pub const LIH_SIZE: usize = 8;

/// Default RTT sample ceiling, in microseconds.
pub const DEFAULT_SANE_RTT_MAX_US: u32 = 3_000_000;
/// Default number of sent packets remembered.
pub const DEFAULT_TX_HISTORY_MAX_LEN: usize = 1024;
