//! TFRC packet history: sender and receiver history, loss detection and
//! window-counter RTT sampling for TFRC-based transports (RFC 4342, RFC 5348).
//!
//! Each connection owns:
//! - an [`RxHistory`] (usually via [`RxEngine`]) that filters duplicates,
//!   decides whether sequence gaps are real loss, and samples the RTT from
//!   the 4-bit window counter;
//! - a [`TxHistory`] that turns echoed sequence numbers into RTT samples.
//!
//! Confirmed losses are handed to a [`LossSink`]; [`LossIntervals`] is a
//! bounded implementation. All operations are synchronous and per-connection;
//! nothing here locks or spawns.
#![warn(
    missing_debug_implementations,
    missing_docs,
    redundant_lifetimes,
    non_local_definitions,
    unsafe_code
)]

pub mod config;
pub mod constants;
pub mod error;
pub mod loss;
pub mod packet;
pub mod receiver;
pub mod ring;
mod rtt;
pub mod rx_history;
pub mod seq;
pub mod tx_history;

pub use config::HistoryConfig;
pub use error::{HistoryError, Result};
pub use loss::{LossInterval, LossIntervals, LossSink, LossView};
pub use packet::{PacketType, RxRecord};
pub use receiver::{RxEngine, RxEvent};
pub use rx_history::{LossState, PendingLoss, RxHistory};
pub use seq::SeqNo;
pub use tx_history::{TxEntry, TxHistory};
