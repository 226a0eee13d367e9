//! Per-packet receive records.

use tokio::time::Instant;

use crate::{
    constants::CCVAL_MASK,
    error::{HistoryError, Result},
    seq::SeqNo,
};

/// Packet type carried in the 4-bit header type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Connection request.
    Request = 0,
    /// Reply to a request.
    Response = 1,
    /// Application data.
    Data = 2,
    /// Acknowledgement only.
    Ack = 3,
    /// Application data with a piggybacked acknowledgement.
    DataAck = 4,
    /// Server asks the client to close.
    CloseReq = 5,
    /// Close.
    Close = 6,
    /// Abort.
    Reset = 7,
    /// Sequence resynchronisation.
    Sync = 8,
    /// Reply to a sync.
    SyncAck = 9,
}

impl PacketType {
    /// Does this packet carry application data?
    pub fn is_data(self) -> bool {
        matches!(self, PacketType::Data | PacketType::DataAck)
    }
}

impl TryFrom<u8> for PacketType {
    type Error = HistoryError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => PacketType::Request,
            1 => PacketType::Response,
            2 => PacketType::Data,
            3 => PacketType::Ack,
            4 => PacketType::DataAck,
            5 => PacketType::CloseReq,
            6 => PacketType::Close,
            7 => PacketType::Reset,
            8 => PacketType::Sync,
            9 => PacketType::SyncAck,
            other => return Err(HistoryError::InvalidPacketType(other)),
        })
    }
}

/// What the receiver remembers about one arrived packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxRecord {
    /// Sequence number.
    pub seqno: SeqNo,
    /// Window counter, 4 bits.
    pub ccval: u8,
    /// Header type.
    pub packet_type: PacketType,
    /// Non-data packets sent immediately before this one.
    pub ndp: u32,
    /// Arrival time.
    pub tstamp: Instant,
}

impl RxRecord {
    /// Build a record; `ccval` is masked to 4 bits.
    pub fn new(
        seqno: SeqNo,
        ccval: u8,
        packet_type: PacketType,
        ndp: u32,
        tstamp: Instant,
    ) -> Self {
        Self {
            seqno,
            ccval: ccval & CCVAL_MASK,
            packet_type,
            ndp,
            tstamp,
        }
    }

    /// Record for a packet arriving right now.
    pub fn received(seqno: SeqNo, ccval: u8, packet_type: PacketType, ndp: u32) -> Self {
        Self::new(seqno, ccval, packet_type, ndp, Instant::now())
    }

    /// Placeholder used to fill ring slots before any packet arrived.
    pub(crate) fn empty(tstamp: Instant) -> Self {
        Self::new(SeqNo::default(), 0, PacketType::Data, 0, tstamp)
    }

    /// Is this packet a valid successor of a packet `distance` sequence
    /// numbers earlier, once the non-data packets in between are accounted for?
    pub fn follows_within(&self, distance: u64) -> bool {
        distance == 1 || u64::from(self.ndp) >= distance
    }
}
