//! Four-slot record ring backing the receive history.

use tokio::time::Instant;

use crate::{
    constants::RING_SIZE,
    error::{HistoryError, Result},
    packet::RxRecord,
};

const MASK: usize = RING_SIZE - 1;

/// Fixed-size ring of receive records, addressed relative to a movable base.
///
/// Logical slot `i` lives at physical slot `(base + i) mod RING_SIZE`.
#[derive(Clone, Debug)]
pub struct RecordRing {
    slots: Box<[RxRecord; RING_SIZE]>,
    base: usize,
}

impl RecordRing {
    /// Allocate all slots up front; the ring never grows afterwards.
    pub fn alloc(now: Instant) -> Result<Self> {
        debug_assert!(RING_SIZE.is_power_of_two());

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(RING_SIZE)
            .map_err(|_| HistoryError::OutOfMemory)?;
        slots.resize(RING_SIZE, RxRecord::empty(now));

        let slots: Box<[RxRecord; RING_SIZE]> = slots
            .into_boxed_slice()
            .try_into()
            .map_err(|_| HistoryError::OutOfMemory)?;

        Ok(Self { slots, base: 0 })
    }

    /// Physical slot of logical position `i`.
    pub fn index(&self, i: usize) -> usize {
        (self.base + i) & MASK
    }

    #[cfg(test)]
    fn base(&self) -> usize {
        self.base
    }

    /// Record at logical position `i`.
    pub fn entry(&self, i: usize) -> &RxRecord {
        &self.slots[self.index(i)]
    }

    /// Mutable record at logical position `i`.
    pub fn entry_mut(&mut self, i: usize) -> &mut RxRecord {
        let idx = self.index(i);
        &mut self.slots[idx]
    }

    /// Overwrite logical position `i`.
    pub fn set(&mut self, i: usize, record: RxRecord) {
        *self.entry_mut(i) = record;
    }

    /// Exchange the records at logical positions `a` and `b`.
    pub fn swap(&mut self, a: usize, b: usize) {
        let (idx_a, idx_b) = (self.index(a), self.index(b));
        self.slots.swap(idx_a, idx_b);
    }

    /// Make logical position `i` the new position 0.
    pub fn rebase(&mut self, i: usize) {
        self.base = self.index(i);
    }

    #[cfg(test)]
    fn physical(&self, idx: usize) -> &RxRecord {
        &self.slots[idx & MASK]
    }
}
