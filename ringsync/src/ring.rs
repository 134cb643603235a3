//! The shared ring descriptor and its bounded index type.
//!
//! The shared ring is the in-memory contract between the engine and its
//! client: an array of packet slots plus the cursor/reserved fields the
//! client writes and the available count the engine publishes back.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::slot::Slot;

/// A ring index bounded to `[0, lim]` where `lim` is the ring's
/// power-of-two-minus-one slot limit.
///
/// All wraparound happens through [`next`](SlotIdx::next),
/// [`add`](SlotIdx::add) and [`sub`](SlotIdx::sub), so index arithmetic
/// can never silently alias two different slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotIdx(u32);

impl SlotIdx {
    pub const ZERO: SlotIdx = SlotIdx(0);

    /// Validate a client-supplied index. `None` if `v` exceeds `lim`.
    pub fn new(v: u32, lim: u32) -> Option<Self> {
        if v > lim { None } else { Some(SlotIdx(v)) }
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// The following index, wrapping at `lim`.
    #[must_use]
    pub fn next(self, lim: u32) -> Self {
        if self.0 == lim {
            SlotIdx(0)
        } else {
            SlotIdx(self.0 + 1)
        }
    }

    /// `self + n`, wrapping over `lim + 1` slots.
    #[must_use]
    pub fn add(self, n: u32, lim: u32) -> Self {
        debug_assert!(n <= lim);
        let v = self.0 + n;
        SlotIdx(if v > lim { v - (lim + 1) } else { v })
    }

    /// `self - n`, wrapping over `lim + 1` slots.
    #[must_use]
    pub fn sub(self, n: u32, lim: u32) -> Self {
        debug_assert!(n <= lim);
        SlotIdx(if self.0 >= n {
            self.0 - n
        } else {
            self.0 + lim + 1 - n
        })
    }

    /// Number of slots in `[self, other)`, walking forward.
    pub fn distance_to(self, other: SlotIdx, lim: u32) -> u32 {
        if other.0 >= self.0 {
            other.0 - self.0
        } else {
            other.0 + lim + 1 - self.0
        }
    }
}

/// Ring bookkeeping a reset hands back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetState {
    pub cursor: u32,
    pub available: u32,
}

/// The shared ring descriptor, visible to both the engine and its
/// client.
///
/// `cursor` and `reserved` are client-writable and read by the engine
/// exactly once per reconciliation call; `available` is engine-writable
/// and is the sole progress signal back to the client.
///
/// # `!Sync`
/// Slot contents use `Cell`, so this type is `!Sync`. Callers serialize
/// access to one ring; TX and RX rings of the same queue are
/// independent.
#[derive(Debug)]
pub struct SharedRing {
    lim: u32,
    cursor: AtomicU32,
    reserved: AtomicU32,
    available: AtomicU32,
    slots: Box<[Slot]>,
}

impl SharedRing {
    /// Create a ring with `num_slots` slots.
    ///
    /// # Panics
    /// Panics if `num_slots` is not a power of two or is less than 2.
    pub fn new(num_slots: u32) -> Self {
        assert!(
            num_slots.is_power_of_two() && num_slots >= 2,
            "ring size {} is not a power of two >= 2",
            num_slots
        );
        let slots = (0..num_slots).map(|_| Slot::default()).collect();
        Self {
            lim: num_slots - 1,
            cursor: AtomicU32::new(0),
            reserved: AtomicU32::new(0),
            available: AtomicU32::new(0),
            slots,
        }
    }

    /// The ring's slot limit (`num_slots - 1`).
    pub fn lim(&self) -> u32 {
        self.lim
    }

    pub fn num_slots(&self) -> u32 {
        self.lim + 1
    }

    pub fn slot(&self, idx: SlotIdx) -> &Slot {
        &self.slots[idx.get() as usize]
    }

    /// Client side: release slots up to (excluding) `cursor`.
    pub fn set_cursor(&self, cursor: u32) {
        self.cursor.store(cursor, Ordering::Release);
    }

    /// Client side: keep `reserved` trailing slots un-released (RX).
    pub fn set_reserved(&self, reserved: u32) {
        self.reserved.store(reserved, Ordering::Release);
    }

    /// Client side: slots currently usable, as last published by the
    /// engine.
    pub fn available(&self) -> u32 {
        self.available.load(Ordering::Acquire)
    }

    /// Current cursor. The engine reads it exactly once per
    /// reconciliation call and treats it as untrusted until validated.
    pub fn cursor(&self) -> u32 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Current reserved count. Same one-shot discipline as
    /// [`cursor`](SharedRing::cursor).
    pub fn reserved(&self) -> u32 {
        self.reserved.load(Ordering::Acquire)
    }

    /// Engine side: publish the available count. The `Release` store
    /// orders it after every hardware-visible update it reports.
    pub(crate) fn publish_available(&self, avail: u32) {
        self.available.store(avail, Ordering::Release);
    }

    /// Engine side: discard the client's cursor state on a reinit.
    pub(crate) fn reset_client_fields(&self) {
        self.cursor.store(0, Ordering::Release);
        self.reserved.store(0, Ordering::Release);
    }
}
