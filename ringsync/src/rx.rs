//! RX reconciliation.
//!
//! Two phases per call: newly hardware-filled entries are imported into
//! the client-visible window, then slots the client released (minus its
//! reserved count) are re-armed for reception and the producer index is
//! republished.

use std::sync::atomic::{Ordering, fence};

use crate::error::Error;
use crate::hw::{BufferPool, RxQueueHw};
use crate::ring::{ResetState, SharedRing, SlotIdx};
use crate::slot::SlotFlags;

/// Engine-side state of one receive ring.
///
/// The caller serializes access; see [`SharedRing`] on the `!Sync`
/// contract.
pub struct RxRing<H: RxQueueHw> {
    shared: SharedRing,
    hw: H,
    /// First slot not yet released by the client.
    hwcur: SlotIdx,
    /// Packets imported and not yet consumed by the client.
    hwavail: u32,
    /// Client-to-NIC index skew for re-arming, rebuilt on reinit.
    hwofs: u32,
    /// Free-running count of entries armed toward hardware.
    prod: u32,
    /// Free-running count of fill records consumed by the engine.
    sw_comp: u32,
}

impl<H: RxQueueHw> RxRing<H> {
    /// Create the ring: assign each slot its default buffer handle
    /// (`buf_base + j`) and arm all but one entry toward hardware. The
    /// spare entry keeps the full and empty states distinguishable.
    ///
    /// # Panics
    /// Panics if the hardware ring size does not match `num_slots`.
    pub fn new(num_slots: u32, hw: H, buf_base: u32, pool: &impl BufferPool) -> Self {
        assert_eq!(
            hw.ring_size(),
            num_slots,
            "hardware rx ring size {} != {} slots",
            hw.ring_size(),
            num_slots
        );
        let lim = num_slots - 1;
        let mut ring = Self {
            shared: SharedRing::new(num_slots),
            hw,
            hwcur: SlotIdx::ZERO,
            hwavail: 0,
            hwofs: 0,
            prod: 0,
            sw_comp: 0,
        };

        let mut j = SlotIdx::ZERO;
        for _ in 0..num_slots {
            ring.shared.slot(j).set_buf(buf_base + j.get());
            j = j.next(lim);
        }

        let mut j = SlotIdx::ZERO;
        for _ in 0..lim {
            let buf = ring.shared.slot(j).buf();
            let Some(addr) = pool.buf_addr(buf) else {
                // the attach layer guarantees the handle range; stop
                // arming rather than program a bogus address
                tracing::warn!(buf, "rx default buffer outside pool, arming stopped");
                break;
            };
            ring.hw.write_desc(ring.prod & lim, addr);
            ring.prod += 1;
            j = j.next(lim);
        }
        fence(Ordering::Release);
        ring.hw.set_producer(ring.prod);

        ring.hwofs = ring.prod;
        ring.shared.publish_available(0);
        tracing::debug!(armed = ring.prod, "rx ring armed");
        ring
    }

    /// The client-visible side of this ring.
    pub fn shared(&self) -> &SharedRing {
        &self.shared
    }

    /// The hardware queue handle, for the interrupt/poll side that
    /// delivers hardware progress.
    pub fn hw(&self) -> &H {
        &self.hw
    }

    pub fn hw_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn hwcur(&self) -> u32 {
        self.hwcur.get()
    }

    pub fn hwavail(&self) -> u32 {
        self.hwavail
    }

    /// Reconcile the client and hardware views of this ring.
    ///
    /// The cursor and reserved count are each read exactly once and
    /// validated before use. Import always completes before release
    /// begins. On error the ring has already been reset.
    pub fn sync(&mut self, pool: &impl BufferPool) -> crate::Result<u32> {
        let lim = self.shared.lim();

        let cur = self.shared.cursor();
        let resvd = self.shared.reserved();
        let Some(cur) = SlotIdx::new(cur, lim) else {
            tracing::warn!(cursor = cur, lim, "rx cursor out of range, resetting");
            self.reset();
            return Err(Error::OutOfRangeCursor);
        };

        self.import(lim)?;

        // Skip past slots the client released, keeping `resvd` of them
        // un-released. Reserving beyond the ring's slack would
        // desynchronize the two views, so it resets instead of
        // clamping.
        let mut k = cur;
        if resvd > 0 {
            let published = self.shared.available();
            if u64::from(resvd) + u64::from(published) >= u64::from(lim) + 1 {
                tracing::warn!(resvd, published, "rx reserve exceeds slack, resetting");
                self.reset();
                return Err(Error::ReservedTooLarge);
            }
            k = cur.sub(resvd, lim);
        }

        if self.hwcur != k {
            self.release(k, pool)?;
        }

        match self.hwavail.checked_sub(resvd) {
            Some(avail) => {
                self.shared.publish_available(avail);
                Ok(avail)
            }
            None => {
                tracing::warn!(
                    resvd,
                    hwavail = self.hwavail,
                    "rx reserve exceeds occupancy, resetting"
                );
                self.reset();
                Err(Error::ReservedTooLarge)
            }
        }
    }

    /// Import newly filled entries into the client window. Idempotent
    /// when hardware has nothing new.
    fn import(&mut self, lim: u32) -> crate::Result<()> {
        let ring_mask = self.hw.ring_size() - 1;

        // fills must be visible before their lengths are read
        fence(Ordering::Acquire);
        let hw_comp = self.hw.comp_count();

        let mut imported = 0u32;
        while self.sw_comp != hw_comp {
            if self.hwavail == lim {
                tracing::warn!(hw_comp, "rx fills exceed ring capacity, resetting");
                self.reset();
                return Err(Error::Overflow);
            }
            let len = self.hw.filled_len(self.sw_comp & ring_mask);
            let j = self.hwcur.add(self.hwavail, lim);
            self.shared.slot(j).set_len(len as u16);
            self.sw_comp = self.sw_comp.wrapping_add(1);
            self.hwavail += 1;
            imported += 1;
        }
        if imported > 0 {
            tracing::trace!(imported, "rx packets imported");
        }
        Ok(())
    }

    /// Re-arm the slots in `[hwcur, k)` for reception.
    ///
    /// Every released entry's buffer address is rewritten before the
    /// single producer publish, so hardware is never told a slot is
    /// reusable ahead of its rewrite.
    fn release(&mut self, k: SlotIdx, pool: &impl BufferPool) -> crate::Result<()> {
        let lim = self.shared.lim();
        let ring_mask = self.hw.ring_size() - 1;

        let mut n = 0u32;
        let mut j = self.hwcur;
        while j != k {
            let slot = self.shared.slot(j);
            // read each untrusted field once
            let (buf, flags) = (slot.buf(), slot.flags());
            let Some(addr) = pool.buf_addr(buf) else {
                tracing::warn!(slot = j.get(), buf, "bad rx buffer handle, resetting");
                self.reset();
                return Err(Error::InvalidBuffer);
            };
            if flags.contains(SlotFlags::BUF_CHANGED) {
                pool.reload_map(buf);
                slot.set_flags(flags.without(SlotFlags::BUF_CHANGED));
            }
            let l = self.nic_index(j);
            debug_assert_eq!(l, self.prod & ring_mask);
            self.hw.write_desc(l, addr);
            self.prod = self.prod.wrapping_add(1);
            j = j.next(lim);
            n += 1;
        }
        tracing::trace!(n, "rx slots re-armed");

        match self.hwavail.checked_sub(n) {
            Some(v) => self.hwavail = v,
            None => {
                tracing::warn!(n, hwavail = self.hwavail, "rx released past avail, resetting");
                self.reset();
                return Err(Error::Overflow);
            }
        }
        self.hwcur = k;

        // address rewrites must be durably visible before the
        // producer index exposes the entries
        fence(Ordering::Release);
        self.hw.set_producer(self.prod);
        Ok(())
    }

    /// Force both sides back to a consistent baseline derived from
    /// hardware ground truth. Unimported fills and the client's
    /// unconsumed window are discarded.
    pub fn reset(&mut self) -> ResetState {
        self.prod = self.hw.producer();
        self.sw_comp = self.hw.comp_count();
        self.hwofs = self.prod;
        self.hwcur = SlotIdx::ZERO;
        self.hwavail = 0;
        self.shared.reset_client_fields();
        self.shared.publish_available(0);
        tracing::debug!(
            prod = self.prod,
            sw_comp = self.sw_comp,
            "rx ring baseline rebuilt"
        );
        ResetState {
            cursor: 0,
            available: 0,
        }
    }

    fn nic_index(&self, j: SlotIdx) -> u32 {
        j.get().wrapping_add(self.hwofs) & (self.hw.ring_size() - 1)
    }
}
