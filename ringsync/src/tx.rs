//! TX reconciliation.
//!
//! Reconciles the client and hardware views of a transmit ring: slots
//! the client released since the last call are submitted to hardware
//! behind a single doorbell, completed entries are reclaimed from the
//! completion queue, and the available count is republished.

use std::sync::atomic::{Ordering, fence};

use arrayvec::ArrayVec;

use crate::cq::Parity;
use crate::error::Error;
use crate::hw::{BufferPool, TxQueueHw};
use crate::ring::{ResetState, SharedRing, SlotIdx};
use crate::slot::SlotFlags;

/// Descriptors staged per hardware write burst.
pub const TX_BURST: usize = 64;

/// One validated submission, staged until its burst is written out.
#[derive(Debug, Clone, Copy)]
struct TxSubmit {
    addr: u64,
    len: u32,
    report: bool,
}

/// Engine-side state of one transmit ring.
///
/// The caller serializes access; see [`SharedRing`] on the `!Sync`
/// contract.
pub struct TxRing<H: TxQueueHw> {
    shared: SharedRing,
    hw: H,
    /// First slot not yet handed to hardware.
    hwcur: SlotIdx,
    /// Authoritative count of slots the client may use.
    hwavail: u32,
    /// Client-to-NIC index skew, rebuilt on reinit.
    hwofs: u32,
    /// Free-running NIC producer count, in building blocks.
    prod: u32,
    /// Free-running NIC consumer count, in building blocks.
    cons: u32,
    /// Free-running completion-queue consumer index.
    cq_cons: u32,
    /// Building blocks occupied by the entry at each masked NIC index.
    blocks: Box<[u16]>,
}

impl<H: TxQueueHw> TxRing<H> {
    /// Create the ring and establish the baseline state.
    ///
    /// # Panics
    /// Panics if the hardware ring size does not match `num_slots` or
    /// the completion queue size is not a power of two.
    pub fn new(num_slots: u32, hw: H) -> Self {
        assert_eq!(
            hw.ring_size(),
            num_slots,
            "hardware tx ring size {} != {} slots",
            hw.ring_size(),
            num_slots
        );
        assert!(
            hw.cq_size().is_power_of_two(),
            "cq size {} is not a power of two",
            hw.cq_size()
        );
        let blocks = vec![1u16; num_slots as usize].into_boxed_slice();
        let mut ring = Self {
            shared: SharedRing::new(num_slots),
            hw,
            hwcur: SlotIdx::ZERO,
            hwavail: 0,
            hwofs: 0,
            prod: 0,
            cons: 0,
            cq_cons: 0,
            blocks,
        };
        ring.reset();
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
    /// The client cursor is read exactly once and validated before
    /// use. On error the ring has already been reset; the client must
    /// treat its in-flight slots as lost.
    pub fn sync(&mut self, pool: &impl BufferPool) -> crate::Result<u32> {
        let lim = self.shared.lim();

        let cur = self.shared.cursor();
        let Some(cur) = SlotIdx::new(cur, lim) else {
            tracing::warn!(cursor = cur, lim, "tx cursor out of range, resetting");
            self.reset();
            return Err(Error::OutOfRangeCursor);
        };

        if self.hwcur != cur {
            self.submit(cur, pool)?;
        }

        let reclaimed = self.drain();
        if reclaimed > 0 {
            self.hwavail += reclaimed;
            if self.hwavail > lim {
                tracing::warn!(hwavail = self.hwavail, lim, "tx avail overflow, resetting");
                self.reset();
                return Err(Error::Overflow);
            }
        }

        // The client must not observe an availability increase before
        // the reclaim it reports; the Release store orders the two.
        self.shared.publish_available(self.hwavail);
        if self.hwavail == 0 {
            tracing::trace!("tx ring full");
        }
        Ok(self.hwavail)
    }

    /// Submit the slots in `[hwcur, cur)` to hardware.
    ///
    /// Each burst is fully validated before any of its descriptors is
    /// written; the producer index and doorbell are published once for
    /// the whole call, so hardware never observes a partial batch.
    fn submit(&mut self, cur: SlotIdx, pool: &impl BufferPool) -> crate::Result<()> {
        let lim = self.shared.lim();
        let n = self.hwcur.distance_to(cur, lim);
        tracing::trace!(from = self.hwcur.get(), to = cur.get(), n, "tx submit");

        let mut j = self.hwcur;
        let mut batch: ArrayVec<TxSubmit, TX_BURST> = ArrayVec::new();
        while j != cur {
            batch.clear();
            let start = j;
            while j != cur && !batch.is_full() {
                let slot = self.shared.slot(j);
                // read each untrusted field once
                let (buf, len, flags) = (slot.buf(), slot.len(), slot.flags());
                let Some(addr) = pool.buf_addr(buf) else {
                    tracing::warn!(slot = j.get(), buf, "bad tx buffer handle, resetting");
                    self.reset();
                    return Err(Error::InvalidBuffer);
                };
                if u32::from(len) > pool.buf_size() {
                    tracing::warn!(slot = j.get(), len, "tx length exceeds buffer, resetting");
                    self.reset();
                    return Err(Error::InvalidBuffer);
                }
                if flags.contains(SlotFlags::BUF_CHANGED) {
                    pool.reload_map(buf);
                }
                slot.set_flags(
                    flags
                        .without(SlotFlags::BUF_CHANGED)
                        .without(SlotFlags::REPORT_REQUESTED),
                );
                batch.push(TxSubmit {
                    addr,
                    len: len.into(),
                    report: flags.contains(SlotFlags::REPORT_REQUESTED),
                });
                j = j.next(lim);
            }

            let mut wj = start;
            for d in &batch {
                let l = self.nic_index(wj);
                debug_assert_eq!(l, self.prod & (self.hw.ring_size() - 1));
                self.hw.write_desc(l, d.addr, d.len, d.report);
                self.blocks[l as usize] = 1;
                self.prod = self.prod.wrapping_add(1);
                wj = wj.next(lim);
            }
        }

        self.hwcur = cur;
        match self.hwavail.checked_sub(n) {
            Some(v) => self.hwavail = v,
            None => {
                tracing::warn!(n, hwavail = self.hwavail, "tx released past avail, resetting");
                self.reset();
                return Err(Error::Overflow);
            }
        }

        // Hardware must not observe the new producer index before the
        // descriptor contents are written.
        fence(Ordering::Release);
        self.hw.set_producer(self.prod);
        self.hw.ring_doorbell();
        Ok(())
    }

    /// Reclaim completed transmissions from the completion queue.
    ///
    /// Returns the number of ring entries released back to the free
    /// pool. A record whose ownership parity does not match the
    /// expected pass parity stops the scan; it is still owned by
    /// hardware.
    fn drain(&mut self) -> u32 {
        let cq_size = self.hw.cq_size();
        let cq_mask = cq_size - 1;
        let ring_mask = self.hw.ring_size() - 1;

        let mut freed = 0u32;
        let mut txbbs = 0u32;
        let mut ring_index = self.cons & ring_mask;

        loop {
            let expected = Parity::for_pass(self.cq_cons, cq_size);
            let cqe = self.hw.read_cqe(self.cq_cons & cq_mask);
            if !cqe.is_ready(expected) {
                break;
            }
            // the record's payload must not be read ahead of its
            // ownership bit
            fence(Ordering::Acquire);
            let new_index = u32::from(cqe.wqe_index) & ring_mask;

            // One record retires the run up to and including
            // wqe_index; entries may span several building blocks.
            loop {
                let nr = u32::from(self.blocks[ring_index as usize]);
                txbbs += nr;
                freed += 1;
                let done = ring_index == new_index;
                ring_index = (ring_index + nr) & ring_mask;
                if done {
                    break;
                }
            }
            self.cq_cons = self.cq_cons.wrapping_add(1);
        }

        // To prevent CQ overflow, update the CQ consumer first and
        // only then advance the ring consumer.
        self.hw.set_cq_consumer(self.cq_cons);
        fence(Ordering::Release);
        self.cons = self.cons.wrapping_add(txbbs);

        if freed > 0 {
            tracing::trace!(freed, "tx completions reclaimed");
        }
        freed
    }

    /// Force both sides back to a consistent baseline derived from
    /// hardware ground truth, discarding the client's cursor.
    pub fn reset(&mut self) -> ResetState {
        let lim = self.shared.lim();
        let cq_size = self.hw.cq_size();
        self.prod = self.hw.producer();
        self.cons = self.hw.consumer();
        self.cq_cons = self.hw.cq_consumer();
        // Acknowledge pending completion records without crediting
        // them; the hardware consumer count above already covers their
        // entries.
        loop {
            let expected = Parity::for_pass(self.cq_cons, cq_size);
            let cqe = self.hw.read_cqe(self.cq_cons & (cq_size - 1));
            if !cqe.is_ready(expected) {
                break;
            }
            self.cq_cons = self.cq_cons.wrapping_add(1);
        }
        self.hw.set_cq_consumer(self.cq_cons);
        self.hwofs = self.prod;
        self.hwcur = SlotIdx::ZERO;
        let in_flight = self.prod.wrapping_sub(self.cons).min(lim);
        self.hwavail = lim - in_flight;
        self.shared.reset_client_fields();
        self.shared.publish_available(self.hwavail);
        tracing::debug!(
            prod = self.prod,
            cons = self.cons,
            hwavail = self.hwavail,
            "tx ring baseline rebuilt"
        );
        ResetState {
            cursor: 0,
            available: self.hwavail,
        }
    }

    fn nic_index(&self, j: SlotIdx) -> u32 {
        j.get().wrapping_add(self.hwofs) & (self.hw.ring_size() - 1)
    }
}
