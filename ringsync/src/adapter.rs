//! Device attach/detach and the reconciliation entry points.
//!
//! The adapter owns the buffer pool and the per-queue TX/RX rings and
//! dispatches `txsync`/`rxsync`/reset calls by ring number. The mode
//! switch control path (stopping and restarting the port around a
//! toggle) belongs to the surrounding driver; here the flag only gates
//! the entry points.

use crate::error::Error;
use crate::hw::{BufferPool, RxQueueHw, TxQueueHw};
use crate::ring::{ResetState, SharedRing};
use crate::rx::RxRing;
use crate::tx::TxRing;

/// One attached device.
///
/// Rings are created with a fixed capacity when their queue is
/// registered and live until the adapter is dropped. Callers serialize
/// access per ring; TX and RX rings of the same queue are independent.
pub struct Adapter<P, TH, RH>
where
    P: BufferPool,
    TH: TxQueueHw,
    RH: RxQueueHw,
{
    pool: P,
    tx: Vec<TxRing<TH>>,
    rx: Vec<RxRing<RH>>,
    zc_mode: bool,
}

impl<P, TH, RH> Adapter<P, TH, RH>
where
    P: BufferPool,
    TH: TxQueueHw,
    RH: RxQueueHw,
{
    /// Attach to a device. Zero-copy mode starts off.
    pub fn attach(pool: P) -> Self {
        tracing::info!("adapter attached");
        Self {
            pool,
            tx: Vec::new(),
            rx: Vec::new(),
            zc_mode: false,
        }
    }

    /// Register one hardware queue pair with `num_slots` slots per
    /// ring. `rx_buf_base` is the first buffer handle of the RX ring's
    /// allocation. Returns the queue number.
    pub fn register_queue(&mut self, tx_hw: TH, rx_hw: RH, num_slots: u32, rx_buf_base: u32) -> u16 {
        self.tx.push(TxRing::new(num_slots, tx_hw));
        self.rx
            .push(RxRing::new(num_slots, rx_hw, rx_buf_base, &self.pool));
        let nr = (self.tx.len() - 1) as u16;
        tracing::info!(queue = nr, num_slots, "queue registered");
        nr
    }

    pub fn num_queues(&self) -> usize {
        self.tx.len()
    }

    /// Toggle the reconciliation-capable mode. The caller has already
    /// quiesced the device.
    pub fn set_zc_mode(&mut self, on: bool) {
        tracing::info!(on, "zero-copy mode toggled");
        self.zc_mode = on;
    }

    pub fn zc_mode(&self) -> bool {
        self.zc_mode
    }

    /// Client-visible side of a TX ring.
    pub fn tx_shared(&self, ring_nr: u16) -> Option<&SharedRing> {
        self.tx.get(ring_nr as usize).map(|r| r.shared())
    }

    /// Client-visible side of an RX ring.
    pub fn rx_shared(&self, ring_nr: u16) -> Option<&SharedRing> {
        self.rx.get(ring_nr as usize).map(|r| r.shared())
    }

    pub fn tx_ring(&self, ring_nr: u16) -> Option<&TxRing<TH>> {
        self.tx.get(ring_nr as usize)
    }

    pub fn tx_ring_mut(&mut self, ring_nr: u16) -> Option<&mut TxRing<TH>> {
        self.tx.get_mut(ring_nr as usize)
    }

    pub fn rx_ring(&self, ring_nr: u16) -> Option<&RxRing<RH>> {
        self.rx.get(ring_nr as usize)
    }

    pub fn rx_ring_mut(&mut self, ring_nr: u16) -> Option<&mut RxRing<RH>> {
        self.rx.get_mut(ring_nr as usize)
    }

    /// Reconcile the TX ring `ring_nr`. Returns the published
    /// available count.
    pub fn txsync(&mut self, ring_nr: u16) -> crate::Result<u32> {
        let Adapter {
            pool, tx, zc_mode, ..
        } = self;
        if !*zc_mode {
            return Err(Error::InvalidRing);
        }
        let ring = tx.get_mut(ring_nr as usize).ok_or(Error::InvalidRing)?;
        ring.sync(pool)
    }

    /// Reconcile the RX ring `ring_nr`. Returns the published
    /// available count.
    pub fn rxsync(&mut self, ring_nr: u16) -> crate::Result<u32> {
        let Adapter {
            pool, rx, zc_mode, ..
        } = self;
        if !*zc_mode {
            return Err(Error::InvalidRing);
        }
        let ring = rx.get_mut(ring_nr as usize).ok_or(Error::InvalidRing)?;
        ring.sync(pool)
    }

    /// Rebuild the TX ring `ring_nr` from hardware ground truth. Also
    /// callable by the client-facing layer after an error return.
    pub fn tx_reset(&mut self, ring_nr: u16) -> crate::Result<ResetState> {
        if !self.zc_mode {
            return Err(Error::InvalidRing);
        }
        let ring = self.tx.get_mut(ring_nr as usize).ok_or(Error::InvalidRing)?;
        Ok(ring.reset())
    }

    /// Rebuild the RX ring `ring_nr` from hardware ground truth.
    pub fn rx_reset(&mut self, ring_nr: u16) -> crate::Result<ResetState> {
        if !self.zc_mode {
            return Err(Error::InvalidRing);
        }
        let ring = self.rx.get_mut(ring_nr as usize).ok_or(Error::InvalidRing)?;
        Ok(ring.reset())
    }

    /// Detach from the device, destroying the rings.
    pub fn detach(self) {}
}

impl<P, TH, RH> Drop for Adapter<P, TH, RH>
where
    P: BufferPool,
    TH: TxQueueHw,
    RH: RxQueueHw,
{
    fn drop(&mut self) {
        tracing::info!(queues = self.tx.len(), "adapter detached");
    }
}
