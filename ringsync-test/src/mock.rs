//! Scriptable mock hardware for the reconciliation engine.
//!
//! The mocks record every descriptor write, producer publish and
//! doorbell, and let tests play the hardware role: [`MockTxQueue::complete`]
//! finishes submitted entries and stamps an ownership-correct
//! completion record, [`MockRxQueue::fill`] receives a packet into the
//! next armed entry.

use std::cell::Cell;

use ringsync::cq::{Cqe, Parity};
use ringsync::hw::{BufferPool, RxQueueHw, TxQueueHw};

/// Fixed-layout buffer pool: handles `0..num_bufs` map to distinct
/// addresses, everything else is invalid.
pub struct MockPool {
    buf_size: u32,
    num_bufs: u32,
    reload_calls: Cell<u32>,
}

impl MockPool {
    pub fn new(buf_size: u32, num_bufs: u32) -> Self {
        Self {
            buf_size,
            num_bufs,
            reload_calls: Cell::new(0),
        }
    }

    /// Number of `reload_map` calls seen.
    pub fn reload_calls(&self) -> u32 {
        self.reload_calls.get()
    }
}

impl BufferPool for MockPool {
    fn buf_size(&self) -> u32 {
        self.buf_size
    }

    fn buf_addr(&self, buf: u32) -> Option<u64> {
        (buf < self.num_bufs).then(|| 0x1000 + u64::from(buf) * u64::from(self.buf_size))
    }

    fn reload_map(&self, _buf: u32) {
        self.reload_calls.set(self.reload_calls.get() + 1);
    }
}

/// One recorded transmit descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxDesc {
    pub addr: u64,
    pub len: u32,
    pub report: bool,
}

/// Mock transmit queue pair: descriptor ring plus completion queue.
pub struct MockTxQueue {
    ring_size: u32,
    cq_size: u32,
    descs: Vec<TxDesc>,
    prod: u32,
    doorbells: u32,
    cq: Vec<Cqe>,
    cq_prod: u32,
    cq_consumer: u32,
    consumed: u32,
}

impl MockTxQueue {
    pub fn new(ring_size: u32, cq_size: u32) -> Self {
        assert!(ring_size.is_power_of_two() && cq_size.is_power_of_two());
        Self {
            ring_size,
            cq_size,
            descs: vec![TxDesc::default(); ring_size as usize],
            prod: 0,
            doorbells: 0,
            // stale parity: nothing is ready until complete() runs
            cq: vec![
                Cqe {
                    owner: Parity::Odd,
                    wqe_index: 0,
                };
                cq_size as usize
            ],
            cq_prod: 0,
            cq_consumer: 0,
            consumed: 0,
        }
    }

    pub fn desc(&self, index: u32) -> TxDesc {
        self.descs[index as usize]
    }

    pub fn doorbells(&self) -> u32 {
        self.doorbells
    }

    /// Entries submitted by the engine and not yet finished by the
    /// mock hardware.
    pub fn outstanding(&self) -> u32 {
        self.prod.wrapping_sub(self.consumed)
    }

    /// Finish `count` submitted entries and report them all with one
    /// completion record carrying the correct ownership parity.
    pub fn complete(&mut self, count: u32) {
        assert!(
            count > 0 && count <= self.outstanding(),
            "completing {} of {} outstanding entries",
            count,
            self.outstanding()
        );
        let last = self.consumed.wrapping_add(count - 1) & (self.ring_size - 1);
        let idx = (self.cq_prod & (self.cq_size - 1)) as usize;
        self.cq[idx] = Cqe {
            owner: Parity::for_pass(self.cq_prod, self.cq_size),
            wqe_index: last as u16,
        };
        self.cq_prod = self.cq_prod.wrapping_add(1);
        self.consumed = self.consumed.wrapping_add(count);
        tracing::trace!(count, wqe = last, "hw: tx entries completed");
    }
}

impl TxQueueHw for MockTxQueue {
    fn ring_size(&self) -> u32 {
        self.ring_size
    }

    fn cq_size(&self) -> u32 {
        self.cq_size
    }

    fn write_desc(&mut self, index: u32, addr: u64, len: u32, report: bool) {
        self.descs[index as usize] = TxDesc { addr, len, report };
    }

    fn set_producer(&mut self, prod: u32) {
        self.prod = prod;
    }

    fn ring_doorbell(&mut self) {
        self.doorbells += 1;
    }

    fn read_cqe(&self, index: u32) -> Cqe {
        self.cq[index as usize]
    }

    fn set_cq_consumer(&mut self, cons_index: u32) {
        self.cq_consumer = cons_index;
    }

    fn cq_consumer(&self) -> u32 {
        self.cq_consumer
    }

    fn producer(&self) -> u32 {
        self.prod
    }

    fn consumer(&self) -> u32 {
        self.consumed
    }
}

/// Mock receive queue: armed descriptor ring plus the fill counter
/// serving as the "new data" indication.
pub struct MockRxQueue {
    ring_size: u32,
    descs: Vec<u64>,
    lens: Vec<u32>,
    prod: u32,
    fills: u32,
}

impl MockRxQueue {
    pub fn new(ring_size: u32) -> Self {
        assert!(ring_size.is_power_of_two());
        Self {
            ring_size,
            descs: vec![0; ring_size as usize],
            lens: vec![0; ring_size as usize],
            prod: 0,
            fills: 0,
        }
    }

    pub fn desc(&self, index: u32) -> u64 {
        self.descs[index as usize]
    }

    /// Entries armed by the engine and not yet filled.
    pub fn armed(&self) -> u32 {
        self.prod.wrapping_sub(self.fills)
    }

    /// Receive a packet of `len` bytes into the next armed entry.
    pub fn fill(&mut self, len: u32) {
        assert!(self.armed() > 0, "no armed entries to fill");
        let idx = (self.fills & (self.ring_size - 1)) as usize;
        self.lens[idx] = len;
        self.fills = self.fills.wrapping_add(1);
        tracing::trace!(len, entry = idx, "hw: rx entry filled");
    }
}

impl RxQueueHw for MockRxQueue {
    fn ring_size(&self) -> u32 {
        self.ring_size
    }

    fn comp_count(&self) -> u32 {
        self.fills
    }

    fn filled_len(&self, index: u32) -> u32 {
        self.lens[index as usize]
    }

    fn write_desc(&mut self, index: u32, addr: u64) {
        self.descs[index as usize] = addr;
    }

    fn set_producer(&mut self, prod: u32) {
        self.prod = prod;
    }

    fn producer(&self) -> u32 {
        self.prod
    }

    fn consumer(&self) -> u32 {
        self.fills
    }
}
