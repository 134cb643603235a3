//! Hardware-facing collaborator traits.
//!
//! The reconciliation engine treats the NIC as a set of narrow black
//! boxes: descriptor writes, producer/doorbell publishes and raw
//! completion reads. Descriptor bit layout, interrupt policy and DMA
//! mapping live behind these traits.

use crate::cq::Cqe;

/// Translates client buffer handles to DMA addresses.
pub trait BufferPool {
    /// Bytes every ring buffer holds. Slot lengths above this are
    /// invalid.
    fn buf_size(&self) -> u32;

    /// DMA address of a buffer handle, or `None` for handles outside
    /// the pool.
    fn buf_addr(&self, buf: u32) -> Option<u64>;

    /// Reload the DMA mapping after the client swapped a buffer into a
    /// slot (`BUF_CHANGED`).
    fn reload_map(&self, buf: u32) {
        let _ = buf;
    }
}

/// Hardware face of one transmit queue pair: the NIC descriptor ring
/// plus its completion queue.
///
/// `write_desc` calls for a batch are only made visible to hardware by
/// the following `set_producer`/`ring_doorbell`; the engine places the
/// ordering barrier between the two.
pub trait TxQueueHw {
    /// Number of descriptor entries in the NIC ring (power of two).
    fn ring_size(&self) -> u32;

    /// Number of completion queue entries (power of two).
    fn cq_size(&self) -> u32;

    /// Fill the transmit descriptor at masked ring `index`. `report`
    /// requests a completion report for this entry.
    fn write_desc(&mut self, index: u32, addr: u64, len: u32, report: bool);

    /// Publish the free-running producer count to hardware.
    fn set_producer(&mut self, prod: u32);

    /// Tell hardware new descriptors are pending. One doorbell covers
    /// a whole batch.
    fn ring_doorbell(&mut self);

    /// Raw completion record at masked CQ `index`.
    fn read_cqe(&self, index: u32) -> Cqe;

    /// Update the hardware completion-consumer register.
    fn set_cq_consumer(&mut self, cons_index: u32);

    /// Last value written to the completion-consumer register.
    fn cq_consumer(&self) -> u32;

    /// Hardware's current producer count. Ground truth for reinit only.
    fn producer(&self) -> u32;

    /// Hardware's current consumer count. Ground truth for reinit only.
    fn consumer(&self) -> u32;
}

/// Hardware face of one receive queue: the NIC descriptor ring plus the
/// inbound "new data" indication.
pub trait RxQueueHw {
    /// Number of descriptor entries in the NIC ring (power of two).
    fn ring_size(&self) -> u32;

    /// Free-running count of ring entries hardware has filled. Reading
    /// it is the engine's only "new data" signal; nothing is pushed.
    fn comp_count(&self) -> u32;

    /// Byte length of the filled entry at masked ring `index`.
    fn filled_len(&self, index: u32) -> u32;

    /// Rewrite the buffer address of ring entry `index` so hardware
    /// may reuse it for a new incoming packet.
    fn write_desc(&mut self, index: u32, addr: u64);

    /// Publish the free-running producer (armed entry) count.
    fn set_producer(&mut self, prod: u32);

    /// Hardware's current producer count. Ground truth for reinit only.
    fn producer(&self) -> u32;

    /// Hardware's current consumer count. Ground truth for reinit only.
    fn consumer(&self) -> u32;
}
