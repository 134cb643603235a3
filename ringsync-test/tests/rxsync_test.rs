//! RX reconciliation scenarios against the mock NIC.

use ringsync::Error;
use ringsync::hw::BufferPool;
use ringsync::hw::RxQueueHw;
use ringsync::ring::SlotIdx;
use ringsync::rx::RxRing;
use ringsync_test::mock::{MockPool, MockRxQueue};

const NUM_SLOTS: u32 = 8;
const LIM: u32 = NUM_SLOTS - 1;
const BUF_BASE: u32 = 16;

fn rx_ring() -> (RxRing<MockRxQueue>, MockPool) {
    ringsync_test::init_logging();
    let pool = MockPool::new(2048, 64);
    let ring = RxRing::new(NUM_SLOTS, MockRxQueue::new(NUM_SLOTS), BUF_BASE, &pool);
    (ring, pool)
}

#[test]
fn test_creation_arms_ring() {
    let (ring, pool) = rx_ring();
    // all but the spare entry are armed with the default buffers
    assert_eq!(ring.hw().armed(), LIM);
    assert_eq!(ring.shared().available(), 0);
    for l in 0..LIM {
        assert_eq!(ring.hw().desc(l), pool.buf_addr(BUF_BASE + l).unwrap());
    }
}

#[test]
fn test_import_new_packets() {
    let (mut ring, pool) = rx_ring();
    ring.hw_mut().fill(128);
    ring.hw_mut().fill(256);

    assert_eq!(ring.sync(&pool).unwrap(), 2);
    let lim = ring.shared().lim();
    assert_eq!(ring.shared().slot(SlotIdx::new(0, lim).unwrap()).len(), 128);
    assert_eq!(ring.shared().slot(SlotIdx::new(1, lim).unwrap()).len(), 256);

    // idempotent with nothing new
    assert_eq!(ring.sync(&pool).unwrap(), 2);
    assert_eq!(ring.hwavail(), 2);
}

#[test]
fn test_release_rearms_slots() {
    let (mut ring, pool) = rx_ring();
    ring.hw_mut().fill(64);
    ring.hw_mut().fill(64);
    assert_eq!(ring.sync(&pool).unwrap(), 2);

    // client consumes both packets and releases the slots
    ring.shared().set_cursor(2);
    assert_eq!(ring.sync(&pool).unwrap(), 0);
    assert_eq!(ring.hwcur(), 2);

    // re-armed at the arm frontier: masked NIC indexes 7 then 0
    assert_eq!(ring.hw().producer(), LIM + 2);
    assert_eq!(ring.hw().desc(7), pool.buf_addr(BUF_BASE).unwrap());
    assert_eq!(ring.hw().desc(0), pool.buf_addr(BUF_BASE + 1).unwrap());
}

#[test]
fn test_reserved_keeps_slots_unreleased() {
    let (mut ring, pool) = rx_ring();
    for _ in 0..3 {
        ring.hw_mut().fill(60);
    }
    assert_eq!(ring.sync(&pool).unwrap(), 3);

    // consume three, hold one back
    ring.shared().set_cursor(3);
    ring.shared().set_reserved(1);
    assert_eq!(ring.sync(&pool).unwrap(), 0);

    // only two slots went back to hardware
    assert_eq!(ring.hw().producer(), LIM + 2);
    assert_eq!(ring.hwavail(), 1);
}

#[test]
fn test_reserved_beyond_slack_resets() {
    let (mut ring, pool) = rx_ring();
    for _ in 0..5 {
        ring.hw_mut().fill(60);
    }
    assert_eq!(ring.sync(&pool).unwrap(), 5);
    let prod_before = ring.hw().producer();

    ring.shared().set_cursor(5);
    ring.shared().set_reserved(4);
    assert_eq!(ring.sync(&pool), Err(Error::ReservedTooLarge));

    // nothing was reprogrammed toward hardware and the ring is back at
    // the baseline
    assert_eq!(ring.hw().producer(), prod_before);
    assert_eq!(ring.shared().available(), 0);
    assert_eq!(ring.shared().reserved(), 0);
    assert_eq!(ring.hwcur(), 0);
}

#[test]
fn test_rx_cursor_out_of_range_resets() {
    let (mut ring, pool) = rx_ring();
    ring.shared().set_cursor(12);
    assert_eq!(ring.sync(&pool), Err(Error::OutOfRangeCursor));
    assert_eq!(ring.shared().cursor(), 0);
    assert_eq!(ring.shared().available(), 0);
}

#[test]
fn test_rx_invalid_buffer_resets() {
    let (mut ring, pool) = rx_ring();
    ring.hw_mut().fill(60);
    assert_eq!(ring.sync(&pool).unwrap(), 1);
    let prod_before = ring.hw().producer();

    // client swaps a bogus handle into the slot it releases
    let lim = ring.shared().lim();
    ring.shared().slot(SlotIdx::new(0, lim).unwrap()).set_buf(99);
    ring.shared().set_cursor(1);

    assert_eq!(ring.sync(&pool), Err(Error::InvalidBuffer));
    // the producer publish never happened
    assert_eq!(ring.hw().producer(), prod_before);
}

#[test]
fn test_full_cycle_wraps() {
    let (mut ring, pool) = rx_ring();
    // several laps of fill / import / consume / re-arm
    let mut cur = 0u32;
    for _ in 0..3 * NUM_SLOTS {
        ring.hw_mut().fill(42);
        assert_eq!(ring.sync(&pool).unwrap(), 1);
        cur = if cur == LIM { 0 } else { cur + 1 };
        ring.shared().set_cursor(cur);
        assert_eq!(ring.sync(&pool).unwrap(), 0);
        assert_eq!(ring.hw().armed(), LIM);
    }
}
