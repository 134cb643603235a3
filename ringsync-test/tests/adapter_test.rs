//! Adapter entry points: mode gating, ring dispatch, lifecycle.

use ringsync::Error;
use ringsync::adapter::Adapter;
use ringsync::ring::SlotIdx;
use ringsync_test::mock::{MockPool, MockRxQueue, MockTxQueue};

const NUM_SLOTS: u32 = 8;
const LIM: u32 = NUM_SLOTS - 1;

fn adapter() -> Adapter<MockPool, MockTxQueue, MockRxQueue> {
    ringsync_test::init_logging();
    let mut na = Adapter::attach(MockPool::new(2048, 64));
    na.register_queue(
        MockTxQueue::new(NUM_SLOTS, 4),
        MockRxQueue::new(NUM_SLOTS),
        NUM_SLOTS,
        16,
    );
    na
}

#[test]
fn test_sync_requires_zc_mode() {
    let mut na = adapter();
    assert_eq!(na.txsync(0), Err(Error::InvalidRing));
    assert_eq!(na.rxsync(0), Err(Error::InvalidRing));
    assert_eq!(na.tx_reset(0).unwrap_err(), Error::InvalidRing);

    na.set_zc_mode(true);
    assert_eq!(na.txsync(0).unwrap(), LIM);
    assert_eq!(na.rxsync(0).unwrap(), 0);

    na.set_zc_mode(false);
    assert_eq!(na.txsync(0), Err(Error::InvalidRing));
}

#[test]
fn test_unknown_ring_number() {
    let mut na = adapter();
    na.set_zc_mode(true);
    assert_eq!(na.txsync(3), Err(Error::InvalidRing));
    assert_eq!(na.rxsync(3), Err(Error::InvalidRing));
    assert_eq!(na.rx_reset(3), Err(Error::InvalidRing));
}

#[test]
fn test_dispatch_through_adapter() {
    let mut na = adapter();
    na.set_zc_mode(true);

    // client side writes through the shared ring
    let shared = na.tx_shared(0).unwrap();
    let slot = shared.slot(SlotIdx::new(0, LIM).unwrap());
    slot.set_buf(2);
    slot.set_len(120);
    shared.set_cursor(1);

    assert_eq!(na.txsync(0).unwrap(), LIM - 1);
    na.tx_ring_mut(0).unwrap().hw_mut().complete(1);
    assert_eq!(na.txsync(0).unwrap(), LIM);

    na.rx_ring_mut(0).unwrap().hw_mut().fill(90);
    assert_eq!(na.rxsync(0).unwrap(), 1);
}

#[test]
fn test_reset_entry_point_after_error() {
    let mut na = adapter();
    na.set_zc_mode(true);

    na.tx_shared(0).unwrap().set_cursor(NUM_SLOTS + 1);
    assert_eq!(na.txsync(0), Err(Error::OutOfRangeCursor));

    // the client-facing layer may reset explicitly after an error
    let state = na.tx_reset(0).unwrap();
    assert_eq!(state.cursor, 0);
    assert_eq!(state.available, LIM);
    assert_eq!(na.txsync(0).unwrap(), LIM);
}

#[test]
fn test_queue_registration() {
    let mut na = adapter();
    assert_eq!(na.num_queues(), 1);
    let nr = na.register_queue(
        MockTxQueue::new(NUM_SLOTS, 4),
        MockRxQueue::new(NUM_SLOTS),
        NUM_SLOTS,
        32,
    );
    assert_eq!(nr, 1);
    assert_eq!(na.num_queues(), 2);

    na.set_zc_mode(true);
    assert_eq!(na.txsync(1).unwrap(), LIM);
    na.detach();
}
