//! Integration tests for the in-process fabric.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use vsync_types::{NodeAddress, NodeId};

use crate::{DeliveryMode, LocalFabric, RowField, RowLayout, SharedStateTable, SstError};

fn fabric(n: usize, mode: DeliveryMode) -> LocalFabric {
    LocalFabric::new(RowLayout::new(n, n).unwrap(), mode)
}

#[test]
fn local_writes_stay_local_until_pushed() {
    let fabric = fabric(3, DeliveryMode::Immediate);
    let mut a = fabric.handle(0).unwrap();
    let b = fabric.handle(1).unwrap();

    a.local_row_mut().suspected[2] = true;
    assert!(!b.row(0).unwrap().suspected[2]);
    assert!(a.row(0).unwrap().suspected[2], "own row reads the local copy");

    a.put_field(RowField::Suspected).unwrap();
    assert!(b.row(0).unwrap().suspected[2]);
}

#[test]
fn partial_push_only_propagates_covered_bytes() {
    let fabric = fabric(3, DeliveryMode::Immediate);
    let mut a = fabric.handle(0).unwrap();
    let c = fabric.handle(2).unwrap();

    let row = a.local_row_mut();
    row.wedged = true;
    row.push_change(NodeId::new(9));

    a.put_field(RowField::Wedged).unwrap();

    let seen = c.row(0).unwrap();
    assert!(seen.wedged);
    assert_eq!(seen.num_changes, 0, "counter was not in the pushed range");
    assert_eq!(seen.changes[0], None);

    a.put_span(RowField::Changes, RowField::NumCommitted).unwrap();
    let seen = c.row(0).unwrap();
    assert_eq!(seen.num_changes, 1);
    assert_eq!(seen.changes[0], Some(NodeId::new(9)));
}

#[test]
fn joiner_address_travels_with_merge_span() {
    let fabric = fabric(2, DeliveryMode::Immediate);
    let mut a = fabric.handle(0).unwrap();
    let b = fabric.handle(1).unwrap();

    a.local_row_mut().joiner_address = Some(NodeAddress::new("10.0.0.9:7000").unwrap());
    a.put_span(RowField::Changes, RowField::NumCommitted).unwrap();

    assert_eq!(
        b.row(0).unwrap().joiner_address.unwrap().as_str(),
        "10.0.0.9:7000"
    );
}

#[test]
fn out_of_range_put_rejected() {
    let fabric = fabric(2, DeliveryMode::Immediate);
    let mut a = fabric.handle(0).unwrap();
    let size = a.layout().row_size();
    assert!(matches!(
        a.put(size - 1, 2),
        Err(SstError::OutOfRange { .. })
    ));
}

#[test]
fn handle_index_checked() {
    let fabric = fabric(2, DeliveryMode::Immediate);
    assert!(matches!(
        fabric.handle(2),
        Err(SstError::RowIndex { index: 2, rows: 2 })
    ));
}

#[test]
fn queued_writes_apply_in_issue_order_per_link() {
    let fabric = fabric(2, DeliveryMode::Queued);
    let mut a = fabric.handle(0).unwrap();
    let b = fabric.handle(1).unwrap();

    a.local_row_mut().num_acked = 1;
    a.put_field(RowField::NumAcked).unwrap();
    a.local_row_mut().num_acked = 2;
    a.put_field(RowField::NumAcked).unwrap();
    assert_eq!(fabric.pending(), 2);
    assert_eq!(b.row(0).unwrap().num_acked, 0);

    assert!(fabric.deliver_link(0, 1));
    assert_eq!(b.row(0).unwrap().num_acked, 1);
    assert!(fabric.deliver_link(0, 1));
    assert_eq!(b.row(0).unwrap().num_acked, 2);
    assert!(!fabric.deliver_link(0, 1));
}

#[test]
fn disconnect_drops_queues_and_rejects_pushes() {
    let fabric = fabric(3, DeliveryMode::Queued);
    let mut a = fabric.handle(0).unwrap();
    let b = fabric.handle(1).unwrap();

    a.local_row_mut().wedged = true;
    a.put_field(RowField::Wedged).unwrap();
    fabric.disconnect(0);

    assert_eq!(fabric.pending(), 0);
    assert!(!fabric.is_connected(0));
    assert!(!b.row(0).unwrap().wedged);
    assert_eq!(
        a.put_field(RowField::Wedged),
        Err(SstError::Disconnected { index: 0 })
    );
}

#[test]
fn pushes_skip_disconnected_receivers() {
    let fabric = fabric(3, DeliveryMode::Queued);
    let mut a = fabric.handle(0).unwrap();
    fabric.disconnect(2);

    a.local_row_mut().num_changes = 1;
    a.put_field(RowField::NumChanges).unwrap();
    assert_eq!(fabric.pending(), 1, "only the link to replica 1 is queued");
}

#[test]
fn random_delivery_converges() {
    let fabric = fabric(4, DeliveryMode::Queued);
    let mut handles: Vec<_> = (0..4).map(|i| fabric.handle(i).unwrap()).collect();

    for (i, h) in handles.iter_mut().enumerate() {
        let row = h.local_row_mut();
        row.num_acked = i as u64 + 1;
        row.suspected[(i + 1) % 4] = true;
        h.put_field(RowField::Suspected).unwrap();
        h.put_field(RowField::NumAcked).unwrap();
    }

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    while fabric.deliver_random(&mut rng, 3) > 0 {}

    for observer in &handles {
        for (i, owner) in handles.iter().enumerate() {
            assert_eq!(&observer.row(i).unwrap(), owner.local_row());
        }
    }
}
