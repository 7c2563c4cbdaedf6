mod common;

use common::NamedFactory;
use hostkit_core::extension::DelegateBridge;
use std::sync::Arc;
use std::thread;

#[test]
fn empty_bridge_is_a_normal_state() {
    let bridge = DelegateBridge::new();
    assert!(bridge.delegate().is_none());
    assert!(!bridge.is_registered());
}

#[test]
fn latest_registration_wins_regardless_of_source() {
    let bridge = DelegateBridge::new();
    bridge.register_delegate(Arc::new(NamedFactory("builtin")));
    bridge.register_delegate(Arc::new(NamedFactory("payload")));
    assert_eq!(
        bridge.delegate().expect("delegate").factory_id(),
        "payload"
    );

    bridge.register_delegate(Arc::new(NamedFactory("builtin")));
    let delegate = bridge.delegate().expect("delegate");
    assert_eq!(delegate.factory_id(), "builtin");
    assert_eq!(delegate.hook_item_names(), vec!["builtin_item".to_string()]);
}

#[test]
fn concurrent_registrations_leave_exactly_one_delegate() {
    let bridge = Arc::new(DelegateBridge::new());
    let ids = ["payload", "builtin", "payload", "builtin"];
    let handles: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || bridge.register_delegate(Arc::new(NamedFactory(id))))
        })
        .collect();
    for handle in handles {
        handle.join().expect("registration thread");
    }

    let delegate = bridge.delegate().expect("delegate");
    assert!(ids.contains(&delegate.factory_id()));
}
