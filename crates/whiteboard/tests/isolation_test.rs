//! Cross-slot isolation and slot reuse of the whiteboard.

use std::sync::Arc;
use std::thread;

use hive_core::DataKey;
use hive_whiteboard::{data_object, Whiteboard};

fn key(name: &str) -> DataKey {
    DataKey::from(name)
}

#[test]
fn data_in_one_slot_is_invisible_in_another() {
    let wb = Whiteboard::new(2);
    let a = wb.allocate(1).unwrap();
    let b = wb.allocate(2).unwrap();

    wb.put(a, key("/Event/Hits"), data_object(11u64)).unwrap();

    assert!(wb.contains(a, &key("/Event/Hits")));
    assert!(!wb.contains(b, &key("/Event/Hits")));
    assert!(wb.get(b, &key("/Event/Hits")).is_none());

    // The same key may be produced independently in each slot
    wb.put(b, key("/Event/Hits"), data_object(22u64)).unwrap();
    assert_eq!(*wb.get_as::<u64>(a, &key("/Event/Hits")).unwrap(), 11);
    assert_eq!(*wb.get_as::<u64>(b, &key("/Event/Hits")).unwrap(), 22);
}

#[test]
fn reused_slot_starts_empty() {
    let wb = Whiteboard::new(1);
    let slot = wb.allocate(1).unwrap();
    wb.put(slot, key("a"), data_object("first")).unwrap();
    wb.put(slot, key("b"), data_object("first")).unwrap();
    wb.release(slot).unwrap();

    let again = wb.allocate(2).unwrap();
    assert_eq!(again, slot);
    assert!(wb.get(again, &key("a")).is_none());
    assert!(wb.get(again, &key("b")).is_none());
    assert!(wb.keys(again).is_empty());

    // A fresh put of a previously used key succeeds
    wb.put(again, key("a"), data_object("second")).unwrap();
    assert_eq!(*wb.get_as::<&str>(again, &key("a")).unwrap(), "second");
}

#[test]
fn concurrent_writers_on_separate_slots() {
    let slots = 4;
    let keys_per_slot = 50;
    let wb = Arc::new(Whiteboard::new(slots));
    let allocated: Vec<usize> = (0..slots as u64).map(|e| wb.allocate(e).unwrap()).collect();

    let handles: Vec<_> = allocated
        .iter()
        .map(|&slot| {
            let wb = Arc::clone(&wb);
            thread::spawn(move || {
                for i in 0..keys_per_slot {
                    wb.put(slot, key(&format!("k{i}")), data_object(slot)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for &slot in &allocated {
        assert_eq!(wb.keys(slot).len(), keys_per_slot);
        for i in 0..keys_per_slot {
            let owner = wb.get_as::<usize>(slot, &key(&format!("k{i}"))).unwrap();
            assert_eq!(*owner, slot);
        }
    }
}
