use sparsemap_rs::SparseSet;

#[test]
fn test_insert_contains_remove() {
    let mut s: SparseSet<u64> = SparseSet::new();
    assert!(s.insert(1).unwrap());
    assert!(s.insert(2).unwrap());
    assert!(!s.insert(1).unwrap());
    assert_eq!(s.len(), 2);
    assert!(s.contains(&1));
    assert!(!s.contains(&3));
    assert!(s.remove(&1));
    assert!(!s.remove(&1));
    assert_eq!(s.len(), 1);
}

#[test]
fn test_string_sets_compare_equal_regardless_of_order() {
    let a: SparseSet<String> = ["a", "e", "d", "c", "b"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut b: SparseSet<String> = SparseSet::new();
    for key in ["e", "c", "b", "a", "d"] {
        assert!(b.insert(key.to_string()).unwrap());
    }
    assert_eq!(a.len(), 5);
    assert_eq!(a, b);

    b.insert("f".to_string()).unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_get_returns_stored_value() {
    let mut s: SparseSet<String> = SparseSet::new();
    s.insert("needle".to_string()).unwrap();
    let stored = s.get("needle").unwrap();
    assert_eq!(stored, "needle");
    assert_eq!(s.get("haystack"), None);
}

#[test]
fn test_take_moves_value_out() {
    let mut s: SparseSet<String> = SparseSet::new();
    s.insert("owned".to_string()).unwrap();
    let value = s.take("owned").unwrap();
    assert_eq!(value, "owned");
    assert!(s.is_empty());
    assert_eq!(s.take("owned"), None);
}

#[derive(Hash, PartialEq, Eq, Debug)]
struct MoveOnly(u64);

#[test]
fn test_move_only_values() {
    let mut s: SparseSet<MoveOnly> = SparseSet::new();
    for i in 0..100u64 {
        assert!(s.insert(MoveOnly(i)).unwrap());
    }
    assert_eq!(s.len(), 100);
    assert!(s.contains(&MoveOnly(42)));

    let mut sum = 0u64;
    for value in s.iter() {
        sum += value.0;
    }
    assert_eq!(sum, (0..100).sum());

    let taken = s.take(&MoveOnly(42)).unwrap();
    assert_eq!(taken, MoveOnly(42));
    assert!(!s.contains(&MoveOnly(42)));
    assert_eq!(s.len(), 99);
}

#[test]
fn test_retain_keeps_matching_values() {
    let mut s: SparseSet<u64> = (0..100u64).collect();
    s.retain(|v| v % 3 == 0);
    assert_eq!(s.len(), 34);
    assert!(s.contains(&99));
    assert!(!s.contains(&98));
}

#[test]
fn test_clear_and_reuse() {
    let mut s: SparseSet<u64> = (0..200u64).collect();
    s.clear();
    assert!(s.is_empty());
    assert!(!s.contains(&10));
    assert!(s.insert(10).unwrap());
    assert_eq!(s.len(), 1);
}

#[test]
fn test_clone_is_independent() {
    let a: SparseSet<u64> = (0..32u64).collect();
    let mut b = a.clone();
    assert_eq!(a, b);
    b.remove(&0);
    assert_ne!(a, b);
    assert!(a.contains(&0));
}

#[test]
fn test_debug_formats_as_set() {
    let mut s: SparseSet<u32> = SparseSet::new();
    s.insert(7).unwrap();
    assert_eq!(format!("{s:?}"), "{7}");
}

#[test]
fn test_iterator_count_matches_len_under_churn() {
    let mut s: SparseSet<u64> = SparseSet::new();
    for i in 0..500u64 {
        s.insert(i).unwrap();
    }
    for i in (0..500u64).step_by(3) {
        s.remove(&i);
    }
    assert_eq!(s.iter().count(), s.len());

    let mut seen: Vec<u64> = s.iter().copied().collect();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), s.len(), "iteration yielded a duplicate");
}
