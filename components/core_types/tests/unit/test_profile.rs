//! Unit tests for profile type keys

use core_types::{ProfileType, ProfileTypeKind, ProfileTypeTuple, ProfileTyper};
use std::collections::HashSet;

#[test]
fn test_typers_with_same_root_differ_by_child() {
    let root = ProfileType::new(1, 5, ProfileTypeKind::ClassId);
    let proto = ProfileType::new(1, 5, ProfileTypeKind::PrototypeId);
    let a = ProfileTyper::new(root, root);
    let b = ProfileTyper::new(root, proto);
    assert_ne!(a, b);

    let mut set = HashSet::new();
    set.insert(a);
    set.insert(b);
    set.insert(ProfileTyper::root_only(root));
    assert_eq!(set.len(), 2);
}

#[test]
fn test_raw_packs_all_fields() {
    let a = ProfileType::new(1, 5, ProfileTypeKind::ClassId);
    let b = ProfileType::new(2, 5, ProfileTypeKind::ClassId);
    let c = ProfileType::new(1, 5, ProfileTypeKind::LiteralId);
    assert_ne!(a.raw(), b.raw());
    assert_ne!(a.raw(), c.raw());
}

#[test]
fn test_symbol_ids_are_distinct_across_typers() {
    let r1 = ProfileType::new(0, 1, ProfileTypeKind::LiteralId);
    let r2 = ProfileType::new(0, 2, ProfileTypeKind::LiteralId);
    let ids: HashSet<u64> = [
        ProfileTypeTuple::new(r1, r1, 0),
        ProfileTypeTuple::new(r1, r1, 1),
        ProfileTypeTuple::new(r2, r2, 0),
        ProfileTypeTuple::new(r2, r1, 0),
    ]
    .iter()
    .map(|t| t.symbol_id())
    .collect();
    assert_eq!(ids.len(), 4);
}

#[test]
fn test_native_object_type_is_reserved() {
    let native = ProfileType::native_object();
    assert_eq!(native.kind, ProfileTypeKind::NapiId);
    assert!(!ProfileType::new(0, 1, ProfileTypeKind::NapiId).is_native_object());
}
