//! Index lookups and iteration, on every backend.

use std::collections::BTreeSet;

use ent_core::{Ent, EntError, LookupFlags, Storage};
use ent_testkit::prelude::*;

fn ids(accounts: &[Account]) -> Vec<u64> {
    accounts.iter().map(Ent::id).collect()
}

#[test]
fn non_unique_lookup_limit_and_reverse() {
    for_each_backend(|name, storage| {
        let mut created = Vec::new();
        for i in 0..4 {
            let mut a = Account::new(&format!("a{i}"), &format!("a{i}@example.com"), 1);
            a.create(&storage).unwrap();
            created.push(a.id());
        }
        let mut other = Account::new("x", "x@example.com", 2);
        other.create(&storage).unwrap();

        let all = load_accounts_by_kind(&storage, 1, 0, LookupFlags::NONE).unwrap();
        assert_eq!(ids(&all), created, "{name}");
        assert_eq!(all[2].name, "a2", "{name}");

        let first_two = load_accounts_by_kind(&storage, 1, 2, LookupFlags::NONE).unwrap();
        assert_eq!(ids(&first_two), created[..2].to_vec(), "{name}");

        let last_two = load_accounts_by_kind(&storage, 1, 2, LookupFlags::REVERSE).unwrap();
        assert_eq!(ids(&last_two), vec![created[3], created[2]], "{name}");

        assert_eq!(find_accounts_by_kind(&*storage, 2).unwrap(), vec![other.id()], "{name}");
    });
}

#[test]
fn missing_keys() {
    for_each_backend(|name, storage| {
        assert_eq!(
            find_account_by_email(&*storage, "nobody@example.com").unwrap_err(),
            EntError::NotFound,
            "{name}"
        );
        assert!(load_account_by_email(&storage, "nobody@example.com")
            .unwrap_err()
            .is_not_found());
        assert!(find_accounts_by_kind(&*storage, 9).unwrap().is_empty(), "{name}");
        assert!(load_accounts_by_kind(&storage, 9, 3, LookupFlags::REVERSE)
            .unwrap()
            .is_empty());
        assert_eq!(load_account_by_id(&storage, 0).unwrap_err(), EntError::NotFound);
        assert_eq!(load_account_by_id(&storage, 77).unwrap_err(), EntError::NotFound);
    });
}

#[test]
fn edge_valued_integer_keys() {
    for_each_backend(|name, storage| {
        let kinds = [-1, 0, 254, 0x00FE_FEFE, i32::MAX, i32::MIN];
        let mut by_kind = Vec::new();
        for (i, kind) in kinds.into_iter().enumerate() {
            let mut a = Account::new("k", &format!("k{i}@example.com"), kind);
            a.create(&storage).unwrap();
            by_kind.push((kind, a.id()));
        }
        for (kind, id) in by_kind {
            assert_eq!(find_accounts_by_kind(&*storage, kind).unwrap(), vec![id], "{name} {kind}");
        }
    });
}

#[test]
fn loaded_entities_are_attached() {
    for_each_backend(|name, storage| {
        let mut a = Account::new("ann", "ann@example.com", 3);
        a.create(&storage).unwrap();

        let mut found = load_account_by_email(&storage, "ann@example.com").unwrap();
        assert_eq!((found.id(), found.version()), (a.id(), 1), "{name}");
        found.set_kind(4);
        found.save().unwrap();

        let mut by_kind = load_accounts_by_kind(&storage, 4, 0, LookupFlags::NONE).unwrap();
        assert_eq!(ids(&by_kind), vec![a.id()], "{name}");
        assert_eq!(by_kind[0].version(), 2, "{name}");
        by_kind[0].set_name("Ann");
        by_kind[0].save().unwrap();

        a.reload().unwrap();
        assert_eq!((a.name.as_str(), a.kind, a.version()), ("Ann", 4, 3), "{name}");
    });
}

#[test]
fn blob_and_unsigned_fields_round_trip() {
    for_each_backend(|name, storage| {
        let mut p = Post::new(u64::MAX, "edge", "Edge");
        p.body = vec![0, 0xFE, 0xFF, b'\r', b'\n'];
        p.create(&storage).unwrap();

        let mut back = Post::default();
        ent_core::load_ent_by_id(&mut back, &storage, p.id()).unwrap();
        assert_eq!(back.author, u64::MAX, "{name}");
        assert_eq!(back.body, p.body, "{name}");
        assert_eq!(find_posts_by_author(&*storage, u64::MAX).unwrap(), vec![p.id()]);
    });
}

#[test]
fn iteration_covers_one_type() {
    for_each_backend(|name, storage| {
        let mut expected = BTreeSet::new();
        for i in 0..150 {
            let mut a = Account::new("n", &format!("n{i}@example.com"), i % 3);
            a.create(&storage).unwrap();
            expected.insert(a.id());
        }
        let mut p = Post::new(1, "p", "P");
        p.create(&storage).unwrap();

        let mut gone = load_account_by_email(&storage, "n7@example.com").unwrap();
        expected.remove(&gone.id());
        gone.delete().unwrap();

        let seen: BTreeSet<u64> = iterate_accounts(&storage)
            .map(|a| a.unwrap().id())
            .collect();
        assert_eq!(seen, expected, "{name}");

        let posts: Vec<u64> = storage.iterate_ids(POST_TYPE).map(Result::unwrap).collect();
        assert_eq!(posts, vec![p.id()], "{name}");
    });
}

#[test]
fn iteration_of_an_empty_type() {
    for_each_backend(|name, storage| {
        assert_eq!(iterate_accounts(&storage).count(), 0, "{name}");
    });
}
