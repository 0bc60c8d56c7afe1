//! Generated workloads checked against a model, on every backend.
//!
//! After any sequence of creates, updates and deletes, with failed writes
//! mixed in, every index must agree exactly with the surviving entities.

use std::collections::{BTreeMap, BTreeSet};

use ent_core::{Ent, EntError, Storage, StorageRef};
use ent_testkit::prelude::*;
use proptest::prelude::*;

fn run_workload(name: &str, storage: &StorageRef, ops: &[AccountOp]) -> Vec<Account> {
    let mut live: Vec<Account> = Vec::new();
    for op in ops {
        match op {
            AccountOp::Create { email, kind } => {
                let taken = live.iter().any(|a| &a.email == email);
                let mut a = Account::new("new", email, *kind);
                match a.create(storage) {
                    Ok(()) => {
                        assert!(!taken, "{name}: duplicate email {email} accepted");
                        live.push(a);
                    }
                    Err(err) => {
                        assert!(taken && err.is_unique_conflict(), "{name}: {err}");
                        assert_eq!(a.id(), 0);
                    }
                }
            }
            AccountOp::SetEmail { target, email } => {
                if live.is_empty() {
                    continue;
                }
                let i = target % live.len();
                let taken = live
                    .iter()
                    .enumerate()
                    .any(|(j, a)| j != i && &a.email == email);
                let a = &mut live[i];
                let version = a.version();
                a.set_email(email);
                match a.save() {
                    Ok(()) => {
                        assert!(!taken, "{name}: duplicate email {email} accepted");
                        assert_eq!(a.version(), version + 1);
                    }
                    Err(err) => {
                        assert!(taken && err.is_unique_conflict(), "{name}: {err}");
                        a.reload().unwrap();
                        assert_eq!(a.version(), version);
                    }
                }
            }
            AccountOp::SetKind { target, kind } => {
                if live.is_empty() {
                    continue;
                }
                let i = target % live.len();
                live[i].set_kind(*kind);
                live[i].save().unwrap();
            }
            AccountOp::SetName { target, name: new_name } => {
                if live.is_empty() {
                    continue;
                }
                let i = target % live.len();
                live[i].set_name(new_name);
                live[i].save().unwrap();
            }
            AccountOp::Delete { target } => {
                if live.is_empty() {
                    continue;
                }
                let i = target % live.len();
                let mut a = live.remove(i);
                a.delete().unwrap();
            }
        }
    }
    live
}

fn check_indexes(name: &str, storage: &StorageRef, ops: &[AccountOp], live: &[Account]) {
    let mut by_kind: BTreeMap<i32, BTreeSet<u64>> = BTreeMap::new();
    for a in live {
        by_kind.entry(a.kind).or_default().insert(a.id());
        assert_eq!(find_account_by_email(&**storage, &a.email).unwrap(), a.id(), "{name}");

        let stored = load_account_by_id(storage, a.id()).unwrap();
        assert_eq!(stored.version(), a.version(), "{name}");
        assert_eq!((&stored.name, &stored.email, stored.kind), (&a.name, &a.email, a.kind));
    }

    let mut emails = BTreeSet::new();
    let mut kinds = BTreeSet::new();
    for op in ops {
        match op {
            AccountOp::Create { email, kind } => {
                emails.insert(email.clone());
                kinds.insert(*kind);
            }
            AccountOp::SetEmail { email, .. } => {
                emails.insert(email.clone());
            }
            AccountOp::SetKind { kind, .. } => {
                kinds.insert(*kind);
            }
            AccountOp::SetName { .. } | AccountOp::Delete { .. } => {}
        }
    }
    for email in emails {
        if !live.iter().any(|a| a.email == email) {
            assert_eq!(
                find_account_by_email(&**storage, &email).unwrap_err(),
                EntError::NotFound,
                "{name}: stale entry for {email}"
            );
        }
    }
    for kind in kinds {
        let found: BTreeSet<u64> = find_accounts_by_kind(&**storage, kind)
            .unwrap()
            .into_iter()
            .collect();
        let expected = by_kind.remove(&kind).unwrap_or_default();
        assert_eq!(found, expected, "{name}: kind {kind}");
    }

    let ids: BTreeSet<u64> = storage
        .iterate_ids(ACCOUNT_TYPE)
        .map(Result::unwrap)
        .collect();
    let expected: BTreeSet<u64> = live.iter().map(Ent::id).collect();
    assert_eq!(ids, expected, "{name}");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn float_fields_keep_their_bits(rating in rating_strategy(), score in score_strategy()) {
        for_each_backend(|name, storage| {
            let mut p = Post::new(1, "f", "F");
            p.rating = rating;
            p.score = score;
            p.create(&storage).unwrap();
            let back = load_post_by_id(&storage, p.id()).unwrap();
            assert_eq!(back.rating.to_bits(), rating.to_bits(), "{name}: {rating}");
            assert_eq!(back.score.to_bits(), score.to_bits(), "{name}: {score}");

            p.set_score(-score);
            p.save().unwrap();
            let back = load_post_by_id(&storage, p.id()).unwrap();
            assert_eq!(back.score.to_bits(), (-score).to_bits(), "{name}: {}", -score);
        });
    }

    #[test]
    fn indexes_follow_entities(ops in account_ops_strategy(24)) {
        for_each_backend(|name, storage| {
            let live = run_workload(name, &storage, &ops);
            check_indexes(name, &storage, &ops, &live);
        });
    }

    #[test]
    fn posts_round_trip(posts in prop::collection::vec(post_strategy(), 1..8)) {
        for_each_backend(|name, storage| {
            let mut stored: Vec<Post> = Vec::new();
            for mut p in posts.clone() {
                let taken = stored
                    .iter()
                    .any(|q| q.author == p.author && q.slug == p.slug);
                match p.create(&storage) {
                    Ok(()) => stored.push(p),
                    Err(err) => assert!(taken && err.is_unique_conflict(), "{name}: {err}"),
                }
            }
            for p in &stored {
                let mut back = Post::default();
                ent_core::load_ent_by_id(&mut back, &storage, p.id()).unwrap();
                assert_eq!(
                    (&back.slug, &back.title, &back.body, back.author),
                    (&p.slug, &p.title, &p.body, p.author),
                    "{name}"
                );
                assert_eq!(back.rating.to_bits(), p.rating.to_bits(), "{name}: {}", p.rating);
                assert_eq!(back.score.to_bits(), p.score.to_bits(), "{name}: {}", p.score);
                assert_eq!(find_post_by_author_slug(&*storage, p.author, &p.slug).unwrap(), p.id());
            }
        });
    }
}
