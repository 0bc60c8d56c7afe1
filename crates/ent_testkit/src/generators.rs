//! Property-based test generators using proptest.
//!
//! Emails and kinds are drawn from small pools so that generated operation
//! sequences collide on unique keys and share non-unique keys often.

use proptest::prelude::*;

use crate::fixtures::{Account, Post};

/// Strategy for account emails from a pool of a few dozen values.
pub fn email_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-c]{1,2}@example\\.com").expect("Invalid regex")
}

/// Strategy for account kinds.
pub fn kind_strategy() -> impl Strategy<Value = i32> {
    prop_oneof![Just(-1), 0..4i32, Just(i32::MAX)]
}

/// Strategy for unsaved accounts.
pub fn account_strategy() -> impl Strategy<Value = Account> {
    (
        prop::string::string_regex("[A-Za-z ]{0,12}").expect("Invalid regex"),
        email_strategy(),
        kind_strategy(),
        any::<bool>(),
    )
        .prop_map(|(name, email, kind, active)| {
            let mut a = Account::new(&name, &email, kind);
            a.active = active;
            a
        })
}

/// Strategy for finite `f64` values, weighted towards the points where the
/// text form switches to exponent notation.
pub fn score_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(1e-7),
        Just(1e21),
        Just(-0.0),
        Just(0.000001),
        Just(999999999999999900000.0),
        any::<f64>().prop_filter("finite", |v| v.is_finite()),
    ]
}

/// Strategy for finite `f32` values.
pub fn rating_strategy() -> impl Strategy<Value = f32> {
    prop_oneof![
        Just(1e-7f32),
        Just(1e21f32),
        Just(-0.0f32),
        any::<f32>().prop_filter("finite", |v| v.is_finite()),
    ]
}

/// Strategy for unsaved posts by one of a few authors.
pub fn post_strategy() -> impl Strategy<Value = Post> {
    (
        1..4u64,
        prop::string::string_regex("[a-z]{1,6}").expect("Invalid regex"),
        ".{0,16}",
        prop::collection::vec(any::<u8>(), 0..32),
        rating_strategy(),
        score_strategy(),
    )
        .prop_map(|(author, slug, title, body, rating, score)| {
            let mut p = Post::new(author, &slug, &title);
            p.body = body;
            p.rating = rating;
            p.score = score;
            p
        })
}

/// One step of a generated account workload. `target` picks a live account
/// by position, modulo the number of live accounts.
#[derive(Debug, Clone)]
pub enum AccountOp {
    /// Create a new account.
    Create {
        /// Email of the new account.
        email: String,
        /// Kind of the new account.
        kind: i32,
    },
    /// Change the email of a live account.
    SetEmail {
        /// Account position.
        target: usize,
        /// New email.
        email: String,
    },
    /// Change the kind of a live account.
    SetKind {
        /// Account position.
        target: usize,
        /// New kind.
        kind: i32,
    },
    /// Change a field no index covers.
    SetName {
        /// Account position.
        target: usize,
        /// New name.
        name: String,
    },
    /// Delete a live account.
    Delete {
        /// Account position.
        target: usize,
    },
}

/// Strategy for a single [`AccountOp`].
pub fn account_op_strategy() -> impl Strategy<Value = AccountOp> {
    prop_oneof![
        3 => (email_strategy(), kind_strategy())
            .prop_map(|(email, kind)| AccountOp::Create { email, kind }),
        2 => (any::<usize>(), email_strategy())
            .prop_map(|(target, email)| AccountOp::SetEmail { target, email }),
        2 => (any::<usize>(), kind_strategy())
            .prop_map(|(target, kind)| AccountOp::SetKind { target, kind }),
        1 => (any::<usize>(), "[a-z]{0,8}")
            .prop_map(|(target, name)| AccountOp::SetName { target, name }),
        1 => any::<usize>().prop_map(|target| AccountOp::Delete { target }),
    ]
}

/// Strategy for workloads of up to `max` operations.
pub fn account_ops_strategy(max: usize) -> impl Strategy<Value = Vec<AccountOp>> {
    prop::collection::vec(account_op_strategy(), 0..=max)
}
