//! Redis backend specifics: keyspace layout, optimistic transactions and
//! the TCP transport.

use std::sync::Arc;

use bytes::Bytes;
use ent_core::{Ent, EntError, LookupFlags, StorageRef};
use ent_storage::redis::{Command, RespValue};
use ent_storage::{RedisConfig, RedisStorage};
use ent_testkit::prelude::*;

fn storage_on(server: &FakeRedisServer) -> StorageRef {
    Arc::new(server.storage())
}

fn bulk(data: &[u8]) -> RespValue {
    RespValue::bulk(Bytes::copy_from_slice(data))
}

#[test]
fn keyspace_layout() {
    let server = FakeRedisServer::new();
    let storage = storage_on(&server);
    let mut a = Account::new("ann", "ann@example.com", 2);
    a.create(&storage).unwrap();
    assert_eq!(a.id(), 1);

    assert_eq!(
        server.keys(),
        vec!["account#email:ann@example.com", "account#kind", "account:1", "entid"]
    );
    assert_eq!(
        server.run(Command::new("HGETALL").arg("account:1")),
        RespValue::Array(Some(vec![
            bulk(b"_ver"),
            bulk(b"1"),
            bulk(b"active"),
            bulk(b"0"),
            bulk(b"email"),
            bulk(b"ann@example.com"),
            bulk(b"kind"),
            bulk(b"2"),
            bulk(b"name"),
            bulk(b"ann"),
        ]))
    );
    assert_eq!(
        server.run(Command::new("GET").arg("account#email:ann@example.com")),
        bulk(b"1")
    );
    assert_eq!(
        server.run(Command::new("ZRANGEBYLEX").arg("account#kind").arg("-").arg("+")),
        RespValue::Array(Some(vec![bulk(b"\x00\x00\x00\x02\xfe\x00\x00\x00\x00\x00\x00\x00\x01")]))
    );
    assert_eq!(
        server.run(Command::new("HGETALL").arg("entid")),
        RespValue::Array(Some(vec![bulk(b"account"), bulk(b"1")]))
    );

    a.set_kind(3);
    a.set_email("");
    a.save().unwrap();
    assert_eq!(server.keys(), vec!["account#kind", "account:1", "entid"]);
    assert_eq!(
        server.run(Command::new("HMGET").arg("account:1").arg("_ver").arg("email")),
        RespValue::Array(Some(vec![bulk(b"2"), bulk(b"")]))
    );

    a.delete().unwrap();
    assert_eq!(server.keys(), vec!["entid"]);
}

#[test]
fn ids_are_hex_in_keys() {
    let server = FakeRedisServer::new();
    let storage: StorageRef = Arc::new(RedisStorage::with_id_key(server.client(), "ids"));
    server.run(Command::new("HSET").arg("ids").arg(POST_TYPE).arg("254"));

    let mut p = Post::new(1, "hex", "Hex");
    p.create(&storage).unwrap();
    assert_eq!(p.id(), 255);
    assert!(server.keys().contains(&Bytes::from_static(b"post:ff")));
    assert_eq!(
        server.run(Command::new("GET").arg(b"post#author_slug:author\xff1\xffslug\xffhex")),
        bulk(b"ff")
    );
    let ids: Vec<u64> = storage.iterate_ids(POST_TYPE).map(Result::unwrap).collect();
    assert_eq!(ids, vec![255]);
}

#[test]
fn write_to_watched_ent_aborts_save() {
    let server = FakeRedisServer::new();
    let storage = storage_on(&server);
    let mut a = Account::new("ann", "ann@example.com", 1);
    a.create(&storage).unwrap();

    server.before_next_exec(|s| {
        s.run(Command::new("HSET").arg("account:1").arg("name").arg("sneaky"));
    });
    a.set_kind(2);
    let err = a.save().unwrap_err();
    assert_eq!(err, EntError::VersionConflict { expected: 1 });
    assert_eq!(a.version(), 1);
    assert!(a.has_unsaved_changes());

    // nothing of the aborted transaction landed
    assert!(find_accounts_by_kind(&*storage, 2).unwrap().is_empty());
    assert_eq!(find_accounts_by_kind(&*storage, 1).unwrap(), vec![a.id()]);
    let stored = load_account_by_id(&storage, a.id()).unwrap();
    assert_eq!((stored.name.as_str(), stored.kind, stored.version()), ("sneaky", 1, 1));

    // the connection is usable afterwards
    a.save().unwrap();
    assert_eq!(a.version(), 2);
}

#[test]
fn racing_unique_claim_aborts_create() {
    let server = FakeRedisServer::new();
    let storage = storage_on(&server);

    server.before_next_exec(|s| {
        s.run(Command::new("SET").arg("account#email:race@example.com").arg("ff"));
    });
    let mut a = Account::new("ann", "race@example.com", 1);
    let err = a.create(&storage).unwrap_err();
    assert!(err.is_version_conflict(), "{err}");
    assert_eq!(a.id(), 0);
    assert_eq!(find_account_by_email(&*storage, "race@example.com").unwrap(), 0xff);
    assert_eq!(iterate_accounts(&storage).count(), 0);
}

#[test]
fn second_client_sees_writes_and_conflicts() {
    let server = FakeRedisServer::new();
    let first = storage_on(&server);
    let second = storage_on(&server);

    let mut a = Account::new("ann", "ann@example.com", 1);
    a.create(&first).unwrap();

    let mut b = load_account_by_email(&second, "ann@example.com").unwrap();
    b.set_name("Ann");
    b.save().unwrap();

    a.set_name("Annie");
    assert!(a.save().unwrap_err().is_version_conflict());
    a.reload().unwrap();
    assert_eq!(a.name, "Ann");
}

#[test]
fn dropped_connection_fails_the_write_only() {
    let server = FakeRedisServer::new();
    let storage = storage_on(&server);
    let mut a = Account::new("ann", "ann@example.com", 1);
    a.create(&storage).unwrap();

    server.fail_next_exchange();
    a.set_kind(2);
    let err = a.save().unwrap_err();
    assert!(matches!(err, EntError::Backend { .. }), "{err}");
    assert_eq!(a.version(), 1);
    assert!(a.has_unsaved_changes());

    a.save().unwrap();
    assert_eq!(a.version(), 2);
    assert_eq!(find_accounts_by_kind(&*storage, 2).unwrap(), vec![a.id()]);
}

#[test]
fn server_errors_surface_as_backend_errors() {
    let server = FakeRedisServer::new();
    let storage = storage_on(&server);
    server.run(Command::new("SET").arg("entid").arg("not a hash"));

    let mut a = Account::new("ann", "ann@example.com", 1);
    let err = a.create(&storage).unwrap_err();
    assert!(matches!(err, EntError::Backend { .. }), "{err}");
    assert!(err.to_string().contains("WRONGTYPE"), "{err}");
}

#[test]
fn tcp_transport_against_fake_server() {
    let server = FakeRedisServer::new();
    let address = server.listen().unwrap();
    let config = RedisConfig::new(address.to_string()).with_connect_attempts(1);
    let tcp: StorageRef = Arc::new(RedisStorage::connect(config).unwrap());

    let mut a = Account::new("ann", "ann@example.com", 1);
    a.create(&tcp).unwrap();
    let mut b = Account::new("bob", "bob@example.com", 1);
    b.create(&tcp).unwrap();
    a.set_email("bob@example.com");
    assert!(a.save().unwrap_err().is_unique_conflict());
    a.set_email("ann@work.example.com");
    a.save().unwrap();

    let by_kind = load_accounts_by_kind(&tcp, 1, 0, LookupFlags::REVERSE).unwrap();
    let names: Vec<&str> = by_kind.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["bob", "ann"]);

    // the in-process client shares the keyspace
    let local = storage_on(&server);
    assert_eq!(find_account_by_email(&*local, "ann@work.example.com").unwrap(), a.id());
    assert_eq!(iterate_accounts(&tcp).count(), 2);
}
