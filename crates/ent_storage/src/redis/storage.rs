//! Entities in Redis.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use ent_codec::{Encoder, FIELD_NAME_VERSION};
use ent_core::index::{compute_index_edits, no_lookup, StorageIndexEdit};
use ent_core::{
    index_fields, Ent, EntError, EntIndex, EntResult, FieldSet, IdIter, LookupFlags, Storage,
};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::codec::{HashDecoder, HashEncoder};
use super::config::RedisConfig;
use super::resp::{Command, RespValue};
use super::transport::{TcpTransport, Transport};

/// Separates a non-unique index key from the id in sorted-set members.
const MEMBER_SEPARATOR: u8 = 0xFE;

/// Keys fetched per `SCAN` round trip.
const SCAN_COUNT: &str = "100";

/// An entity store on a Redis server.
///
/// Layout:
///
/// - entity: hash `type:<hex id>` holding `_ver` and every field
/// - id counters: hash `entid` (configurable), one field per type
/// - unique index: string `type#index:<key>` holding the hex id
/// - non-unique index: sorted set `type#index` of `<key> 0xFE <id, 8 bytes
///   big-endian>` members, all scored 0 and queried by lexical range
///
/// Writes `WATCH` the entity key and every unique key they claim, check the
/// stored version, then commit with `MULTI`/`EXEC`. If another client touches
/// a watched key first, `EXEC` is aborted and the write fails with
/// [`EntError::VersionConflict`].
///
/// All operations share one connection; a write holds it from `WATCH` to
/// `EXEC`.
pub struct RedisStorage<T> {
    conn: Arc<Mutex<T>>,
    id_key: String,
}

impl RedisStorage<TcpTransport> {
    /// Connects to the server named in `config`.
    pub fn connect(config: RedisConfig) -> EntResult<Self> {
        let id_key = config.id_key.clone();
        let transport = TcpTransport::connect(config)?;
        Ok(Self::with_id_key(transport, id_key))
    }
}

impl<T: Transport> RedisStorage<T> {
    /// Stores entities through `transport`, counting ids in `entid`.
    pub fn new(transport: T) -> Self {
        Self::with_id_key(transport, RedisConfig::default().id_key)
    }

    /// Stores entities through `transport`, counting ids in hash `id_key`.
    pub fn with_id_key(transport: T, id_key: impl Into<String>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(transport)),
            id_key: id_key.into(),
        }
    }

    /// Writes `e` under `id` if the stored version is `expected` (0 for a new
    /// entity) and returns the new version.
    fn put_ent(
        &self,
        e: &dyn Ent,
        id: u64,
        expected: u64,
        changed: FieldSet,
    ) -> EntResult<u64> {
        let type_name = e.type_name();
        let version = expected + 1;
        let key = ent_key(type_name, id);
        debug!(type_name, id, version, changed = ?changed, "put ent");

        // HSET never removes fields, so always write all of them.
        let mut hset = HashEncoder::new(&key);
        hset.begin_ent(version);
        e.encode(&mut hset, e.fields().all);
        hset.end_ent();
        let hset = hset.finish()?;

        let mut conn = self.conn.lock();
        let result = put_watched(&mut *conn, e, &key, id, expected, changed, hset);
        if result.is_err() {
            unwatch(&mut *conn);
        }
        result.map(|()| version)
    }
}

impl<T> fmt::Debug for RedisStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("id_key", &self.id_key)
            .finish_non_exhaustive()
    }
}

impl<T: Transport + 'static> Storage for RedisStorage<T> {
    fn create(&self, e: &dyn Ent, fields: FieldSet) -> EntResult<u64> {
        let reply = {
            let mut conn = self.conn.lock();
            exchange_one(
                &mut *conn,
                Command::new("HINCRBY")
                    .arg(&self.id_key)
                    .arg(e.type_name())
                    .arg("1"),
            )?
        };
        let id = reply.into_integer("HINCRBY")?;
        let id = u64::try_from(id)
            .ok()
            .filter(|&id| id > 0)
            .ok_or_else(|| EntError::backend(format!("id counter yielded {id}")))?;
        self.put_ent(e, id, 0, fields)?;
        Ok(id)
    }

    fn save(&self, e: &dyn Ent, fields: FieldSet) -> EntResult<u64> {
        self.put_ent(e, e.id(), e.version(), fields)
    }

    fn load_by_id(&self, e: &mut dyn Ent, id: u64) -> EntResult<u64> {
        let cmd = Command::new("HGETALL").arg(ent_key(e.type_name(), id));
        let reply = {
            let mut conn = self.conn.lock();
            exchange_one(&mut *conn, cmd)?
        };
        decode_hash(e, reply)
    }

    fn delete(&self, e: &dyn Ent, id: u64) -> EntResult<()> {
        let type_name = e.type_name();
        let key = ent_key(type_name, id);
        let mut conn = self.conn.lock();

        if e.indexes().is_empty() {
            let removed = exchange_one(&mut *conn, Command::new("DEL").arg(&key))?
                .into_integer("DEL")?;
            if removed == 0 {
                return Err(EntError::NotFound);
            }
            debug!(type_name, id, "deleted");
            return Ok(());
        }

        let result = delete_watched(&mut *conn, e, &key, id);
        if result.is_err() {
            unwatch(&mut *conn);
        } else {
            debug!(type_name, id, "deleted");
        }
        result
    }

    fn find_by_index(
        &self,
        type_name: &str,
        index: &EntIndex,
        key: &[u8],
        limit: usize,
        flags: LookupFlags,
    ) -> EntResult<Vec<u64>> {
        if index.unique {
            let cmd = Command::new("GET").arg(unique_key(type_name, index.name, key));
            let reply = {
                let mut conn = self.conn.lock();
                exchange_one(&mut *conn, cmd)?
            };
            return match reply.into_bytes("GET")? {
                Some(data) => Ok(vec![parse_hex_id(&data)?]),
                None => Err(EntError::NotFound),
            };
        }

        let mut start = Vec::with_capacity(key.len() + 2);
        start.push(b'[');
        start.extend_from_slice(key);
        start.push(MEMBER_SEPARATOR);
        let mut end = Vec::with_capacity(key.len() + 2);
        end.push(b'(');
        end.extend_from_slice(key);
        end.push(0xFF);

        let zkey = sorted_set_key(type_name, index.name);
        let mut cmd = if flags.contains(LookupFlags::REVERSE) {
            Command::new("ZREVRANGEBYLEX").arg(zkey).arg(end).arg(start)
        } else {
            Command::new("ZRANGEBYLEX").arg(zkey).arg(start).arg(end)
        };
        if limit > 0 {
            cmd = cmd.arg("LIMIT").arg("0").arg(limit.to_string());
        }

        let reply = {
            let mut conn = self.conn.lock();
            exchange_one(&mut *conn, cmd)?
        };
        let members = reply.into_array("ZRANGEBYLEX")?.unwrap_or_default();
        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            let Some(data) = member.into_bytes("ZRANGEBYLEX")? else {
                continue;
            };
            // A longer key that happens to continue with 0xFE also falls in
            // the range; only exact-length members belong to `key`.
            if let Some(id) = member_id(&data, key) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn load_by_index(
        &self,
        e: Box<dyn Ent>,
        index: &EntIndex,
        key: &[u8],
        limit: usize,
        flags: LookupFlags,
    ) -> EntResult<Vec<Box<dyn Ent>>> {
        let type_name = e.type_name();
        let ids = self.find_by_index(type_name, index, key, limit, flags)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // One pipelined round trip for every payload.
        let cmds: Vec<Command> = ids
            .iter()
            .map(|&id| Command::new("HGETALL").arg(ent_key(type_name, id)))
            .collect();
        let replies = {
            let mut conn = self.conn.lock();
            exchange(&mut *conn, &cmds)?
        };

        let mut out: Vec<Box<dyn Ent>> = Vec::with_capacity(ids.len());
        let mut first = Some(e);
        for (id, reply) in ids.into_iter().zip(replies) {
            let mut next = match first.take() {
                Some(e) => e,
                None => match out.first() {
                    Some(proto) => proto.new_empty(),
                    None => return Err(EntError::backend("lookup lost its prototype entity")),
                },
            };
            let version = decode_hash(next.as_mut(), reply)?;
            next.base_mut().set_identity(id, version);
            out.push(next);
        }
        Ok(out)
    }

    fn iterate_ids(&self, type_name: &str) -> IdIter {
        Box::new(ScanIter {
            conn: Arc::clone(&self.conn),
            pattern: format!("{type_name}:*"),
            prefix_len: type_name.len() + 1,
            cursor: Some("0".to_string()),
            ids: VecDeque::new(),
        })
    }
}

/// The body of a create or save, run between `WATCH` and `EXEC`.
fn put_watched<T: Transport>(
    conn: &mut T,
    e: &dyn Ent,
    key: &[u8],
    id: u64,
    expected: u64,
    changed: FieldSet,
    hset: Command,
) -> EntResult<()> {
    let type_name = e.type_name();
    expect_ok(exchange_one(conn, Command::new("WATCH").arg(key))?, "WATCH")?;

    let prev = if expected == 0 {
        None
    } else {
        let mut prev = e.new_empty();
        let current = load_partial(conn, prev.as_mut(), key, index_fields(e.indexes()))?;
        if current == 0 {
            return Err(EntError::NotFound);
        }
        if current != expected {
            debug!(type_name, id, expected, current, "version conflict");
            return Err(EntError::VersionConflict { expected });
        }
        Some(prev)
    };

    // Sorted sets are edited natively, so the postings are never read.
    let edits = compute_index_edits(&mut no_lookup, prev.as_deref(), Some(e), id, changed)?;
    trace!(type_name, id, edits = edits.len(), "index edits");

    let mut queued = Vec::with_capacity(edits.len() + 1);
    for edit in edits {
        if edit.index.unique && !edit.is_cleanup {
            claim_unique(conn, type_name, &edit, id, &mut queued)?;
        } else {
            queued.push(index_command(type_name, &edit, id));
        }
    }
    queued.push(hset);
    run_transaction(conn, queued, expected)
}

/// The body of a delete of an indexed entity.
fn delete_watched<T: Transport>(conn: &mut T, e: &dyn Ent, key: &[u8], id: u64) -> EntResult<()> {
    let type_name = e.type_name();
    expect_ok(exchange_one(conn, Command::new("WATCH").arg(key))?, "WATCH")?;

    let mut prev = e.new_empty();
    let version = load_partial(conn, prev.as_mut(), key, index_fields(e.indexes()))?;
    if version == 0 {
        return Err(EntError::NotFound);
    }

    let edits = compute_index_edits(&mut no_lookup, Some(&*prev), None, id, e.fields().all)?;
    let mut queued: Vec<Command> = edits
        .iter()
        .map(|edit| index_command(type_name, edit, id))
        .collect();
    queued.push(Command::new("DEL").arg(key));
    run_transaction(conn, queued, version)
}

/// Watches a unique key and checks that it is free or already ours. Queues
/// the `SETNX` that claims it.
fn claim_unique<T: Transport>(
    conn: &mut T,
    type_name: &str,
    edit: &StorageIndexEdit,
    id: u64,
    queued: &mut Vec<Command>,
) -> EntResult<()> {
    let ukey = unique_key(type_name, edit.index.name, &edit.key);
    let mut replies = exchange(
        conn,
        &[
            Command::new("WATCH").arg(&ukey),
            Command::new("GET").arg(&ukey),
        ],
    )?;
    let get = replies.pop().unwrap_or(RespValue::NIL);
    if let Some(watch) = replies.pop() {
        expect_ok(watch, "WATCH")?;
    }
    match get.into_bytes("GET")? {
        None => {
            queued.push(Command::new("SETNX").arg(ukey).arg(format!("{id:x}")));
            Ok(())
        }
        Some(data) => {
            let other = parse_hex_id(&data)?;
            if other == id {
                return Ok(());
            }
            debug!(type_name, index = edit.index.name, id, other, "unique conflict");
            Err(EntError::unique_conflict(type_name, edit.index.name))
        }
    }
}

/// The command applying a cleanup, or a non-unique insert.
fn index_command(type_name: &str, edit: &StorageIndexEdit, id: u64) -> Command {
    if edit.index.unique {
        return Command::new("DEL").arg(unique_key(type_name, edit.index.name, &edit.key));
    }
    let zkey = sorted_set_key(type_name, edit.index.name);
    let member = sorted_set_member(&edit.key, id);
    if edit.is_cleanup {
        Command::new("ZREM").arg(zkey).arg(member)
    } else {
        Command::new("ZADD").arg(zkey).arg("0").arg(member)
    }
}

/// Sends `MULTI`, `queued` and `EXEC` in one batch and checks every reply.
fn run_transaction<T: Transport>(
    conn: &mut T,
    queued: Vec<Command>,
    expected: u64,
) -> EntResult<()> {
    let mut batch = Vec::with_capacity(queued.len() + 2);
    batch.push(Command::new("MULTI"));
    batch.extend(queued);
    batch.push(Command::new("EXEC"));
    trace!(commands = ?batch, "transaction");

    let mut replies = exchange(conn, &batch)?;
    let exec = replies
        .pop()
        .ok_or_else(|| EntError::backend("missing EXEC reply"))?;
    for reply in replies {
        reply.into_result()?;
    }
    match exec.into_array("EXEC")? {
        None => {
            debug!(expected, "EXEC aborted by a watched key");
            Err(EntError::VersionConflict { expected })
        }
        Some(results) => {
            for result in results {
                result.into_result()?;
            }
            Ok(())
        }
    }
}

/// Loads `_ver` and `fields` of the hash at `key` into `e`, returning the
/// version (0 when the hash does not exist).
fn load_partial<T: Transport>(
    conn: &mut T,
    e: &mut dyn Ent,
    key: &[u8],
    fields: FieldSet,
) -> EntResult<u64> {
    let meta = e.fields();
    let mut names = Vec::with_capacity(fields.len() + 1);
    names.push(FIELD_NAME_VERSION);
    names.extend(fields.iter().filter_map(|i| meta.name(i)));

    let mut cmd = Command::new("HMGET").arg(key);
    for name in &names {
        cmd.push(name);
    }
    let items = exchange_one(conn, cmd)?
        .into_array("HMGET")?
        .unwrap_or_default();
    let mut c = HashDecoder::from_fields(&names, items)?;
    let version = e.decode_partial(&mut c, fields);
    c.finish()?;
    Ok(version)
}

/// Decodes an `HGETALL` reply into `e`, returning the stored version.
fn decode_hash(e: &mut dyn Ent, reply: RespValue) -> EntResult<u64> {
    let items = reply.into_array("HGETALL")?.unwrap_or_default();
    if items.is_empty() {
        return Err(EntError::NotFound);
    }
    let mut c = HashDecoder::from_pairs(items)?;
    let (_, version) = e.decode(&mut c);
    c.finish()?;
    Ok(version)
}

fn unwatch<T: Transport>(conn: &mut T) {
    if let Err(err) = conn.exchange(&[Command::new("UNWATCH")]) {
        warn!(error = %err, "UNWATCH failed");
    }
}

fn exchange<T: Transport>(conn: &mut T, commands: &[Command]) -> EntResult<Vec<RespValue>> {
    let replies = conn.exchange(commands)?;
    if replies.len() != commands.len() {
        return Err(EntError::backend(format!(
            "sent {} commands, got {} replies",
            commands.len(),
            replies.len()
        )));
    }
    Ok(replies)
}

fn exchange_one<T: Transport>(conn: &mut T, command: Command) -> EntResult<RespValue> {
    exchange(conn, std::slice::from_ref(&command))?
        .pop()
        .ok_or_else(|| EntError::backend("missing reply"))
}

fn expect_ok(reply: RespValue, command: &str) -> EntResult<()> {
    match reply.into_result()? {
        RespValue::Simple(_) => Ok(()),
        other => Err(super::resp::RespError::unexpected(command, &other).into()),
    }
}

/// Entity hash key: `type:<hex id>`.
pub(crate) fn ent_key(type_name: &str, id: u64) -> Vec<u8> {
    format!("{type_name}:{id:x}").into_bytes()
}

/// Unique index key: `type#index:<key>`.
pub(crate) fn unique_key(type_name: &str, index: &str, key: &[u8]) -> Vec<u8> {
    let mut out = sorted_set_key(type_name, index);
    out.push(b':');
    out.extend_from_slice(key);
    out
}

/// Non-unique index sorted set: `type#index`.
pub(crate) fn sorted_set_key(type_name: &str, index: &str) -> Vec<u8> {
    format!("{type_name}#{index}").into_bytes()
}

/// Sorted-set member for `id` under `key`.
pub(crate) fn sorted_set_member(key: &[u8], id: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 9);
    out.extend_from_slice(key);
    out.push(MEMBER_SEPARATOR);
    out.extend_from_slice(&id.to_be_bytes());
    out
}

/// Returns the id of a member written by [`sorted_set_member`] for `key`.
fn member_id(member: &[u8], key: &[u8]) -> Option<u64> {
    if member.len() != key.len() + 9
        || !member.starts_with(key)
        || member[key.len()] != MEMBER_SEPARATOR
    {
        return None;
    }
    let raw: [u8; 8] = member[key.len() + 1..].try_into().ok()?;
    Some(u64::from_be_bytes(raw))
}

fn parse_hex_id(data: &[u8]) -> EntResult<u64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| u64::from_str_radix(s, 16).ok())
        .ok_or_else(|| EntError::backend(format!("invalid id \"{}\"", data.escape_ascii())))
}

/// Walks `SCAN cursor MATCH type:*`, a page at a time.
struct ScanIter<T> {
    conn: Arc<Mutex<T>>,
    pattern: String,
    prefix_len: usize,
    /// `None` once the server reported the final page.
    cursor: Option<String>,
    ids: VecDeque<u64>,
}

impl<T: Transport> ScanIter<T> {
    fn fetch_page(&mut self, cursor: &str) -> EntResult<()> {
        let cmd = Command::new("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&self.pattern)
            .arg("COUNT")
            .arg(SCAN_COUNT);
        let reply = {
            let mut conn = self.conn.lock();
            exchange_one(&mut *conn, cmd)?
        };
        let page = reply.into_array("SCAN")?.unwrap_or_default();
        let [next, keys]: [RespValue; 2] = page
            .try_into()
            .map_err(|_| EntError::backend("SCAN reply is not a pair"))?;
        let next = next.into_bytes("SCAN")?.unwrap_or_default();
        let next = String::from_utf8_lossy(&next).into_owned();
        for key in keys.into_array("SCAN")?.unwrap_or_default() {
            let Some(key) = key.into_bytes("SCAN")? else {
                continue;
            };
            let id = parse_hex_id(key.get(self.prefix_len..).unwrap_or_default())?;
            self.ids.push_back(id);
        }
        self.cursor = if next == "0" { None } else { Some(next) };
        Ok(())
    }
}

impl<T: Transport> Iterator for ScanIter<T> {
    type Item = EntResult<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.ids.pop_front() {
                return Some(Ok(id));
            }
            let cursor = self.cursor.take()?;
            if let Err(err) = self.fetch_page(&cursor) {
                // cursor stays None: the error ends the iteration
                return Some(Err(err));
            }
        }
    }
}
