//! An in-process Redis.
//!
//! [`FakeRedisServer`] holds a keyspace shared by any number of
//! [`FakeRedis`] clients. Each client has its own `WATCH` set and `MULTI`
//! queue, so optimistic transactions race the way they do against a real
//! server. Only the commands the storage backend sends are implemented, and
//! sorted sets only support score 0.
//!
//! Tests can write to the keyspace behind a client's back with
//! [`FakeRedisServer::run`], schedule a write right before the next `EXEC`
//! with [`FakeRedisServer::before_next_exec`], or make the next exchange fail
//! with [`FakeRedisServer::fail_next_exchange`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::{Bytes, BytesMut};
use ent_core::{EntError, EntResult};
use ent_storage::redis::{parse_value, Command, RespValue};
use ent_storage::{RedisStorage, Transport};
use parking_lot::Mutex;
use tracing::{debug, trace};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    Str(Bytes),
    Hash(BTreeMap<Bytes, Bytes>),
    SortedSet(BTreeSet<Bytes>),
}

#[derive(Debug, Default)]
struct Keyspace {
    data: BTreeMap<Bytes, Value>,
    /// Bumped on every write to a key; `WATCH` compares these.
    versions: HashMap<Bytes, u64>,
    clock: u64,
}

type ExecHook = Box<dyn FnOnce(&FakeRedisServer) + Send>;

/// The shared state of a fake Redis.
#[derive(Clone, Default)]
pub struct FakeRedisServer {
    keyspace: Arc<Mutex<Keyspace>>,
    exec_hook: Arc<Mutex<Option<ExecHook>>>,
    fail_next: Arc<AtomicBool>,
}

impl fmt::Debug for FakeRedisServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeRedisServer")
            .field("keys", &self.keyspace.lock().data.len())
            .finish_non_exhaustive()
    }
}

impl FakeRedisServer {
    /// Creates an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new client connection.
    pub fn client(&self) -> FakeRedis {
        FakeRedis {
            server: self.clone(),
            watched: HashMap::new(),
            queue: None,
        }
    }

    /// Opens a storage on a new client connection.
    pub fn storage(&self) -> RedisStorage<FakeRedis> {
        RedisStorage::new(self.client())
    }

    /// Runs one command directly against the keyspace, outside any client.
    pub fn run(&self, cmd: Command) -> RespValue {
        self.keyspace.lock().apply(&cmd)
    }

    /// Returns every key, sorted.
    pub fn keys(&self) -> Vec<Bytes> {
        self.keyspace.lock().data.keys().cloned().collect()
    }

    /// Runs `hook` right before the next `EXEC` of any client is applied.
    pub fn before_next_exec(&self, hook: impl FnOnce(&FakeRedisServer) + Send + 'static) {
        *self.exec_hook.lock() = Some(Box::new(hook));
    }

    /// Makes the next exchange of any client fail as if the connection
    /// dropped.
    pub fn fail_next_exchange(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Serves the keyspace over TCP on an ephemeral local port, one thread
    /// per connection. Returns the bound address.
    pub fn listen(&self) -> io::Result<SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?;
        let server = self.clone();
        thread::spawn(move || {
            for conn in listener.incoming() {
                let Ok(conn) = conn else { break };
                let client = server.client();
                thread::spawn(move || {
                    if let Err(err) = serve(conn, client) {
                        debug!(error = %err, "fake redis connection closed");
                    }
                });
            }
        });
        debug!(%address, "fake redis listening");
        Ok(address)
    }
}

fn serve(mut conn: TcpStream, mut client: FakeRedis) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    loop {
        let n = conn.read(&mut chunk)?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut out = BytesMut::new();
        loop {
            let parsed =
                parse_value(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let Some((value, used)) = parsed else { break };
            let _ = buf.split_to(used);
            let reply = match Command::from_value(value) {
                Ok(cmd) => client.execute(cmd),
                Err(err) => RespValue::Error(format!("ERR {err}")),
            };
            reply.encode(&mut out);
        }
        if !out.is_empty() {
            conn.write_all(&out)?;
        }
    }
}

/// One client connection to a [`FakeRedisServer`].
pub struct FakeRedis {
    server: FakeRedisServer,
    /// Key versions seen at `WATCH`.
    watched: HashMap<Bytes, u64>,
    /// Commands queued since `MULTI`.
    queue: Option<Vec<Command>>,
}

impl fmt::Debug for FakeRedis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeRedis")
            .field("watched", &self.watched.len())
            .field("in_multi", &self.queue.is_some())
            .finish()
    }
}

impl FakeRedis {
    /// Executes one command the way a server would for this connection.
    pub fn execute(&mut self, cmd: Command) -> RespValue {
        let name = String::from_utf8_lossy(cmd.name()).to_ascii_uppercase();
        trace!(command = %cmd, "fake redis");

        if let Some(queue) = self.queue.as_mut() {
            match name.as_str() {
                "EXEC" | "DISCARD" => {}
                "MULTI" => return RespValue::Error("ERR MULTI calls can not be nested".into()),
                "WATCH" => return RespValue::Error("ERR WATCH inside MULTI is not allowed".into()),
                _ => {
                    queue.push(cmd);
                    return RespValue::Simple("QUEUED".into());
                }
            }
        }

        match name.as_str() {
            "MULTI" => {
                self.queue = Some(Vec::new());
                RespValue::ok()
            }
            "EXEC" => self.exec(),
            "DISCARD" => match self.queue.take() {
                Some(_) => {
                    self.watched.clear();
                    RespValue::ok()
                }
                None => RespValue::Error("ERR DISCARD without MULTI".into()),
            },
            "WATCH" => {
                if cmd.args().len() < 2 {
                    return wrong_args("watch");
                }
                let keyspace = self.server.keyspace.lock();
                for key in &cmd.args()[1..] {
                    let version = keyspace.version(key);
                    self.watched.entry(key.clone()).or_insert(version);
                }
                RespValue::ok()
            }
            "UNWATCH" => {
                self.watched.clear();
                RespValue::ok()
            }
            _ => self.server.keyspace.lock().apply(&cmd),
        }
    }

    fn exec(&mut self) -> RespValue {
        let Some(queue) = self.queue.take() else {
            return RespValue::Error("ERR EXEC without MULTI".into());
        };
        let hook = self.server.exec_hook.lock().take();
        if let Some(hook) = hook {
            hook(&self.server);
        }

        let mut keyspace = self.server.keyspace.lock();
        let watched = std::mem::take(&mut self.watched);
        let touched = watched
            .iter()
            .any(|(key, &version)| keyspace.version(key) != version);
        if touched {
            debug!("fake redis EXEC aborted");
            return RespValue::Array(None);
        }
        let replies: Vec<RespValue> = queue.iter().map(|cmd| keyspace.apply(cmd)).collect();
        RespValue::Array(Some(replies))
    }
}

impl Transport for FakeRedis {
    fn exchange(&mut self, commands: &[Command]) -> EntResult<Vec<RespValue>> {
        if self.server.fail_next.swap(false, Ordering::SeqCst) {
            // A dropped connection forgets its transaction state.
            self.watched.clear();
            self.queue = None;
            return Err(EntError::backend("fake redis: connection reset"));
        }
        Ok(commands.iter().map(|cmd| self.execute(cmd.clone())).collect())
    }
}

impl Keyspace {
    fn version(&self, key: &[u8]) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &Bytes) {
        self.clock += 1;
        self.versions.insert(key.clone(), self.clock);
    }

    fn apply(&mut self, cmd: &Command) -> RespValue {
        let args = cmd.args();
        let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
        let argv = &args[1..];
        let result = match name.as_str() {
            "PING" => Ok(RespValue::Simple("PONG".into())),
            "GET" => self.get(argv),
            "SET" => self.set(argv, false),
            "SETNX" => self.set(argv, true),
            "DEL" => Ok(self.del(argv)),
            "HSET" => self.hset(argv),
            "HGETALL" => self.hgetall(argv),
            "HMGET" => self.hmget(argv),
            "HINCRBY" => self.hincrby(argv),
            "ZADD" => self.zadd(argv),
            "ZREM" => self.zrem(argv),
            "ZRANGEBYLEX" => self.zrange_by_lex(argv, false),
            "ZREVRANGEBYLEX" => self.zrange_by_lex(argv, true),
            "SCAN" => self.scan(argv),
            _ => Err(format!("ERR unknown command '{name}'")),
        };
        result.unwrap_or_else(RespValue::Error)
    }

    fn get(&self, argv: &[Bytes]) -> Result<RespValue, String> {
        let [key] = argv else {
            return Err(arity("get"));
        };
        match self.data.get(key) {
            None => Ok(RespValue::NIL),
            Some(Value::Str(v)) => Ok(RespValue::Bulk(Some(v.clone()))),
            Some(_) => Err(WRONGTYPE.into()),
        }
    }

    fn set(&mut self, argv: &[Bytes], only_new: bool) -> Result<RespValue, String> {
        let [key, value] = argv else {
            return Err(arity(if only_new { "setnx" } else { "set" }));
        };
        if only_new && self.data.contains_key(key) {
            return Ok(RespValue::Integer(0));
        }
        self.data.insert(key.clone(), Value::Str(value.clone()));
        self.touch(key);
        Ok(if only_new { RespValue::Integer(1) } else { RespValue::ok() })
    }

    fn del(&mut self, argv: &[Bytes]) -> RespValue {
        let mut removed = 0;
        for key in argv {
            if self.data.remove(key).is_some() {
                self.touch(key);
                removed += 1;
            }
        }
        RespValue::Integer(removed)
    }

    fn hash_mut(&mut self, key: &Bytes) -> Result<&mut BTreeMap<Bytes, Bytes>, String> {
        let value = self
            .data
            .entry(key.clone())
            .or_insert_with(|| Value::Hash(BTreeMap::new()));
        match value {
            Value::Hash(h) => Ok(h),
            _ => Err(WRONGTYPE.into()),
        }
    }

    fn hash(&self, key: &[u8]) -> Result<Option<&BTreeMap<Bytes, Bytes>>, String> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(WRONGTYPE.into()),
        }
    }

    fn hset(&mut self, argv: &[Bytes]) -> Result<RespValue, String> {
        if argv.len() < 3 || argv.len() % 2 == 0 {
            return Err(arity("hset"));
        }
        let key = &argv[0];
        let hash = self.hash_mut(key)?;
        let mut added = 0;
        for pair in argv[1..].chunks(2) {
            if hash.insert(pair[0].clone(), pair[1].clone()).is_none() {
                added += 1;
            }
        }
        self.touch(key);
        Ok(RespValue::Integer(added))
    }

    fn hgetall(&self, argv: &[Bytes]) -> Result<RespValue, String> {
        let [key] = argv else {
            return Err(arity("hgetall"));
        };
        let items: Vec<RespValue> = self
            .hash(key)?
            .map(|h| {
                h.iter()
                    .flat_map(|(f, v)| [RespValue::Bulk(Some(f.clone())), RespValue::Bulk(Some(v.clone()))])
                    .collect()
            })
            .unwrap_or_default();
        Ok(RespValue::Array(Some(items)))
    }

    fn hmget(&self, argv: &[Bytes]) -> Result<RespValue, String> {
        let Some((key, fields)) = argv.split_first().filter(|(_, f)| !f.is_empty()) else {
            return Err(arity("hmget"));
        };
        let hash = self.hash(key)?;
        let items: Vec<RespValue> = fields
            .iter()
            .map(|f| RespValue::Bulk(hash.and_then(|h| h.get(f)).cloned()))
            .collect();
        Ok(RespValue::Array(Some(items)))
    }

    fn hincrby(&mut self, argv: &[Bytes]) -> Result<RespValue, String> {
        let [key, field, by] = argv else {
            return Err(arity("hincrby"));
        };
        let by = parse_i64(by)?;
        let hash = self.hash_mut(key)?;
        let current = match hash.get(field) {
            Some(v) => parse_i64(v)?,
            None => 0,
        };
        let next = current
            .checked_add(by)
            .ok_or_else(|| "ERR increment or decrement would overflow".to_string())?;
        hash.insert(field.clone(), Bytes::from(next.to_string()));
        self.touch(key);
        Ok(RespValue::Integer(next))
    }

    fn sorted_set_mut(&mut self, key: &Bytes) -> Result<&mut BTreeSet<Bytes>, String> {
        let value = self
            .data
            .entry(key.clone())
            .or_insert_with(|| Value::SortedSet(BTreeSet::new()));
        match value {
            Value::SortedSet(z) => Ok(z),
            _ => Err(WRONGTYPE.into()),
        }
    }

    fn zadd(&mut self, argv: &[Bytes]) -> Result<RespValue, String> {
        if argv.len() < 3 || argv.len() % 2 == 0 {
            return Err(arity("zadd"));
        }
        let key = &argv[0];
        for pair in argv[1..].chunks(2) {
            if &pair[0][..] != b"0" {
                return Err("ERR fake redis only supports score 0".into());
            }
        }
        let set = self.sorted_set_mut(key)?;
        let mut added = 0;
        for pair in argv[1..].chunks(2) {
            if set.insert(pair[1].clone()) {
                added += 1;
            }
        }
        self.touch(key);
        Ok(RespValue::Integer(added))
    }

    fn zrem(&mut self, argv: &[Bytes]) -> Result<RespValue, String> {
        let Some((key, members)) = argv.split_first().filter(|(_, m)| !m.is_empty()) else {
            return Err(arity("zrem"));
        };
        let set = match self.data.get_mut(key) {
            None => return Ok(RespValue::Integer(0)),
            Some(Value::SortedSet(z)) => z,
            Some(_) => return Err(WRONGTYPE.into()),
        };
        let removed = members.iter().filter(|m| set.remove(*m)).count();
        let now_empty = set.is_empty();
        if now_empty {
            self.data.remove(key);
        }
        if removed > 0 {
            self.touch(key);
        }
        Ok(RespValue::Integer(removed as i64))
    }

    fn zrange_by_lex(&self, argv: &[Bytes], reverse: bool) -> Result<RespValue, String> {
        let cmd = if reverse { "zrevrangebylex" } else { "zrangebylex" };
        if argv.len() != 3 && argv.len() != 6 {
            return Err(arity(cmd));
        }
        // The reverse form takes the upper bound first.
        let (lo, hi) = if reverse { (&argv[2], &argv[1]) } else { (&argv[1], &argv[2]) };
        let lo = parse_lex_bound(lo)?;
        let hi = parse_lex_bound(hi)?;
        let (offset, count) = if argv.len() == 6 {
            if !argv[3].eq_ignore_ascii_case(b"LIMIT") {
                return Err("ERR syntax error".into());
            }
            let offset = usize::try_from(parse_i64(&argv[4])?).unwrap_or(0);
            let count = usize::try_from(parse_i64(&argv[5])?).unwrap_or(usize::MAX);
            (offset, count)
        } else {
            (0, usize::MAX)
        };

        let members: Vec<&Bytes> = match self.data.get(&argv[0]) {
            None => Vec::new(),
            Some(Value::SortedSet(z)) => z
                .iter()
                .filter(|m| above(m, &lo) && below(m, &hi))
                .collect(),
            Some(_) => return Err(WRONGTYPE.into()),
        };
        let ordered: Box<dyn Iterator<Item = &Bytes>> = if reverse {
            Box::new(members.into_iter().rev())
        } else {
            Box::new(members.into_iter())
        };
        let items: Vec<RespValue> = ordered
            .skip(offset)
            .take(count)
            .map(|m| RespValue::Bulk(Some(m.clone())))
            .collect();
        Ok(RespValue::Array(Some(items)))
    }

    fn scan(&self, argv: &[Bytes]) -> Result<RespValue, String> {
        let Some((cursor, opts)) = argv.split_first() else {
            return Err(arity("scan"));
        };
        let cursor = usize::try_from(parse_i64(cursor)?).map_err(|_| "ERR invalid cursor".to_string())?;
        let mut pattern: Option<&[u8]> = None;
        let mut count = 10usize;
        let mut opts = opts.iter();
        while let Some(opt) = opts.next() {
            let value = opts.next().ok_or_else(|| "ERR syntax error".to_string())?;
            if opt.eq_ignore_ascii_case(b"MATCH") {
                pattern = Some(&value[..]);
            } else if opt.eq_ignore_ascii_case(b"COUNT") {
                count = usize::try_from(parse_i64(value)?).unwrap_or(1).max(1);
            } else {
                return Err("ERR syntax error".into());
            }
        }

        // The cursor is a position in key order.
        let page: Vec<&Bytes> = self.data.keys().skip(cursor).take(count).collect();
        let next = if cursor + page.len() >= self.data.len() {
            0
        } else {
            cursor + page.len()
        };
        let keys: Vec<RespValue> = page
            .into_iter()
            .filter(|k| pattern.map_or(true, |p| glob_match(p, k)))
            .map(|k| RespValue::Bulk(Some(k.clone())))
            .collect();
        Ok(RespValue::Array(Some(vec![
            RespValue::Bulk(Some(Bytes::from(next.to_string()))),
            RespValue::Array(Some(keys)),
        ])))
    }
}

fn arity(cmd: &str) -> String {
    format!("ERR wrong number of arguments for '{cmd}' command")
}

fn wrong_args(cmd: &str) -> RespValue {
    RespValue::Error(arity(cmd))
}

fn parse_i64(data: &[u8]) -> Result<i64, String> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| "ERR value is not an integer or out of range".to_string())
}

fn parse_lex_bound(data: &[u8]) -> Result<Bound<Bytes>, String> {
    match data.first() {
        Some(b'-') | Some(b'+') if data.len() == 1 => Ok(Bound::Unbounded),
        Some(b'[') => Ok(Bound::Included(Bytes::copy_from_slice(&data[1..]))),
        Some(b'(') => Ok(Bound::Excluded(Bytes::copy_from_slice(&data[1..]))),
        _ => Err("ERR min or max not valid string range item".into()),
    }
}

fn above(member: &Bytes, lo: &Bound<Bytes>) -> bool {
    match lo {
        Bound::Unbounded => true,
        Bound::Included(b) => member >= b,
        Bound::Excluded(b) => member > b,
    }
}

fn below(member: &Bytes, hi: &Bound<Bytes>) -> bool {
    match hi {
        Bound::Unbounded => true,
        Bound::Included(b) => member <= b,
        Bound::Excluded(b) => member < b,
    }
}

/// Matches `*` wildcards only.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.iter().position(|&c| c == b'*') {
        None => pattern == text,
        Some(star) => {
            let (head, tail) = (&pattern[..star], &pattern[star + 1..]);
            if !text.starts_with(head) {
                return false;
            }
            let rest = &text[head.len()..];
            (0..=rest.len()).any(|i| glob_match(tail, &rest[i..]))
        }
    }
}
