//! RESP, the Redis wire protocol.
//!
//! Commands are always sent as arrays of bulk strings. Replies are parsed
//! incrementally: [`parse_value`] returns `None` until a whole value is
//! buffered.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors raised while parsing RESP data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RespError {
    /// The input does not follow the protocol.
    #[error("malformed resp: {message}")]
    Malformed {
        /// What was wrong.
        message: String,
    },

    /// A reply had a different shape than the command calls for.
    #[error("unexpected reply to {command}: {found}")]
    UnexpectedReply {
        /// The command that was answered.
        command: String,
        /// Description of the reply.
        found: String,
    },

    /// The server answered with an error reply.
    #[error("redis: {0}")]
    Server(String),
}

impl RespError {
    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an unexpected-reply error.
    pub fn unexpected(command: impl Into<String>, found: &RespValue) -> Self {
        Self::UnexpectedReply {
            command: command.into(),
            found: found.describe(),
        }
    }
}

impl From<RespError> for ent_core::EntError {
    fn from(err: RespError) -> Self {
        ent_core::EntError::backend(err.to_string())
    }
}

/// One RESP value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+OK`
    Simple(String),
    /// `-ERR message`
    Error(String),
    /// `:123`
    Integer(i64),
    /// `$3 foo`, or `$-1` (nil) as `None`
    Bulk(Option<Bytes>),
    /// `*2 ...`, or `*-1` (nil) as `None`
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// A bulk string holding `data`.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Self::Bulk(Some(data.into()))
    }

    /// The nil bulk string.
    pub const NIL: Self = Self::Bulk(None);

    /// `+OK`
    pub fn ok() -> Self {
        Self::Simple("OK".to_string())
    }

    /// Returns true for nil bulk strings and nil arrays.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Bulk(None) | Self::Array(None))
    }

    /// Turns an error reply into `Err`.
    pub fn into_result(self) -> Result<Self, RespError> {
        match self {
            Self::Error(message) => Err(RespError::Server(message)),
            other => Ok(other),
        }
    }

    /// Returns the content of a string reply; nil is `None`.
    pub fn into_bytes(self, command: &str) -> Result<Option<Bytes>, RespError> {
        match self.into_result()? {
            Self::Bulk(data) => Ok(data),
            Self::Simple(s) => Ok(Some(Bytes::from(s))),
            other => Err(RespError::unexpected(command, &other)),
        }
    }

    /// Returns the value of an integer reply.
    pub fn into_integer(self, command: &str) -> Result<i64, RespError> {
        match self.into_result()? {
            Self::Integer(n) => Ok(n),
            other => Err(RespError::unexpected(command, &other)),
        }
    }

    /// Returns the elements of an array reply; nil is `None`.
    pub fn into_array(self, command: &str) -> Result<Option<Vec<RespValue>>, RespError> {
        match self.into_result()? {
            Self::Array(items) => Ok(items),
            other => Err(RespError::unexpected(command, &other)),
        }
    }

    /// Appends the wire form of the value to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Simple(s) => put_line(buf, b'+', s.as_bytes()),
            Self::Error(s) => put_line(buf, b'-', s.as_bytes()),
            Self::Integer(n) => put_line(buf, b':', n.to_string().as_bytes()),
            Self::Bulk(None) => buf.put_slice(b"$-1\r\n"),
            Self::Bulk(Some(data)) => put_bulk(buf, data),
            Self::Array(None) => buf.put_slice(b"*-1\r\n"),
            Self::Array(Some(items)) => {
                put_line(buf, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Simple(s) => format!("simple string {s:?}"),
            Self::Error(s) => format!("error {s:?}"),
            Self::Integer(n) => format!("integer {n}"),
            Self::Bulk(None) | Self::Array(None) => "nil".to_string(),
            Self::Bulk(Some(data)) => format!("bulk string of {} bytes", data.len()),
            Self::Array(Some(items)) => format!("array of {} values", items.len()),
        }
    }
}

/// A command: an array of bulk strings, the first naming the command.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Starts a command named `name`.
    pub fn new(name: &str) -> Self {
        Self {
            args: vec![Bytes::copy_from_slice(name.as_bytes())],
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.push(arg);
        self
    }

    /// Appends an argument in place.
    pub fn push(&mut self, arg: impl AsRef<[u8]>) {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
    }

    /// The command name.
    #[must_use]
    pub fn name(&self) -> &[u8] {
        &self.args[0]
    }

    /// All arguments, the name included.
    #[must_use]
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Appends the wire form of the command to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        put_line(buf, b'*', self.args.len().to_string().as_bytes());
        for arg in &self.args {
            put_bulk(buf, arg);
        }
    }

    /// Reads a command from a parsed request array.
    pub fn from_value(value: RespValue) -> Result<Self, RespError> {
        let Some(items) = value.into_array("request")? else {
            return Err(RespError::malformed("nil request"));
        };
        let mut args = Vec::with_capacity(items.len());
        for item in items {
            match item {
                RespValue::Bulk(Some(data)) => args.push(data),
                other => {
                    return Err(RespError::malformed(format!(
                        "request argument is {}",
                        other.describe()
                    )))
                }
            }
        }
        if args.is_empty() {
            return Err(RespError::malformed("empty request"));
        }
        Ok(Self { args })
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for arg in &self.args {
            list.entry(&String::from_utf8_lossy(arg));
        }
        list.finish()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", arg.escape_ascii())?;
        }
        Ok(())
    }
}

fn put_line(buf: &mut BytesMut, prefix: u8, line: &[u8]) {
    buf.reserve(line.len() + 3);
    buf.put_u8(prefix);
    buf.put_slice(line);
    buf.put_slice(b"\r\n");
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    put_line(buf, b'$', data.len().to_string().as_bytes());
    buf.reserve(data.len() + 2);
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
}

/// Parses one value from the start of `buf`.
///
/// Returns the value and the number of bytes it occupies, or `None` if `buf`
/// does not yet hold a complete value.
pub fn parse_value(buf: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some((prefix, line, mut at)) = read_line(buf, 0)? else {
        return Ok(None);
    };
    let value = match prefix {
        b'+' => RespValue::Simple(String::from_utf8_lossy(line).into_owned()),
        b'-' => RespValue::Error(String::from_utf8_lossy(line).into_owned()),
        b':' => RespValue::Integer(parse_int(line)?),
        b'$' => {
            let len = parse_int(line)?;
            if len < 0 {
                RespValue::Bulk(None)
            } else {
                let len = len as usize;
                if buf.len() < at + len + 2 {
                    return Ok(None);
                }
                if &buf[at + len..at + len + 2] != b"\r\n" {
                    return Err(RespError::malformed("bulk string not terminated by CRLF"));
                }
                let data = Bytes::copy_from_slice(&buf[at..at + len]);
                at += len + 2;
                RespValue::Bulk(Some(data))
            }
        }
        b'*' => {
            let len = parse_int(line)?;
            if len < 0 {
                RespValue::Array(None)
            } else {
                let mut items = Vec::with_capacity(len.min(1024) as usize);
                for _ in 0..len {
                    match parse_value(&buf[at..])? {
                        Some((item, used)) => {
                            items.push(item);
                            at += used;
                        }
                        None => return Ok(None),
                    }
                }
                RespValue::Array(Some(items))
            }
        }
        other => {
            return Err(RespError::malformed(format!(
                "unknown type byte {:?}",
                char::from(other)
            )))
        }
    };
    Ok(Some((value, at)))
}

/// Finds the end of the first complete value in a buffer that grows between
/// calls, resuming where the previous call stopped instead of starting over.
///
/// Bulk payloads are skipped by length, never copied.
#[derive(Debug, Default)]
pub struct FrameScanner {
    at: usize,
    /// Items still missing from each array being walked, innermost last.
    open: Vec<i64>,
}

impl FrameScanner {
    /// Returns the byte length of the first complete value in `buf`, or
    /// `None` until enough bytes have arrived. `buf` must only be appended to
    /// between calls; the scanner resets after reporting a value.
    pub fn scan(&mut self, buf: &[u8]) -> Result<Option<usize>, RespError> {
        loop {
            let Some((prefix, line, next)) = read_line(buf, self.at)? else {
                return Ok(None);
            };
            let end = match prefix {
                b'+' | b'-' | b':' => next,
                b'$' => match parse_int(line)? {
                    len if len < 0 => next,
                    len => {
                        let end = next + len as usize + 2;
                        if buf.len() < end {
                            return Ok(None);
                        }
                        end
                    }
                },
                b'*' => match parse_int(line)? {
                    len if len > 0 => {
                        self.at = next;
                        self.open.push(len);
                        continue;
                    }
                    _ => next,
                },
                other => {
                    return Err(RespError::malformed(format!(
                        "unknown type byte {:?}",
                        char::from(other)
                    )))
                }
            };
            self.at = end;
            loop {
                match self.open.last_mut() {
                    None => {
                        self.at = 0;
                        return Ok(Some(end));
                    }
                    Some(left) if *left > 1 => {
                        *left -= 1;
                        break;
                    }
                    Some(_) => {
                        self.open.pop();
                    }
                }
            }
        }
    }
}

/// Splits off `prefix line\r\n` starting at `start`. Returns the prefix, the
/// line content and the offset just past the line.
fn read_line(buf: &[u8], start: usize) -> Result<Option<(u8, &[u8], usize)>, RespError> {
    let Some(&prefix) = buf.get(start) else {
        return Ok(None);
    };
    let rest = &buf[start + 1..];
    match rest.windows(2).position(|w| w == b"\r\n") {
        Some(end) => Ok(Some((prefix, &rest[..end], start + 1 + end + 2))),
        None => {
            if rest.contains(&b'\n') && !rest.contains(&b'\r') {
                return Err(RespError::malformed("line not terminated by CRLF"));
            }
            Ok(None)
        }
    }
}

fn parse_int(line: &[u8]) -> Result<i64, RespError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RespError::malformed(format!("invalid integer {:?}", line.escape_ascii().to_string())))
}

/// Parses every complete value in `buf`, returning them and the number of
/// bytes consumed.
pub fn parse_all(buf: &[u8]) -> Result<(Vec<RespValue>, usize), RespError> {
    let mut out = Vec::new();
    let mut at = 0;
    while let Some((value, used)) = parse_value(&buf[at..])? {
        out.push(value);
        at += used;
    }
    Ok((out, at))
}
