//! Byte transports carrying RESP exchanges.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;

use bytes::{Buf, BytesMut};
use ent_core::{EntError, EntResult};
use tracing::{debug, warn};

use super::config::RedisConfig;
use super::resp::{parse_value, Command, FrameScanner, RespValue};

/// One connection to a Redis server.
///
/// Connection state (`WATCH`, `MULTI`) belongs to the connection, so a
/// transport is used by one caller at a time.
pub trait Transport: Send {
    /// Sends `commands` as one pipelined batch and returns one reply per
    /// command, in order. Error replies are returned as
    /// [`RespValue::Error`]; only I/O and protocol failures are `Err`.
    fn exchange(&mut self, commands: &[Command]) -> EntResult<Vec<RespValue>>;
}

/// A [`Transport`] over TCP.
///
/// A failed exchange drops the connection; the next exchange reconnects,
/// trying `connect_attempts` times with a fixed pause in between.
#[derive(Debug)]
pub struct TcpTransport {
    config: RedisConfig,
    stream: Option<TcpStream>,
    read_buf: BytesMut,
}

impl TcpTransport {
    /// Connects to the server named in `config`.
    pub fn connect(config: RedisConfig) -> EntResult<Self> {
        let mut transport = Self {
            config,
            stream: None,
            read_buf: BytesMut::with_capacity(4096),
        };
        transport.ensure_connected()?;
        Ok(transport)
    }

    /// Returns true while a connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn ensure_connected(&mut self) -> EntResult<&mut TcpStream> {
        if self.stream.is_none() {
            self.stream = Some(self.dial()?);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| EntError::backend("redis connection unavailable"))
    }

    fn dial(&self) -> EntResult<TcpStream> {
        let attempts = self.config.connect_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match TcpStream::connect(&self.config.address) {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(io_error)?;
                    stream
                        .set_read_timeout(self.config.io_timeout)
                        .map_err(io_error)?;
                    stream
                        .set_write_timeout(self.config.io_timeout)
                        .map_err(io_error)?;
                    debug!(address = %self.config.address, "connected to redis");
                    return Ok(stream);
                }
                Err(err) => {
                    warn!(
                        address = %self.config.address,
                        attempt,
                        attempts,
                        error = %err,
                        "redis connect failed"
                    );
                    last_err = Some(err);
                    if attempt < attempts {
                        thread::sleep(self.config.retry_backoff);
                    }
                }
            }
        }
        Err(last_err.map_or_else(|| EntError::backend("redis connect failed"), io_error))
    }

    fn round_trip(&mut self, commands: &[Command]) -> EntResult<Vec<RespValue>> {
        let mut out = BytesMut::new();
        for cmd in commands {
            cmd.encode(&mut out);
        }
        let stream = self.ensure_connected()?;
        stream.write_all(&out).map_err(io_error)?;
        stream.flush().map_err(io_error)?;

        let mut replies = Vec::with_capacity(commands.len());
        let mut scanner = FrameScanner::default();
        let mut chunk = [0u8; 16 * 1024];
        while replies.len() < commands.len() {
            match scanner.scan(&self.read_buf)? {
                Some(len) => {
                    let (value, used) = parse_value(&self.read_buf[..len])?
                        .ok_or_else(|| EntError::backend("truncated redis reply"))?;
                    self.read_buf.advance(used);
                    replies.push(value);
                }
                None => {
                    let stream = self
                        .stream
                        .as_mut()
                        .ok_or_else(|| EntError::backend("redis connection unavailable"))?;
                    let n = stream.read(&mut chunk).map_err(io_error)?;
                    if n == 0 {
                        return Err(EntError::backend("redis closed the connection"));
                    }
                    self.read_buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
        Ok(replies)
    }
}

impl Transport for TcpTransport {
    fn exchange(&mut self, commands: &[Command]) -> EntResult<Vec<RespValue>> {
        let result = self.round_trip(commands);
        if result.is_err() {
            // The stream may hold half a reply; start over on a fresh one.
            self.stream = None;
            self.read_buf.clear();
        }
        result
    }
}

fn io_error(err: std::io::Error) -> EntError {
    EntError::backend(format!("redis i/o: {err}"))
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::Duration;

    use super::*;

    #[test]
    fn tcp_connect_refused_gives_up() {
        // Bind and drop to find a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = RedisConfig::new(format!("127.0.0.1:{port}"))
            .with_connect_attempts(2)
            .with_retry_backoff(Duration::from_millis(1));
        let err = TcpTransport::connect(config).unwrap_err();
        assert!(matches!(err, EntError::Backend { .. }));
    }

    #[test]
    fn tcp_pipelined_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            let mut buf = [0u8; 256];
            // Two commands: "*1\r\n$4\r\nPING\r\n" twice.
            while seen.len() < 28 {
                let n = conn.read(&mut buf).unwrap();
                seen.extend_from_slice(&buf[..n]);
            }
            // Reply split across writes.
            conn.write_all(b"+PONG\r\n$3\r\nab").unwrap();
            conn.flush().unwrap();
            thread::sleep(Duration::from_millis(10));
            conn.write_all(b"c\r\n").unwrap();
            seen
        });

        let mut transport = TcpTransport::connect(RedisConfig::new(address)).unwrap();
        let ping = Command::new("PING");
        let replies = transport.exchange(&[ping.clone(), ping]).unwrap();
        assert_eq!(
            replies,
            vec![RespValue::Simple("PONG".into()), RespValue::bulk(&b"abc"[..])]
        );
        assert_eq!(server.join().unwrap(), b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn tcp_large_reply_in_small_writes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let payload = vec![b'v'; 200_000];
        let reply = RespValue::Array(Some(vec![
            RespValue::bulk(&b"body"[..]),
            RespValue::bulk(payload),
        ]));
        let mut wire = BytesMut::new();
        reply.encode(&mut wire);
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = [0u8; 256];
            assert!(conn.read(&mut buf).unwrap() > 0);
            for piece in wire.chunks(1000) {
                conn.write_all(piece).unwrap();
            }
            conn.write_all(b"+OK\r\n").unwrap();
        });

        let mut transport = TcpTransport::connect(RedisConfig::new(address)).unwrap();
        let replies = transport
            .exchange(&[Command::new("HGETALL").arg("post:1"), Command::new("PING")])
            .unwrap();
        server.join().unwrap();
        assert_eq!(replies, vec![reply, RespValue::Simple("OK".into())]);
        assert!(transport.read_buf.is_empty());
    }
}
