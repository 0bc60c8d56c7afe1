//! The Redis backend.
//!
//! - [`resp`]: the RESP wire format
//! - [`Transport`]: pipelined command exchange, over TCP or in-process
//! - [`HashEncoder`] / [`HashDecoder`]: entities as hash fields
//! - [`RedisStorage`]: the [`ent_core::Storage`] implementation

mod codec;
mod config;
pub mod resp;
mod storage;
mod transport;

pub use codec::{HashDecoder, HashEncoder};
pub use config::RedisConfig;
pub use resp::{parse_value, Command, RespError, RespValue};
pub use storage::RedisStorage;
pub use transport::{TcpTransport, Transport};
