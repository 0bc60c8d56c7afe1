//! # ent codec
//!
//! The storage-neutral encode/decode protocol for ents.
//!
//! Every wire format (the JSON payload format, the index-key format, a
//! key-value store's hash format) implements the [`Encoder`] and [`Decoder`]
//! traits. Per-type glue code drives them field by field, so a new wire
//! format needs no changes to entity types.
//!
//! ## Usage
//!
//! ```
//! use ent_codec::{encode_json_ent, Decoder, JsonDecoder};
//!
//! let data = encode_json_ent(1, 1, |c| {
//!     c.key("name");
//!     c.str("bob");
//! })
//! .unwrap();
//!
//! let mut c = JsonDecoder::new(&data);
//! assert_eq!(c.dict_header(), -1);
//! let mut name = String::new();
//! loop {
//!     match c.key().as_str() {
//!         "" => break,
//!         "name" => name = c.str(),
//!         _ => c.discard(),
//!     }
//! }
//! assert!(c.err().is_none());
//! assert_eq!(name, "bob");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod decoder;
mod encoder;
mod error;
pub mod number;
mod protocol;

pub use buffer::Buffer;
pub use decoder::JsonDecoder;
pub use encoder::{encode_json_ent, JsonEncoder};
pub use error::{CodecError, CodecResult};
pub use protocol::{decode_dict, decode_list, encode_dict, encode_list, Decoder, Encoder};

/// Reserved payload field holding the entity id.
pub const FIELD_NAME_ID: &str = "_id";

/// Reserved payload field holding the entity version.
pub const FIELD_NAME_VERSION: &str = "_ver";
