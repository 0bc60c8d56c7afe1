//! JSON payload decoder.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;

use crate::error::CodecError;
use crate::number::{check_int_width, check_uint_width};
use crate::protocol::Decoder;

enum Frame {
    Object(serde_json::map::IntoIter),
    Array(std::vec::IntoIter<Value>),
}

/// Decodes JSON written by [`crate::JsonEncoder`].
///
/// The input is parsed up front; the decoder then walks the document one
/// value at a time. Lists and dicts always report an unknown length (`-1`),
/// so callers iterate with [`Decoder::more`] and [`Decoder::key`].
pub struct JsonDecoder {
    pending: Option<Value>,
    frames: Vec<Frame>,
    err: Option<CodecError>,
}

impl std::fmt::Debug for JsonDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonDecoder")
            .field("depth", &self.frames.len())
            .field("err", &self.err)
            .finish()
    }
}

impl JsonDecoder {
    /// Parses `data` and positions the decoder before the root value.
    ///
    /// Malformed JSON puts the decoder straight into the error state.
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(data) {
            Ok(root) => Self::from_value(root),
            Err(err) => Self {
                pending: None,
                frames: Vec::new(),
                err: Some(err.into()),
            },
        }
    }

    /// Positions a decoder before an already parsed value.
    #[must_use]
    pub fn from_value(root: Value) -> Self {
        Self {
            pending: Some(root),
            frames: Vec::new(),
            err: None,
        }
    }

    /// Returns the first error, consuming the decoder.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn set_err(&mut self, err: CodecError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    fn take(&mut self, expected: &'static str) -> Option<Value> {
        if self.err.is_some() {
            return None;
        }
        let value = self.pending.take();
        if value.is_none() {
            self.set_err(CodecError::decoding_failed(format!(
                "expected {expected}, no value pending"
            )));
        }
        value
    }

    fn mismatch(&mut self, expected: &'static str, found: &Value) {
        self.set_err(CodecError::type_mismatch(expected, kind_of(found)));
    }

    fn open(&mut self, expected: &'static str) -> i64 {
        match self.take(expected) {
            Some(Value::Object(map)) if expected == "object" => {
                self.frames.push(Frame::Object(map.into_iter()));
                -1
            }
            Some(Value::Array(items)) if expected == "array" => {
                self.frames.push(Frame::Array(items.into_iter()));
                -1
            }
            Some(Value::Null) | None => 0,
            Some(other) => {
                self.mismatch(expected, &other);
                0
            }
        }
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Decoder for JsonDecoder {
    fn key(&mut self) -> String {
        if self.err.is_some() {
            return String::new();
        }
        match self.frames.last_mut() {
            Some(Frame::Object(entries)) => match entries.next() {
                Some((k, v)) => {
                    self.pending = Some(v);
                    k
                }
                None => {
                    self.frames.pop();
                    String::new()
                }
            },
            _ => {
                self.set_err(CodecError::decoding_failed("key read outside of an object"));
                String::new()
            }
        }
    }

    fn str(&mut self) -> String {
        match self.take("string") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => {
                self.mismatch("string", &other);
                String::new()
            }
        }
    }

    fn blob(&mut self) -> Vec<u8> {
        match self.take("blob") {
            Some(Value::String(s)) => match BASE64.decode(s.as_bytes()) {
                Ok(bytes) => bytes,
                Err(err) => {
                    self.set_err(CodecError::decoding_failed(format!("invalid base64: {err}")));
                    Vec::new()
                }
            },
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                self.mismatch("blob", &other);
                Vec::new()
            }
        }
    }

    fn int(&mut self, bitsize: u32) -> i64 {
        match self.take("integer") {
            Some(Value::Number(n)) => match n.as_i64() {
                Some(v) => check_int_width(v, bitsize).unwrap_or_else(|err| {
                    self.set_err(err);
                    0
                }),
                None => {
                    self.set_err(CodecError::integer_overflow(n, bitsize));
                    0
                }
            },
            Some(Value::Null) | None => 0,
            Some(other) => {
                self.mismatch("integer", &other);
                0
            }
        }
    }

    fn uint(&mut self, bitsize: u32) -> u64 {
        match self.take("unsigned integer") {
            Some(Value::Number(n)) => match n.as_u64() {
                Some(v) => check_uint_width(v, bitsize).unwrap_or_else(|err| {
                    self.set_err(err);
                    0
                }),
                None => {
                    self.set_err(CodecError::integer_overflow(n, bitsize));
                    0
                }
            },
            Some(Value::Null) | None => 0,
            Some(other) => {
                self.mismatch("unsigned integer", &other);
                0
            }
        }
    }

    fn float(&mut self, bitsize: u32) -> f64 {
        match self.take("float") {
            Some(Value::Number(n)) => {
                let v = n.as_f64().unwrap_or(0.0);
                if bitsize == 32 {
                    f64::from(v as f32)
                } else {
                    v
                }
            }
            Some(Value::Null) | None => 0.0,
            Some(other) => {
                self.mismatch("float", &other);
                0.0
            }
        }
    }

    fn bool(&mut self) -> bool {
        match self.take("bool") {
            Some(Value::Bool(b)) => b,
            Some(Value::Null) | None => false,
            Some(other) => {
                self.mismatch("bool", &other);
                false
            }
        }
    }

    fn list_header(&mut self) -> i64 {
        self.open("array")
    }

    fn dict_header(&mut self) -> i64 {
        self.open("object")
    }

    fn more(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        match self.frames.last_mut() {
            Some(Frame::Array(items)) => match items.next() {
                Some(v) => {
                    self.pending = Some(v);
                    true
                }
                None => {
                    self.frames.pop();
                    false
                }
            },
            _ => {
                self.set_err(CodecError::decoding_failed("more() called outside of a list"));
                false
            }
        }
    }

    fn discard(&mut self) {
        self.pending = None;
    }

    fn err(&self) -> Option<&CodecError> {
        self.err.as_ref()
    }
}
