//! Entity fields as Redis hash fields.
//!
//! Every value is stored as a string: integers in decimal, floats in
//! JavaScript number form, bools as `1`/`0`, strings and blobs as-is. Lists
//! and dicts have no hash representation and are rejected.

use std::collections::VecDeque;

use bytes::Bytes;
use ent_codec::number::{check_int_width, check_uint_width, format_float, parse_float};
use ent_codec::{CodecError, CodecResult, Decoder, Encoder, FIELD_NAME_VERSION};

use super::resp::{Command, RespValue};

/// Builds an `HSET key field value ...` command from an entity.
#[derive(Debug)]
pub struct HashEncoder {
    cmd: Command,
    err: Option<CodecError>,
}

impl HashEncoder {
    /// Starts an `HSET` of hash `key`.
    pub fn new(key: &[u8]) -> Self {
        Self {
            cmd: Command::new("HSET").arg(key),
            err: None,
        }
    }

    /// Returns the finished command, or the first error hit.
    pub fn finish(self) -> CodecResult<Command> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(self.cmd),
        }
    }

    fn value(&mut self, v: impl AsRef<[u8]>) {
        if self.err.is_none() {
            self.cmd.push(v);
        }
    }

    fn fail(&mut self, err: CodecError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }
}

impl Encoder for HashEncoder {
    fn begin_ent(&mut self, version: u64) {
        self.value(FIELD_NAME_VERSION);
        self.value(version.to_string());
    }

    fn end_ent(&mut self) {}

    fn key(&mut self, name: &str) {
        self.value(name);
    }

    fn str(&mut self, v: &str) {
        self.value(v);
    }

    fn blob(&mut self, v: &[u8]) {
        self.value(v);
    }

    fn int(&mut self, v: i64, _bitsize: u32) {
        self.value(v.to_string());
    }

    fn uint(&mut self, v: u64, _bitsize: u32) {
        self.value(v.to_string());
    }

    fn float(&mut self, v: f64, bitsize: u32) {
        match format_float(v, bitsize) {
            Ok(text) => self.value(text),
            Err(err) => self.fail(err),
        }
    }

    fn bool(&mut self, v: bool) {
        self.value(if v { "1" } else { "0" });
    }

    fn begin_list(&mut self, _len: usize) {
        self.fail(CodecError::encoding_failed("nested lists are not supported"));
    }

    fn end_list(&mut self) {}

    fn begin_dict(&mut self, _len: usize) {
        self.fail(CodecError::encoding_failed("nested dicts are not supported"));
    }

    fn end_dict(&mut self) {}

    fn err(&self) -> Option<&CodecError> {
        self.err.as_ref()
    }
}

/// Reads hash fields back into an entity.
///
/// Built either from an `HGETALL` reply (field and value interleaved) or
/// from an `HMGET` reply together with the requested field names. Missing
/// (nil) values decode as zero values.
#[derive(Debug)]
pub struct HashDecoder {
    pairs: VecDeque<(String, Option<Bytes>)>,
    pending: Option<Bytes>,
    err: Option<CodecError>,
}

impl HashDecoder {
    /// Reads the reply of `HGETALL`. An empty reply yields no fields.
    pub fn from_pairs(items: Vec<RespValue>) -> CodecResult<Self> {
        if items.len() % 2 != 0 {
            return Err(CodecError::decoding_failed(format!(
                "hash reply has an odd number ({}) of values",
                items.len()
            )));
        }
        let mut pairs = VecDeque::with_capacity(items.len() / 2);
        let mut items = items.into_iter();
        while let (Some(name), Some(value)) = (items.next(), items.next()) {
            let name = bulk(name)?.unwrap_or_default();
            let name = String::from_utf8(name.to_vec())
                .map_err(|_| CodecError::decoding_failed("hash field name is not utf-8"))?;
            pairs.push_back((name, bulk(value)?));
        }
        Ok(Self::with_pairs(pairs))
    }

    /// Reads the reply of `HMGET key names...`.
    pub fn from_fields(names: &[&str], items: Vec<RespValue>) -> CodecResult<Self> {
        if items.len() != names.len() {
            return Err(CodecError::decoding_failed(format!(
                "expected {} hash values, got {}",
                names.len(),
                items.len()
            )));
        }
        let mut pairs = VecDeque::with_capacity(names.len());
        for (name, value) in names.iter().zip(items) {
            pairs.push_back(((*name).to_string(), bulk(value)?));
        }
        Ok(Self::with_pairs(pairs))
    }

    fn with_pairs(pairs: VecDeque<(String, Option<Bytes>)>) -> Self {
        Self {
            pairs,
            pending: None,
            err: None,
        }
    }

    /// Returns the first error hit, if any.
    pub fn finish(self) -> CodecResult<()> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fail(&mut self, err: CodecError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    fn take_text(&mut self) -> Option<String> {
        let data = self.pending.take()?;
        match String::from_utf8(data.to_vec()) {
            Ok(text) => Some(text),
            Err(_) => {
                self.fail(CodecError::decoding_failed("hash value is not utf-8"));
                None
            }
        }
    }
}

fn bulk(value: RespValue) -> CodecResult<Option<Bytes>> {
    match value {
        RespValue::Bulk(data) => Ok(data),
        RespValue::Simple(s) => Ok(Some(Bytes::from(s))),
        RespValue::Integer(n) => Ok(Some(Bytes::from(n.to_string()))),
        other => Err(CodecError::type_mismatch("string", format!("{other:?}"))),
    }
}

impl Decoder for HashDecoder {
    fn key(&mut self) -> String {
        if self.err.is_some() {
            return String::new();
        }
        match self.pairs.pop_front() {
            Some((name, value)) => {
                self.pending = value;
                name
            }
            None => String::new(),
        }
    }

    fn str(&mut self) -> String {
        self.take_text().unwrap_or_default()
    }

    fn blob(&mut self) -> Vec<u8> {
        self.pending.take().map(|b| b.to_vec()).unwrap_or_default()
    }

    fn int(&mut self, bitsize: u32) -> i64 {
        let Some(text) = self.take_text() else {
            return 0;
        };
        let parsed = text
            .parse::<i64>()
            .map_err(|_| CodecError::type_mismatch("integer", text.clone()))
            .and_then(|v| check_int_width(v, bitsize));
        parsed.unwrap_or_else(|err| {
            self.fail(err);
            0
        })
    }

    fn uint(&mut self, bitsize: u32) -> u64 {
        let Some(text) = self.take_text() else {
            return 0;
        };
        let parsed = text
            .parse::<u64>()
            .map_err(|_| CodecError::type_mismatch("unsigned integer", text.clone()))
            .and_then(|v| check_uint_width(v, bitsize));
        parsed.unwrap_or_else(|err| {
            self.fail(err);
            0
        })
    }

    fn float(&mut self, bitsize: u32) -> f64 {
        let Some(text) = self.take_text() else {
            return 0.0;
        };
        parse_float(&text, bitsize).unwrap_or_else(|err| {
            self.fail(err);
            0.0
        })
    }

    fn bool(&mut self) -> bool {
        self.pending
            .take()
            .is_some_and(|b| b.first().is_some_and(|&c| c != b'0'))
    }

    fn list_header(&mut self) -> i64 {
        self.pending = None;
        self.fail(CodecError::decoding_failed("nested lists are not supported"));
        0
    }

    fn dict_header(&mut self) -> i64 {
        self.pending = None;
        self.fail(CodecError::decoding_failed("nested dicts are not supported"));
        0
    }

    fn more(&mut self) -> bool {
        false
    }

    fn discard(&mut self) {
        self.pending = None;
    }

    fn err(&self) -> Option<&CodecError> {
        self.err.as_ref()
    }
}
