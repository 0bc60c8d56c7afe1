//! A hand-written entity type for unit tests.

use ent_codec::{decode_list, encode_list, Decoder, Encoder, FIELD_NAME_ID, FIELD_NAME_VERSION};

use crate::ent::{Ent, EntBase, EntIndex, Fields};
use crate::fieldset::FieldSet;

pub const F_NAME: usize = 0;
pub const F_EMAIL: usize = 1;
pub const F_KIND: usize = 2;
pub const F_W: usize = 3;
pub const F_H: usize = 4;
pub const F_TAGS: usize = 5;

pub static FIELDS: Fields = Fields::new(&["name", "email", "kind", "w", "h", "tags"]);

pub static INDEXES: [EntIndex; 3] = [
    EntIndex::new("email", FieldSet::of(&[F_EMAIL]), true),
    EntIndex::new("kind", FieldSet::of(&[F_KIND]), false),
    EntIndex::new("size", FieldSet::of(&[F_W, F_H]), false),
];

#[derive(Debug, Default, Clone)]
pub struct Sample {
    pub base: EntBase,
    pub name: String,
    pub email: String,
    pub kind: i32,
    pub w: i64,
    pub h: i64,
    pub tags: Vec<String>,
}

impl Sample {
    pub fn new(name: &str, email: &str, kind: i32) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            kind,
            ..Self::default()
        }
    }

    pub fn set_email(&mut self, v: &str) {
        self.email = v.into();
        self.base.set_field_changed(F_EMAIL);
    }

    pub fn set_kind(&mut self, v: i32) {
        self.kind = v;
        self.base.set_field_changed(F_KIND);
    }

    pub fn set_name(&mut self, v: &str) {
        self.name = v.into();
        self.base.set_field_changed(F_NAME);
    }

    pub fn set_size(&mut self, w: i64, h: i64) {
        self.w = w;
        self.h = h;
        self.base.set_field_changed(F_W);
        self.base.set_field_changed(F_H);
    }
}

impl Ent for Sample {
    fn base(&self) -> &EntBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "sample"
    }

    fn new_empty(&self) -> Box<dyn Ent> {
        Box::<Sample>::default()
    }

    fn encode(&self, c: &mut dyn Encoder, fields: FieldSet) {
        if fields.has(F_NAME) {
            c.key("name");
            c.str(&self.name);
        }
        if fields.has(F_EMAIL) {
            c.key("email");
            c.str(&self.email);
        }
        if fields.has(F_KIND) {
            c.key("kind");
            c.int(i64::from(self.kind), 32);
        }
        if fields.has(F_W) {
            c.key("w");
            c.int(self.w, 64);
        }
        if fields.has(F_H) {
            c.key("h");
            c.int(self.h, 64);
        }
        if fields.has(F_TAGS) {
            c.key("tags");
            encode_list(c, &self.tags, |c, t| c.str(t));
        }
    }

    fn decode(&mut self, c: &mut dyn Decoder) -> (u64, u64) {
        let (mut id, mut version) = (0, 0);
        loop {
            match c.key().as_str() {
                "" => break,
                FIELD_NAME_ID => id = c.uint(64),
                FIELD_NAME_VERSION => version = c.uint(64),
                "name" => self.name = c.str(),
                "email" => self.email = c.str(),
                "kind" => self.kind = c.int(32) as i32,
                "w" => self.w = c.int(64),
                "h" => self.h = c.int(64),
                "tags" => self.tags = decode_list(c, |c| c.str()),
                _ => c.discard(),
            }
        }
        (id, version)
    }

    fn decode_partial(&mut self, c: &mut dyn Decoder, fields: FieldSet) -> u64 {
        let mut version = 0;
        loop {
            match c.key().as_str() {
                "" => break,
                FIELD_NAME_VERSION => version = c.uint(64),
                "email" if fields.has(F_EMAIL) => self.email = c.str(),
                "kind" if fields.has(F_KIND) => self.kind = c.int(32) as i32,
                "w" if fields.has(F_W) => self.w = c.int(64),
                "h" if fields.has(F_H) => self.h = c.int(64),
                _ => c.discard(),
            }
        }
        version
    }

    fn indexes(&self) -> &'static [EntIndex] {
        &INDEXES
    }

    fn fields(&self) -> &'static Fields {
        &FIELDS
    }

    fn is_field_empty(&self, field: usize) -> bool {
        match field {
            F_NAME => self.name.is_empty(),
            F_EMAIL => self.email.is_empty(),
            F_TAGS => self.tags.is_empty(),
            _ => false,
        }
    }
}

/// A second type, for type-mismatch checks.
#[derive(Debug, Default)]
pub struct Other {
    pub base: EntBase,
}

impl Ent for Other {
    fn base(&self) -> &EntBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "other"
    }

    fn new_empty(&self) -> Box<dyn Ent> {
        Box::<Other>::default()
    }

    fn encode(&self, _c: &mut dyn Encoder, _fields: FieldSet) {}

    fn decode(&mut self, c: &mut dyn Decoder) -> (u64, u64) {
        while !c.key().is_empty() {
            c.discard();
        }
        (0, 0)
    }

    fn decode_partial(&mut self, c: &mut dyn Decoder, _fields: FieldSet) -> u64 {
        self.decode(c).1
    }

    fn indexes(&self) -> &'static [EntIndex] {
        &[]
    }

    fn fields(&self) -> &'static Fields {
        static F: Fields = Fields::new(&[]);
        &F
    }
}
