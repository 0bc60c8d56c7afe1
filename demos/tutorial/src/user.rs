//! A hand-written entity type.
//!
//! This is what a code generator would emit for
//!
//! ```text
//! struct User {
//!     name:  String            // plain field
//!     email: String  (unique)  // unique index "email"
//!     team:  u32     (index)   // non-unique index "team"
//!     score: f64
//! }
//! ```

use std::fmt;

use ent_codec::{Decoder, Encoder, FIELD_NAME_ID, FIELD_NAME_VERSION};
use ent_core::index::encode_index_key;
use ent_core::{
    ent_string, find_id_by_index, load_ents_by_index_key, Ent, EntBase, EntIndex, EntResult,
    FieldSet, Fields, LookupFlags, Storage, StorageRef,
};

pub const F_NAME: usize = 0;
pub const F_EMAIL: usize = 1;
pub const F_TEAM: usize = 2;
pub const F_SCORE: usize = 3;

pub static FIELDS: Fields = Fields::new(&["name", "email", "team", "score"]);

pub static INDEXES: [EntIndex; 2] = [
    EntIndex::new("email", FieldSet::of(&[F_EMAIL]), true),
    EntIndex::new("team", FieldSet::of(&[F_TEAM]), false),
];

#[derive(Debug, Default, Clone)]
pub struct User {
    pub base: EntBase,
    pub name: String,
    pub email: String,
    pub team: u32,
    pub score: f64,
}

impl User {
    pub fn new(name: &str, email: &str, team: u32) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            team,
            ..Self::default()
        }
    }

    pub fn set_email(&mut self, v: &str) {
        self.email = v.into();
        self.base.set_field_changed(F_EMAIL);
    }

    pub fn set_team(&mut self, v: u32) {
        self.team = v;
        self.base.set_field_changed(F_TEAM);
    }

    pub fn set_score(&mut self, v: f64) {
        self.score = v;
        self.base.set_field_changed(F_SCORE);
    }
}

impl Ent for User {
    fn base(&self) -> &EntBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "user"
    }

    fn new_empty(&self) -> Box<dyn Ent> {
        Box::<User>::default()
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
        if fields.has(F_TEAM) {
            c.key("team");
            c.uint(u64::from(self.team), 32);
        }
        if fields.has(F_SCORE) {
            c.key("score");
            c.float(self.score, 64);
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
                "team" => self.team = c.uint(32) as u32,
                "score" => self.score = c.float(64),
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
                "name" if fields.has(F_NAME) => self.name = c.str(),
                "email" if fields.has(F_EMAIL) => self.email = c.str(),
                "team" if fields.has(F_TEAM) => self.team = c.uint(32) as u32,
                "score" if fields.has(F_SCORE) => self.score = c.float(64),
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
            _ => false,
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ent_string(self))
    }
}

pub fn find_user_by_email(storage: &dyn Storage, email: &str) -> EntResult<u64> {
    find_id_by_index(storage, "user", &INDEXES[0], |c| c.str(email))
}

pub fn load_users_by_team(
    storage: &StorageRef,
    team: u32,
    limit: usize,
    flags: LookupFlags,
) -> EntResult<Vec<User>> {
    let key = encode_index_key(1, |c| c.uint(u64::from(team), 32))?;
    load_ents_by_index_key(storage, &INDEXES[1], &key, limit, flags)
}
