//! A hand-written entity type for backend unit tests.

use ent_codec::{Decoder, Encoder, FIELD_NAME_ID, FIELD_NAME_VERSION};
use ent_core::{Ent, EntBase, EntIndex, FieldSet, Fields};

pub const F_TITLE: usize = 0;
pub const F_SLUG: usize = 1;
pub const F_RANK: usize = 2;

pub static FIELDS: Fields = Fields::new(&["title", "slug", "rank"]);

pub static INDEXES: [EntIndex; 2] = [
    EntIndex::new("slug", FieldSet::of(&[F_SLUG]), true),
    EntIndex::new("rank", FieldSet::of(&[F_RANK]), false),
];

#[derive(Debug, Default, Clone)]
pub struct Note {
    pub base: EntBase,
    pub title: String,
    pub slug: String,
    pub rank: i32,
}

impl Note {
    pub fn new(title: &str, slug: &str, rank: i32) -> Self {
        Self {
            title: title.into(),
            slug: slug.into(),
            rank,
            ..Self::default()
        }
    }

    pub fn set_slug(&mut self, v: &str) {
        self.slug = v.into();
        self.base.set_field_changed(F_SLUG);
    }

    pub fn set_rank(&mut self, v: i32) {
        self.rank = v;
        self.base.set_field_changed(F_RANK);
    }

    pub fn set_title(&mut self, v: &str) {
        self.title = v.into();
        self.base.set_field_changed(F_TITLE);
    }
}

impl Ent for Note {
    fn base(&self) -> &EntBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "note"
    }

    fn new_empty(&self) -> Box<dyn Ent> {
        Box::<Note>::default()
    }

    fn encode(&self, c: &mut dyn Encoder, fields: FieldSet) {
        if fields.has(F_TITLE) {
            c.key("title");
            c.str(&self.title);
        }
        if fields.has(F_SLUG) {
            c.key("slug");
            c.str(&self.slug);
        }
        if fields.has(F_RANK) {
            c.key("rank");
            c.int(i64::from(self.rank), 32);
        }
    }

    fn decode(&mut self, c: &mut dyn Decoder) -> (u64, u64) {
        let (mut id, mut version) = (0, 0);
        loop {
            match c.key().as_str() {
                "" => break,
                FIELD_NAME_ID => id = c.uint(64),
                FIELD_NAME_VERSION => version = c.uint(64),
                "title" => self.title = c.str(),
                "slug" => self.slug = c.str(),
                "rank" => self.rank = c.int(32) as i32,
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
                "title" if fields.has(F_TITLE) => self.title = c.str(),
                "slug" if fields.has(F_SLUG) => self.slug = c.str(),
                "rank" if fields.has(F_RANK) => self.rank = c.int(32) as i32,
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
            F_TITLE => self.title.is_empty(),
            F_SLUG => self.slug.is_empty(),
            _ => false,
        }
    }
}
