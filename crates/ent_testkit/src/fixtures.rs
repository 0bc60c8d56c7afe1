//! Entity types for tests.
//!
//! These are written the way generated entity code looks: a struct embedding
//! [`EntBase`], static field and index tables, setters that mark fields as
//! changed, and typed lookup helpers over the generic ones in `ent_core`.

use std::fmt;

use ent_codec::{Decoder, Encoder, FIELD_NAME_ID, FIELD_NAME_VERSION};
use ent_core::index::encode_index_key;
use ent_core::{
    ent_string, find_id_by_index, find_ids_by_index, iterate_ents, load_by_id, load_ent_by_index,
    load_ents_by_index_key, Ent, EntBase, EntError, EntIndex, EntIterator, EntResult, FieldSet,
    Fields, LookupFlags, Storage, StorageRef,
};

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Type name of [`Account`].
pub const ACCOUNT_TYPE: &str = "account";

/// Field index of [`Account::name`].
pub const ACCOUNT_NAME: usize = 0;
/// Field index of [`Account::email`].
pub const ACCOUNT_EMAIL: usize = 1;
/// Field index of [`Account::kind`].
pub const ACCOUNT_KIND: usize = 2;
/// Field index of [`Account::active`].
pub const ACCOUNT_ACTIVE: usize = 3;

/// Field names of [`Account`].
pub static ACCOUNT_FIELDS: Fields = Fields::new(&["name", "email", "kind", "active"]);

/// Indexes of [`Account`]: `email` (unique) and `kind`.
pub static ACCOUNT_INDEXES: [EntIndex; 2] = [
    EntIndex::new("email", FieldSet::of(&[ACCOUNT_EMAIL]), true),
    EntIndex::new("kind", FieldSet::of(&[ACCOUNT_KIND]), false),
];

/// A user account, unique by email.
#[derive(Debug, Default, Clone)]
pub struct Account {
    /// Identity and change tracking.
    pub base: EntBase,
    /// Display name.
    pub name: String,
    /// Unique email address.
    pub email: String,
    /// Account kind.
    pub kind: i32,
    /// Whether the account may sign in.
    pub active: bool,
}

impl Account {
    /// Creates an unsaved account.
    pub fn new(name: &str, email: &str, kind: i32) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            kind,
            ..Self::default()
        }
    }

    /// Sets `name`.
    pub fn set_name(&mut self, v: &str) {
        self.name = v.into();
        self.base.set_field_changed(ACCOUNT_NAME);
    }

    /// Sets `email`.
    pub fn set_email(&mut self, v: &str) {
        self.email = v.into();
        self.base.set_field_changed(ACCOUNT_EMAIL);
    }

    /// Sets `kind`.
    pub fn set_kind(&mut self, v: i32) {
        self.kind = v;
        self.base.set_field_changed(ACCOUNT_KIND);
    }

    /// Sets `active`.
    pub fn set_active(&mut self, v: bool) {
        self.active = v;
        self.base.set_field_changed(ACCOUNT_ACTIVE);
    }
}

impl Ent for Account {
    fn base(&self) -> &EntBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        ACCOUNT_TYPE
    }

    fn new_empty(&self) -> Box<dyn Ent> {
        Box::<Account>::default()
    }

    fn encode(&self, c: &mut dyn Encoder, fields: FieldSet) {
        if fields.has(ACCOUNT_NAME) {
            c.key("name");
            c.str(&self.name);
        }
        if fields.has(ACCOUNT_EMAIL) {
            c.key("email");
            c.str(&self.email);
        }
        if fields.has(ACCOUNT_KIND) {
            c.key("kind");
            c.int(i64::from(self.kind), 32);
        }
        if fields.has(ACCOUNT_ACTIVE) {
            c.key("active");
            c.bool(self.active);
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
                "active" => self.active = c.bool(),
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
                "name" if fields.has(ACCOUNT_NAME) => self.name = c.str(),
                "email" if fields.has(ACCOUNT_EMAIL) => self.email = c.str(),
                "kind" if fields.has(ACCOUNT_KIND) => self.kind = c.int(32) as i32,
                "active" if fields.has(ACCOUNT_ACTIVE) => self.active = c.bool(),
                _ => c.discard(),
            }
        }
        version
    }

    fn indexes(&self) -> &'static [EntIndex] {
        &ACCOUNT_INDEXES
    }

    fn fields(&self) -> &'static Fields {
        &ACCOUNT_FIELDS
    }

    fn is_field_empty(&self, field: usize) -> bool {
        match field {
            ACCOUNT_NAME => self.name.is_empty(),
            ACCOUNT_EMAIL => self.email.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ent_string(self))
    }
}

/// Loads the account with id `id`.
pub fn load_account_by_id(storage: &StorageRef, id: u64) -> EntResult<Account> {
    load_by_id(storage, id)
}

/// Returns the id of the account with email `email`.
pub fn find_account_by_email(storage: &dyn Storage, email: &str) -> EntResult<u64> {
    find_id_by_index(storage, ACCOUNT_TYPE, &ACCOUNT_INDEXES[0], |c| c.str(email))
}

/// Loads the account with email `email`.
pub fn load_account_by_email(storage: &StorageRef, email: &str) -> EntResult<Account> {
    load_ent_by_index(storage, &ACCOUNT_INDEXES[0], |c| c.str(email))
}

/// Returns the ids of accounts of kind `kind`.
pub fn find_accounts_by_kind(storage: &dyn Storage, kind: i32) -> EntResult<Vec<u64>> {
    find_ids_by_index(storage, ACCOUNT_TYPE, &ACCOUNT_INDEXES[1], 1, |c| {
        c.int(i64::from(kind), 32)
    })
}

/// Loads up to `limit` (0 = all) accounts of kind `kind`.
pub fn load_accounts_by_kind(
    storage: &StorageRef,
    kind: i32,
    limit: usize,
    flags: LookupFlags,
) -> EntResult<Vec<Account>> {
    let key = encode_index_key(1, |c| c.int(i64::from(kind), 32))?;
    load_ents_by_index_key(storage, &ACCOUNT_INDEXES[1], &key, limit, flags)
}

/// Iterates every stored account.
pub fn iterate_accounts(storage: &StorageRef) -> EntIterator<Account> {
    iterate_ents(storage)
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

/// Type name of [`Post`].
pub const POST_TYPE: &str = "post";

/// Field index of [`Post::author`].
pub const POST_AUTHOR: usize = 0;
/// Field index of [`Post::slug`].
pub const POST_SLUG: usize = 1;
/// Field index of [`Post::title`].
pub const POST_TITLE: usize = 2;
/// Field index of [`Post::body`].
pub const POST_BODY: usize = 3;
/// Field index of [`Post::rating`].
pub const POST_RATING: usize = 4;
/// Field index of [`Post::score`].
pub const POST_SCORE: usize = 5;

/// Field names of [`Post`].
pub static POST_FIELDS: Fields = Fields::new(&["author", "slug", "title", "body", "rating", "score"]);

/// Indexes of [`Post`]: `author_slug` (unique, two fields) and `author`.
pub static POST_INDEXES: [EntIndex; 2] = [
    EntIndex::new("author_slug", FieldSet::of(&[POST_AUTHOR, POST_SLUG]), true),
    EntIndex::new("author", FieldSet::of(&[POST_AUTHOR]), false),
];

/// A post, unique by author and slug.
#[derive(Debug, Default, Clone)]
pub struct Post {
    /// Identity and change tracking.
    pub base: EntBase,
    /// Id of the authoring account.
    pub author: u64,
    /// URL slug, unique per author.
    pub slug: String,
    /// Title.
    pub title: String,
    /// Raw body.
    pub body: Vec<u8>,
    /// Reader rating.
    pub rating: f32,
    /// Ranking score.
    pub score: f64,
}

impl Post {
    /// Creates an unsaved post.
    pub fn new(author: u64, slug: &str, title: &str) -> Self {
        Self {
            author,
            slug: slug.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets `author`.
    pub fn set_author(&mut self, v: u64) {
        self.author = v;
        self.base.set_field_changed(POST_AUTHOR);
    }

    /// Sets `slug`.
    pub fn set_slug(&mut self, v: &str) {
        self.slug = v.into();
        self.base.set_field_changed(POST_SLUG);
    }

    /// Sets `title`.
    pub fn set_title(&mut self, v: &str) {
        self.title = v.into();
        self.base.set_field_changed(POST_TITLE);
    }

    /// Sets `body`.
    pub fn set_body(&mut self, v: &[u8]) {
        self.body = v.to_vec();
        self.base.set_field_changed(POST_BODY);
    }

    /// Sets `rating`.
    pub fn set_rating(&mut self, v: f32) {
        self.rating = v;
        self.base.set_field_changed(POST_RATING);
    }

    /// Sets `score`.
    pub fn set_score(&mut self, v: f64) {
        self.score = v;
        self.base.set_field_changed(POST_SCORE);
    }
}

impl Ent for Post {
    fn base(&self) -> &EntBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        POST_TYPE
    }

    fn new_empty(&self) -> Box<dyn Ent> {
        Box::<Post>::default()
    }

    fn encode(&self, c: &mut dyn Encoder, fields: FieldSet) {
        if fields.has(POST_AUTHOR) {
            c.key("author");
            c.uint(self.author, 64);
        }
        if fields.has(POST_SLUG) {
            c.key("slug");
            c.str(&self.slug);
        }
        if fields.has(POST_TITLE) {
            c.key("title");
            c.str(&self.title);
        }
        if fields.has(POST_BODY) {
            c.key("body");
            c.blob(&self.body);
        }
        if fields.has(POST_RATING) {
            c.key("rating");
            c.float(f64::from(self.rating), 32);
        }
        if fields.has(POST_SCORE) {
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
                "author" => self.author = c.uint(64),
                "slug" => self.slug = c.str(),
                "title" => self.title = c.str(),
                "body" => self.body = c.blob(),
                "rating" => self.rating = c.float(32) as f32,
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
                "author" if fields.has(POST_AUTHOR) => self.author = c.uint(64),
                "slug" if fields.has(POST_SLUG) => self.slug = c.str(),
                "title" if fields.has(POST_TITLE) => self.title = c.str(),
                "body" if fields.has(POST_BODY) => self.body = c.blob(),
                "rating" if fields.has(POST_RATING) => self.rating = c.float(32) as f32,
                "score" if fields.has(POST_SCORE) => self.score = c.float(64),
                _ => c.discard(),
            }
        }
        version
    }

    fn indexes(&self) -> &'static [EntIndex] {
        &POST_INDEXES
    }

    fn fields(&self) -> &'static Fields {
        &POST_FIELDS
    }

    fn is_field_empty(&self, field: usize) -> bool {
        match field {
            POST_SLUG => self.slug.is_empty(),
            POST_TITLE => self.title.is_empty(),
            POST_BODY => self.body.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ent_string(self))
    }
}

/// Loads the post with id `id`.
pub fn load_post_by_id(storage: &StorageRef, id: u64) -> EntResult<Post> {
    load_by_id(storage, id)
}

/// Returns the id of the post `slug` by `author`.
pub fn find_post_by_author_slug(storage: &dyn Storage, author: u64, slug: &str) -> EntResult<u64> {
    let ids = find_ids_by_index(storage, POST_TYPE, &POST_INDEXES[0], 2, |c| {
        c.key("author");
        c.uint(author, 64);
        c.key("slug");
        c.str(slug);
    })?;
    ids.first().copied().ok_or(EntError::NotFound)
}

/// Returns the ids of posts by `author`.
pub fn find_posts_by_author(storage: &dyn Storage, author: u64) -> EntResult<Vec<u64>> {
    find_ids_by_index(storage, POST_TYPE, &POST_INDEXES[1], 1, |c| c.uint(author, 64))
}

#[cfg(test)]
mod tests {
    use ent_core::{repr, ReprFlags};

    use super::*;

    #[test]
    fn account_setters_mark_fields() {
        let mut a = Account::new("ann", "ann@example.com", 1);
        assert!(!a.has_unsaved_changes());
        a.set_kind(2);
        a.set_active(true);
        assert_eq!(a.base.dirty(), FieldSet::of(&[ACCOUNT_KIND, ACCOUNT_ACTIVE]));
    }

    #[test]
    fn account_display_omits_empty_strings() {
        let a = Account::new("", "ann@example.com", 0);
        assert_eq!(
            a.to_string(),
            "{\n  _ver: 0,\n  _id: 0,\n  email: \"ann@example.com\",\n  kind: 0,\n  active: false\n}"
        );
        let full = repr(&a, a.fields().all, ReprFlags::NONE).unwrap();
        assert!(full.contains("name: \"\""));
    }

    #[test]
    fn post_multi_field_key_is_order_independent() {
        let p = Post::new(7, "hello", "Hello");
        let from_ent = ent_core::index::IndexKeyEncoder::new()
            .encode_key(&p, POST_INDEXES[0].fields)
            .unwrap();
        let from_lookup = encode_index_key(2, |c| {
            c.key("slug");
            c.str("hello");
            c.key("author");
            c.uint(7, 64);
        })
        .unwrap();
        assert_eq!(from_ent, from_lookup);
        assert_eq!(from_ent, b"author\xff7\xffslug\xffhello");
    }

    #[test]
    fn post_json_round_trip() {
        let mut p = Post::new(3, "s", "t");
        p.body = vec![0, 1, 2];
        p.base.set_identity(9, 2);
        let data = ent_core::json_encode(&p).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!(value["_id"], 9);
        assert_eq!(value["author"], 3);

        let mut back = Post::default();
        ent_core::json_decode(&mut back, &data).unwrap();
        assert_eq!((back.id(), back.version()), (9, 2));
        assert_eq!(back.body, vec![0, 1, 2]);
        assert_eq!(back.slug, "s");
    }

    #[test]
    fn post_floats_keep_their_bits_in_json() {
        for (rating, score) in [
            (0.1f32, 3.6132621877257676e235),
            (1e-7, 1e-7),
            (1e21, 1e21),
            (-0.0, -0.0),
            (f32::MAX, f64::MIN_POSITIVE),
        ] {
            let mut p = Post::new(1, "f", "F");
            p.rating = rating;
            p.score = score;
            let data = ent_core::json_encode(&p).unwrap();
            let mut back = Post::default();
            ent_core::json_decode(&mut back, &data).unwrap();
            assert_eq!(back.rating.to_bits(), rating.to_bits(), "{rating}");
            assert_eq!(back.score.to_bits(), score.to_bits(), "{score}");
        }
    }
}
