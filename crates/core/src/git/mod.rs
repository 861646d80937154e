//! Managed, read-only access to a Git repository: discovery, refs, loose
//! and packed objects, and the commit/tree records the height walk needs.

pub mod cache;
pub mod commit;
pub mod delta;
pub mod idx;
pub mod oid;
pub mod pack;
pub mod refs;
pub mod repo;
pub mod tree;

pub use commit::{CommitRecord, Signature};
pub use oid::ObjectId;
pub use repo::{GitRepository, ObjectDatabase};
pub use tree::{Tree, TreeEntry, TreeEntryKind};

/// The object kinds stored in the object database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    /// Decode the 3-bit type field of a pack entry header. Codes 6 and 7
    /// are delta encodings, not object kinds.
    pub fn from_pack_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ObjectKind::Commit),
            2 => Some(ObjectKind::Tree),
            3 => Some(ObjectKind::Blob),
            4 => Some(ObjectKind::Tag),
            _ => None,
        }
    }

    /// Decode the type name used in loose-object headers.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "commit" => Some(ObjectKind::Commit),
            "tree" => Some(ObjectKind::Tree),
            "blob" => Some(ObjectKind::Blob),
            "tag" => Some(ObjectKind::Tag),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Tag => "tag",
        }
    }
}
