//! Tree object parsing.

use crate::error::{GitHeightError, Result};
use crate::git::ObjectId;

/// What a tree entry points at. Submodule (gitlink) and symlink entries are
/// leaves for diffing purposes; only real subtrees are descended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEntryKind {
    File,
    Subtree,
}

/// One entry of a tree object. Names are byte strings; the filesystem
/// encoding is opaque and comparisons are byte-for-byte (or ASCII
/// case-insensitive when the repository says so).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: Vec<u8>,
    pub kind: TreeEntryKind,
    pub id: ObjectId,
}

/// A parsed tree, preserving the on-disk entry order.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Parse the binary body of a tree object: repeated
    /// `<octal mode> <name>\0<20 raw id bytes>`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut pos = 0usize;

        while pos < data.len() {
            let space = find(data, pos, b' ')
                .ok_or_else(|| GitHeightError::malformed("tree", "entry missing mode"))?;
            let mode = &data[pos..space];
            let nul = find(data, space + 1, b'\0')
                .ok_or_else(|| GitHeightError::malformed("tree", "entry missing name"))?;
            let name = data[space + 1..nul].to_vec();
            if name.is_empty() {
                return Err(GitHeightError::malformed("tree", "empty entry name"));
            }
            let id_end = nul + 21;
            if id_end > data.len() {
                return Err(GitHeightError::malformed("tree", "truncated entry id"));
            }
            let id = ObjectId::from_bytes(&data[nul + 1..id_end])?;

            let kind = if mode == b"40000" {
                TreeEntryKind::Subtree
            } else {
                TreeEntryKind::File
            };
            entries.push(TreeEntry { name, kind, id });
            pos = id_end;
        }

        Ok(Tree { entries })
    }

    /// Find an entry by name, honouring `core.ignorecase`.
    pub fn get(&self, name: &[u8], ignore_case: bool) -> Option<&TreeEntry> {
        self.entries
            .iter()
            .find(|entry| names_equal(&entry.name, name, ignore_case))
    }
}

/// Compare entry names byte-for-byte or ASCII-case-insensitively.
pub fn names_equal(a: &[u8], b: &[u8], ignore_case: bool) -> bool {
    if ignore_case {
        a.len() == b.len()
            && a.iter()
                .zip(b)
                .all(|(x, y)| x.eq_ignore_ascii_case(y))
    } else {
        a == b
    }
}

fn find(data: &[u8], from: usize, byte: u8) -> Option<usize> {
    data[from..].iter().position(|b| *b == byte).map(|i| from + i)
}
