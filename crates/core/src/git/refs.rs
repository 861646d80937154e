//! Reference resolution: `HEAD`, loose refs, and `packed-refs`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{GitHeightError, Result};
use crate::git::ObjectId;

/// HEAD as read from disk, before tag peeling.
#[derive(Debug, Clone)]
pub struct HeadState {
    /// The symbolic ref name (e.g. `refs/heads/main`), if HEAD is symbolic.
    pub ref_name: Option<String>,
    /// The resolved target id. `None` for an unborn branch.
    pub target: Option<ObjectId>,
}

/// Reads refs from a repository's directories. Worktree-private refs (HEAD
/// and friends) live in the private git dir; `refs/` and `packed-refs` are
/// shared through the common dir.
pub struct RefStore {
    git_dir: PathBuf,
    common_dir: PathBuf,
    packed: RefCell<Option<HashMap<String, ObjectId>>>,
}

impl RefStore {
    pub fn new(git_dir: PathBuf, common_dir: PathBuf) -> Self {
        RefStore {
            git_dir,
            common_dir,
            packed: RefCell::new(None),
        }
    }

    /// Read HEAD, following the symbolic indirection if present.
    pub fn head(&self) -> Result<HeadState> {
        let raw = std::fs::read_to_string(self.git_dir.join("HEAD")).map_err(|e| {
            GitHeightError::malformed("HEAD", format!("unreadable: {e}"))
        })?;
        let raw = raw.trim();

        if let Some(name) = raw.strip_prefix("ref: ") {
            let name = name.trim().to_string();
            let target = self.resolve(&name)?;
            Ok(HeadState {
                ref_name: Some(name),
                target,
            })
        } else {
            let id = ObjectId::from_hex(raw)?;
            Ok(HeadState {
                ref_name: None,
                target: Some(id),
            })
        }
    }

    /// Resolve a fully-qualified ref name to an object id, trying loose
    /// files first and `packed-refs` second. Symbolic chains are followed
    /// to a bounded depth.
    pub fn resolve(&self, name: &str) -> Result<Option<ObjectId>> {
        let mut current = name.to_string();
        for _ in 0..10 {
            match self.read_loose(&current)? {
                Some(LooseRef::Symbolic(next)) => current = next,
                Some(LooseRef::Direct(id)) => return Ok(Some(id)),
                None => return Ok(self.packed_lookup(&current)?),
            }
        }
        Err(GitHeightError::malformed(
            "ref",
            format!("symbolic ref chain too deep at {name}"),
        ))
    }

    fn read_loose(&self, name: &str) -> Result<Option<LooseRef>> {
        // HEAD and other top-level pseudo refs are per-worktree; refs/ is
        // shared. Checking both orders costs one stat and tolerates odd
        // layouts.
        let candidates = if name.starts_with("refs/") {
            [self.common_dir.join(name), self.git_dir.join(name)]
        } else {
            [self.git_dir.join(name), self.common_dir.join(name)]
        };

        for path in candidates {
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let raw = raw.trim();
            if let Some(next) = raw.strip_prefix("ref: ") {
                return Ok(Some(LooseRef::Symbolic(next.trim().to_string())));
            }
            return Ok(Some(LooseRef::Direct(ObjectId::from_hex(raw)?)));
        }
        Ok(None)
    }

    fn packed_lookup(&self, name: &str) -> Result<Option<ObjectId>> {
        if self.packed.borrow().is_none() {
            *self.packed.borrow_mut() = Some(self.load_packed()?);
        }
        Ok(self
            .packed
            .borrow()
            .as_ref()
            .expect("loaded above")
            .get(name)
            .copied())
    }

    fn load_packed(&self) -> Result<HashMap<String, ObjectId>> {
        let path = self.common_dir.join("packed-refs");
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut refs = HashMap::new();
        for line in raw.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
                // Header and peeled-tag annotation lines. The pre-peeled ids
                // are an optimisation only; tags are peeled through the
                // object store instead.
                continue;
            }
            let (id_hex, name) = line.split_once(' ').ok_or_else(|| {
                GitHeightError::malformed("packed-refs", format!("unparseable line: {line}"))
            })?;
            refs.insert(name.to_string(), ObjectId::from_hex(id_hex)?);
        }
        Ok(refs)
    }
}

enum LooseRef {
    Symbolic(String),
    Direct(ObjectId),
}

/// Parse the `object`/`type` headers of an annotated tag body.
pub fn parse_tag_target(data: &[u8]) -> Result<ObjectId> {
    for line in data.split(|b| *b == b'\n') {
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix(b"object ") {
            let text = std::str::from_utf8(rest)
                .map_err(|_| GitHeightError::malformed("tag", "non-ASCII target id"))?;
            return ObjectId::from_hex(text.trim_end());
        }
    }
    Err(GitHeightError::malformed("tag", "no object header"))
}
