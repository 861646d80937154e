//! Repository discovery and the read-only object database.

use std::cell::RefCell;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use flate2::read::ZlibDecoder;
use std::io::Read;

use crate::error::{GitHeightError, Result};
use crate::git::commit::CommitRecord;
use crate::git::pack::PackFile;
use crate::git::refs::{parse_tag_target, HeadState, RefStore};
use crate::git::tree::Tree;
use crate::git::{ObjectId, ObjectKind};

/// Alternates may chain; git bounds the recursion and so do we.
const MAX_ALTERNATE_DEPTH: u32 = 5;

/// An opened repository: located directories, ref store, object database,
/// and the settings the version walk cares about.
pub struct GitRepository {
    work_dir: Option<PathBuf>,
    git_dir: PathBuf,
    common_dir: PathBuf,
    refs: RefStore,
    odb: ObjectDatabase,
    ignore_case: bool,
}

impl GitRepository {
    /// Ascend from `start` until a `.git` directory or file is found and
    /// open the repository read-only.
    pub fn discover(start: impl Into<PathBuf>) -> Result<Self> {
        let start = start.into();
        Self::try_discover(&start)?
            .ok_or_else(|| GitHeightError::NotARepository(start.display().to_string()))
    }

    /// Like [`GitRepository::discover`], but yields `None` instead of an
    /// error when no repository exists above `start`.
    pub fn try_discover(start: &Path) -> Result<Option<Self>> {
        let mut dir = absolute(start)?;
        loop {
            let dot_git = dir.join(".git");
            if dot_git.is_dir() {
                return Self::open_git_dir(dot_git, Some(dir)).map(Some);
            }
            if dot_git.is_file() {
                // A worktree checkout: `.git` is a pointer file.
                let private = read_gitdir_file(&dot_git)?;
                return Self::open_git_dir(private, Some(dir)).map(Some);
            }
            // Bare repository, or a start directory inside the .git dir.
            if dir.join("HEAD").is_file() && dir.join("objects").is_dir() {
                return Self::open_git_dir(dir, None).map(Some);
            }
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => return Ok(None),
            }
        }
    }

    fn open_git_dir(git_dir: PathBuf, work_dir: Option<PathBuf>) -> Result<Self> {
        // Worktree private dirs name the shared directory in `commondir`.
        let common_dir = match std::fs::read_to_string(git_dir.join("commondir")) {
            Ok(raw) => normalize(git_dir.join(raw.trim())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => git_dir.clone(),
            Err(e) => return Err(e.into()),
        };

        let odb = ObjectDatabase::open(common_dir.join("objects"), 0)?;
        let refs = RefStore::new(git_dir.clone(), common_dir.clone());
        let ignore_case = read_core_ignorecase(&common_dir.join("config"));

        Ok(GitRepository {
            work_dir,
            git_dir,
            common_dir,
            refs,
            odb,
            ignore_case,
        })
    }

    /// The working directory, when the repository is not bare.
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }

    /// Whether tree-entry names compare ASCII-case-insensitively
    /// (`core.ignorecase`).
    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn head(&self) -> Result<HeadState> {
        self.refs.head()
    }

    /// HEAD peeled to a commit id; `None` on an unborn branch.
    pub fn head_commit(&self) -> Result<Option<ObjectId>> {
        match self.refs.head()?.target {
            Some(id) => Ok(Some(self.peel_to_commit(id)?)),
            None => Ok(None),
        }
    }

    /// Resolve a committish: a full or abbreviated hex id, `HEAD`, or a
    /// branch/tag name with the usual `refs/...` candidates.
    pub fn resolve_committish(&self, spec: &str) -> Result<ObjectId> {
        let unknown = || GitHeightError::UnknownCommittish(spec.to_string());

        if spec == "HEAD" {
            return self.head_commit()?.ok_or_else(unknown);
        }
        if spec.len() == 40 && spec.bytes().all(|b| b.is_ascii_hexdigit()) {
            let id = ObjectId::from_hex(spec)?;
            if !self.odb.contains(&id)? {
                return Err(unknown());
            }
            return self.peel_to_commit(id);
        }
        if (4..40).contains(&spec.len()) && spec.bytes().all(|b| b.is_ascii_hexdigit()) {
            if let Some(id) = self.odb.expand_prefix(spec)? {
                return self.peel_to_commit(id);
            }
        }

        let candidates = [
            spec.to_string(),
            format!("refs/{spec}"),
            format!("refs/tags/{spec}"),
            format!("refs/heads/{spec}"),
            format!("refs/remotes/{spec}"),
            format!("refs/remotes/{spec}/HEAD"),
        ];
        for name in candidates {
            if let Some(id) = self.refs.resolve(&name)? {
                return self.peel_to_commit(id);
            }
        }
        Err(unknown())
    }

    /// Follow annotated tags until a commit is reached.
    pub fn peel_to_commit(&self, mut id: ObjectId) -> Result<ObjectId> {
        loop {
            let (kind, data) = self.odb.read(&id)?;
            match kind {
                ObjectKind::Commit => return Ok(id),
                ObjectKind::Tag => id = parse_tag_target(&data)?,
                other => {
                    return Err(GitHeightError::malformed(
                        "committish",
                        format!("{id} is a {}, not a commit", other.as_str()),
                    ))
                }
            }
        }
    }

    pub fn read_commit(&self, id: &ObjectId) -> Result<CommitRecord> {
        let data = self.read_kind(id, ObjectKind::Commit)?;
        CommitRecord::parse(*id, &data)
    }

    pub fn read_tree(&self, id: &ObjectId) -> Result<Tree> {
        let data = self.read_kind(id, ObjectKind::Tree)?;
        Tree::parse(&data)
    }

    pub fn read_blob(&self, id: &ObjectId) -> Result<Rc<Vec<u8>>> {
        self.read_kind(id, ObjectKind::Blob)
    }

    fn read_kind(&self, id: &ObjectId, expected: ObjectKind) -> Result<Rc<Vec<u8>>> {
        let (kind, data) = self.odb.read(id)?;
        if kind != expected {
            return Err(GitHeightError::malformed(
                expected.as_str(),
                format!("{id} is a {}", kind.as_str()),
            ));
        }
        Ok(data)
    }

    /// Walk a repo-relative, forward-slash path down from a root tree.
    /// Returns the entry's id and whether it is a subtree. An empty path
    /// names the root tree itself.
    pub fn entry_at_path(
        &self,
        root_tree: &ObjectId,
        path: &str,
    ) -> Result<Option<(ObjectId, bool)>> {
        let mut current = (*root_tree, true);
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if !current.1 {
                return Ok(None); // descending through a blob
            }
            let tree = self.read_tree(&current.0)?;
            match tree.get(segment.as_bytes(), self.ignore_case) {
                Some(entry) => {
                    current = (
                        entry.id,
                        entry.kind == crate::git::tree::TreeEntryKind::Subtree,
                    )
                }
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Shortest hex prefix of `id`, at least `min_len` long, that is
    /// unambiguous in this store and its alternates.
    pub fn unique_abbreviation(&self, id: &ObjectId, min_len: usize) -> String {
        let hex = id.to_hex();
        let mut len = min_len.clamp(4, 40);
        while len < 40 {
            if self.odb.count_prefix(&hex[..len], 2) <= 1 {
                return hex[..len].to_string();
            }
            len += 1;
        }
        hex
    }

    pub fn objects(&self) -> &ObjectDatabase {
        &self.odb
    }
}

/// One `objects/` directory plus its packs and alternates.
pub struct ObjectDatabase {
    objects_dir: PathBuf,
    packs: RefCell<Option<Rc<Vec<PackFile>>>>,
    alternates: Vec<ObjectDatabase>,
}

impl ObjectDatabase {
    fn open(objects_dir: PathBuf, depth: u32) -> Result<Self> {
        let mut alternates = Vec::new();
        if depth < MAX_ALTERNATE_DEPTH {
            for path in read_alternates(&objects_dir)? {
                if path.is_dir() {
                    alternates.push(ObjectDatabase::open(path, depth + 1)?);
                } else {
                    tracing::warn!(alternate = %path.display(), "skipping missing alternate object directory");
                }
            }
        }
        Ok(ObjectDatabase {
            objects_dir,
            packs: RefCell::new(None),
            alternates,
        })
    }

    /// Packs are enumerated lazily so repositories without packs never pay
    /// for the directory scan.
    fn packs(&self) -> Result<Rc<Vec<PackFile>>> {
        if let Some(packs) = self.packs.borrow().as_ref() {
            return Ok(Rc::clone(packs));
        }
        let mut packs = Vec::new();
        let pack_dir = self.objects_dir.join("pack");
        if pack_dir.is_dir() {
            let mut idx_paths: Vec<PathBuf> = std::fs::read_dir(&pack_dir)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "idx"))
                .collect();
            idx_paths.sort();
            for idx_path in idx_paths {
                if idx_path.with_extension("pack").is_file() {
                    packs.push(PackFile::open(&idx_path)?);
                }
            }
        }
        let packs = Rc::new(packs);
        *self.packs.borrow_mut() = Some(Rc::clone(&packs));
        Ok(packs)
    }

    /// Read an object, failing with `MissingObject` if it is nowhere in
    /// this store or its alternates.
    pub fn read(&self, id: &ObjectId) -> Result<(ObjectKind, Rc<Vec<u8>>)> {
        self.try_read(id)?
            .ok_or(GitHeightError::MissingObject(*id))
    }

    /// Packs first, loose second, alternates last.
    pub fn try_read(&self, id: &ObjectId) -> Result<Option<(ObjectKind, Rc<Vec<u8>>)>> {
        let packs = self.packs()?;
        for pack in packs.iter() {
            let resolve_base = |base: &ObjectId| self.read(base);
            if let Some(found) = pack.read_object(id, &resolve_base)? {
                return Ok(Some(found));
            }
        }
        if let Some((kind, data)) = self.read_loose(id)? {
            return Ok(Some((kind, Rc::new(data))));
        }
        for alternate in &self.alternates {
            if let Some(found) = alternate.try_read(id)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    pub fn contains(&self, id: &ObjectId) -> Result<bool> {
        let packs = self.packs()?;
        for pack in packs.iter() {
            if pack.index().lookup(id)?.is_some() {
                return Ok(true);
            }
        }
        if self.loose_path(id).is_file() {
            return Ok(true);
        }
        for alternate in &self.alternates {
            if alternate.contains(id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn loose_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Inflate a loose object and split off its `"<type> <length>\0"`
    /// header.
    fn read_loose(&self, id: &ObjectId) -> Result<Option<(ObjectKind, Vec<u8>)>> {
        let raw = match std::fs::read(self.loose_path(id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut inflated = Vec::new();
        ZlibDecoder::new(raw.as_slice()).read_to_end(&mut inflated)?;

        let nul = inflated
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| GitHeightError::malformed("loose object", format!("{id} has no header")))?;
        let header = std::str::from_utf8(&inflated[..nul])
            .map_err(|_| GitHeightError::malformed("loose object", format!("{id} header is not ASCII")))?;
        let (type_name, length) = header.split_once(' ').ok_or_else(|| {
            GitHeightError::malformed("loose object", format!("{id} header is unstructured"))
        })?;
        let kind = ObjectKind::from_name(type_name).ok_or_else(|| {
            GitHeightError::malformed("loose object", format!("{id} has type '{type_name}'"))
        })?;
        let length: usize = length.parse().map_err(|_| {
            GitHeightError::malformed("loose object", format!("{id} has length '{length}'"))
        })?;

        let payload = inflated.split_off(nul + 1);
        if payload.len() != length {
            return Err(GitHeightError::malformed(
                "loose object",
                format!("{id} payload is {} bytes, header says {length}", payload.len()),
            ));
        }
        Ok(Some((kind, payload)))
    }

    /// Count objects matching a hex prefix, stopping at `limit`. Duplicates
    /// between packs and loose storage may be counted twice; that only ever
    /// lengthens an abbreviation.
    pub fn count_prefix(&self, prefix: &str, limit: usize) -> usize {
        let mut count = 0usize;
        if let Ok(packs) = self.packs() {
            for pack in packs.iter() {
                count += pack.index().prefix_match_count(prefix, limit - count);
                if count >= limit {
                    return count;
                }
            }
        }
        let mut loose = Vec::new();
        self.loose_prefix_matches(prefix, limit - count, &mut loose);
        count += loose.len();
        if count >= limit {
            return count;
        }
        for alternate in &self.alternates {
            count += alternate.count_prefix(prefix, limit - count);
            if count >= limit {
                return count;
            }
        }
        count
    }

    /// Expand an abbreviated id to the unique matching object.
    pub fn expand_prefix(&self, prefix: &str) -> Result<Option<ObjectId>> {
        let mut matches: Vec<ObjectId> = Vec::new();
        let packs = self.packs()?;
        for pack in packs.iter() {
            matches.extend(pack.index().prefix_matches(prefix, 2));
        }
        self.loose_prefix_matches(prefix, 2, &mut matches);
        for alternate in &self.alternates {
            if let Some(id) = alternate.expand_prefix(prefix)? {
                matches.push(id);
            }
        }
        matches.sort();
        matches.dedup();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0])),
            _ => Err(GitHeightError::UnknownCommittish(format!(
                "{prefix} is ambiguous"
            ))),
        }
    }

    fn loose_prefix_matches(&self, prefix: &str, limit: usize, out: &mut Vec<ObjectId>) {
        if limit == 0 || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return;
        }
        let prefix = prefix.to_ascii_lowercase();

        let fan_dirs: Vec<String> = if prefix.len() >= 2 {
            vec![prefix[..2].to_string()]
        } else {
            // A one-character prefix spans sixteen fanout directories.
            (0..16u8)
                .map(|n| format!("{}{:x}", prefix, n))
                .collect()
        };

        for fan in fan_dirs {
            let dir = self.objects_dir.join(&fan);
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            let rest = if prefix.len() >= 2 { &prefix[2..] } else { "" };
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if name.len() == 38 && name.starts_with(rest) {
                    if let Ok(id) = ObjectId::from_hex(&format!("{fan}{name}")) {
                        out.push(id);
                        if out.len() >= limit {
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// `objects/info/alternates`: newline-terminated entries, each holding one
/// or more colon-separated paths, relative to the objects directory.
fn read_alternates(objects_dir: &Path) -> Result<Vec<PathBuf>> {
    let path = objects_dir.join("info").join("alternates");
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut paths = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for part in line.split(':').filter(|p| !p.is_empty()) {
            let alternate = PathBuf::from(part);
            let alternate = if alternate.is_absolute() {
                alternate
            } else {
                normalize(objects_dir.join(alternate))
            };
            paths.push(alternate);
        }
    }
    Ok(paths)
}

fn read_gitdir_file(dot_git: &Path) -> Result<PathBuf> {
    let raw = std::fs::read_to_string(dot_git)?;
    let target = raw
        .trim()
        .strip_prefix("gitdir:")
        .ok_or_else(|| GitHeightError::malformed(".git file", "missing 'gitdir:' prefix"))?
        .trim();
    let target = PathBuf::from(target);
    let base = dot_git.parent().unwrap_or(Path::new("."));
    Ok(if target.is_absolute() {
        target
    } else {
        normalize(base.join(target))
    })
}

/// Minimal INI read of `core.ignorecase`. Absent or unparseable settings
/// default to case-sensitive.
fn read_core_ignorecase(config_path: &Path) -> bool {
    let Ok(raw) = std::fs::read_to_string(config_path) else {
        return false;
    };
    let mut in_core = false;
    for line in raw.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_core = line.eq_ignore_ascii_case("[core]");
            continue;
        }
        if !in_core {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim().eq_ignore_ascii_case("ignorecase") {
                return value
                    .split(&['#', ';'][..])
                    .next()
                    .unwrap_or("")
                    .trim()
                    .eq_ignore_ascii_case("true");
            }
        }
    }
    false
}

/// Make `path` absolute against the current directory, without touching the
/// filesystem beyond that.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path.to_path_buf()))
    } else {
        Ok(normalize(std::env::current_dir()?.join(path)))
    }
}

/// Lexically resolve `.` and `..` components.
pub(crate) fn normalize(path: PathBuf) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}
