//! Pack file (`.pack`) object reader.
//!
//! Objects are located through the companion index and read at their
//! pack-local offset: a variable-length type/size header, then either a
//! zlib-compressed payload (plain objects) or a delta against a base object
//! located by relative offset (OFS) or object id (REF).

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use flate2::read::ZlibDecoder;

use crate::error::{GitHeightError, Result};
use crate::git::cache::ObjectCache;
use crate::git::delta;
use crate::git::idx::PackIndex;
use crate::git::{ObjectId, ObjectKind};

/// Resolves a REF-delta base that lives outside this pack.
pub type BaseResolver<'a> = dyn Fn(&ObjectId) -> Result<(ObjectKind, Rc<Vec<u8>>)> + 'a;

/// Raw pack entry, before delta resolution.
enum RawEntry {
    Plain {
        kind: ObjectKind,
        data: Vec<u8>,
    },
    OfsDelta {
        base_offset: u64,
        script: Vec<u8>,
    },
    RefDelta {
        base: ObjectId,
        script: Vec<u8>,
    },
}

pub struct PackFile {
    pack_path: PathBuf,
    index: PackIndex,
    file: RefCell<BufReader<File>>,
    cache: ObjectCache,
}

impl PackFile {
    /// Open a pack by its `.idx` path; the `.pack` must sit beside it.
    pub fn open(idx_path: &Path) -> Result<Self> {
        let index = PackIndex::open(idx_path)?;
        let pack_path = idx_path.with_extension("pack");
        let mut file = BufReader::new(File::open(&pack_path)?);

        let mut header = [0u8; 12];
        file.read_exact(&mut header)?;
        if &header[..4] != b"PACK" {
            return Err(GitHeightError::malformed("pack", "bad signature"));
        }
        let version = u32::from_be_bytes(header[4..8].try_into().expect("4-byte slice"));
        if version != 2 && version != 3 {
            return Err(GitHeightError::malformed(
                "pack",
                format!("unsupported version {version}"),
            ));
        }

        Ok(PackFile {
            pack_path,
            index,
            file: RefCell::new(file),
            cache: ObjectCache::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// Read an object by id if this pack contains it.
    pub fn read_object(
        &self,
        id: &ObjectId,
        resolve_base: &BaseResolver<'_>,
    ) -> Result<Option<(ObjectKind, Rc<Vec<u8>>)>> {
        match self.index.lookup(id)? {
            Some(offset) => Ok(Some(self.read_at_offset(offset, resolve_base)?)),
            None => Ok(None),
        }
    }

    /// Read the object at a pack-local offset, resolving delta chains.
    pub fn read_at_offset(
        &self,
        offset: u64,
        resolve_base: &BaseResolver<'_>,
    ) -> Result<(ObjectKind, Rc<Vec<u8>>)> {
        if let Some(hit) = self.cache.get(offset) {
            return Ok(hit);
        }

        let entry = self.read_raw_entry(offset)?;
        let (kind, data) = match entry {
            RawEntry::Plain { kind, data } => (kind, data),
            RawEntry::OfsDelta {
                base_offset,
                script,
            } => {
                let (kind, base) = self.read_at_offset(base_offset, resolve_base)?;
                (kind, delta::apply(&base, &script)?)
            }
            RawEntry::RefDelta { base, script } => {
                let (kind, base_bytes) = match self.index.lookup(&base)? {
                    Some(base_offset) => self.read_at_offset(base_offset, resolve_base)?,
                    None => resolve_base(&base)?,
                };
                (kind, delta::apply(&base_bytes, &script)?)
            }
        };
        Ok(self.cache.insert(offset, kind, data))
    }

    /// Parse the entry header at `offset` and inflate its payload.
    fn read_raw_entry(&self, offset: u64) -> Result<RawEntry> {
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(offset))?;

        let mut byte = read_byte(&mut *file)?;
        let type_code = (byte >> 4) & 0x7;
        let mut size = (byte & 0x0f) as u64;
        let mut shift = 4u32;
        while byte & 0x80 != 0 {
            byte = read_byte(&mut *file)?;
            size |= ((byte & 0x7f) as u64) << shift;
            shift += 7;
            if shift > 60 {
                return Err(GitHeightError::malformed("pack", "entry size header too long"));
            }
        }

        match type_code {
            1 | 2 | 3 | 4 => {
                let kind = ObjectKind::from_pack_code(type_code)
                    .expect("codes 1-4 are the plain object kinds");
                let data = inflate(&mut *file, size)?;
                Ok(RawEntry::Plain { kind, data })
            }
            6 => {
                // The relative-offset encoding adds one after each shift so
                // that multi-byte encodings have no redundant forms.
                byte = read_byte(&mut *file)?;
                let mut relative = (byte & 0x7f) as u64;
                while byte & 0x80 != 0 {
                    byte = read_byte(&mut *file)?;
                    relative = ((relative + 1) << 7) | (byte & 0x7f) as u64;
                }
                let base_offset = offset.checked_sub(relative).ok_or_else(|| {
                    GitHeightError::malformed("pack", "delta base offset before pack start")
                })?;
                let script = inflate(&mut *file, size)?;
                Ok(RawEntry::OfsDelta {
                    base_offset,
                    script,
                })
            }
            7 => {
                let mut raw = [0u8; 20];
                file.read_exact(&mut raw)?;
                let base = ObjectId::from_bytes(&raw)?;
                let script = inflate(&mut *file, size)?;
                Ok(RawEntry::RefDelta { base, script })
            }
            other => Err(GitHeightError::malformed(
                "pack",
                format!("unknown entry type {other}"),
            )),
        }
    }
}

fn read_byte(reader: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Inflate a zlib stream at the reader's current position, validating the
/// decompressed length against the entry header.
fn inflate(reader: &mut impl Read, expected: u64) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected as usize);
    let mut decoder = ZlibDecoder::new(reader);
    decoder.read_to_end(&mut out)?;
    if out.len() as u64 != expected {
        return Err(GitHeightError::malformed(
            "pack",
            format!(
                "entry inflated to {} bytes, header says {expected}",
                out.len()
            ),
        ));
    }
    Ok(out)
}
