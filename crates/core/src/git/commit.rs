//! Commit object parsing.

use crate::error::{GitHeightError, Result};
use crate::git::ObjectId;

/// Author or committer identity with its timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Zone offset in minutes east of UTC.
    pub tz_offset_minutes: i32,
}

/// A parsed commit object.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub id: ObjectId,
    pub tree: ObjectId,
    /// Parents in their textual order, which is significant for tie-breaks.
    pub parents: Vec<ObjectId>,
    pub author: Option<Signature>,
}

impl CommitRecord {
    /// Parse the text body of a commit object.
    pub fn parse(id: ObjectId, data: &[u8]) -> Result<Self> {
        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;

        for line in data.split(|b| *b == b'\n') {
            if line.is_empty() {
                break; // commit message follows
            }
            if let Some(rest) = line.strip_prefix(b"tree ") {
                tree = Some(parse_id(rest, "commit")?);
            } else if let Some(rest) = line.strip_prefix(b"parent ") {
                parents.push(parse_id(rest, "commit")?);
            } else if let Some(rest) = line.strip_prefix(b"author ") {
                author = parse_signature(rest);
            }
            // committer, gpgsig, and other headers are not needed here
        }

        let tree = tree.ok_or_else(|| {
            GitHeightError::malformed("commit", format!("{id} has no tree header"))
        })?;
        Ok(CommitRecord {
            id,
            tree,
            parents,
            author,
        })
    }

    /// Author time as .NET ticks (100ns units since 0001-01-01T00:00:00).
    pub fn author_date_ticks(&self) -> Option<i64> {
        const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;
        self.author
            .as_ref()
            .map(|sig| UNIX_EPOCH_TICKS + sig.seconds * 10_000_000)
    }
}

fn parse_id(hex: &[u8], kind: &'static str) -> Result<ObjectId> {
    let text = std::str::from_utf8(hex)
        .map_err(|_| GitHeightError::malformed(kind, "non-ASCII object id"))?;
    ObjectId::from_hex(text.trim_end())
}

/// Parse `Name <email> seconds offset`. A malformed identity yields `None`
/// rather than failing the commit; only the graph structure is load-bearing.
fn parse_signature(raw: &[u8]) -> Option<Signature> {
    let text = String::from_utf8_lossy(raw);
    let open = text.find('<')?;
    let close = text[open..].find('>')? + open;

    let name = text[..open].trim().to_string();
    let email = text[open + 1..close].to_string();

    let mut fields = text[close + 1..].split_whitespace();
    let seconds: i64 = fields.next()?.parse().ok()?;
    let zone = fields.next().unwrap_or("+0000");
    let tz_offset_minutes = parse_zone_offset(zone).unwrap_or(0);

    Some(Signature {
        name,
        email,
        seconds,
        tz_offset_minutes,
    })
}

fn parse_zone_offset(zone: &str) -> Option<i32> {
    let (sign, digits) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => (1, zone),
    };
    if digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    Some(sign * (hours * 60 + minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(hex40: &str) -> ObjectId {
        ObjectId::from_hex(hex40).unwrap()
    }

    #[test]
    fn parses_merge_commit() {
        let body = b"tree 4e912736c27e40b389904d046dc63dc9f578117f\n\
                     parent 00a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3\n\
                     parent ff00000000000000000000000000000000000001\n\
                     author Jane Doe <jane@example.com> 1590000000 +0200\n\
                     committer Jane Doe <jane@example.com> 1590000000 +0200\n\
                     \n\
                     Merge branch 'feature'\n";
        let id = oid("1111111111111111111111111111111111111111");
        let commit = CommitRecord::parse(id, body).unwrap();

        assert_eq!(commit.tree, oid("4e912736c27e40b389904d046dc63dc9f578117f"));
        assert_eq!(
            commit.parents,
            vec![
                oid("00a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3"),
                oid("ff00000000000000000000000000000000000001"),
            ]
        );
        let author = commit.author.unwrap();
        assert_eq!(author.name, "Jane Doe");
        assert_eq!(author.email, "jane@example.com");
        assert_eq!(author.seconds, 1_590_000_000);
        assert_eq!(author.tz_offset_minutes, 120);
    }

    #[test]
    fn parses_root_commit_without_author_failure() {
        let body = b"tree 4e912736c27e40b389904d046dc63dc9f578117f\n\nroot\n";
        let id = oid("2222222222222222222222222222222222222222");
        let commit = CommitRecord::parse(id, body).unwrap();
        assert!(commit.parents.is_empty());
        assert!(commit.author.is_none());
    }

    #[test]
    fn missing_tree_is_malformed() {
        let id = oid("2222222222222222222222222222222222222222");
        assert!(CommitRecord::parse(id, b"author x <x@x> 1 +0000\n\n.\n").is_err());
    }

    #[test]
    fn ticks_conversion_matches_epoch() {
        let body = b"tree 4e912736c27e40b389904d046dc63dc9f578117f\n\
                     author A <a@a> 0 +0000\n\n.\n";
        let commit =
            CommitRecord::parse(oid("2222222222222222222222222222222222222222"), body).unwrap();
        assert_eq!(commit.author_date_ticks(), Some(621_355_968_000_000_000));
    }

    #[test]
    fn negative_zone_offsets() {
        assert_eq!(parse_zone_offset("-0430"), Some(-270));
        assert_eq!(parse_zone_offset("+0000"), Some(0));
        assert_eq!(parse_zone_offset("junk"), None);
    }
}
