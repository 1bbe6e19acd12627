use bstr::{BStr, BString, ByteSlice};
use grot_hash::ObjectId;

use crate::ObjectError;

/// A parsed commit record.
///
/// Author and committer lines are kept as raw bytes; the committer
/// timestamp is extracted on demand from the trailing
/// `<epoch> <zone>` tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Id of the root tree.
    pub tree: ObjectId,
    /// Parent commit ids, in header order (empty for a root commit).
    pub parents: Vec<ObjectId>,
    /// The full author line ("Name <email> epoch zone").
    pub author: BString,
    /// The full committer line.
    pub committer: BString,
    /// Log message bytes (everything after the blank separator line).
    pub message: BString,
}

impl Commit {
    /// Parse commit content (no loose header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut tree: Option<ObjectId> = None;
        let mut parents = Vec::new();
        let mut author: Option<BString> = None;
        let mut committer: Option<BString> = None;

        let mut pos = 0;
        while pos < content.len() {
            if content[pos] == b'\n' {
                pos += 1;
                break;
            }
            let line_end = content[pos..]
                .find_byte(b'\n')
                .map(|p| p + pos)
                .unwrap_or(content.len());
            let line = &content[pos..line_end];

            if let Some(space_pos) = line.find_byte(b' ') {
                let key = &line[..space_pos];
                let value = &line[space_pos + 1..];
                match key {
                    b"tree" => tree = Some(parse_id(value)?),
                    b"parent" => parents.push(parse_id(value)?),
                    b"author" => author = Some(BString::from(value)),
                    b"committer" => committer = Some(BString::from(value)),
                    // gpgsig, mergetag and friends are preserved only in
                    // the raw object; the record does not model them.
                    _ => {}
                }
            }
            pos = line_end + 1;
        }

        let tree = tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?;
        let author = author.ok_or(ObjectError::MissingCommitField { field: "author" })?;
        let committer =
            committer.ok_or(ObjectError::MissingCommitField { field: "committer" })?;
        let message = BString::from(&content[pos.min(content.len())..]);

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            message,
        })
    }

    /// Committer timestamp in seconds since the epoch.
    ///
    /// The committer line ends in `<epoch> <zone>`; the token before the
    /// trailing zone offset is the timestamp. Malformed lines are bad
    /// object data.
    pub fn committer_time(&self) -> Result<i64, ObjectError> {
        parse_signature_time(self.committer.as_ref())
    }

    /// Author timestamp in seconds since the epoch.
    pub fn author_time(&self) -> Result<i64, ObjectError> {
        parse_signature_time(self.author.as_ref())
    }

    /// First line of the log message.
    pub fn summary(&self) -> &BStr {
        let msg: &[u8] = self.message.as_ref();
        match msg.find_byte(b'\n') {
            Some(pos) => BStr::new(&msg[..pos]),
            None => BStr::new(msg),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

fn parse_id(value: &[u8]) -> Result<ObjectId, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::BadObjectData("non-UTF8 object id".into()))?;
    Ok(ObjectId::from_hex(hex)?)
}

/// Extract the epoch-seconds token from a signature line.
///
/// Strips the trailing zone token, then takes the last remaining token
/// as the timestamp.
fn parse_signature_time(line: &[u8]) -> Result<i64, ObjectError> {
    let malformed = || ObjectError::BadObjectData("malformed signature timestamp".into());

    let zone_space = line.iter().rposition(|&b| b == b' ').ok_or_else(malformed)?;
    let before_zone = &line[..zone_space];
    let time_space = before_zone
        .iter()
        .rposition(|&b| b == b' ')
        .ok_or_else(malformed)?;
    let token = &before_zone[time_space + 1..];
    let s = std::str::from_utf8(token).map_err(|_| malformed())?;
    let time: i64 = s.parse().map_err(|_| malformed())?;
    if time < 0 {
        return Err(malformed());
    }
    Ok(time)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n");
        out.extend_from_slice(b"parent 0000000000000000000000000000000000000001\n");
        out.extend_from_slice(b"author John Doe <john@example.com> 1234567890 +0000\n");
        out.extend_from_slice(b"committer Jane Doe <jane@example.com> 1234567891 -0500\n");
        out.extend_from_slice(b"\nInitial commit\n");
        out
    }

    #[test]
    fn parse_commit() {
        let commit = Commit::parse(&sample()).unwrap();
        assert_eq!(commit.tree.to_hex(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(commit.parents.len(), 1);
        assert_eq!(
            commit.committer.as_slice(),
            b"Jane Doe <jane@example.com> 1234567891 -0500"
        );
        assert_eq!(commit.message.as_slice(), b"Initial commit\n");
        assert_eq!(commit.summary().as_bytes(), b"Initial commit");
    }

    #[test]
    fn committer_time_extraction() {
        let commit = Commit::parse(&sample()).unwrap();
        assert_eq!(commit.committer_time().unwrap(), 1234567891);
        assert_eq!(commit.author_time().unwrap(), 1234567890);
    }

    #[test]
    fn committer_time_with_spaced_name() {
        let mut data = Vec::new();
        data.extend_from_slice(b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n");
        data.extend_from_slice(b"author A B C <a@b.com> 77 +0100\n");
        data.extend_from_slice(b"committer A B C <a@b.com> 99 +0100\n");
        data.extend_from_slice(b"\nx\n");
        let commit = Commit::parse(&data).unwrap();
        assert_eq!(commit.committer_time().unwrap(), 99);
    }

    #[test]
    fn malformed_committer_time() {
        let mut data = Vec::new();
        data.extend_from_slice(b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n");
        data.extend_from_slice(b"author A <a@b.com> 1 +0000\n");
        data.extend_from_slice(b"committer nospaces\n");
        data.extend_from_slice(b"\nx\n");
        let commit = Commit::parse(&data).unwrap();
        assert!(matches!(
            commit.committer_time(),
            Err(ObjectError::BadObjectData(_))
        ));
    }

    #[test]
    fn root_and_merge() {
        let mut data = Vec::new();
        data.extend_from_slice(b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n");
        data.extend_from_slice(b"author A <a@b.com> 1000000000 +0000\n");
        data.extend_from_slice(b"committer A <a@b.com> 1000000000 +0000\n");
        data.extend_from_slice(b"\nroot\n");
        let commit = Commit::parse(&data).unwrap();
        assert!(commit.is_root());
        assert!(!commit.is_merge());
    }

    #[test]
    fn missing_tree_errors() {
        let data =
            b"author A <a@b.com> 1 +0000\ncommitter A <a@b.com> 1 +0000\n\nmsg\n";
        assert!(matches!(
            Commit::parse(data),
            Err(ObjectError::MissingCommitField { field: "tree" })
        ));
    }
}
