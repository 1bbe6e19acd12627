//! Reference reading: the well-known names and arbitrary ref paths.
//!
//! Only the read surface the façade needs: loose ref files under the
//! git dir with `ref: ` indirection, plus the packed-refs file as a
//! fallback. Reference updates live outside this library.

use std::path::Path;

use grot_hash::ObjectId;

use crate::RepoError;

pub const HEAD: &str = "HEAD";
pub const ORIG_HEAD: &str = "ORIG_HEAD";
pub const MERGE_HEAD: &str = "MERGE_HEAD";
pub const FETCH_HEAD: &str = "FETCH_HEAD";

const MAX_SYMREF_DEPTH: usize = 32;

/// Resolve a reference name to an object id.
///
/// `name` is either one of the well-known names or a path like
/// `refs/heads/main`. Returns `Ok(None)` when the reference does not
/// exist (an unborn branch, for instance).
pub fn resolve_ref(git_dir: &Path, name: &str) -> Result<Option<ObjectId>, RepoError> {
    let mut current = name.to_string();
    for _ in 0..MAX_SYMREF_DEPTH {
        match read_ref_file(git_dir, &current)? {
            Some(RefContent::Symbolic(target)) => current = target,
            Some(RefContent::Direct(id)) => return Ok(Some(id)),
            None => {
                // Loose file absent: consult packed-refs.
                return lookup_packed_ref(git_dir, &current);
            }
        }
    }
    Err(RepoError::BadRef {
        name: name.to_string(),
        reason: "too many levels of symbolic references".into(),
    })
}

enum RefContent {
    Direct(ObjectId),
    Symbolic(String),
}

fn read_ref_file(git_dir: &Path, name: &str) -> Result<Option<RefContent>, RepoError> {
    let path = git_dir.join(name);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RepoError::Io(e)),
    };
    let first_line = content.lines().next().unwrap_or("");

    if let Some(target) = first_line.strip_prefix("ref: ") {
        return Ok(Some(RefContent::Symbolic(target.trim().to_string())));
    }

    // FETCH_HEAD lines carry extra fields after the id.
    let hex: String = first_line
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    if hex.len() != 40 {
        return Err(RepoError::BadRef {
            name: name.to_string(),
            reason: format!("unparseable content: {first_line}"),
        });
    }
    Ok(Some(RefContent::Direct(ObjectId::from_hex(&hex)?)))
}

fn lookup_packed_ref(git_dir: &Path, name: &str) -> Result<Option<ObjectId>, RepoError> {
    let content = match std::fs::read_to_string(git_dir.join("packed-refs")) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RepoError::Io(e)),
    };
    for line in content.lines() {
        if line.starts_with('#') || line.starts_with('^') {
            continue;
        }
        let Some((hex, ref_name)) = line.split_once(' ') else {
            continue;
        };
        if ref_name.trim() == name {
            return Ok(Some(ObjectId::from_hex(hex.trim())?));
        }
    }
    Ok(None)
}
