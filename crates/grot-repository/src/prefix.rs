//! Object-id prefix resolution across loose storage and every pack.

use grot_hash::{HashError, IdPrefix, ObjectId};
use grot_loose::iter_loose_ids;

use crate::{RepoError, Repository};

/// Shortest abbreviation the user-facing resolver accepts. Pack
/// indexes themselves answer prefixes down to two characters.
pub const MINIMUM_ABBREV: usize = 4;

/// Resolve a hex prefix to the unique object id it abbreviates.
///
/// Prefixes shorter than [`MINIMUM_ABBREV`] (or containing non-hex
/// characters) are invalid id strings; a prefix matching several
/// distinct objects is ambiguous; no match at all is a missing object.
pub fn resolve_prefix(repo: &Repository, hex: &str) -> Result<ObjectId, RepoError> {
    if hex.len() < MINIMUM_ABBREV {
        return Err(RepoError::Hash(HashError::BadIdString(hex.to_string())));
    }
    let prefix = IdPrefix::parse(hex)?;

    let mut matches: Vec<ObjectId> = Vec::new();

    for id in iter_loose_ids(repo.loose())? {
        if id.matches_prefix(&prefix) {
            matches.push(id);
        }
    }
    for handle in repo.packs() {
        matches.extend(handle.index.match_prefix(&prefix));
    }

    matches.sort();
    matches.dedup();

    match matches.len() {
        0 => Err(RepoError::NoObject(hex.to_string())),
        1 => Ok(matches[0]),
        _ => Err(RepoError::AmbiguousId(hex.to_string())),
    }
}
