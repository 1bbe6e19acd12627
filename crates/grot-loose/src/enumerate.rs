use std::fs;

use grot_hash::ObjectId;

use crate::{LooseError, LooseStore};

/// Enumerate every loose object id under the store.
///
/// Walks the 256 two-hex-char fanout directories; entries that do not
/// look like object files are skipped.
pub fn iter_loose_ids(store: &LooseStore) -> Result<Vec<ObjectId>, LooseError> {
    let mut ids = Vec::new();
    let dir = match fs::read_dir(store.objects_dir()) {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(LooseError::Io(e)),
    };

    for entry in dir {
        let entry = entry?;
        let name = entry.file_name();
        let Some(prefix) = name.to_str() else {
            continue;
        };
        if prefix.len() != 2 || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            continue;
        }
        for obj in fs::read_dir(entry.path())? {
            let obj = obj?;
            let fname = obj.file_name();
            let Some(rest) = fname.to_str() else {
                continue;
            };
            if rest.len() != 38 {
                continue;
            }
            let hex = format!("{prefix}{rest}");
            if let Ok(id) = ObjectId::from_hex(&hex) {
                ids.push(id);
            }
        }
    }
    ids.sort();
    Ok(ids)
}
