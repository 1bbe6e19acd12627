//! File-index entries: on-disk field layout and stat refresh.

use std::path::Path;

use bstr::BString;
use grot_hash::{ObjectId, SHA1_DIGEST_LENGTH};

use crate::FileIndexError;

// Flag word layout.
pub(crate) const F_PATH_LEN: u32 = 0x0000_0fff;
pub(crate) const F_STAGE: u32 = 0x0000_f000;
pub(crate) const F_STAGE_SHIFT: u32 = 12;
pub(crate) const F_NOT_FLUSHED: u32 = 0x0001_0000;
pub(crate) const F_NO_BLOB: u32 = 0x0002_0000;
pub(crate) const F_NO_COMMIT: u32 = 0x0004_0000;
pub(crate) const F_NO_FILE_ON_DISK: u32 = 0x0008_0000;

// Mode word layout: file type in the low 4 bits, permissions above.
pub(crate) const MODE_FILE_TYPE: u16 = 0x000f;
pub(crate) const MODE_REGULAR_FILE: u16 = 1;
pub(crate) const MODE_SYMLINK: u16 = 2;
pub(crate) const MODE_PERMS_SHIFT: u16 = 4;

/// Staging slot of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    None,
    Modify,
    Add,
    Delete,
}

impl Stage {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            1 => Self::Modify,
            2 => Self::Add,
            3 => Self::Delete,
            _ => Self::None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Modify => 1,
            Self::Add => 2,
            Self::Delete => 3,
        }
    }

    /// Stages that carry a staged blob id on disk.
    pub fn has_staged_blob(self) -> bool {
        matches!(self, Self::Modify | Self::Add)
    }
}

/// One tracked file.
///
/// Field widths match the on-disk encoding exactly; `size` keeps only
/// the low 32 bits of the file size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIndexEntry {
    pub ctime_sec: u64,
    pub ctime_nsec: u64,
    pub mtime_sec: u64,
    pub mtime_nsec: u64,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub mode: u16,
    pub blob: ObjectId,
    pub commit: ObjectId,
    pub flags: u32,
    pub path: BString,
    pub staged_blob: ObjectId,
}

impl FileIndexEntry {
    /// Create an entry for `relpath`, stat `ondisk_path`, and record the
    /// given blob/commit ids.
    pub fn new(
        ondisk_path: &Path,
        relpath: &[u8],
        blob: Option<&ObjectId>,
        commit: Option<&ObjectId>,
    ) -> Result<Self, FileIndexError> {
        let mut entry = Self::from_fields(BString::from(relpath));
        entry.update(ondisk_path, blob, commit, true)?;
        Ok(entry)
    }

    /// A zeroed entry for `path` with the capped path length recorded in
    /// the flag word.
    pub fn from_fields(path: BString) -> Self {
        let len = path.len().min(F_PATH_LEN as usize) as u32;
        let null = ObjectId::from_bytes(&[0u8; SHA1_DIGEST_LENGTH]).expect("20 zero bytes");
        Self {
            ctime_sec: 0,
            ctime_nsec: 0,
            mtime_sec: 0,
            mtime_nsec: 0,
            uid: 0,
            gid: 0,
            size: 0,
            mode: 0,
            blob: null,
            commit: null,
            flags: len,
            path,
            staged_blob: null,
        }
    }

    /// Refresh stat-derived fields from `ondisk_path`.
    ///
    /// A missing file is only tolerated when the entry is already marked
    /// deleted from disk. Timestamps are refreshed only when
    /// `update_timestamps` is set. The blob and commit ids toggle their
    /// respective absence flags.
    pub fn update(
        &mut self,
        ondisk_path: &Path,
        blob: Option<&ObjectId>,
        commit: Option<&ObjectId>,
        update_timestamps: bool,
    ) -> Result<(), FileIndexError> {
        match std::fs::symlink_metadata(ondisk_path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.flags & F_NO_FILE_ON_DISK == 0 {
                    return Err(FileIndexError::Io(e));
                }
            }
            Err(e) => return Err(FileIndexError::Io(e)),
            Ok(meta) => {
                if meta.is_dir() {
                    return Err(FileIndexError::IsDirectory {
                        path: ondisk_path.display().to_string(),
                    });
                }
                self.flags &= !F_NO_FILE_ON_DISK;
                self.refresh_stat(&meta, update_timestamps);
            }
        }

        match blob {
            Some(id) => {
                self.blob = *id;
                self.flags &= !F_NO_BLOB;
            }
            None => self.flags |= F_NO_BLOB,
        }
        match commit {
            Some(id) => {
                self.commit = *id;
                self.flags &= !F_NO_COMMIT;
            }
            None => self.flags |= F_NO_COMMIT,
        }
        Ok(())
    }

    #[cfg(unix)]
    fn refresh_stat(&mut self, meta: &std::fs::Metadata, update_timestamps: bool) {
        use std::os::unix::fs::MetadataExt;
        if update_timestamps {
            self.ctime_sec = meta.ctime() as u64;
            self.ctime_nsec = meta.ctime_nsec() as u64;
            self.mtime_sec = meta.mtime() as u64;
            self.mtime_nsec = meta.mtime_nsec() as u64;
        }
        self.uid = meta.uid();
        self.gid = meta.gid();
        self.size = (meta.len() & 0xffff_ffff) as u32;
        let file_type = if meta.file_type().is_symlink() {
            MODE_SYMLINK
        } else {
            MODE_REGULAR_FILE
        };
        self.mode = file_type | perms_from_mode(meta.mode());
    }

    #[cfg(not(unix))]
    fn refresh_stat(&mut self, meta: &std::fs::Metadata, update_timestamps: bool) {
        use std::time::UNIX_EPOCH;
        if update_timestamps {
            if let Ok(m) = meta.modified().and_then(|t| {
                t.duration_since(UNIX_EPOCH)
                    .map_err(|_| std::io::Error::other("pre-epoch mtime"))
            }) {
                self.mtime_sec = m.as_secs();
                self.mtime_nsec = m.subsec_nanos() as u64;
                self.ctime_sec = self.mtime_sec;
                self.ctime_nsec = self.mtime_nsec;
            }
        }
        self.size = (meta.len() & 0xffff_ffff) as u32;
        self.mode = MODE_REGULAR_FILE | (0o644 << MODE_PERMS_SHIFT);
    }

    /// Mark the entry's file as gone from the working tree.
    pub fn mark_deleted_from_disk(&mut self) {
        self.flags |= F_NO_FILE_ON_DISK;
    }

    /// Path length as recorded in the flag word (capped at 0xfff).
    pub fn flagged_path_len(&self) -> usize {
        (self.flags & F_PATH_LEN) as usize
    }

    pub fn stage(&self) -> Stage {
        Stage::from_bits((self.flags & F_STAGE) >> F_STAGE_SHIFT)
    }

    pub fn set_stage(&mut self, stage: Stage) {
        self.flags = (self.flags & !F_STAGE) | ((stage.bits() << F_STAGE_SHIFT) & F_STAGE);
    }

    pub fn not_flushed(&self) -> bool {
        self.flags & F_NOT_FLUSHED != 0
    }

    pub(crate) fn set_not_flushed(&mut self, on: bool) {
        if on {
            self.flags |= F_NOT_FLUSHED;
        } else {
            self.flags &= !F_NOT_FLUSHED;
        }
    }

    pub fn has_blob(&self) -> bool {
        self.flags & F_NO_BLOB == 0
    }

    pub fn has_commit(&self) -> bool {
        self.flags & F_NO_COMMIT == 0
    }

    pub fn has_file_on_disk(&self) -> bool {
        self.flags & F_NO_FILE_ON_DISK == 0
    }

    /// Is the mode's file type a symlink?
    pub fn is_symlink(&self) -> bool {
        self.mode & MODE_FILE_TYPE == MODE_SYMLINK
    }

    /// Permission bits (0o777-masked).
    pub fn perms(&self) -> u16 {
        self.mode >> MODE_PERMS_SHIFT
    }
}

/// Extract the 12 permission bits from a stat mode and park them above
/// the file-type nibble.
#[cfg(unix)]
pub(crate) fn perms_from_mode(st_mode: u32) -> u16 {
    ((st_mode & 0o777) as u16) << MODE_PERMS_SHIFT
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn stage_round_trip() {
        let mut e = FileIndexEntry::from_fields(BString::from("f"));
        assert_eq!(e.stage(), Stage::None);
        for stage in [Stage::Modify, Stage::Add, Stage::Delete, Stage::None] {
            e.set_stage(stage);
            assert_eq!(e.stage(), stage);
        }
    }

    #[test]
    fn flags_start_with_path_len_and_no_ids() {
        let e = FileIndexEntry::from_fields(BString::from("a/b.txt"));
        assert_eq!(e.flagged_path_len(), 7);
        // from_fields records no absence flags; new()/update() set them.
        assert!(e.has_blob());
        assert!(e.has_commit());
    }

    #[test]
    fn long_path_caps_flag_but_keeps_path() {
        let long = "x/".repeat(3000) + "f";
        let e = FileIndexEntry::from_fields(BString::from(long.as_str()));
        assert_eq!(e.flagged_path_len(), 0xfff);
        assert_eq!(e.path.len(), long.len());
    }

    #[test]
    fn update_stats_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("tracked");
        let mut f = std::fs::File::create(&file_path).unwrap();
        f.write_all(b"contents").unwrap();
        drop(f);

        let e = FileIndexEntry::new(&file_path, b"tracked", None, None).unwrap();
        assert_eq!(e.size, 8);
        assert!(!e.is_symlink());
        assert!(e.has_file_on_disk());
        assert!(!e.has_blob());
        assert!(!e.has_commit());
        assert!(e.mtime_sec > 0);
    }

    #[test]
    fn update_missing_file_needs_deleted_mark() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let mut e = FileIndexEntry::from_fields(BString::from("gone"));
        assert!(e.update(&gone, None, None, true).is_err());

        e.mark_deleted_from_disk();
        e.update(&gone, None, None, true).unwrap();
        assert!(!e.has_file_on_disk());
    }

    #[test]
    fn update_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut e = FileIndexEntry::from_fields(BString::from("d"));
        assert!(matches!(
            e.update(dir.path(), None, None, true),
            Err(FileIndexError::IsDirectory { .. })
        ));
    }

    #[test]
    fn blob_toggles_absence_flag() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("f");
        std::fs::write(&file_path, b"x").unwrap();
        let id = ObjectId::from_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap();

        let mut e = FileIndexEntry::new(&file_path, b"f", Some(&id), None).unwrap();
        assert!(e.has_blob());
        assert!(!e.has_commit());

        e.update(&file_path, None, Some(&id), false).unwrap();
        assert!(!e.has_blob());
        assert!(e.has_commit());
    }
}
