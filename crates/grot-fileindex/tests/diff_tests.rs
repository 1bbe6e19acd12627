//! Co-iteration tests for the tree and directory diff walks.

use std::collections::HashMap;

use bstr::{BStr, BString};
use grot_fileindex::{
    diff, DirDiffCb, DirEntryInfo, FileIndex, FileIndexEntry, FileIndexError, TreeDiffCb,
    TreeReader,
};
use grot_hash::ObjectId;
use grot_object::{Tree, TreeEntry, TreeEntryMode};

fn oid(n: u8) -> ObjectId {
    let mut bytes = [0u8; 20];
    bytes[19] = n;
    ObjectId::from_bytes(&bytes).unwrap()
}

fn blob_entry(name: &str, n: u8) -> TreeEntry {
    TreeEntry {
        mode: TreeEntryMode::Regular,
        name: BString::from(name),
        id: oid(n),
    }
}

fn tree_entry(name: &str, n: u8) -> TreeEntry {
    TreeEntry {
        mode: TreeEntryMode::Tree,
        name: BString::from(name),
        id: oid(n),
    }
}

struct MapReader {
    trees: HashMap<ObjectId, Tree>,
}

impl TreeReader for MapReader {
    fn read_tree(&self, id: &ObjectId) -> Result<Tree, FileIndexError> {
        Ok(self.trees.get(id).expect("tree fixture present").clone())
    }
}

#[derive(Default)]
struct Recorder {
    old_new: Vec<BString>,
    old: Vec<BString>,
    new: Vec<BString>,
}

impl Recorder {
    fn full(path: &BStr, name: &[u8]) -> BString {
        let mut p = BString::from(path.to_vec());
        if !p.is_empty() {
            p.push(b'/');
        }
        p.extend_from_slice(name);
        p
    }
}

impl TreeDiffCb for Recorder {
    fn diff_old_new(
        &mut self,
        ie: &mut FileIndexEntry,
        _te: &TreeEntry,
        _parent: &BStr,
    ) -> Result<(), FileIndexError> {
        self.old_new.push(ie.path.clone());
        Ok(())
    }

    fn diff_old(&mut self, ie: &mut FileIndexEntry, _parent: &BStr) -> Result<(), FileIndexError> {
        self.old.push(ie.path.clone());
        Ok(())
    }

    fn diff_new(&mut self, te: &TreeEntry, parent: &BStr) -> Result<(), FileIndexError> {
        self.new.push(Self::full(parent, &te.name));
        Ok(())
    }
}

/// Fixture: a root tree with `a.txt`, `zebra` and subdir `sub/` holding
/// `one` and `two`.
fn fixture() -> (Tree, MapReader, Vec<&'static str>) {
    let subtree = Tree {
        entries: vec![blob_entry("one", 10), blob_entry("two", 11)],
    };
    let sub_id = oid(100);
    let root = Tree {
        entries: {
            let mut v = vec![
                blob_entry("a.txt", 1),
                tree_entry("sub", 100),
                blob_entry("zebra", 2),
            ];
            v.sort();
            v
        },
    };
    let mut trees = HashMap::new();
    trees.insert(sub_id, subtree);
    (
        root,
        MapReader { trees },
        vec!["a.txt", "sub/one", "sub/two", "zebra"],
    )
}

fn index_of(paths: &[&str]) -> FileIndex {
    let mut idx = FileIndex::new();
    for p in paths {
        idx.add(FileIndexEntry::from_fields(BString::from(*p))).unwrap();
    }
    // A freshly added entry is invisible to walks until flushed.
    let mut buf = Vec::new();
    idx.write(&mut buf).unwrap();
    idx
}

#[test]
fn identical_index_and_tree_only_reports_old_new() {
    let (root, reader, paths) = fixture();
    let mut idx = index_of(&paths);

    let mut rec = Recorder::default();
    diff::diff_tree(&mut idx, &root, b"", None, &reader, &mut rec).unwrap();

    assert_eq!(rec.old_new.len(), paths.len());
    assert!(rec.old.is_empty());
    assert!(rec.new.is_empty());
}

#[test]
fn deleted_index_paths_surface_as_new() {
    let (root, reader, paths) = fixture();
    let mut idx = index_of(&paths);
    idx.remove(b"sub/one").unwrap();
    idx.remove(b"zebra").unwrap();

    let mut rec = Recorder::default();
    diff::diff_tree(&mut idx, &root, b"", None, &reader, &mut rec).unwrap();

    assert_eq!(rec.old_new.len(), paths.len() - 2);
    assert!(rec.old.is_empty());
    assert_eq!(rec.new.len(), 2);
    assert!(rec.new.contains(&BString::from("sub/one")));
    assert!(rec.new.contains(&BString::from("zebra")));
}

#[test]
fn extra_index_paths_surface_as_old() {
    let (root, reader, paths) = fixture();
    let mut all = paths.clone();
    all.push("untracked.c");
    let mut idx = index_of(&all);

    let mut rec = Recorder::default();
    diff::diff_tree(&mut idx, &root, b"", None, &reader, &mut rec).unwrap();

    assert_eq!(rec.old, vec![BString::from("untracked.c")]);
    assert_eq!(rec.old_new.len(), paths.len());
    assert!(rec.new.is_empty());
}

#[test]
fn submodules_are_skipped() {
    let root = Tree {
        entries: vec![
            blob_entry("a", 1),
            TreeEntry {
                mode: TreeEntryMode::Submodule,
                name: BString::from("vendored"),
                id: oid(50),
            },
        ],
    };
    let reader = MapReader {
        trees: HashMap::new(),
    };
    let mut idx = index_of(&["a"]);

    let mut rec = Recorder::default();
    diff::diff_tree(&mut idx, &root, b"", None, &reader, &mut rec).unwrap();
    assert_eq!(rec.old_new.len(), 1);
    assert!(rec.new.is_empty());
}

#[test]
fn entry_name_filter_stops_after_match() {
    let (root, reader, paths) = fixture();
    let mut idx = index_of(&paths);

    let mut rec = Recorder::default();
    diff::diff_tree(&mut idx, &root, b"", Some(b"a.txt"), &reader, &mut rec).unwrap();
    assert_eq!(rec.old_new, vec![BString::from("a.txt")]);
}

#[test]
fn restricted_walk_stays_inside_subdir() {
    let (root, reader, _) = fixture();
    let sub_id = root
        .entries
        .iter()
        .find(|e| e.mode.is_tree())
        .map(|e| e.id)
        .unwrap();
    let subtree = reader.trees.get(&sub_id).unwrap().clone();
    let mut idx = index_of(&["a.txt", "sub/one", "sub/two", "zebra"]);

    let mut rec = Recorder::default();
    diff::diff_tree(&mut idx, &subtree, b"sub", None, &reader, &mut rec).unwrap();
    assert_eq!(
        rec.old_new,
        vec![BString::from("sub/one"), BString::from("sub/two")]
    );
    assert!(rec.old.is_empty() && rec.new.is_empty());
}

// --- directory diff ---

#[derive(Default)]
struct DirRecorder {
    old_new: Vec<BString>,
    old: Vec<BString>,
    new: Vec<BString>,
}

impl DirDiffCb for DirRecorder {
    fn diff_old_new(
        &mut self,
        ie: &mut FileIndexEntry,
        _de: &DirEntryInfo,
        _parent: &BStr,
    ) -> Result<(), FileIndexError> {
        self.old_new.push(ie.path.clone());
        Ok(())
    }

    fn diff_old(&mut self, ie: &mut FileIndexEntry, _parent: &BStr) -> Result<(), FileIndexError> {
        self.old.push(ie.path.clone());
        Ok(())
    }

    fn diff_new(&mut self, de: &DirEntryInfo, parent: &BStr) -> Result<(), FileIndexError> {
        self.new.push(Recorder::full(parent, &de.name));
        Ok(())
    }
}

#[test]
fn directory_walk_matches_index() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
    std::fs::write(dir.path().join("sub/one"), b"1").unwrap();
    std::fs::write(dir.path().join("sub/two"), b"2").unwrap();

    let mut idx = index_of(&["a.txt", "sub/one", "sub/two"]);
    let mut rec = DirRecorder::default();
    diff::diff_dir(&mut idx, dir.path(), b"", &mut rec).unwrap();

    assert_eq!(rec.old_new.len(), 3);
    assert!(rec.old.is_empty());
    assert!(rec.new.is_empty());
}

#[test]
fn untracked_files_and_missing_files_split() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("tracked"), b"t").unwrap();
    std::fs::write(dir.path().join("untracked"), b"u").unwrap();

    let mut idx = index_of(&["gone", "tracked"]);
    let mut rec = DirRecorder::default();
    diff::diff_dir(&mut idx, dir.path(), b"", &mut rec).unwrap();

    assert_eq!(rec.old_new, vec![BString::from("tracked")]);
    assert_eq!(rec.old, vec![BString::from("gone")]);
    assert_eq!(rec.new, vec![BString::from("untracked")]);
}

#[test]
fn metadata_dir_is_excluded_at_root_only() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join(".grot")).unwrap();
    std::fs::write(dir.path().join(".grot/state"), b"x").unwrap();
    std::fs::write(dir.path().join("file"), b"f").unwrap();

    let mut idx = index_of(&["file"]);
    let mut rec = DirRecorder::default();
    diff::diff_dir(&mut idx, dir.path(), b"", &mut rec).unwrap();

    assert_eq!(rec.old_new, vec![BString::from("file")]);
    assert!(rec.new.is_empty());
}

#[test]
fn consecutive_walks_agree() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("d/e")).unwrap();
    std::fs::write(dir.path().join("d/e/deep"), b"x").unwrap();
    std::fs::write(dir.path().join("top"), b"y").unwrap();

    let mut idx = index_of(&["d/e/deep"]);
    let mut first = DirRecorder::default();
    diff::diff_dir(&mut idx, dir.path(), b"", &mut first).unwrap();
    let mut second = DirRecorder::default();
    diff::diff_dir(&mut idx, dir.path(), b"", &mut second).unwrap();

    assert_eq!(first.old_new, second.old_new);
    assert_eq!(first.new, second.new);
    assert_eq!(first.old, second.old);
}
