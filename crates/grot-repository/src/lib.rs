//! The repository façade: discovery, object access across loose and
//! packed storage, well-known references, id-prefix resolution, and
//! supervision of the privsep helpers.

mod discover;
pub mod prefix;
pub mod refs;

pub use discover::{discover_git_dir, is_git_dir};

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use grot_hash::ObjectId;
use grot_loose::LooseStore;
use grot_object::{Commit, Object, ObjectType, Tag, Tree};
use grot_pack::{Pack, PackIndex};
use grot_privsep::{child, MsgType, PrivsepChild};
use tracing::debug;

/// Errors produced by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a git repository (or any parent up to the root): {0}")]
    NotFound(PathBuf),

    #[error("invalid git directory {path}: {reason}")]
    InvalidGitDir { path: PathBuf, reason: String },

    #[error("no such object: {0}")]
    NoObject(String),

    #[error("ambiguous object id prefix: {0}")]
    AmbiguousId(String),

    #[error("object {id} is a {actual}, expected {expected}")]
    UnexpectedType {
        id: ObjectId,
        actual: ObjectType,
        expected: ObjectType,
    },

    #[error("invalid reference {name}: {reason}")]
    BadRef { name: String, reason: String },

    #[error(transparent)]
    Hash(#[from] grot_hash::HashError),

    #[error(transparent)]
    Object(#[from] grot_object::ObjectError),

    #[error(transparent)]
    Loose(#[from] grot_loose::LooseError),

    #[error(transparent)]
    Pack(#[from] grot_pack::PackError),

    #[error(transparent)]
    Privsep(#[from] grot_privsep::PrivsepError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An open pack and its index, discovered under `objects/pack/`.
pub struct PackHandle {
    pub index: PackIndex,
    pub pack: Pack,
}

/// An open repository.
///
/// Single-threaded by design: one handle owns its packs, its loose
/// store, and its helper processes.
pub struct Repository {
    git_dir: PathBuf,
    work_tree: Option<PathBuf>,
    loose: LooseStore,
    packs: Vec<PackHandle>,
    helpers: RefCell<HashMap<&'static str, PrivsepChild>>,
}

impl Repository {
    /// Open a repository at `path`: a worktree root, a `.git`
    /// directory, or a bare repository directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let path = path.as_ref();
        let discovered = if is_git_dir(path) {
            discover::open_git_dir(path)?
        } else if path.join(".git").exists() {
            discover::open_work_tree(path)?
        } else {
            return Err(RepoError::NotFound(path.to_path_buf()));
        };
        Self::from_discovered(discovered)
    }

    /// Discover a repository by walking up from `start`.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self, RepoError> {
        Self::from_discovered(discover::discover_git_dir(start.as_ref())?)
    }

    fn from_discovered(discovered: discover::DiscoveredRepo) -> Result<Self, RepoError> {
        let objects_dir = discovered.git_dir.join("objects");
        let loose = LooseStore::open(&objects_dir);
        let packs = discover_packs(&objects_dir)?;
        debug!(
            git_dir = %discovered.git_dir.display(),
            packs = packs.len(),
            "opened repository"
        );
        Ok(Self {
            git_dir: discovered.git_dir,
            work_tree: discovered.work_tree,
            loose,
            packs,
            helpers: RefCell::new(HashMap::new()),
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn work_tree(&self) -> Option<&Path> {
        self.work_tree.as_deref()
    }

    pub fn is_bare(&self) -> bool {
        self.work_tree.is_none()
    }

    pub fn loose(&self) -> &LooseStore {
        &self.loose
    }

    pub fn packs(&self) -> &[PackHandle] {
        &self.packs
    }

    /// Re-scan `objects/pack/` (after a fetch or repack).
    pub fn refresh_packs(&mut self) -> Result<(), RepoError> {
        self.packs = discover_packs(self.loose.objects_dir())?;
        Ok(())
    }

    // --- object access ---

    /// Does any storage layer contain the object?
    pub fn contains(&self, id: &ObjectId) -> bool {
        if self.loose.contains(id) {
            return true;
        }
        self.packs.iter().any(|p| p.index.lookup(id).is_some())
    }

    /// Read and parse an object, consulting loose storage first, then
    /// every pack.
    pub fn read_object(&self, id: &ObjectId) -> Result<Option<Object>, RepoError> {
        if let Some(obj) = self.loose.read(id)? {
            return Ok(Some(obj));
        }
        for handle in &self.packs {
            if let Some(packed) = handle.pack.read_object(&handle.index, id)? {
                return Ok(Some(Object::parse_content(packed.obj_type, &packed.data)?));
            }
        }
        Ok(None)
    }

    /// Read an object that must exist.
    pub fn require_object(&self, id: &ObjectId) -> Result<Object, RepoError> {
        self.read_object(id)?
            .ok_or_else(|| RepoError::NoObject(id.to_hex()))
    }

    pub fn read_commit(&self, id: &ObjectId) -> Result<Commit, RepoError> {
        match self.require_object(id)? {
            Object::Commit(commit) => Ok(commit),
            other => Err(RepoError::UnexpectedType {
                id: *id,
                actual: other.object_type(),
                expected: ObjectType::Commit,
            }),
        }
    }

    pub fn read_tree(&self, id: &ObjectId) -> Result<Tree, RepoError> {
        match self.require_object(id)? {
            Object::Tree(tree) => Ok(tree),
            other => Err(RepoError::UnexpectedType {
                id: *id,
                actual: other.object_type(),
                expected: ObjectType::Tree,
            }),
        }
    }

    pub fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>, RepoError> {
        match self.require_object(id)? {
            Object::Blob(blob) => Ok(blob.data),
            other => Err(RepoError::UnexpectedType {
                id: *id,
                actual: other.object_type(),
                expected: ObjectType::Blob,
            }),
        }
    }

    pub fn read_tag(&self, id: &ObjectId) -> Result<Tag, RepoError> {
        match self.require_object(id)? {
            Object::Tag(tag) => Ok(tag),
            other => Err(RepoError::UnexpectedType {
                id: *id,
                actual: other.object_type(),
                expected: ObjectType::Tag,
            }),
        }
    }

    /// Resolve a hex prefix (>= 2 characters) to a unique object id.
    pub fn resolve_prefix(&self, hex: &str) -> Result<ObjectId, RepoError> {
        prefix::resolve_prefix(self, hex)
    }

    /// Resolve a well-known or path reference to an object id.
    pub fn resolve_ref(&self, name: &str) -> Result<Option<ObjectId>, RepoError> {
        refs::resolve_ref(&self.git_dir, name)
    }

    // --- privsep helpers ---

    /// The channel of a running helper, spawning it on first use.
    fn helper(&self, name: &'static str) -> Result<(), RepoError> {
        let mut helpers = self.helpers.borrow_mut();
        if !helpers.contains_key(name) {
            let spawned = PrivsepChild::spawn_helper(name)?;
            helpers.insert(name, spawned);
        }
        Ok(())
    }

    fn with_helper<T>(
        &self,
        name: &'static str,
        f: impl FnOnce(&grot_privsep::Channel) -> Result<T, grot_privsep::PrivsepError>,
    ) -> Result<T, RepoError> {
        self.helper(name)?;
        let helpers = self.helpers.borrow();
        let child = helpers.get(name).expect("helper spawned above");
        Ok(f(child.channel())?)
    }

    /// Read a packed object through the pack helper: the pack and its
    /// index stay open in the main process and only their descriptors
    /// cross into the sandbox.
    pub fn read_packed_object_privsep(&self, id: &ObjectId) -> Result<Object, RepoError> {
        use grot_privsep::Channel;

        let Some((handle, table_pos)) = self
            .packs
            .iter()
            .find_map(|h| h.index.lookup(id).map(|pos| (h, pos)))
        else {
            return Err(RepoError::NoObject(id.to_hex()));
        };

        let idx_file = File::open(handle.index.path())?;
        let idx_len = idx_file.metadata()?.len();
        let pack_file = File::open(handle.pack.path())?;
        let pack_len = pack_file.metadata()?.len();
        let pack_path = handle.pack.path().to_path_buf();
        let mut spill = grot_utils::tempfile::scratch_file()
            .map_err(|e| RepoError::Io(std::io::Error::other(e.to_string())))?;
        let id = *id;

        self.with_helper(child::PROG_READ_PACK, move |channel| {
            channel.send_packidx(idx_len, idx_file.as_fd())?;
            channel.send_pack(&pack_path, pack_len, pack_file.as_fd())?;
            channel.send_tmpfd(spill.as_fd())?;
            channel.send_packed_object_req(&id, table_pos)?;

            let frame = channel.recv_expect(MsgType::Object)?;
            let (_, meta) = Channel::decode_object_meta(&frame.payload)?;
            let obj = match meta.obj_type {
                ObjectType::Commit => Object::Commit(channel.recv_commit()?),
                ObjectType::Tree => Object::Tree(channel.recv_tree()?),
                ObjectType::Tag => Object::Tag(channel.recv_tag()?),
                ObjectType::Blob => {
                    let (data, _) = channel.recv_blob(Some(&mut spill))?;
                    Object::Blob(grot_object::Blob::new(data))
                }
            };
            Ok(obj)
        })
    }

    /// Parse a commit in the commit helper from its loose object file.
    pub fn read_commit_privsep(&self, id: &ObjectId) -> Result<Commit, RepoError> {
        let path = self.loose.object_path(id);
        let file = File::open(&path)
            .map_err(|_| RepoError::NoObject(id.to_hex()))?;
        self.with_helper(child::PROG_READ_COMMIT, |channel| {
            channel.send_obj_request(MsgType::CommitRequest, id, file.as_fd())?;
            channel.recv_commit()
        })
    }

    /// Author name from the repository gitconfig, via the gitconfig
    /// helper.
    pub fn gitconfig_author_name(&self) -> Result<Option<String>, RepoError> {
        let value = self.gitconfig_str(MsgType::GitconfigAuthorNameRequest)?;
        Ok((!value.is_empty()).then_some(value))
    }

    /// Author email from the repository gitconfig.
    pub fn gitconfig_author_email(&self) -> Result<Option<String>, RepoError> {
        let value = self.gitconfig_str(MsgType::GitconfigAuthorEmailRequest)?;
        Ok((!value.is_empty()).then_some(value))
    }

    /// `core.repositoryformatversion` from the repository gitconfig.
    pub fn gitconfig_repository_format_version(&self) -> Result<i64, RepoError> {
        let config = File::open(self.git_dir.join("config"))?;
        self.with_helper(child::PROG_READ_GITCONFIG, |channel| {
            channel.send(MsgType::GitconfigParseRequest, b"", Some(config.as_fd()))?;
            channel.send(
                MsgType::GitconfigRepositoryFormatVersionRequest,
                b"",
                None,
            )?;
            channel.recv_gitconfig_int()
        })
    }

    /// Configured remotes, via the gitconfig helper.
    pub fn gitconfig_remotes(&self) -> Result<Vec<(String, String)>, RepoError> {
        let config = File::open(self.git_dir.join("config"))?;
        self.with_helper(child::PROG_READ_GITCONFIG, |channel| {
            channel.send(MsgType::GitconfigParseRequest, b"", Some(config.as_fd()))?;
            channel.send(MsgType::GitconfigRemotesRequest, b"", None)?;
            channel.recv_gitconfig_remotes()
        })
    }

    fn gitconfig_str(&self, request: MsgType) -> Result<String, RepoError> {
        let config = File::open(self.git_dir.join("config"))?;
        self.with_helper(child::PROG_READ_GITCONFIG, |channel| {
            channel.send(MsgType::GitconfigParseRequest, b"", Some(config.as_fd()))?;
            channel.send(request, b"", None)?;
            channel.recv_gitconfig_str()
        })
    }

    /// Stop every running helper. Errors from already-dead helpers are
    /// reported but do not stop the teardown.
    pub fn close(self) -> Result<(), RepoError> {
        let mut helpers = self.helpers.into_inner();
        let mut first_err = None;
        for (_, child) in helpers.drain() {
            if let Err(e) = child.stop() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Every `.idx` under `objects/pack/` with its `.pack`.
fn discover_packs(objects_dir: &Path) -> Result<Vec<PackHandle>, RepoError> {
    let pack_dir = objects_dir.join("pack");
    let mut handles = Vec::new();
    let entries = match std::fs::read_dir(&pack_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(handles),
        Err(e) => return Err(RepoError::Io(e)),
    };

    let mut idx_paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "idx"))
        .collect();
    idx_paths.sort();

    for idx_path in idx_paths {
        let pack_path = idx_path.with_extension("pack");
        if !pack_path.is_file() {
            continue;
        }
        let index = PackIndex::open(&idx_path, false)?;
        let pack = Pack::open(&pack_path)?;
        handles.push(PackHandle { index, pack });
    }
    Ok(handles)
}

mod integration {
    //! Trait wiring for the graph walker and the file-index tree diff.

    use super::*;
    use grot_fileindex::{FileIndexError, TreeReader};
    use grot_revwalk::{CommitReader, GraphError};

    impl CommitReader for Repository {
        fn read_commit(&self, id: &ObjectId) -> Result<Commit, GraphError> {
            match Repository::read_commit(self, id) {
                Ok(commit) => Ok(commit),
                Err(RepoError::NoObject(_)) => Err(GraphError::NoObject(*id)),
                Err(RepoError::UnexpectedType { .. }) => Err(GraphError::NotACommit(*id)),
                Err(e) => Err(GraphError::Source(Box::new(e))),
            }
        }
    }

    impl TreeReader for Repository {
        fn read_tree(&self, id: &ObjectId) -> Result<Tree, FileIndexError> {
            Repository::read_tree(self, id)
                .map_err(|e| FileIndexError::Io(std::io::Error::other(e.to_string())))
        }
    }
}
