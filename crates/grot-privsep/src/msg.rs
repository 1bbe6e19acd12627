//! Typed message payloads exchanged over the privsep channel.
//!
//! Fixed-width fields use host byte order. Payloads that can outgrow a
//! frame (commit log messages, tag messages, tree entries) are split
//! into continuation messages; large blobs bypass the channel through a
//! descriptor supplied by the requester.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::BorrowedFd;

use bstr::BString;
use grot_hash::{ObjectId, SHA1_DIGEST_LENGTH};
use grot_object::{Commit, ObjectHandle, ObjectType, PackedLocation, Tag, Tree, TreeEntry};

use crate::frame::Channel;
use crate::{PrivsepError, WireErrorKind, MAX_FRAME_DATA};

/// Message type tags, one per frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Error,
    Stop,
    ObjectRequest,
    Object,
    CommitRequest,
    Commit,
    CommitLogmsg,
    TreeRequest,
    Tree,
    TreeEntry,
    BlobRequest,
    BlobOutfd,
    Blob,
    TagRequest,
    Tag,
    TagTagmsg,
    PackIdx,
    Pack,
    PackedObjectRequest,
    TmpFd,
    GitconfigParseRequest,
    GitconfigRepositoryFormatVersionRequest,
    GitconfigAuthorNameRequest,
    GitconfigAuthorEmailRequest,
    GitconfigRemotesRequest,
    GitconfigIntVal,
    GitconfigStrVal,
    GitconfigRemotes,
    GitconfigRemote,
}

impl MsgType {
    pub fn code(self) -> u32 {
        match self {
            Self::Error => 0,
            Self::Stop => 1,
            Self::ObjectRequest => 2,
            Self::Object => 3,
            Self::CommitRequest => 4,
            Self::Commit => 5,
            Self::CommitLogmsg => 6,
            Self::TreeRequest => 7,
            Self::Tree => 8,
            Self::TreeEntry => 9,
            Self::BlobRequest => 10,
            Self::BlobOutfd => 11,
            Self::Blob => 12,
            Self::TagRequest => 13,
            Self::Tag => 14,
            Self::TagTagmsg => 15,
            Self::PackIdx => 16,
            Self::Pack => 17,
            Self::PackedObjectRequest => 18,
            Self::TmpFd => 19,
            Self::GitconfigParseRequest => 20,
            Self::GitconfigRepositoryFormatVersionRequest => 21,
            Self::GitconfigAuthorNameRequest => 22,
            Self::GitconfigAuthorEmailRequest => 23,
            Self::GitconfigRemotesRequest => 24,
            Self::GitconfigIntVal => 25,
            Self::GitconfigStrVal => 26,
            Self::GitconfigRemotes => 27,
            Self::GitconfigRemote => 28,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Error,
            1 => Self::Stop,
            2 => Self::ObjectRequest,
            3 => Self::Object,
            4 => Self::CommitRequest,
            5 => Self::Commit,
            6 => Self::CommitLogmsg,
            7 => Self::TreeRequest,
            8 => Self::Tree,
            9 => Self::TreeEntry,
            10 => Self::BlobRequest,
            11 => Self::BlobOutfd,
            12 => Self::Blob,
            13 => Self::TagRequest,
            14 => Self::Tag,
            15 => Self::TagTagmsg,
            16 => Self::PackIdx,
            17 => Self::Pack,
            18 => Self::PackedObjectRequest,
            19 => Self::TmpFd,
            20 => Self::GitconfigParseRequest,
            21 => Self::GitconfigRepositoryFormatVersionRequest,
            22 => Self::GitconfigAuthorNameRequest,
            23 => Self::GitconfigAuthorEmailRequest,
            24 => Self::GitconfigRemotesRequest,
            25 => Self::GitconfigIntVal,
            26 => Self::GitconfigStrVal,
            27 => Self::GitconfigRemotes,
            28 => Self::GitconfigRemote,
            _ => return None,
        })
    }
}

/// Blobs at most this large travel inline in the Blob frame.
pub const BLOB_INLINE_MAX: usize = MAX_FRAME_DATA - 16;

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], PrivsepError> {
        if self.pos + n > self.data.len() {
            return Err(PrivsepError::Len(self.data.len()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, PrivsepError> {
        Ok(u32::from_ne_bytes(self.bytes(4)?.try_into().expect("4 bytes")))
    }

    fn u64(&mut self) -> Result<u64, PrivsepError> {
        Ok(u64::from_ne_bytes(self.bytes(8)?.try_into().expect("8 bytes")))
    }

    fn i64(&mut self) -> Result<i64, PrivsepError> {
        Ok(i64::from_ne_bytes(self.bytes(8)?.try_into().expect("8 bytes")))
    }

    fn id(&mut self) -> Result<ObjectId, PrivsepError> {
        Ok(ObjectId::from_bytes(self.bytes(SHA1_DIGEST_LENGTH)?)?)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}

pub(crate) fn decode_error(payload: &[u8]) -> Result<PrivsepError, PrivsepError> {
    let mut cur = Cursor::new(payload);
    let code = cur.u32()?;
    let errno = cur.u32()? as i32;
    let kind = WireErrorKind::from_code(code).ok_or(PrivsepError::Msg(code))?;
    Ok(PrivsepError::Remote { kind, errno })
}

impl Channel {
    /// Report a failure to the peer.
    pub fn send_error(&self, kind: WireErrorKind, errno: i32) -> Result<(), PrivsepError> {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&kind.code().to_ne_bytes());
        payload.extend_from_slice(&(errno as u32).to_ne_bytes());
        self.send(MsgType::Error, &payload, None)
    }

    /// Ask the peer to exit.
    pub fn send_stop(&self) -> Result<(), PrivsepError> {
        self.send(MsgType::Stop, b"", None)
    }

    // --- requests ---

    /// Ask a helper to parse the loose object open on `fd`.
    pub fn send_obj_request(
        &self,
        msg_type: MsgType,
        id: &ObjectId,
        fd: BorrowedFd<'_>,
    ) -> Result<(), PrivsepError> {
        self.send(msg_type, id.as_bytes(), Some(fd))
    }

    pub fn decode_obj_request(payload: &[u8]) -> Result<ObjectId, PrivsepError> {
        Cursor::new(payload).id()
    }

    // --- object metadata ---

    /// Send decoded object metadata (an Object reply or the payload of
    /// an object/commit/tree/tag request).
    pub fn send_object_meta(
        &self,
        msg_type: MsgType,
        id: &ObjectId,
        handle: &ObjectHandle,
        fd: Option<BorrowedFd<'_>>,
    ) -> Result<(), PrivsepError> {
        let mut payload = Vec::with_capacity(56);
        payload.extend_from_slice(id.as_bytes());
        payload.extend_from_slice(&(handle.obj_type.code() as u32).to_ne_bytes());
        let (flags, offset, pack_idx) = match handle.packed {
            Some(loc) => (
                1u32 | if loc.deltified { 2 } else { 0 },
                loc.offset,
                loc.pack_idx as u32,
            ),
            None => (0, 0, 0),
        };
        payload.extend_from_slice(&flags.to_ne_bytes());
        payload.extend_from_slice(&(handle.header_len as u64).to_ne_bytes());
        payload.extend_from_slice(&handle.size.to_ne_bytes());
        payload.extend_from_slice(&offset.to_ne_bytes());
        payload.extend_from_slice(&pack_idx.to_ne_bytes());
        self.send(msg_type, &payload, fd)
    }

    pub fn decode_object_meta(
        payload: &[u8],
    ) -> Result<(ObjectId, ObjectHandle), PrivsepError> {
        let mut cur = Cursor::new(payload);
        let id = cur.id()?;
        let type_code = cur.u32()?;
        let flags = cur.u32()?;
        let header_len = cur.u64()? as usize;
        let size = cur.u64()?;
        let offset = cur.u64()?;
        let pack_idx = cur.u32()? as usize;

        let obj_type = ObjectType::from_code(type_code as u8)?;
        let packed = if flags & 1 != 0 {
            Some(PackedLocation {
                pack_idx,
                offset,
                deltified: flags & 2 != 0,
            })
        } else {
            None
        };
        Ok((
            id,
            ObjectHandle {
                obj_type,
                size,
                header_len,
                packed,
            },
        ))
    }

    // --- commits ---

    /// Send a parsed commit, splitting the log message into
    /// continuation frames as needed.
    pub fn send_commit(&self, commit: &Commit) -> Result<(), PrivsepError> {
        let mut payload = Vec::new();
        payload.extend_from_slice(commit.tree.as_bytes());
        payload.extend_from_slice(&(commit.author.len() as u32).to_ne_bytes());
        payload.extend_from_slice(&(commit.committer.len() as u32).to_ne_bytes());
        payload.extend_from_slice(&(commit.parents.len() as u32).to_ne_bytes());
        payload.extend_from_slice(&(commit.message.len() as u64).to_ne_bytes());
        payload.extend_from_slice(&commit.author);
        payload.extend_from_slice(&commit.committer);
        for parent in &commit.parents {
            payload.extend_from_slice(parent.as_bytes());
        }
        self.send(MsgType::Commit, &payload, None)?;

        for chunk in commit.message.chunks(MAX_FRAME_DATA) {
            self.send(MsgType::CommitLogmsg, chunk, None)?;
        }
        Ok(())
    }

    /// Receive a commit sent with [`send_commit`](Channel::send_commit).
    pub fn recv_commit(&self) -> Result<Commit, PrivsepError> {
        let frame = self.recv_expect(MsgType::Commit)?;
        let mut cur = Cursor::new(&frame.payload);

        let tree = cur.id()?;
        let author_len = cur.u32()? as usize;
        let committer_len = cur.u32()? as usize;
        let nparents = cur.u32()? as usize;
        let logmsg_len = cur.u64()? as usize;
        let author = BString::from(cur.bytes(author_len)?);
        let committer = BString::from(cur.bytes(committer_len)?);
        let mut parents = Vec::with_capacity(nparents);
        for _ in 0..nparents {
            parents.push(cur.id()?);
        }

        let mut message = Vec::with_capacity(logmsg_len);
        while message.len() < logmsg_len {
            let chunk = self.recv_expect(MsgType::CommitLogmsg)?;
            message.extend_from_slice(&chunk.payload);
        }
        if message.len() != logmsg_len {
            return Err(PrivsepError::Len(message.len()));
        }

        Ok(Commit {
            tree,
            parents,
            author,
            committer,
            message: BString::from(message),
        })
    }

    // --- trees ---

    /// Send a parsed tree as a Tree frame plus one TreeEntry frame per
    /// entry.
    pub fn send_tree(&self, tree: &Tree) -> Result<(), PrivsepError> {
        let count = (tree.len() as u32).to_ne_bytes();
        self.send(MsgType::Tree, &count, None)?;
        for entry in &tree.entries {
            let mut payload = Vec::with_capacity(24 + entry.name.len());
            payload.extend_from_slice(entry.id.as_bytes());
            payload.extend_from_slice(&entry.mode.raw().to_ne_bytes());
            payload.extend_from_slice(&entry.name);
            self.send(MsgType::TreeEntry, &payload, None)?;
        }
        Ok(())
    }

    pub fn recv_tree(&self) -> Result<Tree, PrivsepError> {
        let frame = self.recv_expect(MsgType::Tree)?;
        let mut cur = Cursor::new(&frame.payload);
        let nentries = cur.u32()? as usize;

        let mut entries = Vec::with_capacity(nentries);
        for _ in 0..nentries {
            let entry_frame = self.recv_expect(MsgType::TreeEntry)?;
            let mut ecur = Cursor::new(&entry_frame.payload);
            let id = ecur.id()?;
            let mode_raw = ecur.u32()?;
            let name = BString::from(ecur.rest());
            let mode = grot_object::TreeEntryMode::from_raw(mode_raw)?;
            entries.push(TreeEntry { mode, name, id });
        }
        Ok(Tree { entries })
    }

    // --- blobs ---

    /// Send blob bytes: inline when small, through `outfd` otherwise.
    pub fn send_blob(
        &self,
        data: &[u8],
        hdrlen: usize,
        outfd: Option<&mut File>,
    ) -> Result<(), PrivsepError> {
        let mut payload = Vec::with_capacity(16 + data.len().min(BLOB_INLINE_MAX));
        payload.extend_from_slice(&(data.len() as u64).to_ne_bytes());
        payload.extend_from_slice(&(hdrlen as u64).to_ne_bytes());

        if data.len() <= BLOB_INLINE_MAX {
            payload.extend_from_slice(data);
            self.send(MsgType::Blob, &payload, None)
        } else {
            let out = outfd.ok_or(PrivsepError::NoFd)?;
            out.write_all(data)?;
            out.flush()?;
            out.seek(SeekFrom::Start(0))?;
            self.send(MsgType::Blob, &payload, None)
        }
    }

    /// Receive a blob reply. Large blobs are read back from `outfile`,
    /// the descriptor previously handed to the helper.
    pub fn recv_blob(
        &self,
        mut outfile: Option<&mut File>,
    ) -> Result<(Vec<u8>, usize), PrivsepError> {
        let frame = self.recv_expect(MsgType::Blob)?;
        let mut cur = Cursor::new(&frame.payload);
        let size = cur.u64()? as usize;
        let hdrlen = cur.u64()? as usize;

        if size <= BLOB_INLINE_MAX {
            let data = cur.rest();
            if data.len() != size {
                return Err(PrivsepError::Len(data.len()));
            }
            Ok((data.to_vec(), hdrlen))
        } else {
            let file = outfile.as_deref_mut().ok_or(PrivsepError::NoFd)?;
            file.seek(SeekFrom::Start(0))?;
            let mut data = Vec::with_capacity(size);
            file.read_to_end(&mut data)?;
            if data.len() != size {
                return Err(PrivsepError::Read);
            }
            Ok((data, hdrlen))
        }
    }

    /// Hand the helper the descriptor big blob replies stream into.
    pub fn send_blob_outfd(&self, fd: BorrowedFd<'_>) -> Result<(), PrivsepError> {
        self.send(MsgType::BlobOutfd, b"", Some(fd))
    }

    // --- tags ---

    pub fn send_tag(&self, tag: &Tag) -> Result<(), PrivsepError> {
        let tagger: &[u8] = tag.tagger.as_ref().map(|t| t.as_slice()).unwrap_or(b"");
        let mut payload = Vec::new();
        payload.extend_from_slice(tag.object.as_bytes());
        payload.extend_from_slice(&(tag.obj_type.code() as u32).to_ne_bytes());
        payload.extend_from_slice(&(tag.tag.len() as u32).to_ne_bytes());
        payload.extend_from_slice(&(tagger.len() as u32).to_ne_bytes());
        payload.extend_from_slice(&(tag.message.len() as u64).to_ne_bytes());
        payload.extend_from_slice(&tag.tag);
        payload.extend_from_slice(tagger);
        self.send(MsgType::Tag, &payload, None)?;

        for chunk in tag.message.chunks(MAX_FRAME_DATA) {
            self.send(MsgType::TagTagmsg, chunk, None)?;
        }
        Ok(())
    }

    pub fn recv_tag(&self) -> Result<Tag, PrivsepError> {
        let frame = self.recv_expect(MsgType::Tag)?;
        let mut cur = Cursor::new(&frame.payload);
        let object = cur.id()?;
        let obj_type = ObjectType::from_code(cur.u32()? as u8)?;
        let tag_len = cur.u32()? as usize;
        let tagger_len = cur.u32()? as usize;
        let tagmsg_len = cur.u64()? as usize;
        let tag = BString::from(cur.bytes(tag_len)?);
        let tagger_bytes = cur.bytes(tagger_len)?;
        let tagger = if tagger_bytes.is_empty() {
            None
        } else {
            Some(BString::from(tagger_bytes))
        };

        let mut message = Vec::with_capacity(tagmsg_len);
        while message.len() < tagmsg_len {
            let chunk = self.recv_expect(MsgType::TagTagmsg)?;
            message.extend_from_slice(&chunk.payload);
        }
        if message.len() != tagmsg_len {
            return Err(PrivsepError::Len(message.len()));
        }

        Ok(Tag {
            object,
            obj_type,
            tag,
            tagger,
            message: BString::from(message),
        })
    }

    // --- pack plumbing ---

    /// Pass an open pack-index descriptor and its size.
    pub fn send_packidx(&self, len: u64, fd: BorrowedFd<'_>) -> Result<(), PrivsepError> {
        self.send(MsgType::PackIdx, &len.to_ne_bytes(), Some(fd))
    }

    /// Pass an open pack descriptor, its size, and its path.
    pub fn send_pack(
        &self,
        path: &std::path::Path,
        filesize: u64,
        fd: BorrowedFd<'_>,
    ) -> Result<(), PrivsepError> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&filesize.to_ne_bytes());
        payload.extend_from_slice(path.to_string_lossy().as_bytes());
        self.send(MsgType::Pack, &payload, Some(fd))
    }

    pub fn decode_pack(payload: &[u8]) -> Result<(u64, std::path::PathBuf), PrivsepError> {
        let mut cur = Cursor::new(payload);
        let filesize = cur.u64()?;
        let path = String::from_utf8_lossy(cur.rest()).into_owned();
        Ok((filesize, std::path::PathBuf::from(path)))
    }

    /// Request a packed object by id and index position.
    pub fn send_packed_object_req(
        &self,
        id: &ObjectId,
        table_pos: usize,
    ) -> Result<(), PrivsepError> {
        let mut payload = Vec::with_capacity(24);
        payload.extend_from_slice(id.as_bytes());
        payload.extend_from_slice(&(table_pos as u32).to_ne_bytes());
        self.send(MsgType::PackedObjectRequest, &payload, None)
    }

    pub fn decode_packed_object_req(
        payload: &[u8],
    ) -> Result<(ObjectId, usize), PrivsepError> {
        let mut cur = Cursor::new(payload);
        let id = cur.id()?;
        let pos = cur.u32()? as usize;
        Ok((id, pos))
    }

    /// Hand the peer a temporary-file descriptor.
    pub fn send_tmpfd(&self, fd: BorrowedFd<'_>) -> Result<(), PrivsepError> {
        self.send(MsgType::TmpFd, b"", Some(fd))
    }

    // --- gitconfig ---

    pub fn send_gitconfig_int(&self, value: i64) -> Result<(), PrivsepError> {
        self.send(MsgType::GitconfigIntVal, &value.to_ne_bytes(), None)
    }

    pub fn recv_gitconfig_int(&self) -> Result<i64, PrivsepError> {
        let frame = self.recv_expect(MsgType::GitconfigIntVal)?;
        Cursor::new(&frame.payload).i64()
    }

    pub fn send_gitconfig_str(&self, value: &str) -> Result<(), PrivsepError> {
        self.send(MsgType::GitconfigStrVal, value.as_bytes(), None)
    }

    pub fn recv_gitconfig_str(&self) -> Result<String, PrivsepError> {
        let frame = self.recv_expect(MsgType::GitconfigStrVal)?;
        Ok(String::from_utf8_lossy(&frame.payload).into_owned())
    }

    /// Send the remotes list: a Remotes frame then one Remote frame per
    /// entry.
    pub fn send_gitconfig_remotes(
        &self,
        remotes: &[(String, String)],
    ) -> Result<(), PrivsepError> {
        let count = (remotes.len() as u32).to_ne_bytes();
        self.send(MsgType::GitconfigRemotes, &count, None)?;
        for (name, url) in remotes {
            let mut payload = Vec::new();
            payload.extend_from_slice(&(name.len() as u32).to_ne_bytes());
            payload.extend_from_slice(&(url.len() as u32).to_ne_bytes());
            payload.extend_from_slice(name.as_bytes());
            payload.extend_from_slice(url.as_bytes());
            self.send(MsgType::GitconfigRemote, &payload, None)?;
        }
        Ok(())
    }

    pub fn recv_gitconfig_remotes(&self) -> Result<Vec<(String, String)>, PrivsepError> {
        let frame = self.recv_expect(MsgType::GitconfigRemotes)?;
        let n = Cursor::new(&frame.payload).u32()? as usize;
        let mut remotes = Vec::with_capacity(n);
        for _ in 0..n {
            let rframe = self.recv_expect(MsgType::GitconfigRemote)?;
            let mut cur = Cursor::new(&rframe.payload);
            let name_len = cur.u32()? as usize;
            let url_len = cur.u32()? as usize;
            let name = String::from_utf8_lossy(cur.bytes(name_len)?).into_owned();
            let url = String::from_utf8_lossy(cur.bytes(url_len)?).into_owned();
            remotes.push((name, url));
        }
        Ok(remotes)
    }
}
