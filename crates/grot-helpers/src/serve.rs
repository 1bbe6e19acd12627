//! Request loops for the object, pack, and gitconfig helpers.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use flate2::read::ZlibDecoder;
use grot_object::{Object, ObjectHandle, ObjectType, PackedLocation};
use grot_pack::{Pack, PackIndex};
use grot_privsep::{Channel, Frame, MsgType, PrivsepError, WireErrorKind};

/// Inflate a whole loose object from a descriptor passed to us.
fn inflate_fd(file: File) -> Result<Vec<u8>, PrivsepError> {
    let mut decoder = ZlibDecoder::new(file);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;
    Ok(raw)
}

fn parse_loose(frame: &mut Frame) -> Result<(Object, usize, usize), PrivsepError> {
    let fd = frame.take_fd()?;
    let raw = inflate_fd(File::from(fd))?;
    let (_, size, header_len) = grot_object::header::parse_header(&raw)?;
    let obj = Object::parse_loose(&raw)?;
    Ok((obj, size, header_len))
}

/// Answer one request frame shared by the typed loose-object helpers.
/// Returns false when the peer asked us to stop.
fn serve_loose_request(
    channel: &Channel,
    expected: MsgType,
    frame: &mut Frame,
) -> Result<bool, PrivsepError> {
    match frame.msg_type {
        MsgType::Stop => return Ok(false),
        t if t == expected => {}
        other => return Err(PrivsepError::Msg(other.code())),
    }

    let id = Channel::decode_obj_request(&frame.payload)?;
    let (obj, size, header_len) = parse_loose(frame)?;

    match (expected, obj) {
        (MsgType::ObjectRequest, obj) => {
            let handle = ObjectHandle {
                obj_type: obj.object_type(),
                size: size as u64,
                header_len,
                packed: None,
            };
            channel.send_object_meta(MsgType::Object, &id, &handle, None)?;
        }
        (MsgType::CommitRequest, Object::Commit(commit)) => channel.send_commit(&commit)?,
        (MsgType::TreeRequest, Object::Tree(tree)) => channel.send_tree(&tree)?,
        (MsgType::TagRequest, Object::Tag(tag)) => channel.send_tag(&tag)?,
        (MsgType::BlobRequest, Object::Blob(blob)) => {
            channel.send_blob(&blob.data, header_len, None)?
        }
        _ => {
            channel.send_error(WireErrorKind::ObjType, 0)?;
        }
    }
    Ok(true)
}

fn run_loose_loop(channel: &Channel, expected: MsgType) -> Result<(), PrivsepError> {
    loop {
        let mut frame = channel.recv_raw()?;
        if !serve_loose_request(channel, expected, &mut frame)? {
            return Ok(());
        }
    }
}

/// `grot-read-object`: answer object-metadata requests.
pub fn serve_object(channel: &Channel) -> Result<(), PrivsepError> {
    run_loose_loop(channel, MsgType::ObjectRequest)
}

/// `grot-read-commit`: parse commits.
pub fn serve_commit(channel: &Channel) -> Result<(), PrivsepError> {
    run_loose_loop(channel, MsgType::CommitRequest)
}

/// `grot-read-tree`: parse trees.
pub fn serve_tree(channel: &Channel) -> Result<(), PrivsepError> {
    run_loose_loop(channel, MsgType::TreeRequest)
}

/// `grot-read-tag`: parse tags.
pub fn serve_tag(channel: &Channel) -> Result<(), PrivsepError> {
    run_loose_loop(channel, MsgType::TagRequest)
}

/// `grot-read-blob`: inflate blobs, spilling big ones to the
/// requester's descriptor.
pub fn serve_blob(channel: &Channel) -> Result<(), PrivsepError> {
    let mut spill: Option<File> = None;
    loop {
        let mut frame = channel.recv_raw()?;
        match frame.msg_type {
            MsgType::Stop => return Ok(()),
            MsgType::BlobOutfd => {
                spill = Some(File::from(frame.take_fd()?));
            }
            MsgType::BlobRequest => {
                let _id = Channel::decode_obj_request(&frame.payload)?;
                let (obj, _size, header_len) = parse_loose(&mut frame)?;
                match obj {
                    Object::Blob(blob) => {
                        channel.send_blob(&blob.data, header_len, spill.as_mut())?;
                    }
                    _ => channel.send_error(WireErrorKind::ObjType, 0)?,
                }
            }
            other => return Err(PrivsepError::Msg(other.code())),
        }
    }
}

/// `grot-read-pack`: receive the pack-index and pack descriptors once,
/// then answer packed-object requests.
pub fn serve_pack(channel: &Channel) -> Result<(), PrivsepError> {
    let mut packidx: Option<PackIndex> = None;
    let mut pack: Option<Pack> = None;
    let mut spill: Option<File> = None;

    loop {
        let mut frame = channel.recv_raw()?;
        match frame.msg_type {
            MsgType::Stop => return Ok(()),
            MsgType::PackIdx => {
                let fd = frame.take_fd()?;
                let parsed =
                    PackIndex::from_file(File::from(fd), PathBuf::from("<packidx fd>"), true)
                        .map_err(|_| PrivsepError::Remote {
                            kind: WireErrorKind::BadPackIdx,
                            errno: 0,
                        })?;
                packidx = Some(parsed);
            }
            MsgType::Pack => {
                let fd = frame.take_fd()?;
                let (_filesize, path) = Channel::decode_pack(&frame.payload)?;
                let opened = Pack::from_file(File::from(fd), path, true).map_err(|_| {
                    PrivsepError::Remote {
                        kind: WireErrorKind::BadPackFile,
                        errno: 0,
                    }
                })?;
                pack = Some(opened);
            }
            MsgType::TmpFd => {
                spill = Some(File::from(frame.take_fd()?));
            }
            MsgType::PackedObjectRequest => {
                let (id, table_pos) = Channel::decode_packed_object_req(&frame.payload)?;
                let (Some(idx), Some(pk)) = (packidx.as_ref(), pack.as_ref()) else {
                    return Err(PrivsepError::NoFd);
                };
                match answer_packed_object(channel, pk, idx, id, table_pos, spill.as_mut()) {
                    Ok(()) => {}
                    Err(e) => channel.send_error(pack_error_kind(&e), 0)?,
                }
            }
            other => return Err(PrivsepError::Msg(other.code())),
        }
    }
}

fn pack_error_kind(err: &grot_pack::PackError) -> WireErrorKind {
    use grot_pack::PackError;
    match err {
        PackError::BadPackIdx(_) => WireErrorKind::BadPackIdx,
        PackError::PackIdxChecksum => WireErrorKind::PackIdxChecksum,
        PackError::BadPackFile(_) | PackError::BadDelta { .. } => WireErrorKind::BadPackFile,
        PackError::PackOffset(_) => WireErrorKind::PackOffset,
        PackError::ObjType(_) => WireErrorKind::ObjType,
        PackError::BadDeltaChain => WireErrorKind::BadDeltaChain,
        PackError::Recursion => WireErrorKind::Recursion,
        PackError::NoSpace => WireErrorKind::NoSpace,
        _ => WireErrorKind::Io,
    }
}

fn answer_packed_object(
    channel: &Channel,
    pack: &Pack,
    packidx: &PackIndex,
    id: grot_hash::ObjectId,
    table_pos: usize,
    spill: Option<&mut File>,
) -> Result<(), grot_pack::PackError> {
    let handle = pack.open_object(packidx, table_pos, id)?;
    let data = pack.extract_to_mem(&handle)?;

    let meta = ObjectHandle {
        obj_type: handle.obj_type,
        size: data.len() as u64,
        header_len: 0,
        packed: Some(PackedLocation {
            pack_idx: 0,
            offset: handle.offset,
            deltified: handle.is_deltified(),
        }),
    };
    let send = || -> Result<(), PrivsepError> {
        channel.send_object_meta(MsgType::Object, &id, &meta, None)?;
        match handle.obj_type {
            ObjectType::Commit => {
                channel.send_commit(&grot_object::Commit::parse(&data)?)?;
            }
            ObjectType::Tree => {
                channel.send_tree(&grot_object::Tree::parse(&data)?)?;
            }
            ObjectType::Tag => {
                channel.send_tag(&grot_object::Tag::parse(&data)?)?;
            }
            ObjectType::Blob => {
                channel.send_blob(&data, 0, spill)?;
            }
        }
        Ok(())
    };
    send().map_err(|e| grot_pack::PackError::BadPackFile(e.to_string()))
}

/// `grot-read-gitconfig`: parse the config once, answer value requests.
pub fn serve_gitconfig(channel: &Channel) -> Result<(), PrivsepError> {
    let mut config: Option<crate::gitconfig::GitConfig> = None;
    loop {
        let mut frame = channel.recv_raw()?;
        match frame.msg_type {
            MsgType::Stop => return Ok(()),
            MsgType::GitconfigParseRequest => {
                let fd = frame.take_fd()?;
                let mut text = String::new();
                File::from(fd).read_to_string(&mut text)?;
                config = Some(crate::gitconfig::GitConfig::parse(&text));
            }
            MsgType::GitconfigRepositoryFormatVersionRequest => {
                let cfg = config.as_ref().ok_or(PrivsepError::NoFd)?;
                channel.send_gitconfig_int(cfg.repository_format_version)?;
            }
            MsgType::GitconfigAuthorNameRequest => {
                let cfg = config.as_ref().ok_or(PrivsepError::NoFd)?;
                channel.send_gitconfig_str(cfg.author_name.as_deref().unwrap_or(""))?;
            }
            MsgType::GitconfigAuthorEmailRequest => {
                let cfg = config.as_ref().ok_or(PrivsepError::NoFd)?;
                channel.send_gitconfig_str(cfg.author_email.as_deref().unwrap_or(""))?;
            }
            MsgType::GitconfigRemotesRequest => {
                let cfg = config.as_ref().ok_or(PrivsepError::NoFd)?;
                channel.send_gitconfig_remotes(&cfg.remotes)?;
            }
            other => return Err(PrivsepError::Msg(other.code())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grot_object::Commit;
    use grot_privsep::Channel;
    use std::io::{Seek, SeekFrom, Write};
    use std::os::fd::AsFd;
    use std::thread;

    /// Write a zlib-compressed loose object into a temp file.
    fn loose_file(obj_type: &str, content: &[u8]) -> File {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;

        let mut raw = format!("{} {}\0", obj_type, content.len()).into_bytes();
        raw.extend_from_slice(content);
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&raw).unwrap();
        let bytes = enc.finish().unwrap();

        let mut f = tempfile::tempfile().unwrap();
        f.write_all(&bytes).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f
    }

    fn oid(n: u8) -> grot_hash::ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        grot_hash::ObjectId::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn commit_helper_loop_answers_and_stops() {
        let (client, server) = Channel::pair().unwrap();
        let worker = thread::spawn(move || serve_commit(&server));

        let commit_bytes = b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n\
author A <a@b.com> 100 +0000\n\
committer A <a@b.com> 200 +0000\n\nhello\n";
        let file = loose_file("commit", commit_bytes);
        client
            .send_obj_request(MsgType::CommitRequest, &oid(1), file.as_fd())
            .unwrap();
        let commit: Commit = client.recv_commit().unwrap();
        assert_eq!(commit.committer_time().unwrap(), 200);
        assert_eq!(commit.message.as_slice(), b"hello\n");

        client.send_stop().unwrap();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn commit_helper_rejects_wrong_type() {
        let (client, server) = Channel::pair().unwrap();
        let worker = thread::spawn(move || serve_commit(&server));

        let file = loose_file("blob", b"not a commit");
        client
            .send_obj_request(MsgType::CommitRequest, &oid(1), file.as_fd())
            .unwrap();
        match client.recv_commit() {
            Err(PrivsepError::Remote { kind, .. }) => {
                assert_eq!(kind, WireErrorKind::ObjType);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        client.send_stop().unwrap();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn blob_helper_serves_inline_blobs() {
        let (client, server) = Channel::pair().unwrap();
        let worker = thread::spawn(move || serve_blob(&server));

        let file = loose_file("blob", b"hello\n");
        client
            .send_obj_request(MsgType::BlobRequest, &oid(2), file.as_fd())
            .unwrap();
        let (data, hdrlen) = client.recv_blob(None).unwrap();
        assert_eq!(data, b"hello\n");
        assert_eq!(hdrlen, 7);

        client.send_stop().unwrap();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn pack_helper_serves_packed_blob() {
        use grot_hash::Hasher;

        let (client, server) = Channel::pair().unwrap();
        let worker = thread::spawn(move || serve_pack(&server));

        let content = b"packed blob served by helper";
        let (pack_bytes, idx_bytes, id) = single_blob_pack(content);

        let mut pack_file = tempfile::tempfile().unwrap();
        pack_file.write_all(&pack_bytes).unwrap();
        pack_file.seek(SeekFrom::Start(0)).unwrap();
        let mut idx_file = tempfile::tempfile().unwrap();
        idx_file.write_all(&idx_bytes).unwrap();
        idx_file.seek(SeekFrom::Start(0)).unwrap();

        client
            .send_packidx(idx_bytes.len() as u64, idx_file.as_fd())
            .unwrap();
        client
            .send_pack(
                std::path::Path::new("test.pack"),
                pack_bytes.len() as u64,
                pack_file.as_fd(),
            )
            .unwrap();
        client.send_packed_object_req(&id, 0).unwrap();

        let frame = client.recv_expect(MsgType::Object).unwrap();
        let (got_id, meta) = Channel::decode_object_meta(&frame.payload).unwrap();
        assert_eq!(got_id, id);
        assert_eq!(meta.obj_type, ObjectType::Blob);
        let (data, _) = client.recv_blob(None).unwrap();
        assert_eq!(data, content);

        client.send_stop().unwrap();
        worker.join().unwrap().unwrap();

        /// One-blob .pack/.idx pair, checksummed the way git writes them.
        fn single_blob_pack(content: &[u8]) -> (Vec<u8>, Vec<u8>, grot_hash::ObjectId) {
            use flate2::write::ZlibEncoder;
            use flate2::Compression;

            let id = Hasher::hash_object("blob", content);

            let mut header = Vec::new();
            let mut size = content.len() as u64;
            let mut byte = (3u8 << 4) | (size & 0x0f) as u8;
            size >>= 4;
            while size > 0 {
                header.push(byte | 0x80);
                byte = (size & 0x7f) as u8;
                size >>= 7;
            }
            header.push(byte);

            let mut compressed = Vec::new();
            let mut enc = ZlibEncoder::new(&mut compressed, Compression::default());
            enc.write_all(content).unwrap();
            enc.finish().unwrap();

            let mut pack = Vec::new();
            pack.extend_from_slice(b"PACK");
            pack.extend_from_slice(&2u32.to_be_bytes());
            pack.extend_from_slice(&1u32.to_be_bytes());
            let offset = pack.len() as u64;
            pack.extend_from_slice(&header);
            pack.extend_from_slice(&compressed);
            let pack_checksum = Hasher::digest(&pack);
            pack.extend_from_slice(pack_checksum.as_bytes());

            let mut idx = Vec::new();
            idx.extend_from_slice(&[0xff, 0x74, 0x4f, 0x63]);
            idx.extend_from_slice(&2u32.to_be_bytes());
            let mut fanout = [0u32; 256];
            for slot in fanout.iter_mut().skip(id.first_byte() as usize) {
                *slot = 1;
            }
            for count in fanout {
                idx.extend_from_slice(&count.to_be_bytes());
            }
            idx.extend_from_slice(id.as_bytes());
            idx.extend_from_slice(&0u32.to_be_bytes()); // crc32
            idx.extend_from_slice(&(offset as u32).to_be_bytes());
            idx.extend_from_slice(pack_checksum.as_bytes());
            let idx_checksum = Hasher::digest(&idx);
            idx.extend_from_slice(idx_checksum.as_bytes());

            (pack, idx, id)
        }
    }

    #[test]
    fn gitconfig_helper_answers_values() {
        let (client, server) = Channel::pair().unwrap();
        let worker = thread::spawn(move || serve_gitconfig(&server));

        let mut cfg = tempfile::tempfile().unwrap();
        cfg.write_all(
            b"[core]\n\trepositoryformatversion = 0\n\
[user]\n\tname = Flan Hacker\n\temail = flan@example.com\n\
[remote \"origin\"]\n\turl = ssh://example.com/repo\n",
        )
        .unwrap();
        cfg.seek(SeekFrom::Start(0)).unwrap();

        client
            .send(MsgType::GitconfigParseRequest, b"", Some(cfg.as_fd()))
            .unwrap();
        client
            .send(MsgType::GitconfigAuthorNameRequest, b"", None)
            .unwrap();
        assert_eq!(client.recv_gitconfig_str().unwrap(), "Flan Hacker");

        client
            .send(MsgType::GitconfigRemotesRequest, b"", None)
            .unwrap();
        let remotes = client.recv_gitconfig_remotes().unwrap();
        assert_eq!(
            remotes,
            vec![("origin".to_string(), "ssh://example.com/repo".to_string())]
        );

        client
            .send(MsgType::GitconfigRepositoryFormatVersionRequest, b"", None)
            .unwrap();
        assert_eq!(client.recv_gitconfig_int().unwrap(), 0);

        client.send_stop().unwrap();
        worker.join().unwrap().unwrap();
    }
}
