//! The frame transport: typed length-prefixed messages over a Unix
//! socket pair, with at most one transferred descriptor per frame.
//!
//! Frames travel over a SOCK_SEQPACKET pair so message boundaries are
//! preserved and a descriptor always arrives with its frame. Values in
//! the header are host byte order; this is same-host IPC.

use std::io::IoSlice;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::socket::{
    recvmsg, sendmsg, socketpair, AddressFamily, ControlMessage, ControlMessageOwned,
    MsgFlags, SockFlag, SockType,
};

use crate::msg::MsgType;
use crate::{PrivsepError, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};

/// One received frame.
#[derive(Debug)]
pub struct Frame {
    pub msg_type: MsgType,
    pub peer_id: u32,
    pub pid: u32,
    pub payload: Vec<u8>,
    pub fd: Option<OwnedFd>,
}

impl Frame {
    /// Take the transferred descriptor; its absence is a protocol
    /// error for messages that require one.
    pub fn take_fd(&mut self) -> Result<OwnedFd, PrivsepError> {
        self.fd.take().ok_or(PrivsepError::NoFd)
    }
}

/// One endpoint of a privsep channel.
pub struct Channel {
    fd: OwnedFd,
    /// Poll timeout in milliseconds; negative waits forever.
    timeout_ms: i32,
}

impl Channel {
    /// Create a connected channel pair.
    pub fn pair() -> Result<(Channel, Channel), PrivsepError> {
        // Close-on-exec on both ends; the helper's dup2 onto fd 3
        // clears the flag for the one descriptor it is meant to keep.
        let (a, b) = socketpair(
            AddressFamily::Unix,
            SockType::SeqPacket,
            None,
            SockFlag::SOCK_CLOEXEC,
        )?;
        Ok((Channel::from_fd(a), Channel::from_fd(b)))
    }

    pub fn from_fd(fd: OwnedFd) -> Self {
        Self {
            fd,
            timeout_ms: -1,
        }
    }

    /// Adopt a raw descriptor (the helper side of the channel).
    ///
    /// # Safety
    ///
    /// `raw` must be an open descriptor owned by the caller.
    pub unsafe fn from_raw_fd(raw: RawFd) -> Self {
        Self::from_fd(OwnedFd::from_raw_fd(raw))
    }

    /// Set the receive poll timeout; `None` waits forever.
    pub fn set_timeout_ms(&mut self, timeout_ms: Option<i32>) {
        self.timeout_ms = timeout_ms.unwrap_or(-1);
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Send one frame with an optional descriptor.
    pub fn send(
        &self,
        msg_type: MsgType,
        payload: &[u8],
        fd: Option<BorrowedFd<'_>>,
    ) -> Result<(), PrivsepError> {
        let total = FRAME_HEADER_SIZE + payload.len();
        if total > MAX_FRAME_SIZE {
            return Err(PrivsepError::Len(total));
        }

        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[0..4].copy_from_slice(&msg_type.code().to_ne_bytes());
        header[4..6].copy_from_slice(&(total as u16).to_ne_bytes());
        header[6..10].copy_from_slice(&0u32.to_ne_bytes()); // peerid
        header[10..14].copy_from_slice(&std::process::id().to_ne_bytes());

        let iov = [IoSlice::new(&header), IoSlice::new(payload)];
        let fds;
        let cmsgs: &[ControlMessage<'_>] = match fd {
            Some(fd) => {
                fds = [fd.as_raw_fd()];
                &[ControlMessage::ScmRights(&fds)]
            }
            None => &[],
        };

        let n = sendmsg::<()>(
            self.fd.as_raw_fd(),
            &iov,
            cmsgs,
            MsgFlags::empty(),
            None,
        )?;
        if n != total {
            return Err(PrivsepError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "short privsep write",
            )));
        }
        Ok(())
    }

    /// Block until a frame arrives, then read it.
    ///
    /// Error frames from the peer are translated into
    /// [`PrivsepError::Remote`] here so callers never see them as data.
    pub fn recv(&self) -> Result<Frame, PrivsepError> {
        let frame = self.recv_raw()?;
        if frame.msg_type == MsgType::Error {
            return Err(crate::msg::decode_error(&frame.payload)?);
        }
        Ok(frame)
    }

    /// Read one frame without translating error frames.
    pub fn recv_raw(&self) -> Result<Frame, PrivsepError> {
        self.poll_readable()?;

        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        let mut cmsg_space = nix::cmsg_space!([RawFd; 1]);

        let (n, fd) = {
            let mut iov = [std::io::IoSliceMut::new(&mut buf)];
            let msg = recvmsg::<()>(
                self.fd.as_raw_fd(),
                &mut iov,
                Some(&mut cmsg_space),
                MsgFlags::empty(),
            )?;

            let mut fd: Option<OwnedFd> = None;
            for cmsg in msg.cmsgs()? {
                if let ControlMessageOwned::ScmRights(received) = cmsg {
                    if let Some(&raw) = received.first() {
                        fd = Some(unsafe { OwnedFd::from_raw_fd(raw) });
                    }
                }
            }
            (msg.bytes, fd)
        };
        if n == 0 {
            return Err(PrivsepError::Pipe);
        }
        if n < FRAME_HEADER_SIZE {
            return Err(PrivsepError::Read);
        }

        let raw_type = u32::from_ne_bytes(buf[0..4].try_into().expect("4 bytes"));
        let len = u16::from_ne_bytes(buf[4..6].try_into().expect("2 bytes")) as usize;
        let peer_id = u32::from_ne_bytes(buf[6..10].try_into().expect("4 bytes"));
        let pid = u32::from_ne_bytes(buf[10..14].try_into().expect("4 bytes"));

        if len != n || len < FRAME_HEADER_SIZE {
            return Err(PrivsepError::Len(len));
        }
        let msg_type = MsgType::from_code(raw_type).ok_or(PrivsepError::Msg(raw_type))?;

        Ok(Frame {
            msg_type,
            peer_id,
            pid,
            payload: buf[FRAME_HEADER_SIZE..len].to_vec(),
            fd,
        })
    }

    /// Receive a frame and require a specific type.
    pub fn recv_expect(&self, expected: MsgType) -> Result<Frame, PrivsepError> {
        let frame = self.recv()?;
        if frame.msg_type != expected {
            return Err(PrivsepError::Msg(frame.msg_type.code()));
        }
        Ok(frame)
    }

    fn poll_readable(&self) -> Result<(), PrivsepError> {
        let borrowed = unsafe { BorrowedFd::borrow_raw(self.fd.as_raw_fd()) };
        let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
        let timeout = if self.timeout_ms < 0 {
            PollTimeout::NONE
        } else {
            PollTimeout::try_from(self.timeout_ms).unwrap_or(PollTimeout::MAX)
        };
        let n = poll(&mut fds, timeout)?;
        if n == 0 {
            return Err(PrivsepError::Timeout);
        }
        let revents = fds[0].revents().unwrap_or(PollFlags::empty());
        if revents.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
            return Err(PrivsepError::Io(std::io::Error::other(
                "poll error on privsep channel",
            )));
        }
        if revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP) {
            return Ok(());
        }
        Err(PrivsepError::Interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::os::fd::AsFd;

    #[test]
    fn frame_round_trip() {
        let (a, b) = Channel::pair().unwrap();
        a.send(MsgType::CommitRequest, b"payload bytes", None).unwrap();
        let frame = b.recv().unwrap();
        assert_eq!(frame.msg_type, MsgType::CommitRequest);
        assert_eq!(frame.payload, b"payload bytes");
        assert!(frame.fd.is_none());
        assert_eq!(frame.pid, std::process::id());
    }

    #[test]
    fn oversized_payload_rejected() {
        let (a, _b) = Channel::pair().unwrap();
        let big = vec![0u8; MAX_FRAME_SIZE];
        assert!(matches!(
            a.send(MsgType::Blob, &big, None),
            Err(PrivsepError::Len(_))
        ));
    }

    #[test]
    fn closed_peer_is_pipe() {
        let (a, b) = Channel::pair().unwrap();
        drop(a);
        assert!(matches!(b.recv(), Err(PrivsepError::Pipe)));
    }

    #[test]
    fn recv_timeout_fires() {
        let (_a, mut b) = Channel::pair().unwrap();
        b.set_timeout_ms(Some(10));
        assert!(matches!(b.recv(), Err(PrivsepError::Timeout)));
    }

    #[test]
    fn descriptor_travels_with_frame() {
        let (a, b) = Channel::pair().unwrap();

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"fd payload").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        a.send(MsgType::TmpFd, b"", Some(file.as_fd())).unwrap();
        let mut frame = b.recv().unwrap();
        assert_eq!(frame.msg_type, MsgType::TmpFd);

        let fd = frame.take_fd().unwrap();
        let mut received = std::fs::File::from(fd);
        let mut content = String::new();
        received.read_to_string(&mut content).unwrap();
        assert_eq!(content, "fd payload");
    }

    #[test]
    fn missing_descriptor_is_no_fd() {
        let (a, b) = Channel::pair().unwrap();
        a.send(MsgType::TmpFd, b"", None).unwrap();
        let mut frame = b.recv().unwrap();
        assert!(matches!(frame.take_fd(), Err(PrivsepError::NoFd)));
    }
}
