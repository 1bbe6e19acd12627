//! Helper process supervision: fork+exec a libexec program with the
//! channel on a fixed descriptor, stop it, and reap it.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use tracing::debug;

use crate::frame::Channel;
use crate::{PrivsepError, CHILD_CHANNEL_FD};

/// Compiled-in libexec prefix; overridable at build time with
/// `GROT_LIBEXEC_DEFAULT` and at run time (tests, local builds) via the
/// `GROT_LIBEXEC` environment variable.
pub const LIBEXEC_DIR: &str = match option_env!("GROT_LIBEXEC_DEFAULT") {
    Some(dir) => dir,
    None => "/usr/local/libexec/grot",
};

/// Helper program names.
pub const PROG_READ_OBJECT: &str = "grot-read-object";
pub const PROG_READ_COMMIT: &str = "grot-read-commit";
pub const PROG_READ_TREE: &str = "grot-read-tree";
pub const PROG_READ_BLOB: &str = "grot-read-blob";
pub const PROG_READ_TAG: &str = "grot-read-tag";
pub const PROG_READ_PACK: &str = "grot-read-pack";
pub const PROG_READ_GITCONFIG: &str = "grot-read-gitconfig";

/// Resolve a helper name to its executable path.
pub fn helper_path(name: &str) -> PathBuf {
    let prefix =
        std::env::var("GROT_LIBEXEC").unwrap_or_else(|_| LIBEXEC_DIR.to_string());
    Path::new(&prefix).join(name)
}

/// A running helper and the parent's end of its channel.
pub struct PrivsepChild {
    child: Child,
    channel: Channel,
    program: PathBuf,
}

impl PrivsepChild {
    /// Spawn `program` with the peer end of a fresh channel on fd 3.
    pub fn spawn(program: &Path) -> Result<Self, PrivsepError> {
        use std::os::unix::process::CommandExt;

        let (parent_end, child_end) = Channel::pair()?;
        let child_raw = child_end.as_raw_fd();

        let mut command = Command::new(program);
        // The child keeps stdio; everything else is closed by exec
        // except the channel we plant on the agreed descriptor.
        unsafe {
            command.pre_exec(move || {
                nix::unistd::dup2(child_raw, CHILD_CHANNEL_FD)
                    .map_err(std::io::Error::from)?;
                Ok(())
            });
        }
        let child = command.spawn()?;
        drop(child_end); // parent's copy of the child descriptor

        debug!(program = %program.display(), pid = child.id(), "spawned privsep helper");
        Ok(Self {
            child,
            channel: parent_end,
            program: program.to_path_buf(),
        })
    }

    /// Spawn a well-known helper by name.
    pub fn spawn_helper(name: &str) -> Result<Self, PrivsepError> {
        Self::spawn(&helper_path(name))
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Send stop and wait for the helper to exit.
    ///
    /// A helper killed by a signal is reported as died; a nonzero exit
    /// status as an abnormal exit.
    pub fn stop(mut self) -> Result<(), PrivsepError> {
        self.channel.send_stop()?;
        let status = self.child.wait()?;
        debug!(program = %self.program.display(), %status, "privsep helper stopped");
        if status.code().is_none() {
            return Err(PrivsepError::Died);
        }
        if !status.success() {
            return Err(PrivsepError::Exit);
        }
        Ok(())
    }
}
