//! Serve loops for the libexec helpers.
//!
//! Each helper inherits one end of a privsep channel on descriptor 3
//! and answers requests until it is told to stop. Object and pack files
//! are opened by the main process; only their descriptors cross the
//! channel, so all parsing and decompression happens in here, behind
//! whatever sandboxing the platform applies to the helper binaries.

pub mod gitconfig;
pub mod serve;

use grot_privsep::{Channel, PrivsepError, CHILD_CHANNEL_FD};

/// Entry point shared by the helper mains: adopt the channel on fd 3,
/// run the loop, and report any failure back before exiting nonzero.
pub fn helper_main<F>(serve: F) -> std::process::ExitCode
where
    F: FnOnce(&Channel) -> Result<(), PrivsepError>,
{
    let channel = unsafe { Channel::from_raw_fd(CHILD_CHANNEL_FD) };
    match serve(&channel) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            let errno = match &err {
                PrivsepError::Io(e) => e.raw_os_error().unwrap_or(0),
                PrivsepError::Sys(e) => *e as i32,
                _ => 0,
            };
            let _ = channel.send_error(err.wire_kind(), errno);
            std::process::ExitCode::FAILURE
        }
    }
}
