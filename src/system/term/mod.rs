use std::{
    ffi::{CStr, CString},
    fs::File,
    io,
    os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd},
};

use crate::{common::Error, cutils::cerr};

pub struct Pty {
    /// The file path of the follower side of the pty.
    pub path: CString,
    /// The leader side of the pty.
    pub leader: PtyLeader,
    /// The follower side of the pty.
    pub follower: PtyFollower,
}

impl Pty {
    /// Allocate a new pseudoterminal pair.
    ///
    /// Neither side becomes the controlling terminal of the calling process. Both descriptors are
    /// close-on-exec.
    pub fn open() -> Result<Self, Error> {
        const FLAGS: libc::c_int = libc::O_RDWR | libc::O_NOCTTY | libc::O_CLOEXEC;

        let leader = cerr(unsafe { libc::posix_openpt(FLAGS) }).map_err(Error::DeviceUnavailable)?;
        // SAFETY: `posix_openpt` just handed us this descriptor.
        let leader = unsafe { OwnedFd::from_raw_fd(leader) };

        cerr(unsafe { libc::grantpt(leader.as_raw_fd()) }).map_err(Error::PermissionDenied)?;
        cerr(unsafe { libc::unlockpt(leader.as_raw_fd()) }).map_err(Error::PermissionDenied)?;

        let path = follower_name(&leader).map_err(Error::DeviceUnavailable)?;

        let follower =
            cerr(unsafe { libc::open(path.as_ptr(), FLAGS) }).map_err(Error::DeviceUnavailable)?;
        // SAFETY: `open` just handed us this descriptor.
        let follower = unsafe { OwnedFd::from_raw_fd(follower) };

        Ok(Self {
            path,
            leader: PtyLeader {
                file: leader.into(),
            },
            follower: PtyFollower {
                file: follower.into(),
            },
        })
    }
}

fn follower_name(leader: &OwnedFd) -> io::Result<CString> {
    const PATH_MAX: usize = libc::PATH_MAX as _;
    let mut buf = vec![0 as libc::c_char; PATH_MAX];

    // `ptsname_r` returns the error number instead of setting `errno`.
    match unsafe { libc::ptsname_r(leader.as_raw_fd(), buf.as_mut_ptr(), buf.len()) } {
        0 => {}
        errno => return Err(io::Error::from_raw_os_error(errno)),
    }

    // SAFETY: on success `ptsname_r` wrote a NUL-terminated string into `buf`.
    Ok(unsafe { CStr::from_ptr(buf.as_ptr()) }.to_owned())
}

/// The controlling side of the pty, used by the driver to talk to the shell.
pub struct PtyLeader {
    file: File,
}

impl PtyLeader {
    /// Make reads that would block fail with [`io::ErrorKind::WouldBlock`] instead.
    pub fn set_nonblocking(&self) -> io::Result<()> {
        let fd = self.as_raw_fd();
        let flags = cerr(unsafe { libc::fcntl(fd, libc::F_GETFL, 0) })?;
        cerr(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
        Ok(())
    }

    pub fn is_nonblocking(&self) -> io::Result<bool> {
        let flags = cerr(unsafe { libc::fcntl(self.as_raw_fd(), libc::F_GETFL, 0) })?;
        Ok(flags & libc::O_NONBLOCK != 0)
    }
}

impl io::Read for PtyLeader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl io::Write for PtyLeader {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl AsRawFd for PtyLeader {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl AsFd for PtyLeader {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

/// The subordinate side of the pty, which becomes the shell's standard streams.
pub struct PtyFollower {
    file: File,
}

impl AsRawFd for PtyFollower {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl AsFd for PtyFollower {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}
