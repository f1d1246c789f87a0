//! Anchored document-root opens and file classification.

use crate::{
    http::{response::Response, types::StatusCode},
    server::router,
};
use memchr::memrchr;
use nix::{
    errno::Errno,
    fcntl::{openat2, OFlag, OpenHow, ResolveFlag},
};
use std::{
    ffi::OsStr,
    fs::{File, OpenOptions},
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
    os::unix::ffi::OsStrExt,
    os::unix::fs::OpenOptionsExt,
    path::Path,
};

/// The document-root directory, opened once before the first connection is
/// served and shared read-only by every connection until shutdown.
///
/// Every static open is anchored on this descriptor with
/// `RESOLVE_BENEATH`, so no component of a requested path can address data
/// above the root regardless of what normalization produced.
#[derive(Debug)]
pub struct DocRoot {
    dir: OwnedFd,
}

impl DocRoot {
    /// Opens the directory that static files are served from.
    pub fn open(path: &Path) -> io::Result<Self> {
        let dir = OpenOptions::new()
            .read(true)
            .custom_flags(nix::libc::O_DIRECTORY)
            .open(path)?;

        Ok(Self { dir: dir.into() })
    }

    /// Opens `relative` for reading, refusing any resolution that would
    /// leave the anchor directory.
    fn open_beneath(&self, relative: &[u8]) -> Result<File, Errno> {
        let how = OpenHow::new()
            .flags(OFlag::O_RDONLY | OFlag::O_CLOEXEC)
            .resolve(ResolveFlag::RESOLVE_BENEATH);

        let fd = openat2(self.dir.as_raw_fd(), OsStr::from_bytes(relative), how)?;
        Ok(File::from(unsafe { OwnedFd::from_raw_fd(fd) }))
    }
}

/// Serves `normalized_path` from the document root.
pub(crate) fn serve(root: &DocRoot, normalized_path: &[u8]) -> Response {
    let mut relative = &normalized_path[1..];
    if relative.is_empty() {
        relative = b"index.html";
    }

    let file = match root.open_beneath(relative) {
        Ok(file) => file,
        Err(Errno::ENOENT | Errno::ENOTDIR) => return router::not_found(),
        Err(Errno::EACCES) => return router::forbidden_file(),
        Err(errno) => {
            log::debug!("static open failed with {errno}");
            return Response::empty(StatusCode::InternalServerError);
        }
    };

    let metadata = match file.metadata() {
        Ok(metadata) => metadata,
        Err(_) => return Response::empty(StatusCode::InternalServerError),
    };
    if !metadata.file_type().is_file() {
        return router::forbidden_file();
    }

    Response::file(file, metadata.len(), content_type_for(relative))
}

/// Content type by the last `.` of the requested file name. Extension
/// matching is case-sensitive.
pub(crate) fn content_type_for(name: &[u8]) -> &'static str {
    let base = match memrchr(b'/', name) {
        Some(at) => &name[at + 1..],
        None => name,
    };

    match memrchr(b'.', base) {
        None => "application/octet-stream",
        Some(at) => match &base[at + 1..] {
            b"html" => "text/html",
            b"css" => "text/css",
            b"js" => "application/javascript",
            b"png" => "image/png",
            _ => "text/plain",
        },
    }
}
