//! Owns the memory mapping for a backing region, in either of the two
//! supported modes: a plain file mapping, or a named POSIX shared-memory
//! segment (`/dev/shm` via `shm_open`). Both end up as an ordinary
//! `memmap2::MmapMut` over a file descriptor; the only difference is how
//! that descriptor is obtained.

use memmap2::MmapMut;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::FromRawFd;
use std::path::Path;

/// Which kind of backing a [`RegionMapping`] was opened over. Only used
/// to decide whether `flush` is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingKind {
    File,
    Shm,
}

pub struct RegionMapping {
    _file: File,
    mmap: MmapMut,
    kind: BackingKind,
}

impl RegionMapping {
    /// Creates (or truncates) a file of `size_bytes` and maps it read-write.
    pub fn create_file<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size_bytes)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            _file: file,
            mmap,
            kind: BackingKind::File,
        })
    }

    /// Opens an existing file and maps it read-write.
    pub fn open_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            _file: file,
            mmap,
            kind: BackingKind::File,
        })
    }

    /// Creates (or re-creates) a named POSIX shared-memory segment sized
    /// to `size_bytes` and maps it read-write.
    pub fn create_shm(name: &str, size_bytes: u64) -> io::Result<Self> {
        let file = open_shm_fd(name, true)?;
        file.set_len(size_bytes)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            _file: file,
            mmap,
            kind: BackingKind::Shm,
        })
    }

    /// Opens an existing named shared-memory segment and maps it read-write.
    pub fn open_shm(name: &str) -> io::Result<Self> {
        let file = open_shm_fd(name, false)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            _file: file,
            mmap,
            kind: BackingKind::Shm,
        })
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn kind(&self) -> BackingKind {
        self.kind
    }

    /// Flushes the mapping to stable storage. A no-op for shared-memory
    /// backed regions, which have no stable storage to flush to.
    pub fn flush(&self) -> io::Result<()> {
        match self.kind {
            BackingKind::File => self.mmap.flush(),
            BackingKind::Shm => Ok(()),
        }
    }
}

/// Deletes a named shared-memory segment. Best-effort: missing segments
/// are not an error.
pub fn unlink_shm(name: &str) -> io::Result<()> {
    let cname = shm_path(name)?;
    let rc = unsafe { libc::shm_unlink(cname.as_ptr()) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::NotFound {
            return Ok(());
        }
        return Err(err);
    }
    Ok(())
}

fn shm_path(name: &str) -> io::Result<CString> {
    let leading = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };
    CString::new(leading).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn open_shm_fd(name: &str, create: bool) -> io::Result<File> {
    let cname = shm_path(name)?;
    let flags = if create {
        libc::O_CREAT | libc::O_RDWR
    } else {
        libc::O_RDWR
    };
    let fd = unsafe { libc::shm_open(cname.as_ptr(), flags, 0o600) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: shm_open just handed us ownership of this fd.
    Ok(unsafe { File::from_raw_fd(fd) })
}
