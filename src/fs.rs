use std::{
    ffi::{OsStr, OsString},
    io,
    path::{Path, PathBuf},
};

use rustix::{
    fd::{AsFd, BorrowedFd, OwnedFd},
    fs::{openat, renameat, statat, unlinkat, AtFlags, Mode, OFlags},
    io::Errno,
};
use uuid::Uuid;

/// Number of names to try before giving up on a temporary file.
const TEMP_ATTEMPTS: usize = 64;

/// Provides the operations to publish a file in a directory.
///
/// It relies on a file descriptor, so the temporary file and the
/// destination are always resolved in the same directory, even if the
/// directory is renamed during the download.
pub(crate) struct Directory {
    fd: OwnedFd,
    path: PathBuf,
}

impl AsFd for Directory {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Directory {
    pub fn new(path: &Path) -> io::Result<Self> {
        let path = match path.as_os_str().is_empty() {
            true => Path::new("."),
            false => path,
        };

        let fd = openat(
            rustix::fs::CWD,
            path,
            OFlags::PATH | OFlags::DIRECTORY | OFlags::CLOEXEC,
            Mode::empty(),
        )?;

        Ok(Directory {
            fd,
            path: path.to_owned(),
        })
    }

    /// Path of this directory, used to build the paths given to fetchers.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return `true` unless `name` is known to be missing.
    ///
    /// Errors different to `ENOENT` (like `EACCES`) are reported as an
    /// existing file, since we can't prove that the name is free.
    pub fn exists(&self, name: &OsStr) -> bool {
        !matches!(statat(self, name, AtFlags::empty()), Err(Errno::NOENT))
    }

    /// Reserve a unique name for a temporary file.
    ///
    /// The file is created with `O_EXCL` to prove that the name is not in
    /// use, and then it is removed, so the fetcher can create it again.
    pub fn reserve_temp(&self, base_name: &OsStr) -> io::Result<OsString> {
        for _ in 0..TEMP_ATTEMPTS {
            let mut name = OsString::from(".");
            name.push(base_name);
            name.push(format!(".{}.tmp", Uuid::new_v4().simple()));

            let result = openat(
                self,
                &name,
                OFlags::CREATE | OFlags::EXCL | OFlags::WRONLY | OFlags::CLOEXEC,
                Mode::RUSR | Mode::WUSR,
            );

            match result {
                Ok(fd) => drop(fd),
                Err(Errno::EXIST) => continue,
                Err(e) => return Err(e.into()),
            }

            unlinkat(self, &name, AtFlags::empty())?;
            return Ok(name);
        }

        Err(io::Error::from(io::ErrorKind::AlreadyExists))
    }

    /// Atomically replace `to` with `from`.
    pub fn rename(&self, from: &OsStr, to: &OsStr) -> io::Result<()> {
        Ok(renameat(self, from, self, to)?)
    }

    /// Remove the file `name`.
    ///
    /// Returns `false` if the file does not exist.
    pub fn remove(&self, name: &OsStr) -> io::Result<bool> {
        match unlinkat(self, name, AtFlags::empty()) {
            Ok(()) => Ok(true),
            Err(Errno::NOENT) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[test]
fn reserve_unique_temp_names() {
    let target = tempfile::tempdir().unwrap();
    let directory = Directory::new(target.path()).unwrap();

    let a = directory.reserve_temp(OsStr::new("image.sif")).unwrap();
    let b = directory.reserve_temp(OsStr::new("image.sif")).unwrap();

    assert_ne!(a, b);

    for name in [&a, &b] {
        let name = name.to_str().unwrap();
        assert!(name.starts_with(".image.sif."), "{name}");
        assert!(name.ends_with(".tmp"), "{name}");

        let id = &name[".image.sif.".len()..name.len() - ".tmp".len()];
        assert_eq!(id.len(), 32, "{name}");
        assert!(id.bytes().all(|b| b.is_ascii_hexdigit()), "{name}");

        // The name is reserved, but the file is removed.
        assert!(!directory.exists(OsStr::new(name)));
    }
}

#[test]
fn rename_and_remove() {
    let target = tempfile::tempdir().unwrap();
    let directory = Directory::new(target.path()).unwrap();

    std::fs::write(target.path().join("a"), b"data").unwrap();
    assert!(directory.exists(OsStr::new("a")));

    directory.rename(OsStr::new("a"), OsStr::new("b")).unwrap();
    assert!(!directory.exists(OsStr::new("a")));
    assert_eq!(std::fs::read(target.path().join("b")).unwrap(), b"data");

    assert!(directory.remove(OsStr::new("b")).unwrap());
    assert!(!directory.remove(OsStr::new("b")).unwrap());
}

#[test]
fn missing_directory() {
    let target = tempfile::tempdir().unwrap();
    assert!(Directory::new(&target.path().join("missing")).is_err());
}
