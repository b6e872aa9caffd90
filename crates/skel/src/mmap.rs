//! File-backed shared region.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use memmap2::MmapMut;
use tracing::{debug, info, warn};
use usersched_core::SchedError;

use crate::abi::REGION_SIZE;
use crate::object::SchedObject;

/// A shared region mapped from a file, e.g. under `/dev/shm` or an
/// mmapable map exposed by the kernel side.
pub struct MmapObject {
    path: PathBuf,
    map: MmapMut,
    base: NonNull<u8>,
    _file: File,
}

// The mapping is owned and never moved; `base` is derived from it.
unsafe impl Send for MmapObject {}

impl MmapObject {
    /// Create (or reset) the region file and map it. Any previous contents
    /// are discarded so the region starts zeroed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SchedError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| init_err(path, "create", e))?;
        file.set_len(REGION_SIZE as u64)
            .map_err(|e| init_err(path, "size", e))?;
        info!(path = %path.display(), bytes = REGION_SIZE, "created region file");
        Self::map(path, file)
    }

    /// Map an existing region file without modifying it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SchedError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| init_err(path, "open", e))?;
        let len = file
            .metadata()
            .map_err(|e| init_err(path, "stat", e))?
            .len();
        if len < REGION_SIZE as u64 {
            return Err(SchedError::Init(format!(
                "{}: region file is {len} bytes, need {REGION_SIZE}",
                path.display()
            )));
        }
        Self::map(path, file)
    }

    fn map(path: &Path, file: File) -> Result<Self, SchedError> {
        // The file may be shared with another process; all access goes
        // through atomics in `Region`.
        let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| init_err(path, "mmap", e))?;
        let base = NonNull::new(map.as_mut_ptr()).ok_or_else(|| {
            SchedError::Init(format!("{}: mmap returned a null base", path.display()))
        })?;
        debug!(path = %path.display(), bytes = map.len(), "mapped region");
        Ok(Self {
            path: path.to_path_buf(),
            map,
            base,
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn init_err(path: &Path, op: &str, e: std::io::Error) -> SchedError {
    SchedError::Init(format!("{op} {}: {e}", path.display()))
}

unsafe impl SchedObject for MmapObject {
    fn name(&self) -> &str {
        "mmap"
    }

    fn region(&self) -> NonNull<u8> {
        self.base
    }

    fn region_len(&self) -> usize {
        self.map.len()
    }

    fn release(self: Box<Self>) {
        if let Err(e) = self.map.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush region on release");
        }
        debug!(path = %self.path.display(), "unmapped region");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_sizes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");
        let obj = MmapObject::create(&path).unwrap();
        assert_eq!(obj.region_len(), REGION_SIZE);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), REGION_SIZE as u64);
        assert_eq!(obj.region().as_ptr() as usize % 8, 0);
    }

    #[test]
    fn open_missing_file_is_init_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MmapObject::open(dir.path().join("missing")).err().unwrap();
        assert!(err.is_init());
    }

    #[test]
    fn open_short_file_is_init_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short");
        std::fs::write(&path, [0u8; 16]).unwrap();
        let err = MmapObject::open(&path).err().unwrap();
        assert!(err.is_init());
    }

    #[test]
    fn create_discards_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");
        std::fs::write(&path, vec![0xffu8; REGION_SIZE]).unwrap();
        let obj = MmapObject::create(&path).unwrap();
        let first = unsafe { *obj.region().as_ptr() };
        assert_eq!(first, 0);
    }
}
