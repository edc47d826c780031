use super::ReadError;
use std::fs;
use std::path::{Path, PathBuf};

/// Capacity figures of one mounted filesystem, in units of `block_size`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FsStat {
    pub block_size: u64,
    pub blocks: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
}

/// Where raw counters come from. Every call is a fresh read.
pub trait CounterSource: Send + Sync {
    /// Text of a procfs file relative to the procfs root, e.g. `stat` or `net/dev`.
    fn read(&self, name: &str) -> Result<String, ReadError>;

    /// Numeric entries of the procfs root.
    fn process_ids(&self) -> Result<Vec<u32>, ReadError>;

    fn fs_stat(&self, mount: &str) -> Result<FsStat, ReadError>;

    fn os_release(&self) -> Result<String, ReadError>;
}

#[derive(Debug, Clone)]
pub struct HostSource {
    proc_root: PathBuf,
    os_release_path: PathBuf,
}

impl HostSource {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            os_release_path: PathBuf::from("/etc/os-release"),
        }
    }
}

impl Default for HostSource {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl CounterSource for HostSource {
    fn read(&self, name: &str) -> Result<String, ReadError> {
        read_text(&self.proc_root.join(name))
    }

    fn process_ids(&self) -> Result<Vec<u32>, ReadError> {
        let entries = fs::read_dir(&self.proc_root).map_err(|error| ReadError::Io {
            source_name: self.proc_root.display().to_string(),
            error,
        })?;

        let mut pids = Vec::new();
        for entry in entries.flatten() {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                pids.push(pid);
            }
        }
        Ok(pids)
    }

    fn fs_stat(&self, mount: &str) -> Result<FsStat, ReadError> {
        let stat = nix::sys::statvfs::statvfs(mount).map_err(|errno| ReadError::Syscall {
            path: mount.to_string(),
            errno,
        })?;

        #[allow(clippy::unnecessary_cast)]
        Ok(FsStat {
            block_size: stat.fragment_size() as u64,
            blocks: stat.blocks() as u64,
            blocks_available: stat.blocks_available() as u64,
            files: stat.files() as u64,
            files_free: stat.files_free() as u64,
        })
    }

    fn os_release(&self) -> Result<String, ReadError> {
        read_text(&self.os_release_path)
    }
}

fn read_text(path: &Path) -> Result<String, ReadError> {
    fs::read_to_string(path).map_err(|error| ReadError::Io {
        source_name: path.display().to_string(),
        error,
    })
}
