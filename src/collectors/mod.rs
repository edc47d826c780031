pub mod aggregate;
pub mod counters;
pub mod health;
pub mod sampler;
pub mod source;
pub mod system;

#[cfg(test)]
pub mod testing;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read {source_name}: {error}")]
    Io {
        source_name: String,
        error: std::io::Error,
    },
    #[error("unexpected {source_name} format: {detail}")]
    Malformed { source_name: String, detail: String },
    #[error("statvfs {path} failed: {errno}")]
    Syscall { path: String, errno: nix::errno::Errno },
}

impl ReadError {
    pub fn malformed(source_name: &str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            source_name: source_name.to_string(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("{family} total delta <= 0")]
    NonPositiveDelta { family: &'static str },
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Sampling(#[from] SamplingError),
    #[error("blocking read task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
    #[error("collection did not finish within {0:?}")]
    Timeout(std::time::Duration),
}
