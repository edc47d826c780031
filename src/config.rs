use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub token: Option<String>,
    pub procfs: PathBuf,
    pub request_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address '{addr}': {source}")]
    Listen {
        addr: String,
        source: std::net::AddrParseError,
    },
    #[error("config validation failed: {0}")]
    Validation(String),
}

impl Config {
    pub fn new(
        addr: &str,
        token: Option<String>,
        procfs: PathBuf,
        request_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let cfg = Config {
            listen: parse_listen(addr)?,
            token: token.filter(|t| !t.trim().is_empty()),
            procfs,
            request_timeout,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "request timeout must be > 0".to_string(),
            ));
        }
        if self.procfs.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "procfs path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Accepts `host:port` as well as the `:port` shorthand for all interfaces.
fn parse_listen(addr: &str) -> Result<SocketAddr, ConfigError> {
    let addr = addr.trim();
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    SocketAddr::from_str(&full).map_err(|source| ConfigError::Listen {
        addr: addr.to_string(),
        source,
    })
}

/// Facts fixed at build time plus the moment the agent started.
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: String,
    pub git_sha: String,
    pub build_time: String,
    pub started_at: Instant,
}

impl BuildInfo {
    pub fn from_env() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_sha: option_env!("STACKSCOPE_GIT_SHA")
                .unwrap_or("unknown")
                .to_string(),
            build_time: option_env!("STACKSCOPE_BUILD_TIME")
                .unwrap_or("unknown")
                .to_string(),
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(addr: &str, token: Option<&str>) -> Result<Config, ConfigError> {
        Config::new(
            addr,
            token.map(str::to_string),
            PathBuf::from("/proc"),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn port_only_listen_binds_all_interfaces() {
        let cfg = config(":9100", None).unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:9100".parse().unwrap());
    }

    #[test]
    fn rejects_garbage_listen_address() {
        assert!(matches!(
            config("not-an-addr", None),
            Err(ConfigError::Listen { .. })
        ));
    }

    #[test]
    fn blank_token_disables_auth() {
        assert_eq!(config("127.0.0.1:9100", Some("  ")).unwrap().token, None);
        assert_eq!(
            config("127.0.0.1:9100", Some("s3cret")).unwrap().token.as_deref(),
            Some("s3cret")
        );
    }

    #[test]
    fn token_is_kept_verbatim() {
        assert_eq!(
            config("127.0.0.1:9100", Some(" s3cret ")).unwrap().token.as_deref(),
            Some(" s3cret ")
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Config::new(
            "127.0.0.1:9100",
            None,
            PathBuf::from("/proc"),
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
