use std::path::{Path, PathBuf};

use crate::error::{CronscanError, Result};

/// Files consulted, in order, for the local host name.
const HOSTNAME_FILES: [&str; 2] = ["/proc/sys/kernel/hostname", "/etc/hostname"];

/// Where the host name recorded on every entry comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostIdentity {
    /// Use this name as-is (configured override)
    Fixed(String),
    /// Look up the name of the machine running the scan
    Local,
}

impl HostIdentity {
    pub fn from_override(host_name: Option<&str>) -> Self {
        match host_name {
            Some(name) => Self::Fixed(name.to_string()),
            None => Self::Local,
        }
    }

    /// Resolve the host name, failing with [`CronscanError::HostResolution`] when none is found.
    pub fn resolve(&self) -> Result<String> {
        match self {
            Self::Fixed(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(CronscanError::HostResolution(
                        "configured host name is blank".to_string(),
                    ));
                }
                Ok(name.to_string())
            }
            Self::Local => {
                let files: Vec<PathBuf> = HOSTNAME_FILES.iter().map(PathBuf::from).collect();
                resolve_from(&files, std::env::var("HOSTNAME").ok())
            }
        }
    }
}

/// First non-blank name from `files`, then `env_fallback`.
fn resolve_from(files: &[PathBuf], env_fallback: Option<String>) -> Result<String> {
    for path in files {
        if let Some(name) = read_name(path) {
            log::debug!("Host name {} read from {}", name, path.display());
            return Ok(name);
        }
    }

    env_fallback
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            CronscanError::HostResolution(format!(
                "no host name in {} or $HOSTNAME",
                files
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
}

fn read_name(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let name = content.lines().next()?.trim();
    (!name.is_empty()).then(|| name.to_string())
}
