//! Tool package management boundary.
//!
//! Packages bundle tool servers for distribution. The real installer is
//! an external concern; the core only needs install/remove/list plus
//! enough metadata to render a listing.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PackageError {
    UnknownPackage(String),
    AlreadyInstalled(String),
    /// Installer-level failure, e.g. a fetch or extraction problem.
    Install(String),
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageError::UnknownPackage(name) => write!(f, "no package named '{name}'"),
            PackageError::AlreadyInstalled(name) => {
                write!(f, "package '{name}' is already installed")
            }
            PackageError::Install(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for PackageError {}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[async_trait::async_trait]
pub trait PackageManager: Send + Sync {
    async fn install(&mut self, name: &str) -> Result<PackageInfo, PackageError>;
    async fn remove(&mut self, name: &str) -> Result<(), PackageError>;
    fn installed(&self) -> Vec<PackageInfo>;
}

/// In-process registry of installed packages. Stands in for a real
/// package index until one is wired up.
#[derive(Default)]
pub struct LocalPackageManager {
    available: BTreeMap<String, PackageInfo>,
    installed: BTreeMap<String, PackageInfo>,
}

impl LocalPackageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_available(packages: Vec<PackageInfo>) -> Self {
        Self {
            available: packages
                .into_iter()
                .map(|info| (info.name.clone(), info))
                .collect(),
            installed: BTreeMap::new(),
        }
    }
}

#[async_trait::async_trait]
impl PackageManager for LocalPackageManager {
    async fn install(&mut self, name: &str) -> Result<PackageInfo, PackageError> {
        if self.installed.contains_key(name) {
            return Err(PackageError::AlreadyInstalled(name.to_string()));
        }
        let info = self
            .available
            .get(name)
            .cloned()
            .ok_or_else(|| PackageError::UnknownPackage(name.to_string()))?;
        self.installed.insert(name.to_string(), info.clone());
        Ok(info)
    }

    async fn remove(&mut self, name: &str) -> Result<(), PackageError> {
        self.installed
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PackageError::UnknownPackage(name.to_string()))
    }

    fn installed(&self) -> Vec<PackageInfo> {
        self.installed.values().cloned().collect()
    }
}
