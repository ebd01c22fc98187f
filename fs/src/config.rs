use std::path::Path;

use serde::Deserialize;

use crate::{FsError, FsResult, PathConfig, Vfs};

/// Mount configuration, usually loaded from a TOML file.
///
/// ```toml
/// [paths]
/// separator = "/"
///
/// [[mount]]
/// alias = "/assets/"
/// path = "./assets"
///
/// [[mount]]
/// alias = "/assets/"
/// path = "./base.rlpk"
/// type = "package"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VfsConfig {
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default)]
    pub mount: Vec<MountConfig>,
}

/// A single mount definition.
#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    pub alias: String,
    pub path: String,
    #[serde(default)]
    pub r#type: MountKind,
    /// Relative priority added to the storage's base priority. Ignored for
    /// packages.
    #[serde(default)]
    pub priority: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// A directory on disk.
    #[default]
    Native,
    /// A package container file.
    Package,
}

impl VfsConfig {
    pub fn from_toml_str(content: &str) -> FsResult<Self> {
        toml::from_str(content).map_err(|e| FsError::InvalidFormat(format!("bad VFS config: {e}")))
    }

    /// Create a router and apply every mount in order.
    ///
    /// Fails on the first mount that cannot be applied.
    pub fn build(&self) -> FsResult<Vfs> {
        let vfs = Vfs::new(self.paths.clone());
        for mount in &self.mount {
            log::info!(
                "VFS mount: \"{}\" -> {:?} {:?}",
                mount.alias,
                mount.r#type,
                mount.path
            );
            let result = match mount.r#type {
                MountKind::Native => vfs.mount_physical(&mount.path, &mount.alias, mount.priority),
                MountKind::Package => vfs.mount_package(&mount.path, &mount.alias),
            };
            if let Err(e) = result {
                log::error!("Failed to mount \"{}\": {e}", mount.alias);
                return Err(e);
            }
        }
        Ok(vfs)
    }
}

/// Load a config from a TOML file.
pub fn load_config(path: &Path) -> FsResult<VfsConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = VfsConfig::from_toml_str(&content)?;
    log::info!(
        "Loaded VFS config {} ({} mounts)",
        path.display(),
        config.mount.len()
    );
    Ok(config)
}
