use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const APP_DIR: &str = "recipe-finder";
pub const CATALOG_FILE: &str = "film_simulations.xml";
pub const SETTINGS_FILE: &str = "user_settings.json";

/// Where the catalog and the settings live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub catalog: PathBuf,
    pub settings: PathBuf,
}

impl AppPaths {
    /// Explicit paths win; anything left unset goes in the user's config
    /// directory, or the working directory when there is none.
    pub fn resolve(catalog: Option<PathBuf>, settings: Option<PathBuf>) -> Self {
        let base = default_dir();
        Self {
            catalog: catalog.unwrap_or_else(|| base.join(CATALOG_FILE)),
            settings: settings.unwrap_or_else(|| base.join(SETTINGS_FILE)),
        }
    }

    /// Create the parent directories of both files.
    pub fn ensure_parent_dirs(&self) -> io::Result<()> {
        for path in [&self.catalog, &self.settings] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

fn default_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| Path::new(".").to_path_buf())
}
