use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::AppError;

/// Downloads kept in flight while building an archive.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 8;

pub const STORAGE_URL_ENV: &str = "VEHICLE_ARCHIVE_STORAGE_URL";
pub const STORAGE_KEY_ENV: &str = "VEHICLE_ARCHIVE_STORAGE_KEY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Filesystem { root: PathBuf },
    Http { base_url: String, api_key: Option<String> },
}

impl StorageConfig {
    /// An HTTP endpoint wins over a local directory; with neither, objects live
    /// under the project data directory.
    pub fn resolve(
        storage_url: Option<&str>,
        api_key: Option<&str>,
        storage_dir: Option<&Path>,
    ) -> Result<Self, AppError> {
        if let Some(url) = storage_url.map(str::trim).filter(|u| !u.is_empty()) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(AppError::Config(format!(
                    "storage URL must be http(s), got '{url}'"
                )));
            }
            return Ok(Self::Http {
                base_url: url.to_string(),
                api_key: api_key.map(String::from),
            });
        }

        let root = match storage_dir {
            Some(dir) => dir.to_path_buf(),
            None => data_dir()?.join("objects"),
        };
        Ok(Self::Filesystem { root })
    }
}

pub fn project_dirs() -> Result<ProjectDirs, AppError> {
    ProjectDirs::from("", "", "vehicle-archive")
        .ok_or_else(|| AppError::Config("Could not determine home directory".into()))
}

pub fn data_dir() -> Result<PathBuf, AppError> {
    let dirs = project_dirs()?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;
    Ok(data_dir.to_path_buf())
}

pub fn db_path(override_path: Option<&Path>) -> Result<PathBuf, AppError> {
    match override_path {
        Some(p) => Ok(p.to_path_buf()),
        None => Ok(data_dir()?.join("vehicle-archive.db")),
    }
}
