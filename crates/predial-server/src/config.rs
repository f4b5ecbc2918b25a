use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded explicitly from environment variables.
///
/// Every setting is optional. Without overrides the server runs on the embedded catalog,
/// starts with no user profile and only returns generated reports to the client.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// JSON catalog replacing the embedded data set.
    pub catalog_path: Option<PathBuf>,
    /// JSON user profile loaded into the profile store at startup.
    pub profile_path: Option<PathBuf>,
    /// Directory receiving a copy of every exported report.
    pub report_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `CATALOG_PATH`: catalog JSON file (must exist when set)
    /// - `PROFILE_PATH`: user profile JSON file (must exist when set)
    /// - `REPORT_DIR`: directory for exported reports (created on first export)
    pub fn from_env() -> Result<Self, AppError> {
        let catalog_path = existing_file("CATALOG_PATH")?;
        let profile_path = existing_file("PROFILE_PATH")?;
        let report_dir = non_empty_var("REPORT_DIR").map(PathBuf::from);

        if let Some(dir) = &report_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(AppError::Config(format!(
                    "REPORT_DIR {} is not a directory",
                    dir.display()
                )));
            }
        }

        Ok(Self {
            catalog_path,
            profile_path,
            report_dir,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn existing_file(name: &str) -> Result<Option<PathBuf>, AppError> {
    let Some(value) = non_empty_var(name) else {
        return Ok(None);
    };
    let path = PathBuf::from(value);
    if !path.is_file() {
        return Err(AppError::Config(format!(
            "{name} points to {}, which is not a readable file",
            path.display()
        )));
    }
    Ok(Some(path))
}
