//! Filesystem utilities

use std::fs;
use std::path::Path;

use log::info;

/// Create a directory and all parent directories if they don't exist
pub fn create_dir_all(path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    if !path.as_os_str().is_empty() && !path.exists() {
        fs::create_dir_all(path)?;
        info!("Created directory: {}", path.display());
    }
    Ok(())
}

/// Check if a path exists
pub fn path_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}
