//! Home-directory expansion for output paths.

use std::path::{Path, PathBuf};

use crate::DownloadError;

/// Expand a leading `~/` (or a bare `~`) to the current user's home directory.
///
/// Other paths are returned unchanged. Fails only when an expansion is needed and
/// the home directory cannot be determined.
pub fn resolve_path(path: &str) -> Result<PathBuf, DownloadError> {
    expand_with_home(path, dirs::home_dir)
}

fn expand_with_home(
    path: &str,
    home: impl FnOnce() -> Option<PathBuf>,
) -> Result<PathBuf, DownloadError> {
    let rest = match path.strip_prefix("~/") {
        Some(rest) => rest,
        None if path == "~" => "",
        None => return Ok(PathBuf::from(path)),
    };

    let home = home().ok_or_else(|| DownloadError::HomeDirUnavailable {
        path: path.to_string(),
    })?;

    if rest.is_empty() {
        Ok(home)
    } else {
        Ok(home.join(rest))
    }
}

/// Path of part `part` for the given output prefix: `<prefix>_part<N>.ts`.
pub fn part_path(prefix: &Path, part: u64) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("_part{part}.ts"));
    PathBuf::from(name)
}
