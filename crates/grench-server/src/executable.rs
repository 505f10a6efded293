//! Executable lookup.

use std::path::{Path, PathBuf};

/// Resolve an executable by name.
///
/// Absolute paths are accepted as-is if they exist; anything else is
/// looked up on `PATH`.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    let executable = executable.to_string();
    let found = tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok);
    tracing::debug!(?found, "Resolved server executable");
    found
}
