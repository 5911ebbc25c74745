//! Launches the external pose-generation process.
//!
//! The helper is started without arguments and left running; it is expected
//! to publish the hemisphere centre and the viewpoint array on its own.
//! Dropping the returned [`Child`] kills the process.

use std::path::Path;
use std::process::Stdio;

use hemi_types::HemiError;
use tokio::process::{Child, Command};
use tracing::info;

/// Spawn `executable` detached from our stdin, killed when the handle drops.
///
/// # Errors
///
/// Returns [`HemiError::Helper`] when the process cannot be started.
pub fn spawn_helper(executable: &Path) -> Result<Child, HemiError> {
    let child = Command::new(executable)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| HemiError::Helper(format!("failed to spawn {}: {e}", executable.display())))?;
    info!(
        executable = %executable.display(),
        pid = child.id().unwrap_or_default(),
        "helper process started"
    );
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_helper_runs_executable() {
        let mut child = spawn_helper(Path::new("true")).expect("`true` is on PATH");
        let status = child.wait().await.expect("wait");
        assert!(status.success());
    }

    #[tokio::test]
    async fn spawn_helper_reports_missing_executable() {
        let result = spawn_helper(Path::new("/nonexistent/hemisphere_generator"));
        assert!(matches!(result, Err(HemiError::Helper(_))));
    }
}
