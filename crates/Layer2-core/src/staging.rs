//! Staging - 호스트 파일시스템 준비
//!
//! Host-side staging: recursive tree copies for sources and registry steps,
//! script materialization for inline steps. All failures here are fatal
//! staging errors; nothing is retried.

use crate::build::Build;
use crate::step::{Step, StepKind};
use std::path::{Path, PathBuf};
use tracing::debug;
use wercker_foundation::{Error, Result};

/// Interpreter line prepended to scripts that do not declare one
const DEFAULT_INTERPRETER: &str = "#!/bin/bash -xe";

/// Recursively copy a directory tree. The destination must not exist yet.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        return Err(Error::Staging(format!(
            "source tree {} does not exist",
            src.display()
        )));
    }
    if dst.exists() {
        return Err(Error::Staging(format!(
            "destination {} already exists",
            dst.display()
        )));
    }

    std::fs::create_dir_all(dst)
        .map_err(|e| Error::Staging(format!("Failed to create {}: {}", dst.display(), e)))?;

    for entry in std::fs::read_dir(src)
        .map_err(|e| Error::Staging(format!("Failed to read {}: {}", src.display(), e)))?
    {
        let entry = entry.map_err(|e| Error::Staging(format!("Failed to read entry: {}", e)))?;
        let target = dst.join(entry.file_name());
        let path = entry.path();

        if path.is_dir() {
            copy_tree(&path, &target)?;
        } else {
            std::fs::copy(&path, &target).map_err(|e| {
                Error::Staging(format!(
                    "Failed to copy {} to {}: {}",
                    path.display(),
                    target.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

/// Materialize a step's files at its host path.
///
/// Registry steps copy their pre-staged tree from the step repository;
/// script steps synthesize a directory holding a single normalized `run.sh`.
/// Either way the returned path exists afterwards.
pub fn fetch_step(step: &Step, build: &Build, step_dir: &Path) -> Result<PathBuf> {
    let host_path = step.host_path(build);

    match step.kind() {
        StepKind::Registry => {
            let source = step_dir.join(step.id());
            debug!("fetching step {} from {}", step.id(), source.display());
            copy_tree(&source, &host_path)?;
        }
        StepKind::Script { code } => {
            debug!("materializing script step {}", step.id());
            std::fs::create_dir_all(&host_path).map_err(|e| {
                Error::Staging(format!("Failed to create {}: {}", host_path.display(), e))
            })?;
            let script_path = host_path.join("run.sh");
            std::fs::write(&script_path, normalize_script(code)).map_err(|e| {
                Error::Staging(format!(
                    "Failed to write {}: {}",
                    script_path.display(),
                    e
                ))
            })?;
        }
    }

    Ok(host_path)
}

/// Prepend the default interpreter line unless the code already carries one
pub fn normalize_script(code: &str) -> String {
    if code.starts_with("#!") {
        code.to_string()
    } else {
        format!("{}\n{}", DEFAULT_INTERPRETER, code)
    }
}
