//! Thin wrapper over the NCO command-line utilities
//!
//! The pipeline itself never shells out, but auxiliary tooling relies on
//! two NCO operations: concatenating a chunk list into one file (`ncrcat`)
//! and cropping an existing file's time axis (`ncks -d`). Both are opaque
//! services: a missing tool or non-zero exit is a fatal, non-retryable
//! `ExternalTool` error. The in-place crop goes through a temporary file
//! that is removed on every exit path.

use crate::dates::CfDate;
use crate::errors::{PrepError, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const TEMP_CROP_NAME: &str = "clim_prep_temp.nc";

/// Handle to the NCO utilities, bound to an optional working directory.
#[derive(Debug, Clone, Default)]
pub struct NcoTools {
    pub working_dir: Option<PathBuf>,
}

impl NcoTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(working_dir.into()),
        }
    }

    /// Verifies the NCO utilities are reachable before any work is queued.
    pub fn check_environ() -> Result<()> {
        if !check_executable("ncks") {
            return Err(PrepError::ExternalTool(
                "NCO utilities not found on $PATH".to_string(),
            ));
        }
        Ok(())
    }

    /// Concatenates `chunks` into `out_file` with `ncrcat`.
    pub fn cat_chunks(&self, chunks: &[PathBuf], out_file: &Path) -> Result<()> {
        let mut command = Command::new("ncrcat");
        command.args(["--no_tmp_fl", "-O"]);
        command.args(chunks);
        command.arg(out_file);
        self.run(command, "ncrcat")
    }

    /// Crops `in_file`'s time axis to `[start, end]` with `ncks`, writing
    /// to `out_file` or, when none is given, back in place.
    pub fn crop_time_axis(
        &self,
        time_var_name: &str,
        start: &CfDate,
        end: &CfDate,
        in_file: &Path,
        out_file: Option<&Path>,
    ) -> Result<()> {
        let (target, move_back) = match out_file {
            Some(path) => (path.to_path_buf(), false),
            None => (PathBuf::from(TEMP_CROP_NAME), true),
        };

        let mut command = Command::new("ncks");
        command.args(["--no_tmp_fl", "-O", "-d"]);
        command.arg(format!(
            "{},{},{}",
            time_var_name,
            start.format_ncks(),
            end.format_ncks()
        ));
        command.arg(in_file);
        command.arg(&target);

        let result = self.run(command, "ncks");
        if !move_back {
            return result;
        }

        // the subprocess resolved relative paths inside working_dir; the
        // move-back must agree with it
        let in_file = self.fs_path(in_file);
        let target = self.fs_path(&target);
        let result = result.and_then(|_| {
            fs::remove_file(&in_file)?;
            fs::rename(&target, &in_file)?;
            Ok(())
        });
        if result.is_err() && target.exists() {
            // never leave the temporary behind, even on failure
            let _ = fs::remove_file(&target);
        }
        result
    }

    /// Resolves a path the way the spawned tool sees it.
    fn fs_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.working_dir {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }

    fn run(&self, mut command: Command, tool: &str) -> Result<()> {
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        let output = command.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PrepError::ExternalTool(format!("'{}' not found on $PATH", tool))
            } else {
                PrepError::ExternalTool(format!("failed to launch '{}': {}", tool, e))
            }
        })?;
        if !output.status.success() {
            return Err(PrepError::ExternalTool(format!(
                "'{}' exited with {}: {}",
                tool,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Checks whether an executable of the given name is on `$PATH`.
pub fn check_executable(name: &str) -> bool {
    env::var_os("PATH")
        .map(|paths| {
            env::split_paths(&paths).any(|dir| {
                let candidate = dir.join(name);
                candidate.is_file()
            })
        })
        .unwrap_or(false)
}
