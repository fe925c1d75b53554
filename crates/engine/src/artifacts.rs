// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic file moves across the managed directory trees.
//!
//! Same-filesystem moves are a single rename. Across filesystems the file is
//! copied to `<dest>.tmp`, renamed into place, and the source unlinked — a
//! crash mid-sequence leaves at most one `.tmp` file, which reconciliation
//! sweeps.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Suffix used for in-flight copies. The reconciler sweeps strays.
pub const TMP_SUFFIX: &str = ".tmp";

/// Move `src` to `dst`, creating parent directories.
pub fn move_atomic(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        // CrossesDevices is unstable as an ErrorKind match; EXDEV arrives as
        // a raw os error, so any rename failure falls back to copy+rename.
        Err(_) => {
            let tmp = tmp_path(dst);
            std::fs::copy(src, &tmp)?;
            std::fs::rename(&tmp, dst)?;
            std::fs::remove_file(src)?;
            debug!(src = %src.display(), dst = %dst.display(), "cross-device move");
            Ok(())
        }
    }
}

fn tmp_path(dst: &Path) -> PathBuf {
    let mut name = dst.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(TMP_SUFFIX);
    dst.with_file_name(name)
}

/// `<completed|failed>/<rel>/<name>` destination for a source audio file.
pub fn audio_dest(root: &Path, relative_path: &Path, file_name: &str) -> PathBuf {
    root.join(relative_path).join(file_name)
}

/// `<completed>/<rel>/<name>.txt` destination for a transcript.
pub fn transcript_dest(completed: &Path, relative_path: &Path, file_name: &str) -> PathBuf {
    completed.join(relative_path).join(format!("{file_name}.txt"))
}

/// Engine scratch directory for one job: `<output>/<rel>/`.
pub fn engine_output_dir(output: &Path, relative_path: &Path) -> PathBuf {
    output.join(relative_path)
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
