//! Extension directory synchronisation

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use publoader::extension::manifest::MANIFEST_FILE;

/// Copy every extension directory from `source` into `target`
///
/// Only directories holding a manifest are copied. Existing files in the
/// target are overwritten; files that only exist in the target are kept.
pub fn sync(source: &Path, target: &Path) -> Result<()> {
    if !source.is_dir() {
        bail!("Source is not a directory: {}", source.display());
    }

    println!("Syncing extensions");
    println!("==================");
    println!("Source: {}", source.display());
    println!("Target: {}", target.display());
    println!();

    fs::create_dir_all(target)
        .with_context(|| format!("Failed to create target: {}", target.display()))?;

    let mut dirs: Vec<_> = fs::read_dir(source)
        .with_context(|| format!("Failed to read source: {}", source.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.join(MANIFEST_FILE).is_file())
        .collect();
    dirs.sort();

    let mut files = 0;
    for dir in &dirs {
        let Some(name) = dir.file_name() else {
            continue;
        };
        let copied = copy_dir(dir, &target.join(name))?;
        println!("{:<24} {copied} file(s)", name.to_string_lossy());
        files += copied;
    }

    println!("\nSynced {} extension(s), {files} file(s)", dirs.len());
    tracing::info!(extensions = dirs.len(), files, "Extensions synced");
    Ok(())
}

fn copy_dir(from: &Path, to: &Path) -> Result<usize> {
    fs::create_dir_all(to).with_context(|| format!("Failed to create {}", to.display()))?;

    let mut copied = 0;
    for entry in fs::read_dir(from).with_context(|| format!("Failed to read {}", from.display()))? {
        let entry = entry?;
        let path = entry.path();
        let dest = to.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copied += copy_dir(&path, &dest)?;
        } else {
            fs::copy(&path, &dest).with_context(|| {
                format!("Failed to copy {} to {}", path.display(), dest.display())
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}
