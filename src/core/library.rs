//! core/library.rs
//! Filesystem side of the music library:
//! - find `.mp3` files under an input directory
//! - find-or-create the artist/album/disc directories a track goes into

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{Error, Result};
use super::names::strip_leading_article;

pub fn scan_mp3s(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk_dir(root, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(Error::io("listing", dir))?;

    for entry in entries {
        let entry = entry.map_err(Error::io("listing", dir))?;
        let path = entry.path();

        if path.is_dir() {
            walk_dir(&path, out)?;
        } else if is_mp3(&path) {
            out.push(path);
        }
    }

    Ok(())
}

pub fn is_mp3(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false)
}

/// Result of looking for a child directory by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirMatch {
    /// An entry with exactly this name already exists.
    Existing(PathBuf),
    /// Nothing similar existed; the directory was created.
    Created(PathBuf),
    /// Something with a similar name exists, but not this exact spelling
    /// (or the exact spelling is taken by a file, not a directory).
    Mismatch {
        requested: String,
        similar: Vec<String>,
    },
    /// `name` would not create a child of `parent` ("", "." or "..").
    Unusable { requested: String },
}

/// Find or create `parent/name`.
///
/// `name` is "similar" to an entry when the entry, lowercased, contains `name`
/// lowercased with any leading article removed. No similar entry: create it.
/// Similar entries but no exact match: `Mismatch`, nothing is created or renamed.
pub fn reconcile(parent: &Path, name: &str) -> Result<DirMatch> {
    if matches!(name, "" | "." | "..") {
        return Ok(DirMatch::Unusable {
            requested: name.to_string(),
        });
    }

    let entries = list_names(parent)?;

    let wanted = strip_leading_article(name).to_lowercase();
    let similar: Vec<String> = entries
        .iter()
        .filter(|e| e.to_lowercase().contains(&wanted))
        .cloned()
        .collect();

    let path = parent.join(name);

    if similar.is_empty() {
        match fs::create_dir(&path) {
            Ok(()) => debug!(dir = %path.display(), "created directory"),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(Error::io("creating directory", &path)(e)),
        }
        return Ok(DirMatch::Created(path));
    }

    if entries.iter().any(|e| e == name) && path.is_dir() {
        Ok(DirMatch::Existing(path))
    } else {
        Ok(DirMatch::Mismatch {
            requested: name.to_string(),
            similar,
        })
    }
}

/// Top-level entry names of `dir`; names that are not valid UTF-8 are compared lossily.
pub fn list_names(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(Error::io("listing", dir))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(Error::io("listing", dir))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
