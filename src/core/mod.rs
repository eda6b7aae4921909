//! core/mod.rs
//!
//! The brain of the tool:
//! - Expand command-line inputs into MP3 paths (filesystem walk)
//! - Judge each file's tags, name it, and file it into the library
//!
//! Pipeline per file, strictly one after another:
//!   decode check -> read tags -> evaluate -> stage -> clean tags -> locate -> move
//!
//! Leaf modules are pure (`names`, `naming`, `completeness`) and know nothing
//! about the filesystem; `library`, `tags`, `decode` and `pipeline` do the IO.

pub mod completeness;
pub mod decode;
pub mod error;
pub mod library;
pub mod names;
pub mod naming;
pub mod pipeline;
pub mod tags;
pub mod types;

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use error::{Error, Result};
use pipeline::Outcome;

/// Turn command-line arguments into the list of files to process.
///
/// - Files are kept in argument order, whatever their extension
/// - Directories are walked for `.mp3` files (sorted per directory)
/// - Paths named twice are processed once
/// - A path that cannot be stat'ed fails the whole call, before any file is touched
pub fn collect_inputs(args: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut seen: HashSet<PathBuf> = HashSet::with_capacity(args.len());
    let mut out: Vec<PathBuf> = Vec::new();

    for arg in args {
        let meta = fs::metadata(arg).map_err(Error::io("reading input", arg))?;
        let paths = if meta.is_dir() {
            library::scan_mp3s(arg)?
        } else {
            vec![arg.clone()]
        };
        for path in paths {
            if seen.insert(path.clone()) {
                out.push(path);
            }
        }
    }

    Ok(out)
}

/// Counts for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub placed: usize,
    pub rejected: usize,
    pub unplaced: usize,
}

impl Tally {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Placed { .. } => self.placed += 1,
            Outcome::Rejected { .. } => self.rejected += 1,
            Outcome::Unplaced { .. } => self.unplaced += 1,
        }
    }
}
