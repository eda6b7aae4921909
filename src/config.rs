//! config.rs
//! `music.conf` loading.
//!
//! The file is a shell fragment (`music_root="/srv/music"`) that other scripts
//! source too, so values follow shell quoting. Command-line flags win over it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{Error, Result};

pub const CONFIG_FILE: &str = "music.conf";
pub const DEFAULT_CONFIG_DIR: &str = "/etc/media-scripts";

/// Everything a run needs to know about where files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Top of the organised library.
    pub music_root: PathBuf,
    /// Directory name (under `music_root`) that holds compilations.
    pub comp_dir: String,
    /// Working directory for staged and rejected files.
    pub music_stage: PathBuf,
    /// External decoder used for the corruption check, if any.
    pub decode_cmd: Option<String>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub music_root: Option<PathBuf>,
    pub comp_dir: Option<String>,
    pub music_stage: Option<PathBuf>,
    pub decode_cmd: Option<String>,
}

impl Config {
    /// Read `{config_dir}/music.conf`, then apply `overrides`.
    pub fn load(config_dir: &Path, overrides: Overrides) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE);
        let text = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let values = parse_conf(&text)?;
        debug!(path = %path.display(), keys = values.len(), "config file read");
        Self::resolve(values, overrides)
    }

    pub fn resolve(mut values: BTreeMap<String, String>, overrides: Overrides) -> Result<Self> {
        let mut take = |key: &str| values.remove(key).filter(|v| !v.is_empty());

        let music_root = overrides
            .music_root
            .or_else(|| take("music_root").map(PathBuf::from))
            .ok_or_else(|| missing("music_root", "--rootdir"))?;
        let comp_dir = overrides
            .comp_dir
            .or_else(|| take("comp_dir"))
            .ok_or_else(|| missing("comp_dir", "--compsubdir"))?;
        let music_stage = overrides
            .music_stage
            .or_else(|| take("music_stage").map(PathBuf::from))
            .ok_or_else(|| missing("music_stage", "--stagedir"))?;
        let decode_cmd = overrides.decode_cmd.or_else(|| take("decode_cmd"));

        for key in values.keys() {
            debug!(key = key.as_str(), "ignoring unknown config key");
        }

        Ok(Self {
            music_root,
            comp_dir,
            music_stage,
            decode_cmd,
        })
    }

    /// Library root must exist; the staging directory is created on demand.
    pub fn prepare_dirs(&self) -> Result<()> {
        if !self.music_root.is_dir() {
            return Err(Error::Config(format!(
                "music_root {} is not a directory",
                self.music_root.display()
            )));
        }
        fs::create_dir_all(&self.music_stage)
            .map_err(Error::io("creating staging directory", &self.music_stage))
    }
}

fn missing(key: &str, flag: &str) -> Error {
    Error::Config(format!("{key} is not set (add it to {CONFIG_FILE} or pass {flag})"))
}

/// Parse `key=value` lines. Lines without `=` and `#` comments are skipped;
/// a leading `export ` is allowed; later keys override earlier ones.
pub fn parse_conf(text: &str) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, raw)) = line.split_once('=') else {
            continue;
        };

        let key = key.trim();
        let key = key.strip_prefix("export ").map(str::trim).unwrap_or(key);
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            continue;
        }

        out.insert(key.to_string(), parse_value(raw, idx + 1)?);
    }

    Ok(out)
}

/// One shell word: quotes are removed, escapes resolved, and it ends at
/// unquoted whitespace. A word starting with `#` is a comment.
fn parse_value(raw: &str, line_no: usize) -> Result<String> {
    let unterminated = |q: char| Error::Config(format!("line {line_no}: unterminated {q} quote"));

    let mut out = String::new();
    let mut chars = raw.trim_start().chars().peekable();

    if chars.peek() == Some(&'#') {
        return Ok(out);
    }

    while let Some(ch) = chars.next() {
        match ch {
            '\'' => loop {
                match chars.next() {
                    Some('\'') => break,
                    Some(c) => out.push(c),
                    None => return Err(unterminated('\'')),
                }
            },
            '"' => loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.peek() {
                        Some(&c) if matches!(c, '"' | '\\' | '$' | '`') => {
                            out.push(c);
                            chars.next();
                        }
                        _ => out.push('\\'),
                    },
                    Some(c) => out.push(c),
                    None => return Err(unterminated('"')),
                }
            },
            '\\' => {
                if let Some(c) = chars.next() {
                    out.push(c);
                }
            }
            c if c.is_whitespace() => break,
            c => out.push(c),
        }
    }

    Ok(out)
}
