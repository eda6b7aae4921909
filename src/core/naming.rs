//! core/naming.rs
//! Turn tag values into the names a track gets on disk.
//!
//! Two names come out of here:
//! - the staging fragment: `Artist - Album[ (Disc N)] - NN - Title`
//!   (or `COMPILATION - Album ... - Title (Artist)`)
//! - the library leaf: `NN - Title[ (Artist)].mp3`

use super::names::sanitize_for_filesystem;
use super::types::TrackMetadata;

pub const COMPILATION_PREFIX: &str = "COMPILATION";

/// Sanitized names and padding for one track.
///
/// Built once per file, before we know whether it passes. Rejected files use
/// it too, for their staging name, so every field copes with missing tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedName {
    /// Album, safe to use as a directory name ("" when the tag had none).
    pub album: String,
    /// Artist, safe for a directory name or the "(Artist)" suffix.
    pub artist: String,
    /// Title, safe for a file name.
    pub title: String,

    pub is_compilation: bool,
    /// Adds the "Disc N" level under the album.
    pub is_multidisc: bool,

    /// Raw numbers. Missing ones print as zeros.
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,

    /// Digits of the disc total, at least 1.
    pub disc_width: usize,
    /// Digits of the track total, at least 2.
    pub track_width: usize,

    /// Staging filename fragment, without extension.
    pub fragment: String,
}

impl DerivedName {
    pub fn from_metadata(meta: &TrackMetadata) -> Self {
        derive(
            meta,
            meta.is_compilation,
            meta.is_multidisc(),
            meta.disc_number,
            meta.disc_total,
            meta.track_number,
            meta.track_total,
        )
    }

    /// Zero-padded track number; also the prefix used to spot an existing copy.
    pub fn track_prefix(&self) -> String {
        zero_pad(self.track_number, self.track_width)
    }

    /// Directory name for this track's disc.
    pub fn disc_dir(&self) -> String {
        format!("Disc {}", zero_pad(self.disc_number, self.disc_width))
    }

    /// Final filename inside the album (or disc) directory.
    pub fn leaf_name(&self) -> String {
        let mut name = format!("{} - {}", self.track_prefix(), self.title);
        if self.is_compilation {
            name.push_str(&format!(" ({})", self.artist));
        }
        name.push_str(".mp3");
        name
    }
}

pub fn derive(
    meta: &TrackMetadata,
    is_compilation: bool,
    is_multidisc: bool,
    disc_number: Option<u32>,
    disc_total: Option<u32>,
    track_number: Option<u32>,
    track_total: Option<u32>,
) -> DerivedName {
    let disc_width = disc_total.map_or(1, digit_count);
    let track_width = track_total.map_or(2, |t| digit_count(t).max(2));

    let album = sanitize_for_filesystem(meta.album_text());
    let artist = sanitize_for_filesystem(meta.artist_text());
    let title = sanitize_for_filesystem(meta.title_text());

    let mut fragment = String::new();
    if is_compilation {
        fragment.push_str(COMPILATION_PREFIX);
    } else {
        fragment.push_str(&artist);
    }
    fragment.push_str(" - ");
    fragment.push_str(&album);
    if is_multidisc {
        // Visible disc number is never padded.
        fragment.push_str(&format!(" (Disc {})", disc_number.unwrap_or(0)));
    }
    fragment.push_str(&format!(" - {} - {}", zero_pad(track_number, track_width), title));
    if is_compilation {
        fragment.push_str(&format!(" ({artist})"));
    }

    DerivedName {
        album,
        artist,
        title,
        is_compilation,
        is_multidisc,
        disc_number,
        track_number,
        disc_width,
        track_width,
        fragment,
    }
}

fn digit_count(n: u32) -> usize {
    n.max(1).ilog10() as usize + 1
}

/// Absent numbers pad as zeros.
fn zero_pad(n: Option<u32>, width: usize) -> String {
    format!("{:0width$}", n.unwrap_or(0))
}
