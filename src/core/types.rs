//! Core data types shared between the tag reader, the evaluator and the pipeline.
//!
//! Rule of thumb:
//! - These structs should be "boring bags of data"
//! - No filesystem code
//! - No tag parsing code
//!
//! `TrackMetadata` represents ONE audio file on disk plus the tag fields we validate.
//! Everything here is rebuilt per input file and dropped once the file is handled.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Picture type codes that count as "the cover" (Other, file icon, front cover, leaflet).
pub const COVER_TYPE_CODES: [u8; 4] = [0, 1, 3, 5];

/// ID3 frame carrying replay-gain adjustment data.
pub const REPLAY_GAIN_FRAME: &str = "RGAD";

/// One embedded image (APIC).
///
/// We never look at the picture bytes. All the cover rules need is what kind
/// of picture it claims to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// ID3 picture type code (3 = front cover, 4 = back cover, ...).
    /// Kept as the raw byte so odd codes from old taggers survive untouched.
    pub type_code: u8,

    /// Free-text description. `None` when the tag left it empty, which is
    /// exactly the case the tag cleaner fills in.
    pub description: Option<String>,
}

impl Image {
    pub fn is_cover(&self) -> bool {
        COVER_TYPE_CODES.contains(&self.type_code)
    }
}

/// Tag fields we care about for one file.
/// Think: everything the evaluator and the namer are allowed to look at.
///
/// `None` means "missing", and missing is what the evaluator hunts for:
/// - a zero disc/track number is read as `None` (taggers write 0 for "unknown")
/// - whitespace-only text is `None` too, since it would name a folder " "
/// - a tag that fails to read gives an all-`None` value, not an error
#[derive(Debug, Clone, Default)]
pub struct TrackMetadata {
    /// Full file path on disk.
    /// This is the only thing we always have.
    pub path: PathBuf,

    /// ID3 Title (TIT2, song name)
    pub title: Option<String>,

    /// ID3 Artist (TPE1, per-track artist)
    pub artist: Option<String>,

    /// ID3 Album (TALB)
    pub album: Option<String>,

    /// Best available release date, kept as text ("1996", "1996-06-18").
    /// We only check that one exists, so there is no point parsing it.
    pub date: Option<String>,

    /// Disc number and count from TPOS ("1/2").
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,

    /// Track number and count from TRCK ("5/13").
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,

    /// TIT1 (content group). Required, though nothing is named after it.
    pub grouping: Option<String>,

    /// Embedded images, in the order they sit in the file.
    /// Duplicates of one picture type are kept; the cover check depends on it.
    pub images: Vec<Image>,

    /// TCMP says "this is a compilation". Files go under the compilation
    /// folder and keep the artist in their file name.
    pub is_compilation: bool,

    /// Every frame id present in the tag.
    /// Lets the evaluator ask "is there an RGAD frame?" without re-reading the file.
    pub frame_ids: BTreeSet<String>,
}

impl TrackMetadata {
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    /// Title, or "" when missing.
    pub fn title_text(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn artist_text(&self) -> &str {
        self.artist.as_deref().unwrap_or("")
    }

    pub fn album_text(&self) -> &str {
        self.album.as_deref().unwrap_or("")
    }

    /// Spread over more than one disc (either field above 1).
    pub fn is_multidisc(&self) -> bool {
        self.disc_total.is_some_and(|t| t > 1) || self.disc_number.is_some_and(|n| n > 1)
    }

    pub fn has_frame(&self, id: &str) -> bool {
        self.frame_ids.contains(id)
    }
}

/// A missing or invalid tag field. Each one sends the file to staging.
///
/// Variant order is the order the evaluator checks fields in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defect {
    Undecodable,
    MissingTitle,
    MissingArtist,
    MissingAlbum,
    MissingDate,
    MissingDiscNumber,
    DiscNumberComponent,
    MissingTrackNumberAndTotal,
    MissingTrackNumber,
    MissingTrackTotal,
    MissingGrouping,
    MissingImages,
    AmbiguousCover,
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Defect::Undecodable => "file does not decode properly",
            Defect::MissingTitle => "missing TITLE",
            Defect::MissingArtist => "missing ARTIST",
            Defect::MissingAlbum => "missing ALBUM",
            Defect::MissingDate => "missing DATE",
            Defect::MissingDiscNumber => "missing DISCNUMBER",
            Defect::DiscNumberComponent => "DISCNUMBER missing component",
            Defect::MissingTrackNumberAndTotal => "missing TRACKNUMBER/TRACKTOTAL",
            Defect::MissingTrackNumber => "missing TRACKNUMBER",
            Defect::MissingTrackTotal => "missing TRACKTOTAL",
            Defect::MissingGrouping => "missing GROUPING",
            Defect::MissingImages => "missing images",
            Defect::AmbiguousCover => "there is not exactly one cover image",
        };
        f.write_str(s)
    }
}

/// Worth noting, but does not block placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    ReplayGainPresent,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ReplayGainPresent => write!(f, "{REPLAY_GAIN_FRAME} tag present"),
        }
    }
}

/// Outcome of checking one file's tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletenessVerdict {
    pub defects: Vec<Defect>,
    pub warnings: Vec<Warning>,
}

impl CompletenessVerdict {
    /// Passes iff no defect was found. Warnings never fail a file.
    pub fn passed(&self) -> bool {
        self.defects.is_empty()
    }
}
