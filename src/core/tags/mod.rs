//! core/tags/mod.rs
//!
//! ID3 tag read/write utilities.
//! Public API:
//! - [`read_track_metadata`] reads an MP3 into [`TrackMetadata`](super::types::TrackMetadata)
//!   (non-fatal on tag read failure).
//! - [`clean_for_library`] rewrites the tag of a file that passed validation.

mod pictures;
mod read;
mod util;
mod write;

pub use read::read_track_metadata;
pub use write::{CleanReport, clean_for_library};
