//! core/tags/read.rs
//! Read the ID3v2 tag of an MP3 and convert it into `TrackMetadata`.

use std::path::PathBuf;

use id3::frame::{Content, Picture};
use id3::{Tag, TagLike};

use super::super::types::{Image, TrackMetadata};
use super::pictures::pictures_or_tag;
use super::util::{non_blank, parse_boolish, parse_slash_pair_u32};

/// Frames tried, in order, for the release date.
const DATE_FRAMES: [&str; 5] = ["TDRC", "TYER", "TDRL", "TDOR", "TORY"];

/// Returns `(metadata, failed)`. On failure every field is empty.
pub fn read_track_metadata(path: PathBuf) -> (TrackMetadata, bool) {
    match Tag::read_from_path(&path) {
        Ok(tag) => {
            let mut meta = build_metadata_from_tag(path, &tag);
            // The id3 reader merges pictures of the same type; count what is on disk.
            meta.images = pictures_or_tag(&meta.path, &tag).iter().map(image_of).collect();
            (meta, false)
        }
        Err(_) => (TrackMetadata::empty(path), true),
    }
}

pub(crate) fn build_metadata_from_tag(path: PathBuf, tag: &Tag) -> TrackMetadata {
    let (track_number, track_total) = parse_slash_pair_u32(text_frame(tag, "TRCK").as_deref());
    let (disc_number, disc_total) = parse_slash_pair_u32(text_frame(tag, "TPOS").as_deref());

    let date = DATE_FRAMES
        .iter()
        .find_map(|id| non_blank(text_frame(tag, id)));

    let images = tag.pictures().map(image_of).collect();

    // Present counts as "yes" unless it explicitly says no.
    let is_compilation = text_frame(tag, "TCMP")
        .map(|s| parse_boolish(&s) != Some(false))
        .unwrap_or(false);

    TrackMetadata {
        path,

        title: non_blank(tag.title().map(str::to_owned)),
        artist: non_blank(tag.artist().map(str::to_owned)),
        album: non_blank(tag.album().map(str::to_owned)),
        date,

        disc_number,
        disc_total,
        track_number,
        track_total,

        grouping: non_blank(text_frame(tag, "TIT1")),
        images,
        is_compilation,

        frame_ids: tag.frames().map(|f| f.id().to_string()).collect(),
    }
}

fn image_of(p: &Picture) -> Image {
    Image {
        type_code: u8::from(p.picture_type),
        description: Some(p.description.clone()).filter(|d| !d.is_empty()),
    }
}

/// Get a best-effort string value from a frame id.
fn text_frame(tag: &Tag, id: &str) -> Option<String> {
    let frame = tag.get(id)?;
    match frame.content() {
        Content::Text(s) => Some(s.clone()),
        _ => None,
    }
}
