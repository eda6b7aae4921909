//! core/tags/write.rs
//! Normalise the tag of a file that is about to go into the library.

use std::path::Path;

use id3::frame::{Frame, Picture};
use id3::{Tag, TagLike, Version};

use super::super::error::{Error, Result};
use super::super::types::REPLAY_GAIN_FRAME;
use super::pictures::pictures_or_tag;

/// Play counter. Players bump it silently; it has no business in the library copy.
pub const USAGE_TRACKING_FRAME: &str = "PCNT";

/// Players that choke on an empty APIC description accept a single space.
pub const PLACEHOLDER_DESCRIPTION: &str = " ";

/// What `clean_for_library` changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub removed_v1: bool,
    pub removed_usage_frames: usize,
    pub removed_replay_gain_frames: usize,
    pub filled_descriptions: usize,
}

/// Strip the ID3v1 block, drop PCNT and RGAD frames, give every picture a
/// description and save as ID3v2.3.
pub fn clean_for_library(path: &Path) -> Result<CleanReport> {
    let mut tag = Tag::read_from_path(path).map_err(|source| Error::TagRead {
        path: path.to_path_buf(),
        source,
    })?;

    let pictures = pictures_or_tag(path, &tag);
    let mut report = clean_tag(&mut tag, pictures);

    tag.write_to_path(path, Version::Id3v23)
        .map_err(|source| Error::TagWrite {
            path: path.to_path_buf(),
            source,
        })?;

    report.removed_v1 = id3::v1::Tag::remove_from_path(path).map_err(|source| Error::TagWrite {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(report)
}

/// In-memory part of the cleanup. `pictures` replaces every picture in `tag`;
/// pass them in file order so duplicates of one picture type survive.
pub(crate) fn clean_tag(tag: &mut Tag, pictures: Vec<Picture>) -> CleanReport {
    let removed_usage_frames = tag.remove(USAGE_TRACKING_FRAME).len();
    let removed_replay_gain_frames = tag.remove(REPLAY_GAIN_FRAME).len();

    let mut filled_descriptions = 0;
    tag.remove_all_pictures();
    // add_frame would replace an earlier picture of the same type.
    tag.extend(pictures.into_iter().map(|mut p| {
        if p.description.is_empty() {
            p.description = PLACEHOLDER_DESCRIPTION.to_string();
            filled_descriptions += 1;
        }
        Frame::from(p)
    }));

    CleanReport {
        removed_v1: false,
        removed_usage_frames,
        removed_replay_gain_frames,
        filled_descriptions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use id3::frame::PictureType;
    use std::fs;
    use tempfile::TempDir;

    fn cover(description: &str) -> Picture {
        Picture {
            mime_type: "image/png".to_string(),
            picture_type: PictureType::CoverFront,
            description: description.to_string(),
            data: vec![0x89, 0x50, 0x4E, 0x47],
        }
    }

    /// 128-byte ID3v1 block.
    fn v1_block() -> Vec<u8> {
        let mut block = vec![0u8; 128];
        block[..3].copy_from_slice(b"TAG");
        block[3..8].copy_from_slice(b"Title");
        block
    }

    #[test]
    fn empty_picture_description_gets_placeholder() {
        let mut tag = Tag::new();
        let report = clean_tag(&mut tag, vec![cover("")]);

        assert_eq!(report.filled_descriptions, 1);
        let descriptions: Vec<&str> = tag.pictures().map(|p| p.description.as_str()).collect();
        assert_eq!(descriptions, vec![" "]);
    }

    #[test]
    fn described_pictures_are_left_alone() {
        let mut tag = Tag::new();
        let report = clean_tag(&mut tag, vec![cover("front")]);

        assert_eq!(report, CleanReport::default());
        assert_eq!(tag.pictures().next().unwrap().description, "front");
    }

    #[test]
    fn file_is_saved_as_v23_without_v1() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.mp3");

        let mut bytes = vec![0u8; 256];
        bytes.extend(v1_block());
        fs::write(&path, &bytes).unwrap();

        let mut tag = Tag::new();
        tag.set_title("Loser");
        let _ = tag.add_frame(cover(""));
        tag.write_to_path(&path, Version::Id3v24).unwrap();

        let report = clean_for_library(&path).unwrap();
        assert!(report.removed_v1);
        assert_eq!(report.filled_descriptions, 1);

        let reread = Tag::read_from_path(&path).unwrap();
        assert_eq!(reread.version(), Version::Id3v23);
        assert_eq!(reread.title(), Some("Loser"));
        assert_eq!(reread.pictures().next().unwrap().description, " ");

        let on_disk = fs::read(&path).unwrap();
        assert_ne!(&on_disk[on_disk.len() - 128..on_disk.len() - 125], b"TAG");
    }

    #[test]
    fn untagged_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bare.mp3");
        fs::write(&path, [0u8; 32]).unwrap();

        assert!(matches!(clean_for_library(&path), Err(Error::TagRead { .. })));
    }

    #[test]
    fn pictures_of_one_type_are_not_merged() {
        let mut back = cover("");
        back.picture_type = PictureType::CoverBack;
        let mut second_back = cover("liner");
        second_back.picture_type = PictureType::CoverBack;

        let mut tag = Tag::new();
        let report = clean_tag(&mut tag, vec![cover("front"), back, second_back]);

        assert_eq!(report.filled_descriptions, 1);
        let descriptions: Vec<&str> = tag.pictures().map(|p| p.description.as_str()).collect();
        assert_eq!(descriptions, vec!["front", " ", "liner"]);
    }

    #[test]
    fn duplicate_pictures_survive_the_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.mp3");
        fs::write(&path, [0u8; 256]).unwrap();

        let mut back = cover("");
        back.picture_type = PictureType::Media;
        let mut second = cover("");
        second.picture_type = PictureType::Media;

        let mut tag = Tag::new();
        tag.set_title("Loser");
        tag.extend([Frame::from(cover("front")), Frame::from(back), Frame::from(second)]);
        tag.write_to_path(&path, Version::Id3v24).unwrap();

        let report = clean_for_library(&path).unwrap();
        assert_eq!(report.filled_descriptions, 2);

        let on_disk = super::super::pictures::read_pictures(&path).unwrap();
        let seen: Vec<(u8, &str)> = on_disk
            .iter()
            .map(|p| (u8::from(p.picture_type), p.description.as_str()))
            .collect();
        assert_eq!(seen, vec![(3, "front"), (6, " "), (6, " ")]);
    }
}
