//! core/tags/pictures.rs
//! Picture frames exactly as they sit in the file.
//!
//! `id3::Tag` keeps one APIC per picture type, so a file with two front covers
//! reads back as having one. Cover checks need the real count, so this walks
//! the ID3v2 frame headers itself and decodes every APIC (v2.2: PIC) body it
//! meets, in file order.
//!
//! Anything it cannot follow (compressed or encrypted picture frames, unknown
//! versions, truncated blocks) gives `None`, and callers fall back to what the
//! `id3` reader saw.

use std::borrow::Cow;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use id3::frame::{Picture, PictureType};
use id3::Tag;
use tracing::debug;

const HEADER_LEN: usize = 10;

// Tag header flags.
const TAG_UNSYNCHRONISATION: u8 = 0x80;
const TAG_EXTENDED_HEADER: u8 = 0x40;

// v2.3 frame flags.
const V3_COMPRESSION: u16 = 0x0080;
const V3_ENCRYPTION: u16 = 0x0040;
const V3_GROUPING: u16 = 0x0020;

// v2.4 frame flags.
const V4_GROUPING: u16 = 0x0040;
const V4_COMPRESSION: u16 = 0x0008;
const V4_ENCRYPTION: u16 = 0x0004;
const V4_UNSYNCHRONISATION: u16 = 0x0002;
const V4_DATA_LENGTH: u16 = 0x0001;

/// Every picture in the leading ID3v2 tag of `path`, duplicates included.
///
/// `Some(vec![])` for a file without an ID3v2 tag.
pub fn read_pictures(path: &Path) -> Option<Vec<Picture>> {
    match read_tag_block(path) {
        Ok(block) => {
            let pictures = pictures_in_tag(&block);
            if pictures.is_none() {
                debug!(path = %path.display(), "picture frames could not be walked");
            }
            pictures
        }
        Err(e) => {
            debug!(path = %path.display(), "reading tag block: {e}");
            None
        }
    }
}

/// Pictures of `path` as stored, or the ones `tag` kept when the raw walk
/// fails or somehow sees fewer.
pub(crate) fn pictures_or_tag(path: &Path, tag: &Tag) -> Vec<Picture> {
    let kept = tag.pictures().count();
    match read_pictures(path) {
        Some(pictures) if pictures.len() >= kept => pictures,
        _ => tag.pictures().cloned().collect(),
    }
}

/// Header plus body of the leading ID3v2 tag, or whatever the file starts with
/// when there is none.
fn read_tag_block(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;

    let mut header = [0u8; HEADER_LEN];
    let got = file.read(&mut header)?;
    if got < HEADER_LEN || &header[..3] != b"ID3" {
        return Ok(header[..got].to_vec());
    }

    let size = syncsafe(&header[6..10]) as usize;
    let mut block = header.to_vec();
    file.take(size as u64).read_to_end(&mut block)?;
    Ok(block)
}

/// Walk one ID3v2 tag (header included).
pub(crate) fn pictures_in_tag(block: &[u8]) -> Option<Vec<Picture>> {
    if block.len() < HEADER_LEN || &block[..3] != b"ID3" {
        return Some(Vec::new());
    }

    let major = block[3];
    let flags = block[5];
    let size = syncsafe(&block[6..10]) as usize;
    let body = block.get(HEADER_LEN..HEADER_LEN + size)?;

    // Before v2.4 unsynchronisation covers the whole tag body.
    let body: Cow<[u8]> = if major < 4 && flags & TAG_UNSYNCHRONISATION != 0 {
        Cow::Owned(resync(body))
    } else {
        Cow::Borrowed(body)
    };

    match major {
        2 => walk_v22(&body),
        3 | 4 => {
            let start = if flags & TAG_EXTENDED_HEADER != 0 {
                extended_header_len(&body, major)?
            } else {
                0
            };
            walk_v23_v24(body.get(start..)?, major, flags & TAG_UNSYNCHRONISATION != 0)
        }
        _ => None,
    }
}

fn extended_header_len(body: &[u8], major: u8) -> Option<usize> {
    let raw = body.get(..4)?;
    if major == 4 {
        // v2.4 counts the size field itself.
        Some(syncsafe(raw) as usize)
    } else {
        Some(4 + u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
    }
}

fn walk_v22(frames: &[u8]) -> Option<Vec<Picture>> {
    let mut out = Vec::new();
    let mut pos = 0;

    while pos + 6 <= frames.len() {
        let head = &frames[pos..pos + 6];
        if head[0] == 0 {
            break; // padding
        }
        let size = u32::from_be_bytes([0, head[3], head[4], head[5]]) as usize;
        let content = frames.get(pos + 6..pos + 6 + size)?;
        pos += 6 + size;

        if &head[..3] == b"PIC" {
            out.push(parse_pic(content)?);
        }
    }

    Some(out)
}

fn walk_v23_v24(frames: &[u8], major: u8, tag_unsync: bool) -> Option<Vec<Picture>> {
    let mut out = Vec::new();
    let mut pos = 0;

    while pos + HEADER_LEN <= frames.len() {
        let head = &frames[pos..pos + HEADER_LEN];
        if head[0] == 0 {
            break; // padding
        }
        let size = if major == 4 {
            syncsafe(&head[4..8])
        } else {
            u32::from_be_bytes([head[4], head[5], head[6], head[7]])
        } as usize;
        let flags = u16::from_be_bytes([head[8], head[9]]);
        let content = frames.get(pos + HEADER_LEN..pos + HEADER_LEN + size)?;
        pos += HEADER_LEN + size;

        if &head[..4] != b"APIC" {
            continue;
        }

        let body: Cow<[u8]> = if major == 4 {
            if flags & (V4_COMPRESSION | V4_ENCRYPTION) != 0 {
                return None;
            }
            let mut skip = 0;
            if flags & V4_GROUPING != 0 {
                skip += 1;
            }
            if flags & V4_DATA_LENGTH != 0 {
                skip += 4;
            }
            let rest = content.get(skip..)?;
            if tag_unsync || flags & V4_UNSYNCHRONISATION != 0 {
                Cow::Owned(resync(rest))
            } else {
                Cow::Borrowed(rest)
            }
        } else {
            if flags & (V3_COMPRESSION | V3_ENCRYPTION) != 0 {
                return None;
            }
            let skip = if flags & V3_GROUPING != 0 { 1 } else { 0 };
            Cow::Borrowed(content.get(skip..)?)
        };

        out.push(parse_apic(&body)?);
    }

    Some(out)
}

/// `encoding, mime\0, type, description\0, data`
fn parse_apic(body: &[u8]) -> Option<Picture> {
    let (&encoding, rest) = body.split_first()?;
    let (mime, rest) = split_terminated(rest, 1)?;
    let (&kind, rest) = rest.split_first()?;
    let (description, data) = split_terminated(rest, terminator_width(encoding)?)?;

    Some(Picture {
        mime_type: latin1(mime),
        picture_type: picture_type(kind),
        description: decode_text(encoding, description)?,
        data: data.to_vec(),
    })
}

/// `encoding, format[3], type, description\0, data`
fn parse_pic(body: &[u8]) -> Option<Picture> {
    let (&encoding, rest) = body.split_first()?;
    let format = rest.get(..3)?;
    let (&kind, rest) = rest.get(3..)?.split_first()?;
    let (description, data) = split_terminated(rest, terminator_width(encoding)?)?;

    let mime_type = match format {
        b"PNG" => "image/png".to_string(),
        b"JPG" => "image/jpeg".to_string(),
        other => format!("image/{}", latin1(other).to_lowercase()),
    };

    Some(Picture {
        mime_type,
        picture_type: picture_type(kind),
        description: decode_text(encoding, description)?,
        data: data.to_vec(),
    })
}

fn terminator_width(encoding: u8) -> Option<usize> {
    match encoding {
        0 | 3 => Some(1),
        1 | 2 => Some(2),
        _ => None,
    }
}

/// Split at the first NUL (or aligned NUL pair), dropping the terminator.
fn split_terminated(bytes: &[u8], width: usize) -> Option<(&[u8], &[u8])> {
    let end = if width == 1 {
        bytes.iter().position(|&b| b == 0)?
    } else {
        bytes
            .chunks_exact(2)
            .position(|pair| pair == [0, 0])?
            * 2
    };
    Some((&bytes[..end], &bytes[end + width..]))
}

fn decode_text(encoding: u8, bytes: &[u8]) -> Option<String> {
    match encoding {
        0 => Some(latin1(bytes)),
        1 => match bytes {
            [] => Some(String::new()),
            [0xFF, 0xFE, rest @ ..] => utf16(rest, u16::from_le_bytes),
            [0xFE, 0xFF, rest @ ..] => utf16(rest, u16::from_be_bytes),
            _ => utf16(bytes, u16::from_be_bytes),
        },
        2 => utf16(bytes, u16::from_be_bytes),
        3 => String::from_utf8(bytes.to_vec()).ok(),
        _ => None,
    }
}

fn utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn picture_type(code: u8) -> PictureType {
    match code {
        0 => PictureType::Other,
        1 => PictureType::Icon,
        2 => PictureType::OtherIcon,
        3 => PictureType::CoverFront,
        4 => PictureType::CoverBack,
        5 => PictureType::Leaflet,
        6 => PictureType::Media,
        7 => PictureType::LeadArtist,
        8 => PictureType::Artist,
        9 => PictureType::Conductor,
        10 => PictureType::Band,
        11 => PictureType::Composer,
        12 => PictureType::Lyricist,
        13 => PictureType::RecordingLocation,
        14 => PictureType::DuringRecording,
        15 => PictureType::DuringPerformance,
        16 => PictureType::ScreenCapture,
        17 => PictureType::BrightFish,
        18 => PictureType::Illustration,
        19 => PictureType::BandLogo,
        20 => PictureType::PublisherLogo,
        b => PictureType::Undefined(b),
    }
}

fn syncsafe(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .fold(0u32, |acc, &b| (acc << 7) | u32::from(b & 0x7F))
}

/// Undo unsynchronisation: every `FF 00` becomes `FF`.
fn resync(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut prev_ff = false;
    for &b in bytes {
        if prev_ff && b == 0 {
            prev_ff = false;
            continue;
        }
        out.push(b);
        prev_ff = b == 0xFF;
    }
    out
}
