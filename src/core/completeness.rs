//! core/completeness.rs
//! Decide whether a file's tags are complete enough to go into the library.
//!
//! Every check runs; nothing short-circuits. The verdict lists one `Defect`
//! per failing check, in check order.

use super::types::{CompletenessVerdict, Defect, REPLAY_GAIN_FRAME, TrackMetadata, Warning};

pub fn evaluate(decode_ok: bool, meta: &TrackMetadata) -> CompletenessVerdict {
    let mut defects = Vec::new();

    if !decode_ok {
        defects.push(Defect::Undecodable);
    }

    if meta.title.is_none() {
        defects.push(Defect::MissingTitle);
    }
    if meta.artist.is_none() {
        defects.push(Defect::MissingArtist);
    }
    if meta.album.is_none() {
        defects.push(Defect::MissingAlbum);
    }
    if meta.date.is_none() {
        defects.push(Defect::MissingDate);
    }

    // Only "number missing, total present" is a component error.
    // A number without a total is accepted.
    match (meta.disc_number, meta.disc_total) {
        (None, None) => defects.push(Defect::MissingDiscNumber),
        (None, Some(_)) => defects.push(Defect::DiscNumberComponent),
        _ => {}
    }

    match (meta.track_number, meta.track_total) {
        (None, None) => defects.push(Defect::MissingTrackNumberAndTotal),
        (number, total) => {
            if number.is_none() {
                defects.push(Defect::MissingTrackNumber);
            }
            if total.is_none() {
                defects.push(Defect::MissingTrackTotal);
            }
        }
    }

    if meta.grouping.is_none() {
        defects.push(Defect::MissingGrouping);
    }

    if meta.images.is_empty() {
        defects.push(Defect::MissingImages);
    }
    if meta.images.len() > 1 && meta.images.iter().filter(|i| i.is_cover()).count() > 1 {
        defects.push(Defect::AmbiguousCover);
    }

    let mut warnings = Vec::new();
    if meta.has_frame(REPLAY_GAIN_FRAME) {
        warnings.push(Warning::ReplayGainPresent);
    }

    CompletenessVerdict { defects, warnings }
}
