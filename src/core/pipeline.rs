//! core/pipeline.rs
//! One file, start to finish.
//!
//! Received -> decode-checked -> tags read -> evaluated -> staged
//!   -> rejected (stop)
//!   -> cleaned -> located -> moved into the library
//!
//! Every file is first moved into the staging directory as
//! `{fragment}.{token}.mp3`, with a `{fragment}.{token}.txt` log next to it
//! (a long fragment is cut short so the name still fits on disk).
//! Only a file that makes it into the library leaves staging; its log is
//! removed if nothing was written to it.

use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::completeness::evaluate;
use super::decode::DecodeCheck;
use super::error::{Error, Result};
use super::library::{DirMatch, list_names, reconcile};
use super::naming::DerivedName;
use super::tags::{clean_for_library, read_track_metadata};
use super::types::{Defect, REPLAY_GAIN_FRAME};
use crate::config::Config;

/// Where a file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Moved into the library. `log` is kept only if something was noted.
    Placed { path: PathBuf, log: Option<PathBuf> },
    /// Tags incomplete; left in staging with the defects logged.
    Rejected {
        staged: PathBuf,
        log: PathBuf,
        defects: Vec<Defect>,
    },
    /// Tags fine, but no library spot for it; left in staging.
    Unplaced {
        staged: PathBuf,
        log: PathBuf,
        reason: Unplaced,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unplaced {
    /// A directory on the way differs only by case/article from an existing one.
    DirectoryMismatch { parent: PathBuf, requested: String },
    /// A directory name that would escape its parent ("." or "..").
    UnusableName { parent: PathBuf, requested: String },
    /// The album directory already holds this track number.
    TrackExists { dir: PathBuf },
    /// The library file name would be longer than the filesystem allows.
    NameTooLong { dir: PathBuf },
}

impl Display for Unplaced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unplaced::DirectoryMismatch { parent, requested } => {
                write!(f, "\"{requested}\" clashes with an existing entry in {}", parent.display())
            }
            Unplaced::UnusableName { parent, requested } => {
                write!(f, "\"{requested}\" cannot be a directory in {}", parent.display())
            }
            Unplaced::TrackExists { dir } => write!(f, "track number already present in {}", dir.display()),
            Unplaced::NameTooLong { dir } => write!(f, "file name too long for {}", dir.display()),
        }
    }
}

/// Most filesystems stop at 255 bytes per name.
const MAX_NAME_BYTES: usize = 255;

/// Fragment budget in a staging name; the rest is `.{token}.txt`.
const MAX_FRAGMENT_BYTES: usize = 200;

/// Per-run source of unique staging tokens.
#[derive(Debug)]
pub struct RunId {
    prefix: String,
    seq: u32,
}

impl RunId {
    pub fn new() -> Self {
        let mut prefix = Uuid::new_v4().simple().to_string();
        prefix.truncate(8);
        Self { prefix, seq: 0 }
    }

    fn next_token(&mut self) -> String {
        self.seq += 1;
        format!("{}-{}", self.prefix, self.seq)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain-text log kept beside a staged file.
struct FileLog {
    path: PathBuf,
    file: File,
    entries: usize,
}

impl FileLog {
    fn create(path: PathBuf) -> Result<Self> {
        let file = File::create(&path).map_err(Error::io("creating log", &path))?;
        Ok(Self {
            path,
            file,
            entries: 0,
        })
    }

    fn entry(&mut self, line: impl Display) -> Result<()> {
        writeln!(self.file, "{line}").map_err(Error::io("writing log", &self.path))?;
        self.entries += 1;
        Ok(())
    }

    /// Flush; delete the file if it is empty. Returns the path if kept.
    fn finish(mut self) -> Result<Option<PathBuf>> {
        self.file
            .flush()
            .map_err(Error::io("writing log", &self.path))?;
        drop(self.file);

        if self.entries == 0 {
            fs::remove_file(&self.path).map_err(Error::io("removing log", &self.path))?;
            Ok(None)
        } else {
            Ok(Some(self.path))
        }
    }

    /// For outcomes that always keep the log.
    fn keep(self) -> Result<PathBuf> {
        let path = self.path.clone();
        self.finish()?;
        Ok(path)
    }
}

/// Runs files through the pipeline, one at a time.
pub struct Shelver<'a> {
    config: &'a Config,
    decoder: &'a dyn DecodeCheck,
    run: RunId,
}

impl<'a> Shelver<'a> {
    pub fn new(config: &'a Config, decoder: &'a dyn DecodeCheck) -> Self {
        Self {
            config,
            decoder,
            run: RunId::new(),
        }
    }

    pub fn process_file(&mut self, input: &Path) -> Result<Outcome> {
        debug!(path = %input.display(), "received");

        let decode_ok = self.decoder.decodes_cleanly(input)?;
        debug!(path = %input.display(), decode_ok, "decode checked");

        let (meta, tag_failed) = read_track_metadata(input.to_path_buf());
        debug!(path = %input.display(), tag_failed, "tags read");

        let verdict = evaluate(decode_ok, &meta);
        let name = DerivedName::from_metadata(&meta);
        debug!(path = %input.display(), passed = verdict.passed(), "evaluated");

        let token = self.run.next_token();
        let stem = staging_stem(&name.fragment);
        let staged = self.config.music_stage.join(format!("{stem}.{token}.mp3"));
        let mut log = FileLog::create(self.config.music_stage.join(format!("{stem}.{token}.txt")))?;

        if tag_failed {
            log.entry("could not read ID3v2 tag")?;
        }

        move_file(input, &staged)?;
        debug!(from = %input.display(), to = %staged.display(), "staged");

        if !verdict.passed() {
            for defect in &verdict.defects {
                log.entry(defect)?;
            }
            for warning in &verdict.warnings {
                log.entry(warning)?;
            }
            let log = log.keep()?;
            warn!(
                path = %input.display(),
                staged = %staged.display(),
                defects = verdict.defects.len(),
                "rejected"
            );
            return Ok(Outcome::Rejected {
                staged,
                log,
                defects: verdict.defects,
            });
        }

        let report = clean_for_library(&staged)?;
        if report.removed_replay_gain_frames > 0 {
            log.entry(format!("removed {REPLAY_GAIN_FRAME} tag"))?;
        }
        debug!(path = %staged.display(), ?report, "cleaned");

        let dir = match self.locate(&name, &mut log)? {
            Ok(dir) => dir,
            Err(reason) => {
                let log = log.keep()?;
                warn!(path = %input.display(), staged = %staged.display(), "not placed: {reason}");
                return Ok(Outcome::Unplaced {
                    staged,
                    log,
                    reason,
                });
            }
        };
        debug!(path = %staged.display(), dir = %dir.display(), "located");

        let prefix = name.track_prefix();
        if list_names(&dir)?.iter().any(|n| n.starts_with(&prefix)) {
            log.entry("this track ID already exists")?;
            let log = log.keep()?;
            let reason = Unplaced::TrackExists { dir };
            warn!(path = %input.display(), staged = %staged.display(), "not placed: {reason}");
            return Ok(Outcome::Unplaced {
                staged,
                log,
                reason,
            });
        }

        let leaf = name.leaf_name();
        if leaf.len() > MAX_NAME_BYTES {
            log.entry(format!("file name is {} bytes, the limit is {MAX_NAME_BYTES}", leaf.len()))?;
            let log = log.keep()?;
            let reason = Unplaced::NameTooLong { dir };
            warn!(path = %input.display(), staged = %staged.display(), "not placed: {reason}");
            return Ok(Outcome::Unplaced {
                staged,
                log,
                reason,
            });
        }

        let dest = dir.join(leaf);
        move_file(&staged, &dest)?;
        let log = log.finish()?;
        info!(from = %input.display(), to = %dest.display(), "placed");

        Ok(Outcome::Placed { path: dest, log })
    }

    /// Walk root -> artist|compilations -> album [-> disc], finding or creating each level.
    fn locate(
        &self,
        name: &DerivedName,
        log: &mut FileLog,
    ) -> Result<std::result::Result<PathBuf, Unplaced>> {
        let top = if name.is_compilation {
            self.config.comp_dir.clone()
        } else {
            name.artist.clone()
        };

        let mut segments = vec![top, name.album.clone()];
        if name.is_multidisc {
            segments.push(name.disc_dir());
        }

        let mut dir = self.config.music_root.clone();
        for segment in segments {
            match reconcile(&dir, &segment)? {
                DirMatch::Existing(path) | DirMatch::Created(path) => dir = path,
                DirMatch::Mismatch { requested, similar } => {
                    log.entry(format!(
                        "directory mismatch in {}: wanted \"{requested}\", found \"{}\"",
                        dir.display(),
                        similar.join("\", \"")
                    ))?;
                    return Ok(Err(Unplaced::DirectoryMismatch {
                        parent: dir,
                        requested,
                    }));
                }
                DirMatch::Unusable { requested } => {
                    log.entry(format!("cannot file under \"{requested}\" in {}", dir.display()))?;
                    return Ok(Err(Unplaced::UnusableName {
                        parent: dir,
                        requested,
                    }));
                }
            }
        }

        Ok(Ok(dir))
    }
}

/// `fragment` cut to `MAX_FRAGMENT_BYTES` on a char boundary.
fn staging_stem(fragment: &str) -> &str {
    if fragment.len() <= MAX_FRAGMENT_BYTES {
        return fragment;
    }
    let mut end = MAX_FRAGMENT_BYTES;
    while !fragment.is_char_boundary(end) {
        end -= 1;
    }
    &fragment[..end]
}

/// Rename, falling back to copy + delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to).map_err(Error::io("copying", to))?;
            fs::remove_file(from).map_err(Error::io("removing", from))
        }
        Err(e) => Err(Error::io("moving", from)(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use id3::frame::{Content, Picture, PictureType, Unknown};
    use id3::Frame;
    use id3::{Tag, TagLike, Version};
    use tempfile::TempDir;

    struct Decodes(bool);

    impl DecodeCheck for Decodes {
        fn decodes_cleanly(&self, _path: &Path) -> Result<bool> {
            Ok(self.0)
        }
    }

    struct Fixture {
        _tmp: TempDir,
        inbox: PathBuf,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let inbox = tmp.path().join("inbox");
            let root = tmp.path().join("music");
            let stage = tmp.path().join("stage");
            for d in [&inbox, &root, &stage] {
                fs::create_dir(d).unwrap();
            }
            Self {
                _tmp: tmp,
                inbox,
                config: Config {
                    music_root: root,
                    comp_dir: "Compilations".into(),
                    music_stage: stage,
                    decode_cmd: None,
                },
            }
        }

        /// Placeholder audio with a v2.4 tag and a trailing v1 block.
        fn track(&self, file: &str, tag: &Tag) -> PathBuf {
            let path = self.inbox.join(file);
            let mut bytes = vec![0u8; 256];
            bytes.extend(b"TAG");
            bytes.extend([0u8; 125]);
            fs::write(&path, bytes).unwrap();
            tag.write_to_path(&path, Version::Id3v24).unwrap();
            path
        }

        fn root(&self) -> &Path {
            &self.config.music_root
        }

        fn stage_names(&self) -> Vec<String> {
            list_names(&self.config.music_stage).unwrap()
        }
    }

    fn cover() -> Picture {
        Picture {
            mime_type: "image/jpeg".to_string(),
            picture_type: PictureType::CoverFront,
            description: String::new(),
            data: vec![0xFF, 0xD8, 0xFF, 0xE0],
        }
    }

    fn full_tag() -> Tag {
        let mut tag = Tag::new();
        tag.set_title("Devil's Haircut");
        tag.set_artist("Beck");
        tag.set_album("Odelay");
        tag.set_text("TDRC", "1996");
        tag.set_text("TPOS", "1/1");
        tag.set_text("TRCK", "2/12");
        tag.set_text("TIT1", "Alternative");
        let _ = tag.add_frame(cover());
        tag
    }

    #[test]
    fn complete_file_is_placed_without_log() {
        let fx = Fixture::new();
        let input = fx.track("in.mp3", &full_tag());

        let decoder = Decodes(true);
        let mut shelver = Shelver::new(&fx.config, &decoder);
        let outcome = shelver.process_file(&input).unwrap();

        let expected = fx.root().join("Beck/Odelay/02 - Devil's Haircut.mp3");
        assert_eq!(
            outcome,
            Outcome::Placed {
                path: expected.clone(),
                log: None
            }
        );
        assert!(expected.is_file());
        assert!(!input.exists());
        assert!(fx.stage_names().is_empty());

        let tag = Tag::read_from_path(&expected).unwrap();
        assert_eq!(tag.version(), Version::Id3v23);
        assert_eq!(tag.pictures().next().unwrap().description, " ");
        let bytes = fs::read(&expected).unwrap();
        assert_ne!(&bytes[bytes.len() - 128..bytes.len() - 125], b"TAG");
    }

    #[test]
    fn missing_artist_and_images_is_rejected() {
        let fx = Fixture::new();
        let mut tag = full_tag();
        tag.remove_artist();
        tag.remove_all_pictures();
        let input = fx.track("in.mp3", &tag);

        let decoder = Decodes(true);
        let mut shelver = Shelver::new(&fx.config, &decoder);
        let outcome = shelver.process_file(&input).unwrap();

        let Outcome::Rejected {
            staged,
            log,
            defects,
        } = outcome
        else {
            panic!("expected rejection, got {outcome:?}");
        };
        assert_eq!(defects, vec![Defect::MissingArtist, Defect::MissingImages]);
        assert!(staged.is_file());
        assert!(staged.starts_with(&fx.config.music_stage));
        let staged_name = staged.file_name().unwrap().to_string_lossy().into_owned();
        assert!(staged_name.starts_with(" - Odelay - 02 - Devil's Haircut."));
        assert!(staged_name.ends_with(".mp3"));

        assert_eq!(log.extension().unwrap(), "txt");
        let text = fs::read_to_string(&log).unwrap();
        assert_eq!(text, "missing ARTIST\nmissing images\n");

        assert!(list_names(fx.root()).unwrap().is_empty());
    }

    #[test]
    fn undecodable_file_is_rejected() {
        let fx = Fixture::new();
        let input = fx.track("in.mp3", &full_tag());

        let decoder = Decodes(false);
        let mut shelver = Shelver::new(&fx.config, &decoder);
        let outcome = shelver.process_file(&input).unwrap();

        assert!(matches!(
            outcome,
            Outcome::Rejected { ref defects, .. } if defects == &vec![Defect::Undecodable]
        ));
    }

    #[test]
    fn untagged_file_is_rejected_with_note() {
        let fx = Fixture::new();
        let input = fx.inbox.join("bare.mp3");
        fs::write(&input, [0u8; 64]).unwrap();

        let decoder = Decodes(true);
        let mut shelver = Shelver::new(&fx.config, &decoder);
        let Outcome::Rejected { log, .. } = shelver.process_file(&input).unwrap() else {
            panic!("expected rejection");
        };
        let text = fs::read_to_string(log).unwrap();
        assert!(text.starts_with("could not read ID3v2 tag\nmissing TITLE\n"));
    }

    #[test]
    fn compilation_on_second_disc() {
        let fx = Fixture::new();
        let mut tag = full_tag();
        tag.set_title("Track");
        tag.set_artist("DJ X");
        tag.set_album("Mix");
        tag.set_text("TPOS", "2/2");
        tag.set_text("TRCK", "5/9");
        tag.set_text("TCMP", "1");
        let input = fx.track("in.mp3", &tag);

        let decoder = Decodes(true);
        let mut shelver = Shelver::new(&fx.config, &decoder);
        let outcome = shelver.process_file(&input).unwrap();

        let expected = fx.root().join("Compilations/Mix/Disc 2/05 - Track (DJ X).mp3");
        assert_eq!(
            outcome,
            Outcome::Placed {
                path: expected.clone(),
                log: None
            }
        );
        assert!(expected.is_file());
    }

    #[test]
    fn replay_gain_removal_keeps_log() {
        let fx = Fixture::new();
        let mut tag = full_tag();
        let _ = tag.add_frame(Frame::with_content(
            "RGAD",
            Content::Unknown(Unknown {
                data: vec![0; 8],
                version: Version::Id3v24,
            }),
        ));
        let input = fx.track("in.mp3", &tag);

        let decoder = Decodes(true);
        let mut shelver = Shelver::new(&fx.config, &decoder);
        let Outcome::Placed { path, log } = shelver.process_file(&input).unwrap() else {
            panic!("expected placement");
        };

        let log = log.expect("log kept");
        assert_eq!(fs::read_to_string(log).unwrap(), "removed RGAD tag\n");
        assert!(Tag::read_from_path(&path).unwrap().get("RGAD").is_none());
    }

    #[test]
    fn article_mismatch_leaves_file_in_staging() {
        let fx = Fixture::new();
        fs::create_dir(fx.root().join("The Beck")).unwrap();
        let input = fx.track("in.mp3", &full_tag());

        let decoder = Decodes(true);
        let mut shelver = Shelver::new(&fx.config, &decoder);
        let outcome = shelver.process_file(&input).unwrap();

        let Outcome::Unplaced {
            staged,
            log,
            reason,
        } = outcome
        else {
            panic!("expected unplaced, got {outcome:?}");
        };
        assert_eq!(
            reason,
            Unplaced::DirectoryMismatch {
                parent: fx.root().to_path_buf(),
                requested: "Beck".into()
            }
        );
        assert!(staged.is_file());
        assert!(fs::read_to_string(log).unwrap().contains("directory mismatch"));
        assert_eq!(list_names(fx.root()).unwrap(), vec!["The Beck"]);
    }

    #[test]
    fn existing_track_number_is_not_overwritten() {
        let fx = Fixture::new();
        let album = fx.root().join("Beck/Odelay");
        fs::create_dir_all(&album).unwrap();
        fs::write(album.join("02 - Devils Haircut.mp3"), b"old").unwrap();
        let input = fx.track("in.mp3", &full_tag());

        let decoder = Decodes(true);
        let mut shelver = Shelver::new(&fx.config, &decoder);
        let outcome = shelver.process_file(&input).unwrap();

        let Outcome::Unplaced { staged, log, reason } = outcome else {
            panic!("expected unplaced, got {outcome:?}");
        };
        assert_eq!(reason, Unplaced::TrackExists { dir: album.clone() });
        assert!(staged.is_file());
        assert_eq!(fs::read_to_string(log).unwrap(), "this track ID already exists\n");
        assert_eq!(list_names(&album).unwrap(), vec!["02 - Devils Haircut.mp3"]);
    }

    #[test]
    fn second_track_joins_existing_album() {
        let fx = Fixture::new();
        let decoder = Decodes(true);
        let mut shelver = Shelver::new(&fx.config, &decoder);

        let first = fx.track("a.mp3", &full_tag());
        shelver.process_file(&first).unwrap();

        let mut tag = full_tag();
        tag.set_title("Hotwax");
        tag.set_text("TRCK", "3/12");
        let second = fx.track("b.mp3", &tag);
        let outcome = shelver.process_file(&second).unwrap();

        assert!(matches!(outcome, Outcome::Placed { .. }));
        assert_eq!(
            list_names(&fx.root().join("Beck/Odelay")).unwrap(),
            vec!["02 - Devil's Haircut.mp3", "03 - Hotwax.mp3"]
        );
    }

    #[test]
    fn staging_tokens_are_unique_within_a_run() {
        let mut run = RunId::new();
        let a = run.next_token();
        let b = run.next_token();
        assert_ne!(a, b);
        assert!(a.ends_with("-1"));
        assert_eq!(a.len(), 10);
    }

    #[test]
    fn two_front_covers_are_rejected() {
        let fx = Fixture::new();
        let mut tag = full_tag();
        let mut second = cover();
        second.description = "alternate".into();
        // add_frame would replace the first cover; the file must hold both.
        tag.extend([Frame::from(second)]);
        let input = fx.track("in.mp3", &tag);

        let decoder = Decodes(true);
        let mut shelver = Shelver::new(&fx.config, &decoder);
        let Outcome::Rejected { staged, log, defects } = shelver.process_file(&input).unwrap() else {
            panic!("expected rejection");
        };

        assert_eq!(defects, vec![Defect::AmbiguousCover]);
        assert_eq!(
            fs::read_to_string(log).unwrap(),
            "there is not exactly one cover image\n"
        );
        assert!(staged.is_file());
        assert!(list_names(fx.root()).unwrap().is_empty());
    }

    #[test]
    fn dot_dot_album_is_not_placed() {
        let fx = Fixture::new();
        let mut tag = full_tag();
        tag.set_album("..");
        let input = fx.track("in.mp3", &tag);

        let decoder = Decodes(true);
        let mut shelver = Shelver::new(&fx.config, &decoder);
        let outcome = shelver.process_file(&input).unwrap();

        let Outcome::Unplaced { staged, reason, .. } = outcome else {
            panic!("expected unplaced, got {outcome:?}");
        };
        assert_eq!(
            reason,
            Unplaced::UnusableName {
                parent: fx.root().join("Beck"),
                requested: "..".into()
            }
        );
        assert!(staged.is_file());
        assert_eq!(list_names(fx.root()).unwrap(), vec!["Beck"]);
        assert!(list_names(&fx.root().join("Beck")).unwrap().is_empty());
    }

    #[test]
    fn long_title_is_rejected_not_fatal() {
        let fx = Fixture::new();
        let mut tag = full_tag();
        tag.remove_artist();
        tag.set_title("é".repeat(200));
        let input = fx.track("in.mp3", &tag);

        let decoder = Decodes(true);
        let mut shelver = Shelver::new(&fx.config, &decoder);
        let Outcome::Rejected { staged, log, .. } = shelver.process_file(&input).unwrap() else {
            panic!("expected rejection");
        };

        assert!(staged.is_file());
        assert!(log.is_file());
        for path in [&staged, &log] {
            assert!(path.file_name().unwrap().len() <= MAX_NAME_BYTES);
        }
    }

    #[test]
    fn long_title_that_passes_stays_in_staging() {
        let fx = Fixture::new();
        let mut tag = full_tag();
        tag.set_title("x".repeat(300));
        let input = fx.track("in.mp3", &tag);

        let decoder = Decodes(true);
        let mut shelver = Shelver::new(&fx.config, &decoder);
        let outcome = shelver.process_file(&input).unwrap();

        let Outcome::Unplaced { staged, reason, .. } = outcome else {
            panic!("expected unplaced, got {outcome:?}");
        };
        assert_eq!(
            reason,
            Unplaced::NameTooLong {
                dir: fx.root().join("Beck/Odelay")
            }
        );
        assert!(staged.is_file());
    }

    #[test]
    fn staging_stem_cuts_on_char_boundary() {
        let fragment = "é".repeat(150);
        let stem = staging_stem(&fragment);
        assert_eq!(stem.len(), MAX_FRAGMENT_BYTES);
        assert_eq!(staging_stem("short"), "short");

        let odd = format!("a{}", "é".repeat(150));
        assert_eq!(staging_stem(&odd).len(), MAX_FRAGMENT_BYTES - 1);
    }
}
