//! core/decode.rs
//! Corruption probe: does the whole file decode?
//!
//! Default is an in-process Symphonia decode of every packet. A configured
//! external command (e.g. `mpg123 -t -q`) can replace it; only its exit
//! status is looked at.

use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use super::error::{Error, Result};

pub trait DecodeCheck {
    /// `Ok(false)` means the file is corrupt; `Err` means we could not even try.
    fn decodes_cleanly(&self, path: &Path) -> Result<bool>;
}

/// Decode the default track with Symphonia, discarding the samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaCheck;

impl DecodeCheck for SymphoniaCheck {
    fn decodes_cleanly(&self, path: &Path) -> Result<bool> {
        let file = File::open(path).map_err(Error::io("opening", path))?;
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = match symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        ) {
            Ok(p) => p,
            Err(e) => {
                debug!(path = %path.display(), "format probe failed: {e}");
                return Ok(false);
            }
        };

        let mut format = probed.format;

        let Some(track) = format.default_track() else {
            debug!(path = %path.display(), "no audio track");
            return Ok(false);
        };
        let track_id = track.id;

        let mut decoder = match symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
        {
            Ok(d) => d,
            Err(e) => {
                debug!(path = %path.display(), "decoder init failed: {e}");
                return Ok(false);
            }
        };

        let mut decoded_packets: u64 = 0;
        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                // End of stream.
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => {
                    debug!(path = %path.display(), "read error after {decoded_packets} packets: {e}");
                    return Ok(false);
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(_) => decoded_packets += 1,
                Err(e) => {
                    debug!(path = %path.display(), "decode error after {decoded_packets} packets: {e}");
                    return Ok(false);
                }
            }
        }

        Ok(decoded_packets > 0)
    }
}

/// Run an external decoder with the file path appended.
#[derive(Debug, Clone)]
pub struct CommandCheck {
    program: String,
    args: Vec<String>,
}

impl CommandCheck {
    /// Build from a whitespace-separated command line. `None` if it is blank.
    pub fn from_command_line(cmd: &str) -> Option<Self> {
        let mut words = cmd.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }
}

impl DecodeCheck for CommandCheck {
    fn decodes_cleanly(&self, path: &Path) -> Result<bool> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| Error::Decoder {
                program: self.program.clone(),
                source,
            })?;

        debug!(path = %path.display(), program = %self.program, ?status, "decoder exited");
        Ok(status.success())
    }
}
