//! Audio payload checksum plugin.
//!
//! Tag editors rewrite container metadata (ID3, Vorbis comments, cover art)
//! without touching the encoded audio. This plugin fingerprints the audio
//! stream alone, so a retagged copy of a track still matches the original.
//!
//! The payload digest itself comes from a [`PayloadDigester`]. The default
//! [`FfmpegDigester`] stream-copies the audio through ffmpeg's `md5` muxer.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{Fingerprint, FingerprintError, FingerprintPlugin};
use crate::matching::Classification;

/// Identifier of the media plugin.
pub const MEDIA_PLUGIN_ID: &str = "media_checksum";

/// Executable name used when no ffmpeg path is configured.
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// MD5 of an empty byte stream, produced for files without audio.
pub const EMPTY_PAYLOAD_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// File extensions handled by the media plugin (lowercase).
///
/// Audio formats plus the common containers that carry an audio stream;
/// a container without one yields no payload and is treated as inapplicable.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    // MPEG and AAC family
    "mp3", "mp2", "mpa", "aac", "m4a", "m4b", "m4p", "mp4", "3gp",
    // Ogg and Matroska
    "ogg", "oga", "opus", "spx", "mka", "mkv", "webm",
    // Lossless
    "flac", "wav", "aiff", "aif", "aifc", "wv", "ape", "tta", "alac", "caf", "dsf", "dff",
    // Others
    "wma", "asf", "ac3", "eac3", "dts", "mpc", "amr", "au", "ra",
];

/// Source of audio payload digests.
pub trait PayloadDigester: Send + Sync {
    /// Digest of the audio payload of `path`.
    ///
    /// `Ok(None)` means no payload could be extracted (no audio stream,
    /// decoder failure, digester unavailable).
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file itself cannot be read.
    fn payload_digest(&self, path: &Path) -> io::Result<Option<String>>;

    /// The digest this digester produces for an empty payload.
    fn empty_payload_digest(&self) -> &str {
        EMPTY_PAYLOAD_MD5
    }
}

/// Payload digester backed by an ffmpeg subprocess.
#[derive(Debug)]
pub struct FfmpegDigester {
    program: PathBuf,
    warned_missing: AtomicBool,
}

impl FfmpegDigester {
    /// Digester running the given ffmpeg executable.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            warned_missing: AtomicBool::new(false),
        }
    }

    /// The executable this digester runs.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, path: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-i")
            .arg(path)
            .args([
                "-map",
                "0:a",
                "-codec",
                "copy",
                "-hide_banner",
                "-loglevel",
                "warning",
                "-f",
                "md5",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl Default for FfmpegDigester {
    fn default() -> Self {
        Self::new(DEFAULT_FFMPEG)
    }
}

impl PayloadDigester for FfmpegDigester {
    fn payload_digest(&self, path: &Path) -> io::Result<Option<String>> {
        // Fail on the file before blaming ffmpeg for it.
        std::fs::File::open(path)?;

        let output = match self.command(path).output() {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !self.warned_missing.swap(true, Ordering::Relaxed) {
                    log::warn!(
                        "ffmpeg not found at '{}'; media checksums are unavailable",
                        self.program.display()
                    );
                }
                return Ok(None);
            }
            Err(e) => {
                log::debug!("Failed to run ffmpeg on {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        if !output.status.success() {
            log::debug!(
                "ffmpeg exited with {} for {}: {}",
                output.status,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        Ok(parse_md5_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Extract the hex digest from ffmpeg `md5` muxer output (`MD5=<hex>`).
#[must_use]
pub fn parse_md5_output(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let digest = line.trim().strip_prefix("MD5=")?.trim();
        (!digest.is_empty() && digest.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| digest.to_ascii_lowercase())
    })
}

/// Whether the media plugin handles files with this extension.
#[must_use]
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Audio payload checksum.
pub struct MediaChecksum {
    digester: Arc<dyn PayloadDigester>,
}

impl MediaChecksum {
    /// Create the plugin over a payload digester.
    #[must_use]
    pub fn new(digester: Arc<dyn PayloadDigester>) -> Self {
        Self { digester }
    }

    fn inapplicable(path: &Path) -> FingerprintError {
        FingerprintError::Inapplicable {
            plugin: MEDIA_PLUGIN_ID,
            path: path.to_path_buf(),
        }
    }
}

impl std::fmt::Debug for MediaChecksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaChecksum").finish_non_exhaustive()
    }
}

impl FingerprintPlugin for MediaChecksum {
    fn id(&self) -> &'static str {
        MEDIA_PLUGIN_ID
    }

    fn description(&self) -> &'static str {
        "Checksum of the audio payload only; finds retagged copies of audio files (needs ffmpeg)"
    }

    fn compute(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        if !path.exists() {
            return Err(FingerprintError::unreadable(
                path,
                io::Error::from(io::ErrorKind::NotFound),
            ));
        }
        if !is_audio_file(path) {
            return Err(Self::inapplicable(path));
        }

        match self.digester.payload_digest(path) {
            Ok(Some(digest)) => Ok(digest),
            Ok(None) => Err(Self::inapplicable(path)),
            Err(e) => Err(FingerprintError::unreadable(path, e)),
        }
    }

    fn label(&self) -> Classification {
        Classification::Modified
    }

    fn is_degenerate(&self, fingerprint: &str) -> bool {
        fingerprint == self.digester.empty_payload_digest()
    }

    fn requires_byte_equality(&self) -> bool {
        false
    }
}
