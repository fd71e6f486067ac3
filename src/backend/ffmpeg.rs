//! Render backend that shells out to the ffmpeg / ffprobe executables.
//!
//! Exports bake the rotation into pixels and reset the display matrix, which
//! needs ffmpeg 7 or newer for `-display_rotation`.

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::backend::probe::parse_probe_output;
use crate::backend::{ExportPreset, ExportSession, RenderBackend};
use crate::config::ExportConfig;
use crate::error::{Result, TrimError};
use crate::export::{CancelToken, ProgressReporter};
use crate::video::orientation::Rotation;
use crate::video::types::{AssetMetadata, Frame, MediaTime};

/// How often a running encode is checked for completion or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Keep this much of ffmpeg's stderr in error messages
const STDERR_TAIL: usize = 600;

/// Codecs ffprobe can name but ffmpeg cannot decode into a new clip
const UNDECODABLE_CODECS: &[&str] = &["", "none", "unknown"];

/// First release that accepts `-display_rotation` as an input override
const MIN_FFMPEG_MAJOR: u32 = 7;

/// How a bounded tool run ended
enum Bounded {
    Finished(Output),
    TimedOut,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|r| r.join().ok()).unwrap_or_default()
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Kill failed (process may have exited): {}", e);
    }
    let _ = child.wait();
}

/// Run a short-lived tool, killing it once `timeout` has passed
fn run_bounded(command: &mut Command, timeout: Duration) -> io::Result<Bounded> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = Instant::now() + timeout;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(Some(status)),
            Ok(None) if Instant::now() >= deadline => {
                reap(&mut child);
                break Ok(None);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL.min(timeout)),
            Err(e) => {
                reap(&mut child);
                break Err(e);
            }
        }
    };

    let stdout = collect(stdout);
    let stderr = collect(stderr);

    Ok(match status? {
        Some(status) => Bounded::Finished(Output {
            status,
            stdout,
            stderr,
        }),
        None => Bounded::TimedOut,
    })
}

/// Major version from `ffmpeg -version`; `None` for git builds and unknown output
fn ffmpeg_major_version(banner: &str) -> Option<u32> {
    let version = banner
        .lines()
        .next()?
        .strip_prefix("ffmpeg version ")?
        .split_whitespace()
        .next()?;
    let version = version.strip_prefix('n').unwrap_or(version);
    let digits: String = version.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// How an export's ffmpeg process ended
enum ExportExit {
    Finished(ExitStatus),
    Cancelled,
    Lost(io::Error),
}

pub struct FfmpegBackend {
    settings: ExportConfig,
}

impl FfmpegBackend {
    pub fn new(settings: ExportConfig) -> Self {
        Self { settings }
    }

    fn ffmpeg(&self) -> &Path {
        &self.settings.ffmpeg_path
    }

    fn ffprobe(&self) -> &Path {
        &self.settings.ffprobe_path
    }

    /// x264 speed preset and CRF for a quality preset
    fn encoder_tuning(preset: ExportPreset) -> (&'static str, u8) {
        match preset {
            ExportPreset::Highest => ("slow", 18),
            ExportPreset::Medium => ("medium", 23),
            ExportPreset::Low => ("veryfast", 28),
        }
    }

    /// Video filter that bakes the layer instruction's rotation into pixels
    fn rotation_filter(rotation: Rotation) -> Option<&'static str> {
        match rotation {
            Rotation::None => None,
            Rotation::Clockwise90 => Some("transpose=1"),
            Rotation::CounterClockwise90 => Some("transpose=2"),
            Rotation::UpsideDown => Some("hflip,vflip"),
        }
    }

    /// Build the ffmpeg argument list for an export session
    pub fn export_args(&self, session: &ExportSession) -> Vec<String> {
        let composition = &session.composition;
        let instruction = composition.instruction();
        let window = instruction.time_range;
        let (speed, crf) = Self::encoder_tuning(session.preset);

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            // The rotation is applied explicitly below
            "-noautorotate".into(),
            // Identity matrix, so the muxer does not copy the source rotation
            // onto pixels that are already upright
            "-display_rotation:v:0".into(),
            "0".into(),
            "-ss".into(),
            format!("{:.3}", window.start_secs()),
            "-i".into(),
            composition.source().display().to_string(),
            "-t".into(),
            format!("{:.3}", window.duration_secs()),
            "-map".into(),
            format!("0:{}", composition.video().track.index),
        ];

        if let Some(filter) = Self::rotation_filter(instruction.rotation) {
            args.push("-vf".into());
            args.push(filter.into());
        }

        args.extend([
            "-c:v".into(),
            self.settings.video_codec.clone(),
            "-preset".into(),
            speed.into(),
            "-crf".into(),
            crf.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-metadata:s:v:0".into(),
            "rotate=0".into(),
        ]);

        match composition.audio() {
            Some(audio) => args.extend([
                "-map".into(),
                format!("0:{}", audio.track.index),
                "-c:a".into(),
                self.settings.audio_codec.clone(),
                "-b:a".into(),
                format!("{}k", self.settings.audio_bitrate_kbps),
            ]),
            None => args.push("-an".into()),
        }

        args.extend([
            "-threads".into(),
            self.settings.threads.to_string(),
            "-movflags".into(),
            "+faststart".into(),
            "-progress".into(),
            "pipe:1".into(),
            session.output_path.display().to_string(),
        ]);

        args
    }

    fn stderr_tail(stderr: &str) -> String {
        let trimmed = stderr.trim();
        let start = trimmed.len().saturating_sub(STDERR_TAIL);
        let start = (start..trimmed.len())
            .find(|i| trimmed.is_char_boundary(*i))
            .unwrap_or(trimmed.len());
        trimmed[start..].to_string()
    }
}

/// Parse a `-progress` line into elapsed output microseconds
fn progress_micros(line: &str) -> Option<i64> {
    // ffmpeg's out_time_ms is also in microseconds
    line.strip_prefix("out_time_us=")
        .or_else(|| line.strip_prefix("out_time_ms="))
        .and_then(|v| v.trim().parse::<i64>().ok())
}

impl RenderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        let version = |tool: &Path| match run_bounded(
            Command::new(tool).arg("-version"),
            self.settings.probe_timeout(),
        ) {
            Ok(Bounded::Finished(output)) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            _ => None,
        };

        let Some(banner) = version(self.ffmpeg()) else {
            return false;
        };
        if let Some(major) = ffmpeg_major_version(&banner) {
            if major < MIN_FFMPEG_MAJOR {
                warn!("ffmpeg {} is too old, {} or newer is required", major, MIN_FFMPEG_MAJOR);
                return false;
            }
        }
        version(self.ffprobe()).is_some()
    }

    fn probe(&self, path: &Path) -> Result<AssetMetadata> {
        let timeout = self.settings.probe_timeout();
        let run = run_bounded(
            Command::new(self.ffprobe())
                .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
                .arg(path),
            timeout,
        )
        .map_err(|e| TrimError::InvalidVideoTrack {
            reason: format!("could not run ffprobe: {}", e),
        })?;

        let output = match run {
            Bounded::Finished(output) => output,
            Bounded::TimedOut => {
                warn!("ffprobe gave up on {} after {:?}", path.display(), timeout);
                return Err(TrimError::InvalidVideoTrack {
                    reason: format!("ffprobe timed out after {:?}", timeout),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TrimError::InvalidVideoTrack {
                reason: format!("ffprobe failed for {}: {}", path.display(), Self::stderr_tail(&stderr)),
            });
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    fn supports_export(&self, metadata: &AssetMetadata, _preset: ExportPreset) -> bool {
        // Every preset re-encodes, so any decodable video stream qualifies
        metadata
            .video_track()
            .map(|track| !UNDECODABLE_CODECS.contains(&track.codec.as_str()))
            .unwrap_or(false)
            && !metadata.natural_size.is_empty()
    }

    fn export(
        &self,
        session: &ExportSession,
        cancel: &CancelToken,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let args = self.export_args(session);
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new(self.ffmpeg())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TrimError::ExportSessionFailed {
                reason: format!("could not start ffmpeg: {}", e),
            })?;

        // Drain both pipes so ffmpeg never blocks on a full buffer
        let total_micros = (session.range.duration_ms() * 1000).max(1);
        let progress_reader = child.stdout.take().map(|stdout| {
            let progress = progress.clone();
            thread::spawn(move || {
                for line in BufReader::new(stdout).lines().map_while(|l| l.ok()) {
                    if let Some(micros) = progress_micros(&line) {
                        progress.report(micros as f32 / total_micros as f32);
                    }
                }
            })
        });
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        let exit = loop {
            if cancel.is_cancelled() {
                info!("Cancelling ffmpeg export to {}", session.output_path.display());
                reap(&mut child);
                break ExportExit::Cancelled;
            }

            match child.try_wait() {
                Ok(Some(status)) => break ExportExit::Finished(status),
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    reap(&mut child);
                    break ExportExit::Lost(e);
                }
            }
        };

        if let Some(reader) = progress_reader {
            let _ = reader.join();
        }
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        match exit {
            ExportExit::Cancelled => Err(TrimError::ExportCancelled),
            ExportExit::Lost(e) => Err(TrimError::export_failed(format!("lost track of ffmpeg: {}", e))),
            ExportExit::Finished(status) if status.success() => {
                progress.report(1.0);
                Ok(())
            }
            ExportExit::Finished(status) => {
                let tail = Self::stderr_tail(&stderr);
                Err(TrimError::export_failed(if tail.is_empty() {
                    format!("ffmpeg exited with {}", status)
                } else {
                    tail
                }))
            }
        }
    }

    fn extract_frame(&self, source: &Path, at: MediaTime) -> Result<Frame> {
        let seek = format!("{:.3}", at.as_secs_f64());
        let timeout = self.settings.probe_timeout();
        let run = run_bounded(
            Command::new(self.ffmpeg())
                .args(["-hide_banner", "-nostdin", "-loglevel", "error", "-noautorotate"])
                // Input-side seek without accurate_seek lands on the preceding keyframe
                .args(["-noaccurate_seek", "-ss", seek.as_str(), "-i"])
                .arg(source)
                .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"]),
            timeout,
        )
        .map_err(|e| TrimError::thumbnail_failed(format!("could not run ffmpeg: {}", e)))?;

        let output = match run {
            Bounded::Finished(output) => output,
            Bounded::TimedOut => {
                return Err(TrimError::thumbnail_failed(format!(
                    "no frame at {:.3}s within {:?}",
                    at.as_secs_f64(),
                    timeout
                )))
            }
        };

        if !output.status.success() || output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TrimError::thumbnail_failed(format!(
                "no frame at {:.3}s: {}",
                at.as_secs_f64(),
                Self::stderr_tail(&stderr)
            )));
        }

        let image = image::load_from_memory(&output.stdout)
            .map_err(|e| TrimError::thumbnail_failed(format!("undecodable frame: {}", e)))?;
        Ok(Frame::new(image.to_rgb8()))
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new(ExportConfig::default())
    }
}
