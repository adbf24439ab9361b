use std::io;
use std::path::{Path, PathBuf};

use crate::catalog::Video;
use crate::config::{EncoderSection, StreamSection};

/// One external encoder invocation: a program, its argument vector,
/// and the input path the supervisor checks before launching.
#[derive(Debug, Clone)]
pub struct EncoderJob {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub input: PathBuf,
    pub label: String,
}

/// Builds ffmpeg invocations from the typed config: fixed transcode
/// parameters, low-latency tuning, and a fixed RTMP push destination.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    stream: StreamSection,
    encoder: EncoderSection,
}

impl EncoderSettings {
    pub fn new(stream: StreamSection, encoder: EncoderSection) -> Self {
        Self { stream, encoder }
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.encoder.log_level.clone(),
        ]
    }

    fn output_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.encoder.preset.clone(),
            "-tune".to_string(),
            "zerolatency".to_string(),
            "-crf".to_string(),
            self.encoder.crf.to_string(),
            "-maxrate".to_string(),
            self.encoder.maxrate.clone(),
            "-bufsize".to_string(),
            self.encoder.bufsize.clone(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            self.encoder.audio_bitrate.clone(),
            "-f".to_string(),
            "flv".to_string(),
            "-y".to_string(),
            self.stream.rtmp_url.clone(),
        ]
    }

    /// Single-file job: exit code 0 means the video played to its
    /// natural end.
    pub fn file_job(&self, video: &Video) -> EncoderJob {
        let mut args = self.base_args();
        args.push("-re".to_string());
        args.push("-i".to_string());
        args.push(video.file_path.clone());
        args.extend(self.output_args());
        EncoderJob {
            program: self.stream.ffmpeg_binary.clone(),
            args,
            input: PathBuf::from(&video.file_path),
            label: video.display_name.clone(),
        }
    }

    /// Gapless job reading a concat manifest of queued segments.
    pub fn concat_job(&self, manifest: &Path, segments: usize) -> EncoderJob {
        let mut args = self.base_args();
        args.push("-re".to_string());
        args.push("-f".to_string());
        args.push("concat".to_string());
        args.push("-safe".to_string());
        args.push("0".to_string());
        args.push("-i".to_string());
        args.push(manifest.to_string_lossy().to_string());
        args.extend(self.output_args());
        EncoderJob {
            program: self.stream.ffmpeg_binary.clone(),
            args,
            input: manifest.to_path_buf(),
            label: format!("concat x{segments}"),
        }
    }
}

/// Writes an ffmpeg concat manifest. Single quotes in paths use the
/// close-escape-reopen quoting the concat demuxer expects.
pub fn write_concat_manifest(path: &Path, entries: &[PathBuf]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = String::new();
    for entry in entries {
        let escaped = entry.to_string_lossy().replace('\'', "'\\''");
        content.push_str(&format!("file '{escaped}'\n"));
    }
    std::fs::write(path, content)
}
