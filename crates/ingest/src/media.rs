use anyhow::{Context, Result};
use async_trait::async_trait;
use common::config::MediaConfig;
use common::ItemRecord;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use crate::segment::Window;

/// Access to an item's raw media: download, probe, cut.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Download one audio stream for the item into `dest_dir`.
    async fn fetch(&self, item_id: &str, dest_dir: &Path) -> Result<PathBuf>;

    /// Total duration in milliseconds.
    async fn duration_ms(&self, media: &Path) -> Result<u64>;

    /// Write `window` of `media` to `output`.
    async fn export(&self, media: &Path, window: &Window, output: &Path) -> Result<()>;
}

/// `yt-dlp` for downloads, `ffprobe`/`ffmpeg` for probing and cutting.
pub struct FfmpegBackend {
    config: MediaConfig,
}

impl FfmpegBackend {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn fetch(&self, item_id: &str, dest_dir: &Path) -> Result<PathBuf> {
        let template = dest_dir.join(format!("{}.%(ext)s", item_id));
        let url = ItemRecord::watch_url(item_id);

        let mut cmd = Command::new(&self.config.yt_dlp_bin);
        cmd.arg("-f")
            .arg("bestaudio")
            .arg("--no-playlist")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg("-o")
            .arg(&template)
            .arg(&url);
        run_tool(&mut cmd, "yt-dlp").await?;

        find_download(dest_dir, item_id).await
    }

    async fn duration_ms(&self, media: &Path) -> Result<u64> {
        let mut cmd = Command::new(&self.config.ffprobe_bin);
        cmd.arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(media);
        let stdout = run_tool(&mut cmd, "ffprobe").await?;

        let seconds: f64 = stdout
            .trim()
            .parse()
            .context(format!("Unexpected ffprobe duration output: {:?}", stdout.trim()))?;
        if !seconds.is_finite() || seconds < 0.0 {
            anyhow::bail!("Invalid media duration: {}", seconds);
        }
        Ok((seconds * 1000.0).round() as u64)
    }

    async fn export(&self, media: &Path, window: &Window, output: &Path) -> Result<()> {
        let extension = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        let mut cmd = Command::new(&self.config.ffmpeg_bin);
        cmd.arg("-y")
            .arg("-v")
            .arg("error")
            .arg("-ss")
            .arg(format_seconds(window.start_ms))
            .arg("-i")
            .arg(media)
            .arg("-t")
            .arg(format_seconds(window.duration_ms()))
            .arg("-vn")
            .arg("-c:a")
            .arg(codec_for(extension)?)
            .arg(output);
        run_tool(&mut cmd, "ffmpeg").await?;
        Ok(())
    }
}

fn codec_for(extension: &str) -> Result<&'static str> {
    match extension {
        "mp4" | "m4a" => Ok("aac"),
        "mp3" => Ok("libmp3lame"),
        "wav" => Ok("pcm_s16le"),
        "flac" => Ok("flac"),
        "ogg" => Ok("libopus"),
        _ => anyhow::bail!("Unsupported segment format: {}", extension),
    }
}

fn format_seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

async fn run_tool(cmd: &mut Command, tool: &str) -> Result<String> {
    debug!(tool, command = ?cmd, "Running media tool");
    let output = cmd
        .output()
        .await
        .context(format!("Failed to start {}", tool))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{} exited with {}: {}", tool, output.status, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// The downloader picks the extension; look for `<item_id>.*`.
async fn find_download(dir: &Path, item_id: &str) -> Result<PathBuf> {
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let stem_matches = path.file_stem().and_then(|s| s.to_str()) == Some(item_id);
        let partial = path.extension().and_then(|e| e.to_str()) == Some("part");
        if path.is_file() && stem_matches && !partial {
            return Ok(path);
        }
    }

    anyhow::bail!("Download for item {} not found in {:?}", item_id, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0), "0.000");
        assert_eq!(format_seconds(3000), "3.000");
        assert_eq!(format_seconds(61_005), "61.005");
    }

    #[test]
    fn test_codec_for_known_and_unknown() {
        assert_eq!(codec_for("mp4").unwrap(), "aac");
        assert_eq!(codec_for("mp3").unwrap(), "libmp3lame");
        assert!(codec_for("avi").is_err());
    }

    #[tokio::test]
    async fn test_find_download_skips_partial_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("vid.webm.part"), b"x").unwrap();
        std::fs::write(tmp.path().join("vid.webm"), b"x").unwrap();

        let found = find_download(tmp.path(), "vid").await.unwrap();
        assert_eq!(found, tmp.path().join("vid.webm"));
        assert!(find_download(tmp.path(), "other").await.is_err());
    }
}
