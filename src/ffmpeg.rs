use crate::error::{AppError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Wrappers over the `ffmpeg`/`ffprobe` child processes this pipeline shells
/// out to. Every invocation goes through `tokio::process::Command` with
/// explicit stdio and a wall-clock budget, mirroring the `gt_ffmpeg::transcode`
/// idiom this pack uses for HLS transcoding.
const PROCESS_TIMEOUT: Duration = Duration::from_secs(120);

async fn run(mut command: Command, label: &str) -> Result<()> {
    command.stdout(Stdio::null()).stderr(Stdio::piped());

    let child = command
        .spawn()
        .map_err(|e| AppError::ExternalProcess(format!("{label}: failed to spawn: {e}")))?;

    let output = tokio::time::timeout(PROCESS_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| AppError::Timeout(label.to_string()))?
        .map_err(|e| AppError::ExternalProcess(format!("{label}: {e}")))?;

    if !output.status.success() {
        return Err(AppError::ExternalProcess(format!(
            "{label} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(())
}

/// `ffmpeg -y -i <in> -vn -acodec pcm_f32le -ac 1 <out>`
#[tracing::instrument(skip_all)]
pub async fn extract_audio(input: &Path, output: &Path) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-i")
        .arg(input)
        .arg("-vn")
        .arg("-acodec")
        .arg("pcm_f32le")
        .arg("-ac")
        .arg("1")
        .arg(output);
    run(cmd, "extract_audio").await
}

/// `ffmpeg -y -i <in> -an -c:v libx264 -preset ultrafast -crf 18 <out>`
#[tracing::instrument(skip_all)]
pub async fn extract_silent_video(input: &Path, output: &Path) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-i")
        .arg(input)
        .arg("-an")
        .arg("-c:v")
        .arg("libx264")
        .arg("-preset")
        .arg("ultrafast")
        .arg("-crf")
        .arg("18")
        .arg(output);
    run(cmd, "extract_silent_video").await
}

/// `ffmpeg -y -i <in> -c copy -f hls -hls_time 10 -hls_list_size 0
///  -hls_segment_type mpegts -hls_flags append_list+omit_endlist
///  -hls_allow_cache 0 -hls_segment_filename <pat.ts> <out.m3u8>`
#[tracing::instrument(skip_all)]
pub async fn hls_segment(
    input: &Path,
    segment_pattern: &Path,
    playlist_out: &Path,
    hls_time_secs: u32,
) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-i")
        .arg(input)
        .arg("-c")
        .arg("copy")
        .arg("-f")
        .arg("hls")
        .arg("-hls_time")
        .arg(hls_time_secs.to_string())
        .arg("-hls_list_size")
        .arg("0")
        .arg("-hls_segment_type")
        .arg("mpegts")
        .arg("-hls_flags")
        .arg("append_list+omit_endlist")
        .arg("-hls_allow_cache")
        .arg("0")
        .arg("-hls_segment_filename")
        .arg(segment_pattern)
        .arg(playlist_out);
    run(cmd, "hls_segment").await
}

/// `ffmpeg -y -ss <s> -i <vid> -t <d> -c:v libx264 -preset superfast -an <out>`
#[tracing::instrument(skip_all)]
pub async fn cut_video_window(
    video: &Path,
    start_secs: f64,
    duration_secs: f64,
    output: &Path,
) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-ss")
        .arg(format!("{start_secs:.3}"))
        .arg("-i")
        .arg(video)
        .arg("-t")
        .arg(format!("{duration_secs:.3}"))
        .arg("-c:v")
        .arg("libx264")
        .arg("-preset")
        .arg("superfast")
        .arg("-an")
        .arg(output);
    run(cmd, "cut_video_window").await
}

/// `ffmpeg -y -i <v> -i <a> -c:v copy -c:a aac <out>`
#[tracing::instrument(skip_all)]
pub async fn mux(video: &Path, audio: &Path, output: &Path) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-i")
        .arg(video)
        .arg("-i")
        .arg(audio)
        .arg("-c:v")
        .arg("copy")
        .arg("-c:a")
        .arg("aac")
        .arg(output);
    run(cmd, "mux").await.map_err(|e| match e {
        AppError::ExternalProcess(msg) | AppError::Timeout(msg) => AppError::MuxFailed(msg),
        other => other,
    })
}

/// `ffmpeg -y -i <v> -i <a> -filter_complex "[0:v]subtitles='<ass>'[v]"
///  -map [v] -map 1:a -c:v libx264 -preset superfast -crf 23 -c:a aac <out>`
#[tracing::instrument(skip_all)]
pub async fn mux_with_subtitles(
    video: &Path,
    audio: &Path,
    ass_path: &Path,
    output: &Path,
) -> Result<()> {
    let filter = format!("[0:v]subtitles='{}'[v]", ass_path.display());
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-i")
        .arg(video)
        .arg("-i")
        .arg(audio)
        .arg("-filter_complex")
        .arg(filter)
        .arg("-map")
        .arg("[v]")
        .arg("-map")
        .arg("1:a")
        .arg("-c:v")
        .arg("libx264")
        .arg("-preset")
        .arg("superfast")
        .arg("-crf")
        .arg("23")
        .arg("-c:a")
        .arg("aac")
        .arg(output);
    run(cmd, "mux_with_subtitles").await.map_err(|e| match e {
        AppError::ExternalProcess(msg) | AppError::Timeout(msg) => AppError::MuxFailed(msg),
        other => other,
    })
}

/// `ffmpeg -y -f concat -safe 0 -i <list.txt> -c copy <out.mp4>`
#[tracing::instrument(skip_all)]
pub async fn concat(list_file: &Path, output: &Path) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(list_file)
        .arg("-c")
        .arg("copy")
        .arg(output);
    run(cmd, "concat").await
}

/// `ffmpeg -y -f f32le -ar <sr> -ac 1 -i pipe:0 -filter:a atempo=<s> -f f32le pipe:1`
///
/// Streams raw float32 PCM through an `atempo` filter chain and reads the
/// stretched PCM back from stdout. `speed` must already satisfy
/// `0.5 <= speed <= 100` (ffmpeg's own `atempo` bound); callers validate
/// before calling.
#[tracing::instrument(skip(samples))]
pub async fn time_stretch(samples: &[f32], sample_rate: u32, speed: f64) -> Result<Vec<f32>> {
    if !(0.5..=100.0).contains(&speed) {
        return Err(AppError::StretchOutOfRange(speed));
    }

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-f")
        .arg("f32le")
        .arg("-ar")
        .arg(sample_rate.to_string())
        .arg("-ac")
        .arg("1")
        .arg("-i")
        .arg("pipe:0")
        .arg("-filter:a")
        .arg(format!("atempo={speed}"))
        .arg("-f")
        .arg("f32le")
        .arg("pipe:1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| AppError::ExternalProcess(format!("time_stretch: failed to spawn: {e}")))?;

    let mut stdin = child.stdin.take().expect("stdin was piped");
    let mut stdout = child.stdout.take().expect("stdout was piped");

    let input_bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

    let write_task = tokio::spawn(async move {
        let _ = stdin.write_all(&input_bytes).await;
    });

    let mut output_bytes = Vec::new();
    let read_result = tokio::time::timeout(PROCESS_TIMEOUT, stdout.read_to_end(&mut output_bytes))
        .await
        .map_err(|_| AppError::Timeout("time_stretch".to_string()))?;
    read_result.map_err(|e| AppError::ExternalProcess(format!("time_stretch: {e}")))?;

    let _ = write_task.await;

    let status = tokio::time::timeout(PROCESS_TIMEOUT, child.wait())
        .await
        .map_err(|_| AppError::Timeout("time_stretch".to_string()))?
        .map_err(|e| AppError::ExternalProcess(format!("time_stretch: {e}")))?;

    if !status.success() {
        return Err(AppError::ExternalProcess(format!(
            "time_stretch exited with {status}"
        )));
    }

    let stretched = output_bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(stretched)
}

/// `ffprobe -v error -show_entries format=duration -of default=noprint_wrappers=1:nokey=1 <in>`
#[tracing::instrument(skip_all)]
pub async fn probe_duration_secs(input: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(input)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| AppError::ExternalProcess(format!("probe_duration_secs: {e}")))?;

    if !output.status.success() {
        return Err(AppError::ExternalProcess(format!(
            "ffprobe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .map_err(|e| AppError::ExternalProcess(format!("unparseable ffprobe duration: {e}")))
}

/// `ffprobe -v error -select_streams v:0 -show_entries stream=width,height
///  -of csv=s=x:p=0 <in>`
#[tracing::instrument(skip_all)]
pub async fn probe_video_dimensions(input: &Path) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height")
        .arg("-of")
        .arg("csv=s=x:p=0")
        .arg(input)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| AppError::ExternalProcess(format!("probe_video_dimensions: {e}")))?;

    if !output.status.success() {
        return Err(AppError::ExternalProcess(format!(
            "ffprobe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let mut parts = text.trim().split('x');
    let width = parts.next().and_then(|s| s.parse().ok());
    let height = parts.next().and_then(|s| s.parse().ok());

    match (width, height) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(AppError::ExternalProcess(format!(
            "unparseable ffprobe resolution: {text}"
        ))),
    }
}
