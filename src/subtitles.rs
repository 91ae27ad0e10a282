use std::fmt::Write as _;

/// Generates an `.ass` subtitle track sized to the source video resolution.
/// Off by default; emitted only when a task explicitly requests burned-in
/// subtitles (see `mux_with_subtitles`).
const MAX_CHARS_CJK: usize = 20;
const MAX_CHARS_LATIN: usize = 40;
const MIN_EVENT_DURATION_MS: f64 = 100.0;
const MIN_EVENT_GAP_MS: f64 = 40.0;
const BASE_RESOLUTION_WIDTH: f64 = 1280.0;
const BASE_FONT_SIZE: f64 = 60.0;
const BASE_MARGIN: f64 = 30.0;

pub struct SubtitleCue {
    pub start_ms: f64,
    pub duration_ms: f64,
    pub text: String,
}

fn is_cjk(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c as u32,
            0x4E00..=0x9FFF | 0x3040..=0x30FF | 0xAC00..=0xD7A3)
    })
}

/// Splits `text` into cues whose durations are proportional to character
/// count, respecting the per-language max-chars rule and the minimum event
/// duration / inter-event gap.
pub fn split_cue(start_ms: f64, duration_ms: f64, text: &str) -> Vec<SubtitleCue> {
    let max_chars = if is_cjk(text) { MAX_CHARS_CJK } else { MAX_CHARS_LATIN };
    let chars: Vec<char> = text.chars().collect();

    if chars.is_empty() {
        return Vec::new();
    }

    let chunks: Vec<String> = chars
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect())
        .collect();

    let total_chars = chars.len() as f64;
    let mut cues = Vec::with_capacity(chunks.len());
    let mut cursor = start_ms;

    for chunk in &chunks {
        let share = chunk.chars().count() as f64 / total_chars;
        let mut chunk_duration = (duration_ms * share).max(MIN_EVENT_DURATION_MS);
        if cursor + chunk_duration > start_ms + duration_ms && chunks.len() > 1 {
            chunk_duration = chunk_duration.max(MIN_EVENT_DURATION_MS);
        }
        cues.push(SubtitleCue {
            start_ms: cursor,
            duration_ms: chunk_duration,
            text: chunk.clone(),
        });
        cursor += chunk_duration + MIN_EVENT_GAP_MS;
    }

    cues
}

fn format_timestamp(ms: f64) -> String {
    let total_cs = (ms / 10.0).round() as i64;
    let cs = total_cs % 100;
    let total_secs = total_cs / 100;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;
    format!("{hours}:{mins:02}:{secs:02}.{cs:02}")
}

/// Build a full `.ass` document for one segment's cues, scaled to
/// `video_width`x`video_height`.
pub fn build_ass(cues: &[SubtitleCue], video_width: u32, video_height: u32) -> String {
    let scale = video_width as f64 / BASE_RESOLUTION_WIDTH;
    let font_size = (BASE_FONT_SIZE * scale).round() as i64;
    let margin = (BASE_MARGIN * scale).round() as i64;

    let mut out = String::new();
    let _ = writeln!(out, "[Script Info]");
    let _ = writeln!(out, "ScriptType: v4.00+");
    let _ = writeln!(out, "PlayResX: {video_width}");
    let _ = writeln!(out, "PlayResY: {video_height}");
    let _ = writeln!(out);
    let _ = writeln!(out, "[V4+ Styles]");
    let _ = writeln!(
        out,
        "Format: Name, Fontname, Fontsize, PrimaryColour, OutlineColour, BackColour, Bold, BorderStyle, Outline, Alignment, MarginL, MarginR, MarginV"
    );
    let _ = writeln!(
        out,
        "Style: Default,Arial,{font_size},&H00FFFFFF,&H00000000,&H80000000,1,3,2,2,{margin},{margin},{margin}"
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "[Events]");
    let _ = writeln!(out, "Format: Layer, Start, End, Style, Text");

    for cue in cues {
        let start = format_timestamp(cue.start_ms);
        let end = format_timestamp(cue.start_ms + cue.duration_ms);
        let text = cue.text.replace('\n', "\\N");
        let _ = writeln!(out, "Dialogue: 0,{start},{end},Default,{text}");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_long_latin_text_respecting_max_chars() {
        let text = "a".repeat(100);
        let cues = split_cue(0.0, 5000.0, &text);
        assert!(cues.iter().all(|c| c.text.chars().count() <= MAX_CHARS_LATIN));
        assert_eq!(cues.iter().map(|c| c.text.chars().count()).sum::<usize>(), 100);
    }

    #[test]
    fn enforces_minimum_event_duration() {
        let cues = split_cue(0.0, 10.0, "hi");
        assert!(cues.iter().all(|c| c.duration_ms >= MIN_EVENT_DURATION_MS));
    }

    #[test]
    fn scales_font_and_margins_by_resolution() {
        let ass = build_ass(&[], 1920, 1080);
        assert!(ass.contains("Style: Default,Arial,90"));
        assert!(ass.contains("PlayResX: 1920"));
    }

    #[test]
    fn cjk_text_uses_shorter_max_chars() {
        let text = "你".repeat(50);
        let cues = split_cue(0.0, 5000.0, &text);
        assert!(cues.iter().all(|c| c.text.chars().count() <= MAX_CHARS_CJK));
    }
}
