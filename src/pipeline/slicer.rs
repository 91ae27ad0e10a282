use crate::config::Config;
use crate::error::Result;
use crate::models::{AudioClip, Sentence};
use crate::wav;
use std::path::{Path, PathBuf};

/// Builds one speaker-reference clip per contiguous same-speaker run, long
/// enough for the TTS model to clone a voice from, and stamps every
/// sentence in that run with the clip's path.
///
/// Degrades by leaving `prompt_audio_path` unset on sentences it cannot
/// cover; callers treat those as "skip synthesis" rather than a hard error.
pub fn slice(
    sentences: &mut [Sentence],
    vocals_path: &Path,
    scratch_dir: &Path,
    config: &Config,
) -> Result<Vec<AudioClip>> {
    let (samples, sample_rate) = wav::read_mono_f32(vocals_path)?;
    let goal = config.audio_clip_goal_duration_ms;
    let min = config.audio_clip_min_duration_ms;
    let padding = config.audio_clip_padding_ms;
    let allow_cross_non_speech = config.audio_clip_allow_cross_non_speech;

    let blocks = group_blocks(sentences, padding, allow_cross_non_speech);
    let clips_dir = scratch_dir.join("prompt_clips");
    std::fs::create_dir_all(&clips_dir).ok();

    let mut clips = Vec::new();

    for (clip_index, block) in blocks.into_iter().enumerate() {
        let total_ms: i64 = block.iter().map(|(_, s, e)| e - s).sum();
        if total_ms < min {
            continue;
        }

        let windows = if total_ms <= goal {
            block.clone()
        } else {
            truncate_to_goal(&block, goal)
        };

        let merged = merge_intervals(windows.iter().map(|(_, s, e)| (*s, *e)).collect());
        let stitched = extract_and_stitch(&samples, sample_rate, &merged, config);
        let clip_id = format!("clip_{clip_index}");
        let clip_path = clips_dir.join(format!("{clip_id}.wav"));
        wav::write_mono_f32(&clip_path, &stitched, sample_rate)?;

        let duration_ms = (stitched.len() as f64 / sample_rate as f64 * 1000.0) as i64;
        let speaker = sentences
            .iter()
            .find(|s| block.iter().any(|(idx, _, _)| *idx == s.sequence))
            .map(|s| s.speaker.clone())
            .unwrap_or_default();

        clips.push(AudioClip {
            id: clip_id.clone(),
            speaker,
            total_duration_ms: duration_ms,
            segments: merged,
            path: clip_path.clone(),
        });

        for (idx, _, _) in &block {
            if let Some(sentence) = sentences.iter_mut().find(|s| s.sequence == *idx) {
                sentence.prompt_audio_path = Some(clip_path.clone());
            }
        }
    }

    Ok(clips)
}

/// `(sequence, padded_start_ms, padded_end_ms)` grouped into contiguous
/// same-speaker runs. A new block starts on speaker change, or (unless
/// `allow_cross_non_speech`) on any gap in `sequence`.
fn group_blocks(
    sentences: &[Sentence],
    padding_ms: i64,
    allow_cross_non_speech: bool,
) -> Vec<Vec<(i32, i64, i64)>> {
    let mut blocks: Vec<Vec<(i32, i64, i64)>> = Vec::new();
    let mut current: Vec<(i32, i64, i64)> = Vec::new();
    let mut current_speaker: Option<&str> = None;
    let mut last_sequence: Option<i32> = None;

    for sentence in sentences {
        let padded_start = (sentence.start_ms - padding_ms).max(0);
        let padded_end = sentence.end_ms + padding_ms;

        let speaker_changed = current_speaker != Some(sentence.speaker.as_str());
        let sequence_gap = !allow_cross_non_speech
            && last_sequence.is_some_and(|last| sentence.sequence != last + 1);

        if speaker_changed || sequence_gap {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            current_speaker = Some(sentence.speaker.as_str());
        }

        current.push((sentence.sequence, padded_start, padded_end));
        last_sequence = Some(sentence.sequence);
    }

    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}

/// Accumulate sentences until the next would exceed `goal`; truncate the
/// tail sentence so the block fills the budget exactly.
fn truncate_to_goal(block: &[(i32, i64, i64)], goal: i64) -> Vec<(i32, i64, i64)> {
    let mut out = Vec::new();
    let mut accumulated = 0i64;

    for &(idx, start, end) in block {
        let duration = end - start;
        if accumulated + duration <= goal {
            out.push((idx, start, end));
            accumulated += duration;
        } else {
            let remaining = goal - accumulated;
            if remaining > 0 {
                out.push((idx, start, start + remaining));
            }
            break;
        }
    }

    out
}

fn merge_intervals(mut intervals: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
    intervals.sort_by_key(|&(s, _)| s);
    let mut merged: Vec<(i64, i64)> = Vec::new();

    for (start, end) in intervals {
        if let Some(last) = merged.last_mut() {
            if start <= last.1 {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }

    merged
}

fn extract_and_stitch(
    samples: &[f32],
    sample_rate: u32,
    intervals: &[(i64, i64)],
    config: &Config,
) -> Vec<f32> {
    let fade_len = ((config.silence_fade_ms as f64 / 1000.0) * sample_rate as f64) as usize;

    let mut pieces: Vec<Vec<f32>> = intervals
        .iter()
        .map(|&(start_ms, end_ms)| {
            let start = ((start_ms as f64 / 1000.0) * sample_rate as f64) as usize;
            let end = ((end_ms as f64 / 1000.0) * sample_rate as f64) as usize;
            let end = end.min(samples.len());
            let start = start.min(end);
            samples[start..end].to_vec()
        })
        .collect();

    if let Some(first) = pieces.first_mut() {
        wav::fade_in(first, fade_len);
    }
    if let Some(last) = pieces.last_mut() {
        wav::fade_out(last, fade_len);
    }
    for piece in pieces.iter_mut().take(pieces.len().saturating_sub(1)).skip(1) {
        wav::fade_in(piece, fade_len / 2);
        wav::fade_out(piece, fade_len / 2);
    }

    let mut stitched: Vec<f32> = pieces.into_iter().flatten().collect();
    wav::normalize(&mut stitched, config.normalization_threshold);
    stitched
}

#[allow(dead_code)]
fn debug_clip_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.wav"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(sequence: i32, speaker: &str, start_ms: i64, end_ms: i64) -> Sentence {
        Sentence::new_fetched(
            uuid::Uuid::nil(),
            sequence,
            "orig".to_string(),
            "trans".to_string(),
            speaker.to_string(),
            start_ms,
            end_ms,
            sequence == 0,
            false,
        )
    }

    #[test]
    fn groups_break_on_speaker_change() {
        let sentences = vec![
            sentence(0, "A", 0, 1000),
            sentence(1, "A", 1000, 2000),
            sentence(2, "B", 2000, 3000),
        ];
        let blocks = group_blocks(&sentences, 200, false);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), 2);
        assert_eq!(blocks[1].len(), 1);
    }

    #[test]
    fn groups_break_on_sequence_gap_when_disallowed() {
        let sentences = vec![
            sentence(0, "A", 0, 1000),
            sentence(2, "A", 3000, 4000),
        ];
        let blocks = group_blocks(&sentences, 0, false);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn truncate_to_goal_fills_budget_exactly() {
        let block = vec![(0, 0, 5000), (1, 5000, 10000), (2, 10000, 15000)];
        let truncated = truncate_to_goal(&block, 12_000);
        let total: i64 = truncated.iter().map(|(_, s, e)| e - s).sum();
        assert_eq!(total, 12_000);
    }

    #[test]
    fn merge_intervals_coalesces_overlaps() {
        let merged = merge_intervals(vec![(0, 1000), (800, 2000), (5000, 6000)]);
        assert_eq!(merged, vec![(0, 2000), (5000, 6000)]);
    }
}
