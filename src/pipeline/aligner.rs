use crate::clients::simplifier::{FastSentence, SimplificationCandidates};
use crate::clients::{Simplifier, TtsClient};
use crate::config::Config;
use crate::error::Result;
use crate::models::Batch;
use crate::pipeline::fetcher::PathManager;
use crate::pipeline::tts_producer::synthesize_one;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Distributes each batch's timing error across its sentences, then retries
/// once through the Simplifier for any sentence still over `max_speed`. Never
/// reorders sentences or touches `target_duration_ms`.
pub async fn align_batch(
    batch: &mut Batch,
    config: &Config,
    simplifier: Option<&Simplifier>,
    tts: &Arc<dyn TtsClient>,
    model_lock: &Arc<Mutex<()>>,
    paths: &PathManager,
) -> Result<()> {
    distribute_correction(batch, config);

    let fast_indices: Vec<usize> = batch
        .sentences
        .iter()
        .enumerate()
        .filter(|(_, s)| s.speed > config.max_speed)
        .map(|(i, _)| i)
        .collect();

    if fast_indices.is_empty() {
        return Ok(());
    }

    let Some(simplifier) = simplifier else {
        tracing::warn!(
            count = fast_indices.len(),
            "no simplifier configured, leaving over-speed sentences as-is"
        );
        return Ok(());
    };

    let fast_sentences: Vec<FastSentence> = fast_indices
        .iter()
        .map(|&i| {
            let s = &batch.sentences[i];
            FastSentence {
                sequence: s.sequence,
                original_text: s.original_text.clone(),
                translated_text: s.translated_text.clone(),
                speed: s.speed,
            }
        })
        .collect();

    let candidates = match simplifier.simplify(&fast_sentences).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("simplification call failed, skipping retry: {e}");
            return Ok(());
        }
    };

    for &i in &fast_indices {
        let sentence = &mut batch.sentences[i];
        let Some(candidate) = candidates.iter().find(|c| c.sequence == sentence.sequence) else {
            continue;
        };

        let ideal_length =
            sentence.translated_text.chars().count() as f64 * (config.max_speed / sentence.speed);

        if let Some(chosen) = pick_candidate(candidate, ideal_length) {
            sentence.translated_text = chosen;

            if let Err(e) = synthesize_one(tts, model_lock, sentence, config, paths).await {
                tracing::warn!(
                    sequence = sentence.sequence,
                    "re-synthesis after simplification failed: {e}"
                );
            }
        }
    }

    distribute_correction(batch, config);

    Ok(())
}

/// Prefer the longest candidate at or under `ideal_length`; otherwise the
/// shortest candidate over it; otherwise keep the existing text (`None`).
fn pick_candidate(candidates: &SimplificationCandidates, ideal_length: f64) -> Option<String> {
    let ordered = candidates.ordered();
    if ordered.is_empty() {
        return None;
    }

    let under_or_equal = ordered
        .iter()
        .filter(|c| c.chars().count() as f64 <= ideal_length)
        .max_by_key(|c| c.chars().count());

    if let Some(best) = under_or_equal {
        return Some(best.to_string());
    }

    ordered
        .iter()
        .min_by_key(|c| c.chars().count())
        .map(|c| c.to_string())
}

fn distribute_correction(batch: &mut Batch, config: &Config) {
    let diffs: Vec<f64> = batch.sentences.iter().map(|s| s.duration_diff_ms()).collect();
    let total_diff: f64 = diffs.iter().sum();
    let pos_sum: f64 = diffs.iter().filter(|&&d| d > 0.0).sum();
    let neg_sum: f64 = diffs.iter().map(|&d| (-d).max(0.0)).sum();

    for (sentence, &diff) in batch.sentences.iter_mut().zip(diffs.iter()) {
        if sentence.generated_audio.is_none() {
            sentence.speed = 1.0;
            sentence.speech_duration_ms = 0.0;
            sentence.ending_silence_ms = 0.0;
            continue;
        }

        if total_diff > 0.0 {
            if diff > 0.0 && pos_sum > 0.0 {
                let adjustment = total_diff * (diff / pos_sum);
                let adjusted_duration = (sentence.duration_ms - adjustment).max(1e-3);
                sentence.speech_duration_ms = adjusted_duration;
                sentence.speed = sentence.duration_ms / adjusted_duration;
                sentence.ending_silence_ms = 0.0;
            } else {
                sentence.speech_duration_ms = sentence.duration_ms;
                sentence.speed = 1.0;
                sentence.ending_silence_ms = 0.0;
            }
        } else if total_diff < 0.0 {
            if diff < 0.0 && neg_sum > 0.0 {
                let needed = total_diff.abs() * ((-diff) / neg_sum);
                let slow = needed.min(config.max_slowdown_ratio * sentence.duration_ms);
                let adjusted_duration = sentence.duration_ms + slow;
                sentence.speech_duration_ms = adjusted_duration;
                sentence.speed = sentence.duration_ms / adjusted_duration;
                sentence.ending_silence_ms = needed - slow;
            } else {
                sentence.speech_duration_ms = sentence.duration_ms;
                sentence.speed = 1.0;
                sentence.ending_silence_ms = 0.0;
            }
        } else {
            sentence.speech_duration_ms = sentence.duration_ms;
            sentence.speed = 1.0;
            sentence.ending_silence_ms = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sentence;

    fn config() -> Config {
        Config::from_env().expect("Config::from_env falls back to defaults with no env set")
    }

    fn sentence_with(duration_ms: f64, target_ms: i64) -> Sentence {
        let mut s = Sentence::new_fetched(
            uuid::Uuid::nil(),
            0,
            "orig".into(),
            "trans".into(),
            "A".into(),
            0,
            target_ms,
            true,
            true,
        );
        s.generated_audio = Some(vec![0.0; 10]);
        s.duration_ms = duration_ms;
        s
    }

    #[test]
    fn too_long_audio_speeds_up_proportionally() {
        let mut batch = Batch::new(0, vec![sentence_with(2000.0, 1000)]);
        distribute_correction(&mut batch, &config());
        assert!(batch.sentences[0].speed > 1.0);
    }

    #[test]
    fn too_short_audio_caps_slowdown_at_ratio() {
        let mut batch = Batch::new(0, vec![sentence_with(1000.0, 2000)]);
        distribute_correction(&mut batch, &config());
        let s = &batch.sentences[0];
        assert!(s.speed < 1.0);
        assert!(s.ending_silence_ms >= 0.0);
    }

    #[test]
    fn pick_candidate_prefers_longest_under_ideal() {
        let candidates = SimplificationCandidates {
            sequence: 0,
            minimal: Some("a".repeat(30)),
            slight: Some("a".repeat(20)),
            moderate: Some("a".repeat(10)),
            significant: None,
            extreme: None,
        };
        let picked = pick_candidate(&candidates, 25.0).unwrap();
        assert_eq!(picked.len(), 20);
    }

    #[test]
    fn pick_candidate_falls_back_to_shortest_when_none_fit() {
        let candidates = SimplificationCandidates {
            sequence: 0,
            minimal: Some("a".repeat(30)),
            slight: Some("a".repeat(40)),
            moderate: None,
            significant: None,
            extreme: None,
        };
        let picked = pick_candidate(&candidates, 5.0).unwrap();
        assert_eq!(picked.len(), 30);
    }
}
