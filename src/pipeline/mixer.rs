use crate::config::Config;
use crate::error::Result;
use crate::ffmpeg;
use crate::models::Batch;
use crate::subtitles::{self, SubtitleCue};
use crate::wav;
use std::path::{Path, PathBuf};

/// State carried across batches within one task: a rolling tail of the
/// final mixed audio, used only to cross-fade the next batch's onset.
/// Sentence placement on the output timeline (`adjusted_start_ms`) is set
/// upstream by the TimeStamper in W2; this stage only materializes and
/// stitches audio, it does not own the clock.
pub struct MixerState {
    audio_buffer: Vec<f32>,
    batch_counter: u64,
    max_buffer_samples: usize,
}

impl MixerState {
    pub fn new(config: &Config) -> Self {
        let max_buffer_samples =
            (config.max_buffer_duration.as_secs_f64() * config.target_sr as f64) as usize;
        Self {
            audio_buffer: Vec::new(),
            batch_counter: 0,
            max_buffer_samples,
        }
    }

    /// Runs the full per-batch procedure (materialize, cross-fade,
    /// background mix, video cut + mux). Returns the produced segment's MP4
    /// path, or `None` if the batch was dropped (clock does not advance).
    #[tracing::instrument(skip_all, fields(batch_index = batch.batch_index))]
    pub async fn process_batch(
        &mut self,
        batch: &Batch,
        instrumental_path: Option<&Path>,
        silent_video_path: &Path,
        segments_dir: &Path,
        config: &Config,
    ) -> Result<Option<PathBuf>> {
        match self.try_process_batch(batch, instrumental_path, silent_video_path, segments_dir, config).await {
            Ok(path) => Ok(Some(path)),
            Err(e) => {
                tracing::warn!("batch {} dropped: {e}", batch.batch_index);
                Ok(None)
            }
        }
    }

    async fn try_process_batch(
        &mut self,
        batch: &Batch,
        instrumental_path: Option<&Path>,
        silent_video_path: &Path,
        segments_dir: &Path,
        config: &Config,
    ) -> Result<PathBuf> {
        let start_time_ms = batch.sentences.first().map(|s| s.adjusted_start_ms).unwrap_or(0.0);
        let mut running_ms = start_time_ms;

        let mut materialized = Vec::new();
        let mut cues: Vec<SubtitleCue> = Vec::new();
        for sentence in &batch.sentences {
            let Some(generated) = &sentence.generated_audio else {
                continue;
            };

            let cue_start_ms = running_ms - start_time_ms;

            let mut piece = if sentence.is_first && sentence.start_ms > 0 {
                let mut with_lead = wav::silence(sentence.start_ms as f64, config.target_sr);
                let fade_len =
                    (config.silence_fade_ms as f64 / 1000.0 * config.target_sr as f64) as usize;
                let mut fade_in_tail = generated.clone();
                wav::fade_in(&mut fade_in_tail, fade_len);
                with_lead.extend(fade_in_tail);
                with_lead
            } else {
                generated.clone()
            };

            if (sentence.speed - 1.0).abs() > 1e-6 {
                piece = ffmpeg::time_stretch(&piece, config.target_sr, sentence.speed).await?;
            }

            if sentence.ending_silence_ms > 0.0 {
                let fade_len =
                    (config.silence_fade_ms as f64 / 1000.0 * config.target_sr as f64) as usize;
                wav::fade_out(&mut piece, fade_len);
                piece.extend(wav::silence(sentence.ending_silence_ms, config.target_sr));
            }

            if sentence.is_last {
                let video_duration_secs = ffmpeg::probe_duration_secs(silent_video_path).await.unwrap_or(0.0);
                let occupied_ms = running_ms + piece.len() as f64 / config.target_sr as f64 * 1000.0;
                let tail_ms = (video_duration_secs * 1000.0 - occupied_ms).max(0.0);
                if tail_ms > 0.0 {
                    piece.extend(wav::silence(tail_ms, config.target_sr));
                }
            }

            if config.burn_subtitles {
                let duration_ms =
                    if sentence.speech_duration_ms > 0.0 { sentence.speech_duration_ms } else { sentence.duration_ms };
                cues.extend(subtitles::split_cue(cue_start_ms.max(0.0), duration_ms, &sentence.translated_text));
            }

            running_ms += piece.len() as f64 / config.target_sr as f64 * 1000.0;
            materialized.push(piece);
        }

        if materialized.is_empty() {
            return Err(crate::error::AppError::MuxFailed(
                "batch produced no audio".to_string(),
            ));
        }

        let overlap = config.audio_overlap_samples;
        let mut vocals_mix = materialized.remove(0);
        for piece in materialized {
            vocals_mix = wav::crossfade_concat(&vocals_mix, &piece, overlap.min(vocals_mix.len()));
        }

        let mixed = if !self.audio_buffer.is_empty() {
            wav::crossfade_concat(&self.audio_buffer, &vocals_mix, overlap.min(self.audio_buffer.len()))
        } else {
            vocals_mix
        };

        let duration_secs = mixed.len() as f64 / config.target_sr as f64;

        let final_audio = if let Some(instrumental_path) = instrumental_path {
            mix_background(&mixed, instrumental_path, start_time_ms / 1000.0, duration_secs, config)?
        } else {
            mixed
        };

        std::fs::create_dir_all(segments_dir).ok();
        let audio_tmp = segments_dir.join(format!("batch_{}_audio.wav", batch.batch_index));
        wav::write_mono_f32(&audio_tmp, &final_audio, config.target_sr)?;

        let video_tmp = segments_dir.join(format!("batch_{}_video.mp4", batch.batch_index));
        ffmpeg::cut_video_window(
            silent_video_path,
            start_time_ms / 1000.0,
            duration_secs,
            &video_tmp,
        )
        .await?;

        let segment_path = segments_dir.join(format!("segment_{}.mp4", batch.batch_index));
        if config.burn_subtitles && !cues.is_empty() {
            let (width, height) = ffmpeg::probe_video_dimensions(silent_video_path).await.unwrap_or((1280, 720));
            let ass_path = segments_dir.join(format!("batch_{}.ass", batch.batch_index));
            tokio::fs::write(&ass_path, subtitles::build_ass(&cues, width, height))
                .await
                .map_err(|e| crate::error::AppError::MuxFailed(e.to_string()))?;
            ffmpeg::mux_with_subtitles(&video_tmp, &audio_tmp, &ass_path, &segment_path).await?;
        } else {
            ffmpeg::mux(&video_tmp, &audio_tmp, &segment_path).await?;
        }

        let tail_start = final_audio.len().saturating_sub(self.max_buffer_samples);
        self.audio_buffer = final_audio[tail_start..].to_vec();

        self.batch_counter += 1;
        if self.batch_counter % config.cleanup_interval as u64 == 0 {
            tracing::debug!("mixer garbage-collection hook at batch {}", self.batch_counter);
        }

        Ok(segment_path)
    }
}

fn mix_background(
    vocals: &[f32],
    instrumental_path: &Path,
    start_secs: f64,
    duration_secs: f64,
    config: &Config,
) -> Result<Vec<f32>> {
    let (instrumental, sr) = wav::read_mono_f32(instrumental_path)?;
    let start = (start_secs * sr as f64) as usize;
    let end = ((start_secs + duration_secs) * sr as f64) as usize;
    let end = end.min(instrumental.len());
    let start = start.min(end);
    let background = &instrumental[start..end];

    let len = vocals.len().max(background.len());
    let mut mixed = Vec::with_capacity(len);
    for i in 0..len {
        let v = vocals.get(i).copied().unwrap_or(0.0) * config.vocals_volume;
        let b = background.get(i).copied().unwrap_or(0.0) * config.background_volume;
        mixed.push(v + b);
    }

    wav::normalize(&mut mixed, config.normalization_threshold);
    Ok(mixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> Config {
        Config::from_env().expect("Config::from_env falls back to defaults with no env set")
    }

    #[test]
    fn mix_background_respects_volume_and_normalization() {
        let dir = tempdir().unwrap();
        let instrumental_path = dir.path().join("instrumental.wav");
        let sr = 24_000;
        let instrumental = vec![1.0f32; sr as usize * 2];
        wav::write_mono_f32(&instrumental_path, &instrumental, sr).unwrap();

        let vocals = vec![1.0f32; sr as usize];
        let config = config();

        let mixed = mix_background(&vocals, &instrumental_path, 0.0, 1.0, &config).unwrap();

        assert_eq!(mixed.len(), vocals.len());
        let peak = mixed.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        assert!(peak <= config.normalization_threshold + 1e-4);
    }

    #[test]
    fn mix_background_clamps_the_window_to_the_instrumental_length() {
        let dir = tempdir().unwrap();
        let instrumental_path = dir.path().join("short.wav");
        let sr = 24_000;
        let instrumental = vec![0.5f32; sr as usize]; // 1 second only
        wav::write_mono_f32(&instrumental_path, &instrumental, sr).unwrap();

        let vocals = vec![0.2f32; sr as usize * 3];
        let config = config();

        // Request a window starting well past the instrumental's end; should
        // not panic and should still return audio the length of vocals.
        let mixed = mix_background(&vocals, &instrumental_path, 5.0, 3.0, &config).unwrap();
        assert_eq!(mixed.len(), vocals.len());
    }

    #[test]
    fn new_mixer_state_sizes_the_buffer_from_config() {
        let config = config();
        let state = MixerState::new(&config);
        assert_eq!(state.batch_counter, 0);
        assert!(state.audio_buffer.is_empty());
        assert_eq!(
            state.max_buffer_samples,
            (config.max_buffer_duration.as_secs_f64() * config.target_sr as f64) as usize
        );
    }
}
