use crate::clients::TtsClient;
use crate::config::Config;
use crate::models::{Batch, Sentence};
use crate::pipeline::fetcher::PathManager;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Reads the sliced sentences and drives the speech synthesizer one sentence
/// at a time, batching `TTS_BATCH_SIZE` at a stretch. Implemented as a spawned
/// task writing into a bounded channel rather than a hand-rolled async
/// generator, per the "async generators become channels" redesign note.
///
/// `model_lock` serializes calls into the synthesizer: the model is not
/// reentrant, so every producer for every concurrent task shares one mutex.
pub fn spawn(
    client: Arc<dyn TtsClient>,
    model_lock: Arc<Mutex<()>>,
    sentences: Vec<Sentence>,
    config: Arc<Config>,
    paths: PathManager,
) -> (tokio::task::JoinHandle<()>, mpsc::Receiver<Batch>) {
    let (tx, rx) = mpsc::channel(config.tts_queue_size);

    let handle = tokio::spawn(async move {
        let mut pending = Vec::with_capacity(config.tts_batch_size);
        let mut batch_index: u64 = 0;

        for mut sentence in sentences {
            let synthesized = synthesize_one(&client, &model_lock, &mut sentence, &config, &paths).await;
            if let Err(e) = synthesized {
                tracing::warn!(
                    sequence = sentence.sequence,
                    "speech synthesis failed, emitting empty audio: {e}"
                );
                sentence.generated_audio = None;
                sentence.duration_ms = 0.0;
            }

            pending.push(sentence);

            if pending.len() >= config.tts_batch_size {
                let batch = Batch::new(batch_index, std::mem::take(&mut pending));
                batch_index += 1;
                if tx.send(batch).await.is_err() {
                    return;
                }
            }
        }

        if !pending.is_empty() {
            let batch = Batch::new(batch_index, pending);
            let _ = tx.send(batch).await;
        }
    });

    (handle, rx)
}

pub(crate) async fn synthesize_one(
    client: &Arc<dyn TtsClient>,
    model_lock: &Arc<Mutex<()>>,
    sentence: &mut Sentence,
    config: &Config,
    paths: &PathManager,
) -> crate::error::Result<()> {
    let Some(prompt_path) = &sentence.prompt_audio_path else {
        return Ok(());
    };

    let prompt_audio = tokio::fs::read(prompt_path)
        .await
        .map_err(|e| crate::error::AppError::SynthesisFailed(sentence.sequence, e.to_string()))?;

    let (pcm, sr) = {
        let _guard = model_lock.lock().await;
        client.speech_synth(&prompt_audio, &sentence.translated_text).await?
    };

    let samples: Vec<f32> = pcm.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
    sentence.duration_ms = samples.len() as f64 / sr as f64 * 1000.0;
    sentence.generated_audio = Some(samples.clone());

    if config.save_tts_audio {
        let dir = paths.tts_output_dir();
        tokio::fs::create_dir_all(&dir).await.ok();
        let out = dir.join(format!(
            "sentence_{:04}_{}.wav",
            sentence.sequence, sentence.speaker
        ));
        let _ = crate::wav::write_mono_f32(&out, &samples, sr);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result as AppResult};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct FakeTtsClient {
        sample_rate: u32,
        fail: bool,
    }

    #[async_trait]
    impl TtsClient for FakeTtsClient {
        async fn speech_synth(&self, _prompt_audio: &[u8], text: &str) -> AppResult<(Vec<i16>, u32)> {
            if self.fail {
                return Err(AppError::SynthesisFailed(0, "forced failure".to_string()));
            }
            let samples = vec![1000i16; text.len().max(1) * 10];
            Ok((samples, self.sample_rate))
        }
    }

    fn config() -> Config {
        Config::from_env().expect("Config::from_env falls back to defaults with no env set")
    }

    fn sentence_with_prompt(sequence: i32, prompt_path: std::path::PathBuf) -> Sentence {
        let mut s = Sentence::new_fetched(
            uuid::Uuid::nil(),
            sequence,
            "orig".into(),
            "hello there".into(),
            "A".into(),
            0,
            1000,
            sequence == 0,
            false,
        );
        s.prompt_audio_path = Some(prompt_path);
        s
    }

    #[tokio::test]
    async fn synthesize_one_fills_in_duration_and_audio() {
        let dir = tempdir().unwrap();
        let prompt_path = dir.path().join("prompt.wav");
        tokio::fs::write(&prompt_path, b"not really a wav").await.unwrap();

        let client: Arc<dyn TtsClient> = Arc::new(FakeTtsClient { sample_rate: 24_000, fail: false });
        let model_lock = Arc::new(Mutex::new(()));
        let mut sentence = sentence_with_prompt(0, prompt_path);
        let config = config();
        let paths = PathManager::new(dir.path().to_str().unwrap(), uuid::Uuid::nil());

        synthesize_one(&client, &model_lock, &mut sentence, &config, &paths)
            .await
            .unwrap();

        assert!(sentence.generated_audio.is_some());
        assert!(sentence.duration_ms > 0.0);
    }

    #[tokio::test]
    async fn synthesize_one_without_prompt_audio_is_a_noop() {
        let dir = tempdir().unwrap();
        let client: Arc<dyn TtsClient> = Arc::new(FakeTtsClient { sample_rate: 24_000, fail: false });
        let model_lock = Arc::new(Mutex::new(()));
        let mut sentence = Sentence::new_fetched(
            uuid::Uuid::nil(),
            0,
            "orig".into(),
            "trans".into(),
            "A".into(),
            0,
            1000,
            true,
            true,
        );
        let config = config();
        let paths = PathManager::new(dir.path().to_str().unwrap(), uuid::Uuid::nil());

        synthesize_one(&client, &model_lock, &mut sentence, &config, &paths)
            .await
            .unwrap();

        assert!(sentence.generated_audio.is_none());
    }

    #[tokio::test]
    async fn spawn_emits_batches_of_configured_size_and_flushes_the_remainder() {
        let dir = tempdir().unwrap();
        let prompt_path = dir.path().join("prompt.wav");
        tokio::fs::write(&prompt_path, b"not really a wav").await.unwrap();

        let client: Arc<dyn TtsClient> = Arc::new(FakeTtsClient { sample_rate: 24_000, fail: false });
        let model_lock = Arc::new(Mutex::new(()));
        let mut config = config();
        config.tts_batch_size = 2;
        let config = Arc::new(config);
        let paths = PathManager::new(dir.path().to_str().unwrap(), uuid::Uuid::nil());

        let sentences: Vec<Sentence> =
            (0..5).map(|i| sentence_with_prompt(i, prompt_path.clone())).collect();

        let (handle, mut rx) = spawn(client, model_lock, sentences, config, paths);

        let mut batches = Vec::new();
        while let Some(batch) = rx.recv().await {
            batches.push(batch);
        }
        handle.await.unwrap();

        assert_eq!(batches.len(), 3); // 2 + 2 + 1
        assert_eq!(batches[2].sentences.len(), 1);
        let total: usize = batches.iter().map(|b| b.sentences.len()).sum();
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn synthesis_failure_emits_empty_audio_instead_of_stopping_the_batch() {
        let dir = tempdir().unwrap();
        let prompt_path = dir.path().join("prompt.wav");
        tokio::fs::write(&prompt_path, b"not really a wav").await.unwrap();

        let client: Arc<dyn TtsClient> = Arc::new(FakeTtsClient { sample_rate: 24_000, fail: true });
        let model_lock = Arc::new(Mutex::new(()));
        let mut config = config();
        config.tts_batch_size = 1;
        let config = Arc::new(config);
        let paths = PathManager::new(dir.path().to_str().unwrap(), uuid::Uuid::nil());

        let sentences = vec![sentence_with_prompt(0, prompt_path)];
        let (handle, mut rx) = spawn(client, model_lock, sentences, config, paths);

        let batch = rx.recv().await.expect("one batch should still be emitted");
        handle.await.unwrap();

        assert!(batch.sentences[0].generated_audio.is_none());
        assert_eq!(batch.sentences[0].duration_ms, 0.0);
    }
}
