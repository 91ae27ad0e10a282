use crate::config::Config;
use crate::models::Batch;

/// Runs immediately after the Aligner, in the same W2 worker. Walks the
/// batch assigning each sentence its place on the monotonic output-audio
/// clock. The clock is owned by this one worker; nothing upstream (W1) or
/// downstream (W4) mutates it.
pub struct TimeStamperState {
    clock_ms: f64,
}

impl TimeStamperState {
    pub fn new() -> Self {
        Self { clock_ms: 0.0 }
    }

    pub fn clock_ms(&self) -> f64 {
        self.clock_ms
    }

    pub fn stamp_batch(&mut self, batch: &mut Batch, config: &Config) {
        for sentence in &mut batch.sentences {
            sentence.adjusted_start_ms = self.clock_ms;

            let Some(generated) = &sentence.generated_audio else {
                sentence.adjusted_duration_ms = 0.0;
                continue;
            };

            let raw_duration_ms = generated.len() as f64 / config.target_sr as f64 * 1000.0;
            sentence.adjusted_duration_ms = raw_duration_ms;
            self.clock_ms += raw_duration_ms;
        }
    }
}

impl Default for TimeStamperState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sentence;

    fn sentence(generated: Option<Vec<f32>>) -> Sentence {
        let mut s = Sentence::new_fetched(
            uuid::Uuid::nil(), 0, "o".into(), "t".into(), "A".into(), 0, 1000, true, true,
        );
        s.generated_audio = generated;
        s
    }

    #[test]
    fn clock_advances_monotonically_and_skips_missing_audio() {
        let config = Config::from_env().unwrap();
        let mut stamper = TimeStamperState::new();
        let mut batch = Batch::new(
            0,
            vec![
                sentence(Some(vec![0.0; config.target_sr as usize])),
                sentence(None),
                sentence(Some(vec![0.0; config.target_sr as usize / 2])),
            ],
        );

        stamper.stamp_batch(&mut batch, &config);

        assert_eq!(batch.sentences[0].adjusted_start_ms, 0.0);
        assert!(batch.sentences[1].adjusted_start_ms > batch.sentences[0].adjusted_start_ms);
        assert_eq!(batch.sentences[1].adjusted_duration_ms, 0.0);
        assert!(batch.sentences[2].adjusted_start_ms > batch.sentences[1].adjusted_start_ms);
    }
}
