use std::path::PathBuf;

/// The atomic unit carried end-to-end through the pipeline.
///
/// Source fields are set once by the Fetcher and never change again. Derived
/// fields are each owned by exactly one downstream stage (Slicer, TTS
/// Producer, Aligner, TimeStamper) and are `None`/zero until that stage runs.
/// We keep one struct with option-typed derived fields rather than a distinct
/// type per stage: the pipeline moves whole `Batch`es through channels, and a
/// single shape avoids a stage-indexed type for every hop.
#[derive(Debug, Clone)]
pub struct Sentence {
    pub task_id: uuid::Uuid,
    pub sequence: i32,

    // Source fields, immutable after fetch.
    pub original_text: String,
    pub translated_text: String,
    pub speaker: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub is_first: bool,
    pub is_last: bool,

    // Fetcher.
    pub target_duration_ms: i64,

    // Slicer.
    pub prompt_audio_path: Option<PathBuf>,

    // TTS Producer.
    pub generated_audio: Option<Vec<f32>>,
    pub duration_ms: f64,

    // Aligner.
    pub speed: f64,
    pub ending_silence_ms: f64,
    pub speech_duration_ms: f64,

    // TimeStamper.
    pub adjusted_start_ms: f64,
    pub adjusted_duration_ms: f64,
}

impl Sentence {
    /// Construct a freshly-fetched sentence; every derived field starts at
    /// its stage's "not yet visited" value.
    pub fn new_fetched(
        task_id: uuid::Uuid,
        sequence: i32,
        original_text: String,
        translated_text: String,
        speaker: String,
        start_ms: i64,
        end_ms: i64,
        is_first: bool,
        is_last: bool,
    ) -> Self {
        Self {
            task_id,
            sequence,
            target_duration_ms: end_ms - start_ms,
            original_text,
            translated_text,
            speaker,
            start_ms,
            end_ms,
            is_first,
            is_last,
            prompt_audio_path: None,
            generated_audio: None,
            duration_ms: 0.0,
            speed: 1.0,
            ending_silence_ms: 0.0,
            speech_duration_ms: 0.0,
            adjusted_start_ms: 0.0,
            adjusted_duration_ms: 0.0,
        }
    }

    /// `diff` used throughout the Aligner's proportional-correction math.
    pub fn duration_diff_ms(&self) -> f64 {
        self.duration_ms - self.target_duration_ms as f64
    }
}

/// A contiguous run of up to `TTS_BATCH_SIZE` sentences. Batch boundaries are
/// chosen once by the TTS Producer and preserved by every downstream stage.
#[derive(Debug, Clone)]
pub struct Batch {
    pub batch_index: u64,
    pub sentences: Vec<Sentence>,
}

impl Batch {
    pub fn new(batch_index: u64, sentences: Vec<Sentence>) -> Self {
        Self { batch_index, sentences }
    }
}

/// A stitched speaker-reference clip used as TTS prompt audio.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub id: String,
    pub speaker: String,
    pub total_duration_ms: i64,
    /// Source-timeline intervals (already merged/coalesced) that were
    /// stitched to build this clip.
    pub segments: Vec<(i64, i64)>,
    pub path: PathBuf,
}
