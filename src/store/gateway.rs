use crate::error::{AppError, Result};
use crate::models::{MediaPaths, Sentence, TaskStatus};
use crate::store::object_store::ObjectStore;
use bytes::Bytes;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Typed façade over the two remote stores (Postgres KV + object store).
/// This is the only component that speaks the wire protocol of either;
/// every other component takes a `StoreGateway` handle. Both clients are
/// constructed once at startup and shared, matching the teacher's
/// process-wide `db: PgPool` / `navidrome_client: Arc<NavidromeClient>`
/// singletons.
#[derive(Clone)]
pub struct StoreGateway {
    db: PgPool,
    objects: Arc<dyn ObjectStore>,
}

impl StoreGateway {
    pub fn new(db: PgPool, objects: Arc<dyn ObjectStore>) -> Self {
        Self { db, objects }
    }

    /// Single batched read of every speech segment for a task, ordered by
    /// `sequence`. `is_last` is derived from `transcriptions.total_segments`
    /// rather than trusting a stored flag, so it always agrees with the row
    /// actually at the end of the ordered result.
    pub async fn get_segments(&self, task_id: Uuid) -> Result<Vec<Sentence>> {
        let task = sqlx::query_as::<_, TaskRow>("SELECT * FROM media_tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(task_id.to_string()))?;

        let transcription = sqlx::query_as::<_, TranscriptionRow>(
            "SELECT id, total_segments FROM transcriptions WHERE id = $1",
        )
        .bind(task.transcription_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(task.transcription_id.to_string()))?;

        let rows = sqlx::query_as::<_, SegmentRow>(
            "SELECT sequence, start_ms, end_ms, content_type, speaker, original_text, translated_text
             FROM transcription_segments
             WHERE transcription_id = $1 AND content_type = 'speech'
             ORDER BY sequence ASC",
        )
        .bind(task.transcription_id)
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        if rows.is_empty() {
            return Err(AppError::EmptyTranscription);
        }

        let max_sequence = transcription.total_segments;
        let last_sequence = rows.iter().map(|r| r.sequence).max().unwrap_or(0);

        let sentences = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                Sentence::new_fetched(
                    task_id,
                    row.sequence,
                    row.original_text,
                    row.translated_text,
                    row.speaker,
                    row.start_ms,
                    row.end_ms,
                    i == 0,
                    row.sequence == last_sequence || row.sequence == max_sequence,
                )
            })
            .collect();

        Ok(sentences)
    }

    pub async fn get_media_paths(&self, task_id: Uuid) -> Result<MediaPaths> {
        let task = sqlx::query_as::<_, TaskRow>("SELECT * FROM media_tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(task_id.to_string()))?;

        if task.audio_path.is_empty() || task.video_path.is_empty() {
            return Err(AppError::Validation(
                "task is missing audio_path or video_path".to_string(),
            ));
        }

        Ok(MediaPaths { audio_path: task.audio_path, video_path: task.video_path })
    }

    pub async fn download(&self, key: &str) -> Result<Bytes> {
        self.objects.download(key).await
    }

    pub async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        self.objects.upload(key, bytes, content_type).await
    }

    pub async fn object_exists(&self, key: &str) -> Result<bool> {
        self.objects.exists(key).await
    }

    /// Idempotent, retried with exponential backoff (3 attempts, 2x factor).
    /// Reads are never retried — only status writes, per the error-handling
    /// design (`StoreUnavailable` recovery column).
    pub async fn update_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut delay = Duration::from_millis(250);
        let mut last_err = None;

        for attempt in 0..3 {
            let result = sqlx::query(
                "UPDATE media_tasks SET status = $2, error_message = $3, updated_at = now()
                 WHERE id = $1",
            )
            .bind(task_id)
            .bind(status)
            .bind(error_message)
            .execute(&self.db)
            .await;

            match result {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        "update_task_status attempt {} failed for {}: {}",
                        attempt + 1,
                        task_id,
                        e
                    );
                    last_err = Some(e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }

        Err(AppError::StoreUnavailable(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<crate::models::Task> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM media_tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(task_id.to_string()))?;
        Ok(row.into())
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    status: TaskStatus,
    transcription_id: Uuid,
    audio_path: String,
    video_path: String,
    error_message: Option<String>,
    target_language: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<TaskRow> for crate::models::Task {
    fn from(row: TaskRow) -> Self {
        crate::models::Task {
            id: row.id,
            status: row.status,
            transcription_id: row.transcription_id,
            audio_path: row.audio_path,
            video_path: row.video_path,
            error_message: row.error_message,
            target_language: row.target_language,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TranscriptionRow {
    #[allow(dead_code)]
    id: Uuid,
    total_segments: i32,
}

#[derive(sqlx::FromRow)]
struct SegmentRow {
    sequence: i32,
    start_ms: i64,
    end_ms: i64,
    #[allow(dead_code)]
    content_type: String,
    speaker: String,
    original_text: String,
    translated_text: String,
}
