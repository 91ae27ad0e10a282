use crate::clients::{SeparatorClient, Simplifier, TtsClient};
use crate::config::Config;
use crate::error::Result;
use crate::models::{Batch, TaskStatus};
use crate::pipeline::task_manager::TaskManager;
use crate::pipeline::{aligner, fetcher, hls_publisher::HlsPublisher, mixer::MixerState, timestamper, tts_producer};
use crate::store::StoreGateway;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use uuid::Uuid;

/// Process-wide handles the orchestrator wires into one run. Shared across
/// every concurrent task; per-task state (the TTS model mutex, scratch
/// paths) is constructed fresh inside `run_complete_tts_pipeline`.
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<StoreGateway>,
    pub tts_client: Arc<dyn TtsClient>,
    pub separator_client: Option<Arc<dyn SeparatorClient>>,
    pub simplifier: Option<Arc<Simplifier>>,
    pub config: Arc<Config>,
    /// System-wide cap on concurrent object-store uploads, shared by every
    /// task running in this process.
    pub upload_semaphore: Arc<Semaphore>,
}

/// Runs the full bounded-queue pipeline for one task to completion. Four
/// concurrent workers (TTS producer, Align+Stamp, Video prep, Compose)
/// connected by two bounded channels; back-pressure propagates purely
/// through the channels filling up. Always cleans the scratch directory on
/// exit, success or failure.
#[tracing::instrument(skip(collaborators), fields(task_id = %task_id))]
pub async fn run_complete_tts_pipeline(collaborators: Collaborators, task_id: Uuid) -> Result<()> {
    let result = run_inner(&collaborators, task_id).await;

    let scratch_root = fetcher::PathManager::new(&collaborators.config.scratch_root, task_id).root;
    let _ = tokio::fs::remove_dir_all(&scratch_root).await;

    match &result {
        Ok(()) => {
            collaborators
                .gateway
                .update_task_status(task_id, TaskStatus::Completed, None)
                .await?;
        }
        Err(e) => {
            tracing::error!("task {task_id} failed: {e}");
            collaborators
                .gateway
                .update_task_status(task_id, TaskStatus::Error, Some(&e.to_string()))
                .await?;
        }
    }

    result
}

async fn run_inner(collaborators: &Collaborators, task_id: Uuid) -> Result<()> {
    let Collaborators { gateway, tts_client, separator_client, simplifier, config, upload_semaphore } =
        collaborators;

    gateway.update_task_status(task_id, TaskStatus::Processing, None).await?;

    let fetched = fetcher::fetch(
        gateway.clone(),
        separator_client.clone(),
        config.clone(),
        task_id,
    )
    .await?;

    let model_lock = Arc::new(Mutex::new(()));
    let (q1_tx, q1_rx) = mpsc::channel::<Batch>(config.tts_queue_size);
    let (q2_tx, q2_rx) = mpsc::channel::<Batch>(config.aligned_queue_size);
    let (video_tx, video_rx) = oneshot::channel::<Result<PathBuf>>();

    let mut tasks = TaskManager::new();

    // W1: TTS producer.
    {
        let client = tts_client.clone();
        let model_lock = model_lock.clone();
        let sentences = fetched.sentences;
        let config = config.clone();
        let paths = fetched.paths.clone();
        tasks.spawn("tts_producer", async move {
            let (handle, mut rx) = tts_producer::spawn(client, model_lock, sentences, config, paths);
            while let Some(batch) = rx.recv().await {
                if q1_tx.send(batch).await.is_err() {
                    break;
                }
            }
            drop(q1_tx);
            let _ = handle.await;
        });
    }

    // W2: Align + Stamp.
    {
        let simplifier = simplifier.clone();
        let tts_client = tts_client.clone();
        let model_lock = model_lock.clone();
        let config = config.clone();
        let paths = fetched.paths.clone();
        let mut q1_rx = q1_rx;
        tasks.spawn("align_and_stamp", async move {
            let mut stamper = timestamper::TimeStamperState::new();
            while let Some(mut batch) = q1_rx.recv().await {
                if let Err(e) = aligner::align_batch(
                    &mut batch,
                    &config,
                    simplifier.as_deref(),
                    &tts_client,
                    &model_lock,
                    &paths,
                )
                .await
                {
                    tracing::warn!("batch {} failed alignment: {e}", batch.batch_index);
                }
                stamper.stamp_batch(&mut batch, &config);
                if q2_tx.send(batch).await.is_err() {
                    break;
                }
            }
        });
    }

    // W3: Video prep.
    {
        let video_future = fetched.video_future;
        tasks.spawn("video_prep", async move {
            let result = match video_future.await {
                Ok(inner) => inner,
                Err(e) => Err(crate::error::AppError::VideoCutFailed(e.to_string())),
            };
            let _ = video_tx.send(result);
        });
    }

    // W4: Compose.
    let merge_result = {
        let gateway = gateway.clone();
        let config = config.clone();
        let instrumental_path = fetched.instrumental_path.clone();
        let segments_dir = fetched.paths.segments_dir();
        let upload_semaphore = upload_semaphore.clone();
        let mut q2_rx = q2_rx;
        let (merge_tx, merge_rx) = oneshot::channel::<Result<PathBuf>>();

        tasks.spawn("compose", async move {
            let video_path = match video_rx.await {
                Ok(Ok(path)) => path,
                Ok(Err(e)) => {
                    let _ = merge_tx.send(Err(e));
                    return;
                }
                Err(_) => {
                    let _ = merge_tx.send(Err(crate::error::AppError::VideoCutFailed(
                        "video worker dropped".to_string(),
                    )));
                    return;
                }
            };

            let publisher = match HlsPublisher::create(
                gateway.clone(),
                config.clone(),
                task_id,
                segments_dir.clone(),
                upload_semaphore,
            )
            .await
            {
                Ok(p) => p,
                Err(e) => {
                    let _ = merge_tx.send(Err(e));
                    return;
                }
            };

            let mut mixer = MixerState::new(&config);
            let mut mp4_paths = Vec::new();
            let mut part_index: u64 = 0;

            while let Some(batch) = q2_rx.recv().await {
                let segment = match mixer
                    .process_batch(&batch, instrumental_path.as_deref(), &video_path, &segments_dir, &config)
                    .await
                {
                    Ok(Some(path)) => path,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!("batch {} compose failed: {e}", batch.batch_index);
                        continue;
                    }
                };

                if let Err(e) = publisher.add_segment(&segment, part_index).await {
                    tracing::warn!("batch {} HLS publish failed: {e}", batch.batch_index);
                }
                part_index += 1;
                mp4_paths.push(segment);
            }

            let outcome = publisher.finalize_merge(&mp4_paths, task_id).await;
            let _ = merge_tx.send(outcome);
        });

        merge_rx
    };

    tasks.shutdown().await;

    merge_result.await.map_err(|_| {
        crate::error::AppError::Internal(anyhow::anyhow!("compose worker dropped without a result"))
    })??;

    Ok(())
}
