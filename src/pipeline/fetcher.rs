use crate::clients::SeparatorClient;
use crate::config::Config;
use crate::error::Result;
use crate::models::{AudioClip, Sentence};
use crate::pipeline::slicer;
use crate::store::StoreGateway;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Scratch-directory layout for one task. Centralizing the paths here keeps
/// every stage from re-deriving `<scratch>/...` by hand.
#[derive(Debug, Clone)]
pub struct PathManager {
    pub root: PathBuf,
}

impl PathManager {
    pub fn new(scratch_root: &str, task_id: Uuid) -> Self {
        Self { root: Path::new(scratch_root).join(task_id.to_string()) }
    }

    pub fn original_audio(&self) -> PathBuf {
        self.root.join("original_audio.wav")
    }

    pub fn vocals(&self) -> PathBuf {
        self.root.join("vocals.wav")
    }

    pub fn instrumental(&self) -> PathBuf {
        self.root.join("instrumental.wav")
    }

    pub fn silent_video(&self, basename: &str) -> PathBuf {
        self.root.join(format!("silent_{basename}"))
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.root.join("segments")
    }

    pub fn tts_output_dir(&self) -> PathBuf {
        self.root.join("tts_output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_scoped_under_the_task_id() {
        let task_id = Uuid::nil();
        let paths = PathManager::new("/scratch", task_id);
        assert_eq!(paths.root, PathBuf::from(format!("/scratch/{task_id}")));
        assert_eq!(paths.original_audio(), paths.root.join("original_audio.wav"));
        assert_eq!(paths.vocals(), paths.root.join("vocals.wav"));
        assert_eq!(paths.instrumental(), paths.root.join("instrumental.wav"));
        assert_eq!(paths.segments_dir(), paths.root.join("segments"));
        assert_eq!(paths.tts_output_dir(), paths.root.join("tts_output"));
    }

    #[test]
    fn silent_video_keeps_the_original_basename() {
        let paths = PathManager::new("/scratch", Uuid::nil());
        assert_eq!(
            paths.silent_video("clip.mp4"),
            paths.root.join("silent_clip.mp4")
        );
    }
}

pub struct FetchResult {
    pub sentences: Vec<Sentence>,
    pub clips: Vec<AudioClip>,
    pub vocals_path: PathBuf,
    pub instrumental_path: Option<PathBuf>,
    pub video_future: tokio::task::JoinHandle<Result<PathBuf>>,
    pub paths: PathManager,
}

#[tracing::instrument(skip(gateway, separator, config))]
pub async fn fetch(
    gateway: Arc<StoreGateway>,
    separator: Option<Arc<dyn SeparatorClient>>,
    config: Arc<Config>,
    task_id: Uuid,
) -> Result<FetchResult> {
    let (sentences, media_paths) = tokio::try_join!(
        gateway.get_segments(task_id),
        gateway.get_media_paths(task_id),
    )?;

    let paths = PathManager::new(&config.scratch_root, task_id);
    tokio::fs::create_dir_all(&paths.root).await.ok();

    let video_basename = media_paths
        .video_path
        .rsplit('/')
        .next()
        .unwrap_or("video.mp4")
        .to_string();

    let video_future = {
        let gateway = gateway.clone();
        let paths = paths.clone();
        let video_key = media_paths.video_path.clone();
        tokio::spawn(async move {
            let bytes = gateway.download(&video_key).await?;
            let out = paths.silent_video(&video_basename);
            tokio::fs::write(&out, &bytes)
                .await
                .map_err(|e| crate::error::AppError::VideoCutFailed(e.to_string()))?;
            Ok(out)
        })
    };

    let audio_bytes = gateway.download(&media_paths.audio_path).await?;
    tokio::fs::write(paths.original_audio(), &audio_bytes)
        .await
        .map_err(|e| crate::error::AppError::Internal(e.into()))?;

    let (vocals_path, instrumental_path) = match &separator {
        Some(separator) => match separator.separate(&audio_bytes).await {
            Ok((vocals, instrumental)) => {
                tokio::fs::write(paths.vocals(), &vocals).await.ok();
                tokio::fs::write(paths.instrumental(), &instrumental).await.ok();
                (paths.vocals(), Some(paths.instrumental()))
            }
            Err(e) => {
                tracing::warn!("vocal separation failed, falling back to original audio: {e}");
                (paths.original_audio(), None)
            }
        },
        None => (paths.original_audio(), None),
    };

    let mut sentences = sentences;
    let clips = match slicer::slice(&mut sentences, &vocals_path, &paths.root, &config) {
        Ok(clips) => clips,
        Err(e) => {
            tracing::warn!("audio slicing degraded to un-sliced sentences: {e}");
            Vec::new()
        }
    };

    Ok(FetchResult {
        sentences,
        clips,
        vocals_path,
        instrumental_path,
        video_future,
        paths,
    })
}
