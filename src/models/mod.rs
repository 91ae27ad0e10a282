pub mod playlist;
pub mod sentence;
pub mod task;

pub use playlist::{HlsPlaylist, PlaylistSegment};
pub use sentence::{AudioClip, Batch, Sentence};
pub use task::{MediaPaths, Task, TaskStatus};
