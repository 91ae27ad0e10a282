pub mod separator_client;
pub mod simplifier;
pub mod tts_client;

pub use separator_client::{HttpSeparatorClient, SeparatorClient};
pub use simplifier::Simplifier;
pub use tts_client::{HttpTtsClient, TtsClient};
