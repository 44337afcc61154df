pub mod backend;
pub mod chunk;
pub mod file;
pub mod level;

pub use backend::{AudioFrame, MicrophoneFeed, MicrophoneSource, MicrophoneStream};
pub use chunk::{assemble_wav, AudioBlob};
pub use file::{AudioFile, FileMicrophone};
pub use level::AudioLevelMonitor;
