use std::io::Cursor;
use tracing::debug;

use super::backend::AudioFrame;
use crate::error::{Result, VoiceError};

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// A finished recording, ready for the transcription boundary
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Concatenate captured chunks, in order, into one 16-bit PCM WAV blob
///
/// The format comes from the first chunk; `sample_rate`/`channels` are used
/// when there are no chunks at all.
pub fn assemble_wav(chunks: &[AudioFrame], sample_rate: u32, channels: u16) -> Result<AudioBlob> {
    let (sample_rate, channels) = chunks
        .first()
        .map(|c| (c.sample_rate, c.channels))
        .unwrap_or((sample_rate, channels));

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| VoiceError::Encoding(e.to_string()))?;

        for chunk in chunks {
            if chunk.sample_rate != sample_rate || chunk.channels != channels {
                return Err(VoiceError::Encoding(format!(
                    "chunk format changed mid-recording ({}Hz/{}ch, expected {}Hz/{}ch)",
                    chunk.sample_rate, chunk.channels, sample_rate, channels
                )));
            }
            for &sample in &chunk.samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| VoiceError::Encoding(e.to_string()))?;
            }
        }

        writer
            .finalize()
            .map_err(|e| VoiceError::Encoding(e.to_string()))?;
    }

    let bytes = cursor.into_inner();
    debug!(
        "Assembled {} chunks into {} byte WAV blob",
        chunks.len(),
        bytes.len()
    );

    Ok(AudioBlob {
        bytes,
        mime_type: WAV_MIME_TYPE,
        sample_rate,
        channels,
    })
}
