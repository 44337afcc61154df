//! Microphone level analysis
//!
//! Mirrors a browser analyser node: a Blackman-windowed FFT over the most
//! recent `fft_size` samples, bin magnitudes mapped from
//! `[min_decibels, max_decibels]` onto `0..=255`, averaged, then normalized
//! so that a mean of 128 reads as full scale.

use tracing::{debug, info};

use super::backend::MicrophoneStream;
use crate::config::AudioConfig;
use crate::error::{Result, VoiceError};

/// Mean byte magnitude that maps to a level of 1.0
const FULL_SCALE_BYTE: f32 = 128.0;

pub struct AudioLevelMonitor {
    stream: Option<MicrophoneStream>,
    analyser: SpectrumAnalyser,
    /// Most recent mono samples, oldest first
    window: Vec<f32>,
    latest: f32,
}

impl AudioLevelMonitor {
    /// Attach an analyser to a microphone stream
    ///
    /// The monitor takes ownership of the stream. A stream without an audio
    /// track is rejected and its tracks are released immediately.
    pub fn attach(mut stream: MicrophoneStream, config: &AudioConfig) -> Result<Self> {
        if !stream.has_audio_track() {
            stream.stop_tracks();
            return Err(VoiceError::Device(format!(
                "stream {} has no audio track",
                stream.label()
            )));
        }

        let fft_size = config.fft_size.max(32).next_power_of_two();
        info!(
            "Level monitor attached to {} (fft_size={}, range={}..{} dB)",
            stream.label(),
            fft_size,
            config.min_decibels,
            config.max_decibels
        );

        Ok(Self {
            stream: Some(stream),
            analyser: SpectrumAnalyser::new(fft_size, config.min_decibels, config.max_decibels),
            window: vec![0.0; fft_size],
            latest: 0.0,
        })
    }

    /// Current normalized amplitude in [0, 1]
    pub fn sample(&mut self) -> f32 {
        let Some(stream) = self.stream.as_mut() else {
            return 0.0;
        };

        let frames = stream.drain();
        if frames.is_empty() {
            return self.latest;
        }

        for frame in &frames {
            self.push_samples(&frame.mono_f32());
        }

        self.latest = self.analyser.level(&self.window);
        self.latest
    }

    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    /// Release the analyser and its stream. Idempotent.
    pub fn detach(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
            debug!("Level monitor detached from {}", stream.label());
        }
        self.latest = 0.0;
    }

    fn push_samples(&mut self, samples: &[f32]) {
        let size = self.window.len();
        if samples.len() >= size {
            self.window.copy_from_slice(&samples[samples.len() - size..]);
        } else {
            self.window.rotate_left(samples.len());
            let start = size - samples.len();
            self.window[start..].copy_from_slice(samples);
        }
    }
}

impl Drop for AudioLevelMonitor {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Frequency-domain magnitude analyser
struct SpectrumAnalyser {
    window_fn: Vec<f32>,
    tw_re: Vec<f32>,
    tw_im: Vec<f32>,
    min_db: f32,
    max_db: f32,
    real: Vec<f32>,
    imag: Vec<f32>,
}

impl SpectrumAnalyser {
    fn new(size: usize, min_db: f32, max_db: f32) -> Self {
        let (tw_re, tw_im) = twiddle_factors(size);
        Self {
            window_fn: blackman_window(size),
            tw_re,
            tw_im,
            min_db,
            max_db: if max_db > min_db { max_db } else { min_db + 1.0 },
            real: vec![0.0; size],
            imag: vec![0.0; size],
        }
    }

    /// Mean of the byte-scaled bin magnitudes, normalized and clamped to [0, 1]
    fn level(&mut self, samples: &[f32]) -> f32 {
        let n = self.window_fn.len();
        for i in 0..n {
            self.real[i] = samples[i] * self.window_fn[i];
            self.imag[i] = 0.0;
        }
        fft_in_place(&mut self.real, &mut self.imag, &self.tw_re, &self.tw_im);

        let bins = n / 2;
        let range = self.max_db - self.min_db;
        let mut total = 0.0f32;
        for k in 0..bins {
            let magnitude = (self.real[k].powi(2) + self.imag[k].powi(2)).sqrt() / n as f32;
            if magnitude <= 0.0 {
                continue;
            }
            let db = 20.0 * magnitude.log10();
            let byte = (255.0 * (db - self.min_db) / range).clamp(0.0, 255.0).floor();
            total += byte;
        }

        let mean = total / bins as f32;
        (mean / FULL_SCALE_BYTE).clamp(0.0, 1.0)
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    const PI: f32 = std::f32::consts::PI;
    (0..size)
        .map(|n| {
            let x = n as f32 / size as f32;
            0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
        })
        .collect()
}

fn twiddle_factors(n: usize) -> (Vec<f32>, Vec<f32>) {
    const PI: f32 = std::f32::consts::PI;
    (0..n / 2)
        .map(|k| {
            let angle = -2.0 * PI * k as f32 / n as f32;
            (angle.cos(), angle.sin())
        })
        .unzip()
}

/// Radix-2 Cooley-Tukey FFT; `real.len()` must be a power of two
fn fft_in_place(real: &mut [f32], imag: &mut [f32], tw_re: &[f32], tw_im: &[f32]) {
    let n = real.len();
    debug_assert!(n.is_power_of_two(), "FFT size must be power of 2");

    let mut j = 0usize;
    for i in 0..n {
        if i < j {
            real.swap(i, j);
            imag.swap(i, j);
        }
        let mut m = n >> 1;
        while m >= 1 && j >= m {
            j -= m;
            m >>= 1;
        }
        j += m;
    }

    let mut len = 2;
    while len <= n {
        let half = len / 2;
        let step = n / len;
        for start in (0..n).step_by(len) {
            for k in 0..half {
                let (wr, wi) = (tw_re[k * step], tw_im[k * step]);
                let a = start + k;
                let b = a + half;
                let tr = real[b] * wr - imag[b] * wi;
                let ti = real[b] * wi + imag[b] * wr;
                real[b] = real[a] - tr;
                imag[b] = imag[a] - ti;
                real[a] += tr;
                imag[a] += ti;
            }
        }
        len <<= 1;
    }
}
