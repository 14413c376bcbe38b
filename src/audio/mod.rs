//! Waveform buffers, WAV output and chunk stitching.

pub mod stitch;

use std::path::{Path, PathBuf};

use crate::TtsError;

pub use stitch::{combine, crossfade_append, fade_samples, DEFAULT_FADE_MS};

/// Audio rendered for one text chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Index of the [`crate::text::TextChunk`] this audio was rendered from.
    pub index: usize,
    pub samples: Vec<f32>,
}

/// A mono waveform at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio (24000 for the supported models)
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Duration floored to whole seconds, as reported in episode metadata.
    pub fn whole_seconds(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 / self.sample_rate as u64
    }

    /// Write the audio as a 16-bit PCM mono WAV file.
    ///
    /// Samples go to a `.partial` sibling first and are renamed into place, so
    /// a failed write never leaves a truncated file at `path`.
    pub fn write_wav(&self, path: &Path) -> Result<(), TtsError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let partial = partial_path(path);
        let written = (|| -> Result<(), hound::Error> {
            let mut writer = hound::WavWriter::create(&partial, spec)?;
            for &sample in &self.samples {
                let clamped = sample.clamp(-1.0, 1.0);
                writer.write_sample((clamped * i16::MAX as f32) as i16)?;
            }
            writer.finalize()
        })();

        if let Err(e) = written {
            let _ = std::fs::remove_file(&partial);
            return Err(e.into());
        }
        std::fs::rename(&partial, path)?;
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

/// Whole-second duration read from a WAV file header.
pub fn probe_duration(path: &Path) -> Result<u64, TtsError> {
    let reader = hound::WavReader::open(path)?;
    let rate = reader.spec().sample_rate;
    if rate == 0 {
        return Ok(0);
    }
    Ok(reader.duration() as u64 / rate as u64)
}
