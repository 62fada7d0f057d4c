//! WAV file I/O for playback sources and saved recordings.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::audio_block::AudioBlock;

#[derive(Error, Debug)]
pub enum WavError {
    #[error("WAV error: {0}")]
    Hound(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV file has no channels")]
    NoChannels,
}

/// A decoded file: interleaved f32 samples in [-1, 1] and the file's sample rate.
#[derive(Debug, Clone)]
pub struct DecodedWav {
    pub samples: AudioBlock,
    pub sample_rate: u32,
}

/// Decodes a WAV file. Integer samples are scaled by the format's positive full scale
/// (32767 for 16-bit), float samples are taken as-is.
pub fn read_wav(path: &Path) -> Result<DecodedWav, WavError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(WavError::NoChannels);
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let full_scale = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<_, _>>()?
        }
    };

    log::info!(
        "Decoded {}: {} channels, {} Hz, {} frames",
        path.display(),
        channels,
        spec.sample_rate,
        samples.len() / channels
    );

    Ok(DecodedWav {
        samples: AudioBlock::from_interleaved(samples, channels),
        sample_rate: spec.sample_rate,
    })
}

/// Writes `block` as 16-bit PCM. Samples are clamped to [-1, 1] and scaled by 32767.
pub fn write_pcm16(path: &Path, sample_rate: u32, block: &AudioBlock) -> Result<(), WavError> {
    let spec = hound::WavSpec {
        channels: block.channels() as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in block.as_slice() {
        writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Saves a capture to `dir/recording-<local timestamp>.wav`, creating `dir` if needed.
/// Returns `None` without touching the disk when nothing was recorded.
pub fn save_recording(
    dir: &Path,
    sample_rate: u32,
    block: &AudioBlock,
) -> Result<Option<PathBuf>, WavError> {
    if block.is_empty() {
        log::info!("No audio recorded.");
        return Ok(None);
    }
    fs::create_dir_all(dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let mut path = dir.join(format!("recording-{}.wav", stamp));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("recording-{}-{}.wav", stamp, n));
        n += 1;
    }
    write_pcm16(&path, sample_rate, block)?;
    log::info!("Saved recording to {}", path.display());
    Ok(Some(path))
}
