//! WAV inspection and container unwrapping.

use hound::{SampleFormat, WavReader, WavSpec};
use std::io::Cursor;

/// Properties read from a WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Samples per channel.
    pub frames: u32,
    pub duration_ms: u64,
}

pub fn inspect_wav(bytes: &[u8]) -> Result<AudioInfo, hound::Error> {
    let (spec, frames) = frames_present(bytes)?;
    Ok(AudioInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        frames,
        duration_ms: u64::from(frames) * 1000 / u64::from(spec.sample_rate),
    })
}

/// Header and number of complete frames actually present in `bytes`.
///
/// Encoders writing to a pipe cannot seek back to patch the header, so the
/// declared data length may be a placeholder far past the end of the stream.
fn frames_present(bytes: &[u8]) -> Result<(WavSpec, u32), hound::Error> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(hound::Error::FormatError("sample rate is zero"));
    }
    if spec.channels == 0 {
        return Err(hound::Error::FormatError("channel count is zero"));
    }
    let declared = reader.duration();
    // The reader stops at the start of the data chunk's payload.
    let data_start = reader.into_inner().position();
    let available = (bytes.len() as u64).saturating_sub(data_start);
    let block_align =
        u64::from(spec.channels) * u64::from(spec.bits_per_sample.div_ceil(8)).max(1);
    let present = u32::try_from(available / block_align).unwrap_or(u32::MAX);
    Ok((spec, declared.min(present)))
}

/// Strip the WAV container, returning 16-bit little-endian interleaved samples.
///
/// 16-bit integer audio is copied as is. Other integer widths are shifted to 16
/// bits and float samples are clamped to `[-1, 1]` and scaled.
pub fn wav_to_pcm(bytes: &[u8]) -> Result<Vec<u8>, hound::Error> {
    let (spec, frames) = frames_present(bytes)?;
    let samples = frames as usize * usize::from(spec.channels);
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let mut pcm = Vec::with_capacity(samples * 2);
    match spec.sample_format {
        SampleFormat::Int if spec.bits_per_sample <= 16 => {
            let shift = 16 - u32::from(spec.bits_per_sample);
            for sample in reader.samples::<i16>().take(samples) {
                let sample = sample? << shift;
                pcm.extend_from_slice(&sample.to_le_bytes());
            }
        }
        SampleFormat::Int => {
            let shift = u32::from(spec.bits_per_sample) - 16;
            for sample in reader.samples::<i32>().take(samples) {
                let sample = (sample? >> shift) as i16;
                pcm.extend_from_slice(&sample.to_le_bytes());
            }
        }
        SampleFormat::Float => {
            for sample in reader.samples::<f32>().take(samples) {
                let sample = (sample?.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
                pcm.extend_from_slice(&sample.to_le_bytes());
            }
        }
    }
    Ok(pcm)
}
