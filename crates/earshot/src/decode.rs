//! Audio decoding and resampling.
//!
//! WAV decodes through hound and is always available. MP3/FLAC/OGG go
//! through symphonia when the `symphonia-decode` feature is enabled.

use std::io::Cursor;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::AnalysisError;

/// Decoded audio, interleaved.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples (L, R, L, R, ...)
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl DecodedAudio {
    /// Total number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average all channels into one.
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// Decode WAV audio using hound.
pub fn decode_wav(data: &[u8]) -> Result<DecodedAudio, AnalysisError> {
    let reader = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| AnalysisError::Decode(format!("failed to parse WAV header: {}", e)))?;

    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AnalysisError::Decode(format!("failed to read float samples: {}", e)))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AnalysisError::Decode(format!("failed to read int samples: {}", e)))?
        }
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Decode audio using symphonia (MP3, FLAC, OGG, etc.)
#[cfg(feature = "symphonia-decode")]
pub fn decode_audio_symphonia(data: &[u8], extension: Option<&str>) -> Result<DecodedAudio, AnalysisError> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let decode_err = |what: &str, e: SymphoniaError| AnalysisError::Decode(format!("{}: {}", what, e));

    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_err("failed to probe audio format", e))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AnalysisError::Decode("no audio track found".into()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AnalysisError::Decode("no sample rate".into()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err("failed to create decoder", e))?;

    let track_id = track.id;
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(decode_err("failed to read packet", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Corrupt frame; skip it and keep going
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::debug!(msg, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(decode_err("failed to decode packet", e)),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend(sample_buf.samples());
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Decode audio from raw bytes.
///
/// Tries WAV first (hound), then symphonia formats if the feature is enabled.
/// `extension` is a format hint for symphonia.
pub fn decode_audio(data: &[u8], extension: Option<&str>) -> Result<DecodedAudio, AnalysisError> {
    if data.len() >= 4 && &data[0..4] == b"RIFF" {
        return decode_wav(data);
    }

    #[cfg(feature = "symphonia-decode")]
    {
        decode_audio_symphonia(data, extension)
    }

    #[cfg(not(feature = "symphonia-decode"))]
    {
        Err(AnalysisError::Decode(format!(
            "unsupported audio format {} (enable symphonia-decode feature for MP3/FLAC/OGG)",
            extension.unwrap_or("<unknown>")
        )))
    }
}

/// Resample mono samples with a sinc interpolator.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AnalysisError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| AnalysisError::Analysis(format!("resampler error: {}", e)))?;

    let mut output = resampler
        .process(&[samples], None)
        .map_err(|e| AnalysisError::Analysis(format!("resample failed: {}", e)))?;

    Ok(output.pop().unwrap_or_default())
}
