//! Frame-based DSP over mono samples.

use std::f32::consts::PI;

use realfft::RealFftPlanner;

use crate::AnalysisError;

/// Lowest and highest frequencies folded into chroma.
const CHROMA_MIN_HZ: f32 = 55.0;
const CHROMA_MAX_HZ: f32 = 4200.0;

/// Tempo search range.
const MIN_BPM: f64 = 60.0;
const MAX_BPM: f64 = 200.0;

/// Compute a Hann window of the given size.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

fn frame_count(len: usize, frame_size: usize, hop_size: usize) -> usize {
    if len >= frame_size {
        (len - frame_size) / hop_size + 1
    } else {
        0
    }
}

/// Short-Time Fourier Transform.
///
/// Returns magnitude spectrogram: one `Vec` per frame, `fft_size / 2 + 1`
/// bins each. Input shorter than one frame is zero-padded to a single frame.
pub fn stft(samples: &[f32], fft_size: usize, hop_size: usize) -> Result<Vec<Vec<f32>>, AnalysisError> {
    let window = hann_window(fft_size);
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_size);

    let num_frames = frame_count(samples.len(), fft_size, hop_size).max(1);

    let mut spectrogram = Vec::with_capacity(num_frames);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_size;

        for (i, slot) in input.iter_mut().enumerate() {
            *slot = samples.get(start + i).copied().unwrap_or(0.0) * window[i];
        }

        fft.process(&mut input, &mut spectrum)
            .map_err(|e| AnalysisError::Analysis(format!("FFT failed: {}", e)))?;

        spectrogram.push(spectrum.iter().map(|c| c.norm()).collect());
    }

    Ok(spectrogram)
}

/// Compute RMS energy per frame.
pub fn rms_energy(samples: &[f32], frame_size: usize, hop_size: usize) -> Vec<f32> {
    (0..frame_count(samples.len(), frame_size, hop_size))
        .map(|i| {
            let frame = &samples[i * hop_size..i * hop_size + frame_size];
            let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
            (sum_sq / frame.len() as f32).sqrt()
        })
        .collect()
}

/// Compute spectral centroid per frame from a magnitude spectrogram, in Hz.
pub fn spectral_centroid(spectrogram: &[Vec<f32>], sample_rate: u32, fft_size: usize) -> Vec<f32> {
    let freq_resolution = sample_rate as f32 / fft_size as f32;

    spectrogram
        .iter()
        .map(|frame| {
            let total_magnitude: f32 = frame.iter().sum();
            if total_magnitude < 1e-10 {
                return 0.0;
            }
            let weighted_sum: f32 = frame
                .iter()
                .enumerate()
                .map(|(i, &mag)| i as f32 * freq_resolution * mag)
                .sum();
            weighted_sum / total_magnitude
        })
        .collect()
}

/// Compute zero-crossing rate per frame.
pub fn zero_crossing_rate(samples: &[f32], frame_size: usize, hop_size: usize) -> Vec<f32> {
    (0..frame_count(samples.len(), frame_size, hop_size))
        .map(|i| {
            let frame = &samples[i * hop_size..i * hop_size + frame_size];
            let crossings = frame.windows(2).filter(|w| w[0] * w[1] < 0.0).count();
            crossings as f32 / (frame.len() - 1).max(1) as f32
        })
        .collect()
}

/// Fold spectrogram bins into 12 pitch classes.
///
/// Each bin's power goes to the nearest equal-tempered pitch class
/// (A4 = 440 Hz). Frames are normalized so their loudest class is 1.0;
/// silent frames stay all-zero.
pub fn chroma_frames(spectrogram: &[Vec<f32>], sample_rate: u32, fft_size: usize) -> Vec<[f64; 12]> {
    let freq_resolution = sample_rate as f32 / fft_size as f32;
    let bins = spectrogram.first().map(Vec::len).unwrap_or(0);

    let bin_classes: Vec<Option<usize>> = (0..bins)
        .map(|bin| {
            let freq = bin as f32 * freq_resolution;
            if !(CHROMA_MIN_HZ..=CHROMA_MAX_HZ).contains(&freq) {
                return None;
            }
            let midi = 69.0 + 12.0 * (freq / 440.0).log2();
            Some((midi.round() as i32).rem_euclid(12) as usize)
        })
        .collect();

    spectrogram
        .iter()
        .map(|frame| {
            let mut chroma = [0.0_f64; 12];
            for (mag, pc) in frame.iter().zip(&bin_classes) {
                if let Some(pc) = pc {
                    chroma[*pc] += (*mag as f64) * (*mag as f64);
                }
            }
            let peak = chroma.iter().cloned().fold(0.0, f64::max);
            if peak > 1e-10 {
                for v in &mut chroma {
                    *v /= peak;
                }
            } else {
                chroma = [0.0; 12];
            }
            chroma
        })
        .collect()
}

/// Half-wave rectified spectral flux between consecutive frames.
pub fn onset_envelope(spectrogram: &[Vec<f32>]) -> Vec<f32> {
    let mut envelope = Vec::with_capacity(spectrogram.len());
    if spectrogram.is_empty() {
        return envelope;
    }
    envelope.push(0.0);
    for pair in spectrogram.windows(2) {
        let flux: f32 = pair[1]
            .iter()
            .zip(&pair[0])
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();
        envelope.push(flux);
    }
    envelope
}

/// Tempo in BPM from the onset envelope's autocorrelation.
///
/// `frame_rate` is envelope frames per second. Returns 0.0 when the
/// envelope is too short or flat to show a periodicity.
pub fn estimate_tempo(envelope: &[f32], frame_rate: f64) -> f64 {
    if frame_rate <= 0.0 || envelope.is_empty() {
        return 0.0;
    }

    let mean = envelope.iter().map(|&v| v as f64).sum::<f64>() / envelope.len() as f64;
    let centered: Vec<f64> = envelope.iter().map(|&v| v as f64 - mean).collect();

    let min_lag = ((60.0 * frame_rate / MAX_BPM).floor() as usize).max(1);
    let max_lag = (60.0 * frame_rate / MIN_BPM).ceil() as usize;
    if centered.len() <= max_lag {
        return 0.0;
    }

    let mut best_lag = 0;
    let mut best_corr = 0.0;
    for lag in min_lag..=max_lag {
        let corr: f64 = centered
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / (centered.len() - lag) as f64;
        // Multiples of the beat period score the same; keep the shortest
        if corr > best_corr + 1e-12 {
            best_corr = corr;
            best_lag = lag;
        }
    }

    if best_lag == 0 {
        return 0.0;
    }
    60.0 * frame_rate / best_lag as f64
}

/// Local maxima of the envelope that stand above mean + one standard deviation.
pub fn count_onsets(envelope: &[f32]) -> usize {
    if envelope.len() < 3 {
        return 0;
    }
    let n = envelope.len() as f64;
    let mean = envelope.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = envelope
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let threshold = mean + var.sqrt();

    envelope
        .windows(3)
        .filter(|w| w[1] > w[0] && w[1] >= w[2] && w[1] as f64 > threshold)
        .count()
}

pub fn mean(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 22050;

    fn sine(freq: f32, seconds: f32) -> Vec<f32> {
        let n = (SR as f32 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / SR as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn stft_frame_shape() {
        let spec = stft(&sine(440.0, 1.0), 2048, 512).unwrap();
        assert_eq!(spec.len(), (22050 - 2048) / 512 + 1);
        assert_eq!(spec[0].len(), 1025);
    }

    #[test]
    fn short_input_padded_to_one_frame() {
        let spec = stft(&[0.1; 100], 2048, 512).unwrap();
        assert_eq!(spec.len(), 1);
    }

    #[test]
    fn a440_lands_in_pitch_class_a() {
        let spec = stft(&sine(440.0, 0.5), 2048, 512).unwrap();
        let chroma = chroma_frames(&spec, SR, 2048);
        let frame = chroma[chroma.len() / 2];
        let argmax = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(argmax, 9);
        assert_eq!(frame[9], 1.0);
    }

    #[test]
    fn silence_gives_zero_chroma() {
        let spec = stft(&vec![0.0; 4096], 2048, 512).unwrap();
        let chroma = chroma_frames(&spec, SR, 2048);
        assert!(chroma.iter().all(|f| f.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn centroid_tracks_frequency() {
        let low = stft(&sine(220.0, 0.5), 2048, 512).unwrap();
        let high = stft(&sine(3520.0, 0.5), 2048, 512).unwrap();
        let low_c = mean(&spectral_centroid(&low, SR, 2048));
        let high_c = mean(&spectral_centroid(&high, SR, 2048));
        assert!(high_c > low_c * 4.0, "{} vs {}", high_c, low_c);
    }

    #[test]
    fn rms_of_constant_signal() {
        let rms = rms_energy(&[0.5; 4096], 2048, 512);
        assert!(rms.iter().all(|&r| (r - 0.5).abs() < 1e-6));
    }

    #[test]
    fn zcr_of_alternating_signal_is_one() {
        let alternating: Vec<f32> = (0..1024).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let zcr = zero_crossing_rate(&alternating, 512, 256);
        assert!(zcr.iter().all(|&z| (z - 1.0).abs() < 1e-6));
    }

    #[test]
    fn tempo_from_periodic_envelope() {
        // Impulse every 20 frames at 40 frames/s is 120 BPM
        let envelope: Vec<f32> = (0..400).map(|i| if i % 20 == 0 { 1.0 } else { 0.0 }).collect();
        let bpm = estimate_tempo(&envelope, 40.0);
        assert!((bpm - 120.0).abs() < 1e-6, "got {}", bpm);
        assert_eq!(count_onsets(&envelope), 19);
    }

    #[test]
    fn flat_envelope_has_no_tempo() {
        assert_eq!(estimate_tempo(&[1.0; 400], 40.0), 0.0);
        assert_eq!(count_onsets(&[1.0; 400]), 0);
    }
}
