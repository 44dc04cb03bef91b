use crate::chord_templates::{note_name, FLAT_KEY_ROOTS};
use crate::types::{KeyEstimate, KeyMode};

/// Krumhansl-Kessler major key profile (duration-weighted perception studies).
const MAJOR_PROFILE: [f64; 12] = [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];

/// Krumhansl-Kessler minor key profile.
const MINOR_PROFILE: [f64; 12] = [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

/// Detect the key of a pitch-class profile using the Krumhansl-Schmuckler algorithm.
///
/// Correlates the profile against all 24 major/minor key profiles. The best
/// Pearson correlation determines the detected key. A profile with no energy
/// has no key.
pub fn detect_key(profile: &[f64; 12]) -> Option<KeyEstimate> {
    let total: f64 = profile.iter().sum();
    if total <= 0.0 {
        return None;
    }

    let mut histogram = *profile;
    for h in &mut histogram {
        *h /= total;
    }

    // Correlate against all 24 key profiles (12 roots × 2 modes)
    let mut best_root: u8 = 0;
    let mut best_mode = KeyMode::Major;
    let mut best_corr = -1.0_f64;

    for root in 0..12u8 {
        // Rotate histogram so root = index 0
        let mut rotated = [0.0; 12];
        for (i, slot) in rotated.iter_mut().enumerate() {
            *slot = histogram[(i + root as usize) % 12];
        }

        let major_corr = pearson(&rotated, &MAJOR_PROFILE);
        if major_corr > best_corr {
            best_corr = major_corr;
            best_root = root;
            best_mode = KeyMode::Major;
        }

        let minor_corr = pearson(&rotated, &MINOR_PROFILE);
        if minor_corr > best_corr {
            best_corr = minor_corr;
            best_root = root;
            best_mode = KeyMode::Minor;
        }
    }

    Some(KeyEstimate {
        root: note_name(best_root, uses_flats(best_root)).to_string(),
        root_pitch_class: best_root,
        mode: best_mode,
        confidence: (best_corr * 10000.0).round() / 10000.0,
    })
}

/// Whether chords in a key rooted at `root_pitch_class` are spelled with flats.
pub fn uses_flats(root_pitch_class: u8) -> bool {
    FLAT_KEY_ROOTS.contains(&(root_pitch_class % 12))
}

/// Pearson correlation coefficient between two 12-element arrays.
fn pearson(x: &[f64; 12], y: &[f64; 12]) -> f64 {
    let x_mean: f64 = x.iter().sum::<f64>() / 12.0;
    let y_mean: f64 = y.iter().sum::<f64>() / 12.0;

    let mut num = 0.0;
    let mut x_sq = 0.0;
    let mut y_sq = 0.0;

    for i in 0..12 {
        let xd = x[i] - x_mean;
        let yd = y[i] - y_mean;
        num += xd * yd;
        x_sq += xd * xd;
        y_sq += yd * yd;
    }

    let denom = (x_sq * y_sq).sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    num / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale_profile(pcs: &[usize]) -> [f64; 12] {
        let mut p = [0.0; 12];
        for &pc in pcs {
            p[pc] += 1.0;
        }
        p
    }

    #[test]
    fn silent_profile_has_no_key() {
        assert!(detect_key(&[0.0; 12]).is_none());
    }

    #[test]
    fn c_major_scale_detected() {
        let mut profile = scale_profile(&[0, 2, 4, 5, 7, 9, 11]);
        // Tonic and dominant weigh more, as they do in real music
        profile[0] += 1.0;
        profile[7] += 0.5;

        let key = detect_key(&profile).unwrap();
        assert_eq!(key.root, "C");
        assert_eq!(key.mode, KeyMode::Major);
        assert!(key.confidence > 0.7, "confidence {} should be > 0.7", key.confidence);
    }

    #[test]
    fn a_minor_with_tonic_emphasis() {
        let mut profile = scale_profile(&[9, 11, 0, 2, 4, 5, 7]);
        profile[9] += 1.5;
        profile[4] += 0.5;

        let key = detect_key(&profile).unwrap();
        assert_eq!(key.root_pitch_class, 9);
        assert_eq!(key.mode, KeyMode::Minor);
    }

    #[test]
    fn flat_key_spelling() {
        let mut profile = scale_profile(&[1, 3, 5, 6, 8, 10, 0]);
        profile[1] += 1.0;
        profile[8] += 0.5;

        let key = detect_key(&profile).unwrap();
        if key.root_pitch_class == 1 {
            assert_eq!(key.root, "Db");
        }
    }

    #[test]
    fn pearson_identical_arrays() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let r = pearson(&a, &a);
        assert!((r - 1.0).abs() < 1e-10, "self-correlation should be 1.0, got {}", r);
    }
}
