use std::f64::consts::PI;

use image::imageops::FilterType;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::outfit::types::{HistoryEntry, WardrobeItem};

pub const DEFAULT_THRESHOLD: u32 = 5;

const SAMPLE_SIZE: usize = 32;
const HASH_SIZE: usize = 8;
const TONE_LEVELS: u32 = 7;
/// AC coefficients below this (luma 0..1, orthonormal DCT) are treated as
/// compression noise.
const NOISE_FLOOR: f64 = 0.02;
const RELATIVE_NOISE_FLOOR: f64 = 1e-3;

/// cos((2x + 1) * u * pi / 64) for the low-frequency rows we keep.
static COSINES: Lazy<[[f64; SAMPLE_SIZE]; HASH_SIZE]> = Lazy::new(|| {
    let mut table = [[0.0; SAMPLE_SIZE]; HASH_SIZE];
    for (u, row) in table.iter_mut().enumerate() {
        for (x, value) in row.iter_mut().enumerate() {
            let angle = ((2 * x + 1) as f64) * (u as f64) * PI / (2.0 * SAMPLE_SIZE as f64);
            *value = angle.cos();
        }
    }
    table
});

/// Perceptual fingerprint: a 64-bit DCT structure hash plus a thermometer
/// coded mean tone per RGB channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub structure: u64,
    pub tone: u32,
}

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let decoded = image::load_from_memory(bytes)?;
        let sample = decoded
            .resize_exact(SAMPLE_SIZE as u32, SAMPLE_SIZE as u32, FilterType::Lanczos3)
            .to_rgb8();

        let mut luma = [[0.0f64; SAMPLE_SIZE]; SAMPLE_SIZE];
        let mut sums = [0.0f64; 3];
        for (x, y, pixel) in sample.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            sums[0] += r as f64;
            sums[1] += g as f64;
            sums[2] += b as f64;
            luma[y as usize][x as usize] =
                (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) / 255.0;
        }

        let pixel_count = (SAMPLE_SIZE * SAMPLE_SIZE) as f64;
        let mut tone = 0u32;
        for (channel, sum) in sums.iter().enumerate() {
            let level = ((sum / pixel_count) / 32.0)
                .floor()
                .clamp(0.0, TONE_LEVELS as f64) as u32;
            let code = (1u32 << level) - 1;
            tone |= code << (channel as u32 * TONE_LEVELS);
        }

        Ok(Fingerprint {
            structure: structure_hash(&luma),
            tone,
        })
    }

    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.structure ^ other.structure).count_ones() + (self.tone ^ other.tone).count_ones()
    }
}

fn dct_scale(k: usize) -> f64 {
    if k == 0 {
        (1.0 / SAMPLE_SIZE as f64).sqrt()
    } else {
        (2.0 / SAMPLE_SIZE as f64).sqrt()
    }
}

fn structure_hash(luma: &[[f64; SAMPLE_SIZE]; SAMPLE_SIZE]) -> u64 {
    let cosines = &*COSINES;
    let mut coefficients = [0.0f64; HASH_SIZE * HASH_SIZE];
    for u in 0..HASH_SIZE {
        for v in 0..HASH_SIZE {
            let mut sum = 0.0;
            for (y, row) in luma.iter().enumerate() {
                let vertical = cosines[u][y];
                for (x, value) in row.iter().enumerate() {
                    sum += value * vertical * cosines[v][x];
                }
            }
            coefficients[u * HASH_SIZE + v] = dct_scale(u) * dct_scale(v) * sum;
        }
    }

    // DC only carries brightness, which the tone code already covers.
    let ac = &mut coefficients[1..];
    let peak = ac.iter().fold(0.0f64, |peak, value| peak.max(value.abs()));
    let floor = NOISE_FLOOR.max(RELATIVE_NOISE_FLOOR * peak);
    for value in ac.iter_mut() {
        if value.abs() < floor {
            *value = 0.0;
        }
    }

    let mut sorted = [0.0f64; HASH_SIZE * HASH_SIZE - 1];
    sorted.copy_from_slice(&*ac);
    sorted.sort_by(|a, b| a.total_cmp(b));
    let median = sorted[sorted.len() / 2];

    // Zeroed coefficients never set a bit, so re-encoding noise in flat
    // regions of the spectrum cannot flip them.
    ac.iter()
        .enumerate()
        .filter(|(_, value)| **value != 0.0 && **value > median)
        .fold(0u64, |hash, (index, _)| hash | (1u64 << (index + 1)))
}

/// Anything holding a previously seen image.
pub trait DuplicateCandidate {
    fn candidate_image(&self) -> Option<&[u8]>;
}

impl DuplicateCandidate for HistoryEntry {
    fn candidate_image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }
}

impl DuplicateCandidate for WardrobeItem {
    fn candidate_image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }
}

impl DuplicateCandidate for Vec<u8> {
    fn candidate_image(&self) -> Option<&[u8]> {
        Some(self.as_slice())
    }
}

#[derive(Debug)]
pub struct DuplicateMatch<'a, C> {
    pub candidate: &'a C,
    pub index: usize,
    /// `None` when the match was decided by byte comparison.
    pub distance: Option<u32>,
}

/// A new image checked against a caller-scoped collection, most recent first.
/// A match borrows from the candidates only, never from the new image.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateQuery<'i, 'a, C> {
    pub image: &'i [u8],
    pub candidates: &'a [C],
    pub threshold: u32,
}

impl<'i, 'a, C: DuplicateCandidate> DuplicateQuery<'i, 'a, C> {
    pub fn new(image: &'i [u8], candidates: &'a [C]) -> Self {
        DuplicateQuery {
            image,
            candidates,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn run(&self) -> Option<DuplicateMatch<'a, C>> {
        find_duplicate(self.image, self.candidates, self.threshold)
    }
}

/// Returns the first candidate within `threshold`, scanning in the given
/// order. Threshold 0 accepts byte-identical images only. When either side
/// cannot be decoded the comparison falls back to exact bytes.
pub fn find_duplicate<'a, C: DuplicateCandidate>(
    image: &[u8],
    candidates: &'a [C],
    threshold: u32,
) -> Option<DuplicateMatch<'a, C>> {
    if image.is_empty() {
        return None;
    }

    let upload_print = if threshold == 0 {
        None
    } else {
        match Fingerprint::of(image) {
            Ok(fingerprint) => Some(fingerprint),
            Err(err) => {
                debug!("New image could not be fingerprinted, comparing bytes: {err}");
                None
            }
        }
    };

    for (index, candidate) in candidates.iter().enumerate() {
        let Some(stored) = candidate.candidate_image() else {
            continue;
        };
        if stored.is_empty() {
            continue;
        }

        let distance = match upload_print {
            Some(upload_print) => match Fingerprint::of(stored) {
                Ok(fingerprint) => Some(upload_print.distance(&fingerprint)),
                Err(err) => {
                    debug!("Candidate {index} could not be fingerprinted, comparing bytes: {err}");
                    None
                }
            },
            None => None,
        };

        let matched = match distance {
            Some(distance) => distance <= threshold,
            None => stored == image,
        };
        if matched {
            debug!("Duplicate found at candidate {index} (distance={:?})", distance);
            return Some(DuplicateMatch {
                candidate,
                index,
                distance,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::codecs::png::PngEncoder;
    use image::{DynamicImage, Rgb, RgbImage};

    fn encode_png(image: &RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image.clone())
            .write_with_encoder(PngEncoder::new(&mut bytes))
            .unwrap();
        bytes
    }

    fn encode_jpeg(image: &RgbImage, quality: u8) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image.clone())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))
            .unwrap();
        bytes
    }

    fn solid(color: [u8; 3]) -> Vec<u8> {
        encode_png(&RgbImage::from_pixel(100, 100, Rgb(color)))
    }

    fn block_pattern() -> RgbImage {
        let mut state: u32 = 0x2545_f491;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        };
        let mut palette = Vec::new();
        for _ in 0..64 {
            palette.push([next(), next(), next()]);
        }
        RgbImage::from_fn(200, 200, |x, y| {
            let block = ((y / 25) * 8 + (x / 25)) as usize;
            Rgb(palette[block])
        })
    }

    #[test]
    fn identical_bytes_match_at_threshold_zero() {
        let image = solid([40, 90, 160]);
        let candidates = vec![image.clone()];
        let found = find_duplicate(&image, &candidates, 0).expect("match");
        assert_eq!(found.index, 0);
        assert_eq!(found.distance, None);
    }

    #[test]
    fn threshold_zero_rejects_re_encoded_copy() {
        let pattern = block_pattern();
        let first = encode_jpeg(&pattern, 90);
        let second = encode_jpeg(&pattern, 75);
        assert!(find_duplicate(&first, &[second], 0).is_none());
    }

    #[test]
    fn lossy_re_encodes_still_match() {
        let pattern = block_pattern();
        let high = encode_jpeg(&pattern, 90);
        let low = encode_jpeg(&pattern, 75);
        assert_ne!(high, low);
        let candidates = vec![low];
        let found = find_duplicate(&high, &candidates, DEFAULT_THRESHOLD).expect("match");
        assert!(found.distance.unwrap() <= DEFAULT_THRESHOLD);
    }

    #[test]
    fn resized_copy_still_matches() {
        let pattern = block_pattern();
        let original = encode_png(&pattern);
        let resized = DynamicImage::ImageRgb8(pattern)
            .resize_exact(120, 120, FilterType::Triangle)
            .to_rgb8();
        let candidates = vec![encode_png(&resized)];
        assert!(find_duplicate(&original, &candidates, DEFAULT_THRESHOLD).is_some());
    }

    /// Full-frame fabric close-up: fine vertical stripes over a soft
    /// top-to-bottom shading, no plain background.
    fn striped_swatch() -> RgbImage {
        RgbImage::from_fn(400, 600, |x, y| {
            let shade = 100.0 + 20.0 * y as f64 / 600.0;
            let stripe = if (x / 4) % 2 == 0 { 20.0 } else { -20.0 };
            let level = (shade + stripe).round().clamp(0.0, 255.0) as u8;
            Rgb([level, level, level])
        })
    }

    #[test]
    fn patterned_fabric_re_encodes_still_match() {
        let swatch = striped_swatch();
        let fine = encode_jpeg(&swatch, 92);
        let coarse = encode_jpeg(&swatch, 60);
        let candidates = vec![coarse];
        let found = find_duplicate(&fine, &candidates, DEFAULT_THRESHOLD).expect("match");
        assert!(found.distance.unwrap() <= DEFAULT_THRESHOLD);

        let half = DynamicImage::ImageRgb8(swatch)
            .resize_exact(200, 300, FilterType::Triangle)
            .to_rgb8();
        let candidates = vec![encode_jpeg(&half, 80)];
        assert!(find_duplicate(&fine, &candidates, DEFAULT_THRESHOLD).is_some());
    }

    #[test]
    fn match_borrows_only_from_candidates() {
        let candidates = vec![solid([5, 5, 5])];
        let found = {
            let upload = candidates[0].clone();
            DuplicateQuery::new(&upload, &candidates)
                .with_threshold(0)
                .run()
        };
        assert_eq!(found.map(|found| found.index), Some(0));
    }

    #[test]
    fn solid_red_and_blue_do_not_match() {
        let red = solid([255, 0, 0]);
        let blue = solid([0, 0, 255]);
        assert!(find_duplicate(&red, &[blue], DEFAULT_THRESHOLD).is_none());
    }

    #[test]
    fn first_acceptable_candidate_wins() {
        let red = solid([255, 0, 0]);
        let candidates = vec![solid([0, 0, 255]), red.clone(), red.clone()];
        let found = find_duplicate(&red, &candidates, DEFAULT_THRESHOLD).expect("match");
        assert_eq!(found.index, 1);
    }

    #[test]
    fn undecodable_payloads_fall_back_to_bytes() {
        let garbage = b"definitely not an image".to_vec();
        let candidates = vec![solid([1, 2, 3]), garbage.clone()];
        let found = find_duplicate(&garbage, &candidates, DEFAULT_THRESHOLD).expect("match");
        assert_eq!(found.index, 1);
        assert_eq!(found.distance, None);

        let other_garbage = b"also not an image".to_vec();
        assert!(find_duplicate(&other_garbage, &candidates, DEFAULT_THRESHOLD).is_none());
    }

    #[test]
    fn query_uses_default_threshold() {
        let image = solid([10, 200, 30]);
        let candidates = vec![image.clone()];
        let query = DuplicateQuery::new(&image, &candidates);
        assert_eq!(query.threshold, DEFAULT_THRESHOLD);
        assert!(query.run().is_some());
        assert!(query.with_threshold(0).run().is_some());
    }
}
