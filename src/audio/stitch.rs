//! Crossfade stitching of per-chunk audio into one track.

use super::Waveform;

/// Default crossfade between chunks (10 ms, 240 samples at 24 kHz).
pub const DEFAULT_FADE_MS: u32 = 10;

/// Number of samples covered by a fade of `fade_ms` at `sample_rate`.
pub fn fade_samples(fade_ms: u32, sample_rate: u32) -> usize {
    (sample_rate as u64 * fade_ms as u64 / 1000) as usize
}

/// Fold `segments` left to right into one waveform, crossfading each seam.
///
/// Segments are joined in iteration order. Empty segments leave their
/// neighbour untouched.
pub fn combine<I>(segments: I, fade_ms: u32, sample_rate: u32) -> Waveform
where
    I: IntoIterator<Item = Vec<f32>>,
{
    let fade = fade_samples(fade_ms, sample_rate);
    let mut combined: Vec<f32> = Vec::new();

    for segment in segments {
        if combined.is_empty() {
            combined = segment;
        } else {
            crossfade_append(&mut combined, &segment, fade);
        }
    }

    Waveform::new(combined, sample_rate)
}

/// Append `src` to `dst`, blending the last samples of `dst` with the first of `src`.
///
/// The overlap is `min(fade, dst.len(), src.len())`. Inside it `dst` ramps
/// linearly from 1 to 0 and `src` from 0 to 1, both ramps including their end
/// points, so the first blended sample equals `dst`'s and the last equals
/// `src`'s. Returns the overlap actually used.
pub fn crossfade_append(dst: &mut Vec<f32>, src: &[f32], fade: usize) -> usize {
    let overlap = fade.min(dst.len()).min(src.len());
    if overlap == 0 {
        dst.extend_from_slice(src);
        return 0;
    }

    let dst_start = dst.len() - overlap;
    let steps = (overlap - 1).max(1) as f32;
    for (i, &incoming) in src[..overlap].iter().enumerate() {
        let t = if overlap == 1 { 0.0 } else { i as f32 / steps };
        let outgoing = dst[dst_start + i];
        dst[dst_start + i] = outgoing * (1.0 - t) + incoming * t;
    }

    dst.extend_from_slice(&src[overlap..]);
    overlap
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, start: f32, step: f32) -> Vec<f32> {
        (0..len).map(|i| start + step * i as f32).collect()
    }

    fn max_delta(samples: &[f32]) -> f32 {
        samples
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0, f32::max)
    }

    #[test]
    fn fade_samples_at_24khz() {
        assert_eq!(fade_samples(10, 24000), 240);
        assert_eq!(fade_samples(0, 24000), 0);
    }

    #[test]
    fn single_segment_is_returned_unchanged() {
        let a = ramp(500, 0.0, 0.001);
        let wave = combine(vec![a.clone()], 10, 24000);
        assert_eq!(wave.samples, a);
        assert_eq!(wave.sample_rate, 24000);
    }

    #[test]
    fn empty_neighbours_are_ignored() {
        let a = ramp(500, 0.0, 0.001);
        assert_eq!(combine(vec![a.clone(), vec![]], 10, 24000).samples, a);
        assert_eq!(combine(vec![vec![], a.clone()], 10, 24000).samples, a);
        assert!(combine(Vec::<Vec<f32>>::new(), 10, 24000).samples.is_empty());
    }

    #[test]
    fn zero_fade_concatenates() {
        let a = vec![0.5; 100];
        let b = vec![-0.5; 100];
        let wave = combine(vec![a.clone(), b.clone()], 0, 24000);
        assert_eq!(wave.samples.len(), 200);
        assert_eq!(&wave.samples[..100], a.as_slice());
        assert_eq!(&wave.samples[100..], b.as_slice());
    }

    #[test]
    fn output_length_subtracts_each_overlap() {
        // 10 ms at 24 kHz = 240 samples; only the seam into the 100-sample segment is clamped.
        let segments = vec![vec![0.1; 1000], vec![0.2; 100], vec![0.3; 800], vec![0.4; 600]];
        let total: usize = segments.iter().map(Vec::len).sum();
        let wave = combine(segments, 10, 24000);
        assert_eq!(wave.samples.len(), total - (100 + 240 + 240));
    }

    #[test]
    fn crossfade_reports_clamped_overlap() {
        let mut dst = vec![1.0; 50];
        let used = crossfade_append(&mut dst, &[0.0; 30], 240);
        assert_eq!(used, 30);
        assert_eq!(dst.len(), 50);
    }

    #[test]
    fn crossfade_is_continuous_at_both_boundaries() {
        let a = ramp(1000, 0.9, -0.0005);
        let b = ramp(1000, -0.4, 0.0003);
        let fade = 240;
        let wave = combine(vec![a.clone(), b.clone()], 10, 24000);
        let limit = max_delta(&a).max(max_delta(&b)) + 1e-6;

        let enter = a.len() - fade;
        let exit = enter + fade - 1;
        let s = &wave.samples;
        assert!((s[enter] - s[enter - 1]).abs() <= limit);
        assert!((s[exit + 1] - s[exit]).abs() <= limit);
        assert!((s[enter] - a[enter]).abs() < 1e-6);
        assert!((s[exit] - b[fade - 1]).abs() < 1e-6);
    }

    #[test]
    fn crossfade_blends_linearly() {
        let mut dst = vec![1.0; 5];
        crossfade_append(&mut dst, &[0.0; 5], 5);
        let expected = [1.0, 0.75, 0.5, 0.25, 0.0];
        for (got, want) in dst.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn duration_is_floored_seconds() {
        let wave = combine(vec![vec![0.0; 24000], vec![0.0; 24000]], 10, 24000);
        assert_eq!(wave.samples.len(), 48000 - 240);
        assert_eq!(wave.whole_seconds(), 1);
    }
}
