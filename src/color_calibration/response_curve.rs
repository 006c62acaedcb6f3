//! Response-curve sampling and LUT inversion: a per-channel set of
//! (input, measured) pairs gets inverted into a calibration LUT by a
//! monotone spline — Akima when there are enough samples to fit one,
//! linear otherwise.

/// Below this many samples, fall back to piecewise-linear interpolation —
/// an Akima fit needs at least 5 points to be well-posed.
pub const MIN_SAMPLES_FOR_AKIMA: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplineKind {
    Linear,
    Akima,
}

/// One (input value, measured response) pair recorded while sweeping a
/// channel from 0 to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveSample {
    pub input: f64,
    pub measured: f64,
}

/// Inverts a response curve into a LUT of `lut_size` entries spanning the
/// measured range. `samples` need not be sorted; duplicate or
/// non-increasing measured values are dropped to keep the spline's
/// abscissas strictly increasing.
#[must_use]
pub fn invert_to_lut(samples: &[CurveSample], lut_size: usize) -> Vec<f64> {
    if lut_size == 0 {
        return Vec::new();
    }
    let mut sorted: Vec<CurveSample> = samples.to_vec();
    sorted.sort_by(|a, b| a.measured.partial_cmp(&b.measured).unwrap_or(std::cmp::Ordering::Equal));
    sorted.dedup_by(|a, b| (a.measured - b.measured).abs() < f64::EPSILON);

    if sorted.len() < 2 {
        let value = sorted.first().map_or(0.0, |s| s.input);
        return vec![value; lut_size];
    }

    let kind = if sorted.len() >= MIN_SAMPLES_FOR_AKIMA { SplineKind::Akima } else { SplineKind::Linear };
    let lo = sorted.first().unwrap().measured;
    let hi = sorted.last().unwrap().measured;

    (0..lut_size)
        .map(|i| {
            let t = if lut_size == 1 { 0.0 } else { i as f64 / (lut_size - 1) as f64 };
            let x = lo + t * (hi - lo);
            match kind {
                SplineKind::Linear => linear_interpolate(&sorted, x),
                SplineKind::Akima => akima_interpolate(&sorted, x),
            }
        })
        .collect()
}

fn linear_interpolate(points: &[CurveSample], x: f64) -> f64 {
    if x <= points[0].measured {
        return points[0].input;
    }
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if x <= b.measured {
            let span = b.measured - a.measured;
            let t = if span.abs() < f64::EPSILON { 0.0 } else { (x - a.measured) / span };
            return a.input + t * (b.input - a.input);
        }
    }
    points.last().unwrap().input
}

/// A slope-weighted piecewise-cubic fit (Akima, 1970): estimates each
/// interior point's tangent from a weighted average of its neighboring
/// secant slopes, then Hermite-interpolates between points using those
/// tangents. Falls back to the linear secant slope at curve endpoints.
fn akima_interpolate(points: &[CurveSample], x: f64) -> f64 {
    let n = points.len();
    let secant = |i: usize| -> f64 {
        let (a, b) = (points[i], points[i + 1]);
        let span = b.measured - a.measured;
        if span.abs() < f64::EPSILON {
            0.0
        } else {
            (b.input - a.input) / span
        }
    };

    let tangent = |i: usize| -> f64 {
        if i == 0 {
            return secant(0);
        }
        if i == n - 1 {
            return secant(n - 2);
        }
        if i == 1 || i == n - 2 {
            return (secant(i - 1) + secant(i)) / 2.0;
        }
        let (s0, s1, s2, s3) = (secant(i - 2), secant(i - 1), secant(i), secant(i + 1));
        let w1 = (s3 - s2).abs();
        let w2 = (s1 - s0).abs();
        if (w1 + w2).abs() < f64::EPSILON {
            (s1 + s2) / 2.0
        } else {
            (w1 * s1 + w2 * s2) / (w1 + w2)
        }
    };

    if x <= points[0].measured {
        return points[0].input;
    }
    for (i, pair) in points.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        if x <= b.measured {
            let span = b.measured - a.measured;
            let t = if span.abs() < f64::EPSILON { 0.0 } else { (x - a.measured) / span };
            let m0 = tangent(i) * span;
            let m1 = tangent(i + 1) * span;
            let t2 = t * t;
            let t3 = t2 * t;
            let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
            let h10 = t3 - 2.0 * t2 + t;
            let h01 = -2.0 * t3 + 3.0 * t2;
            let h11 = t3 - t2;
            return h00 * a.input + h10 * m0 + h01 * b.input + h11 * m1;
        }
    }
    points.last().unwrap().input
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(n: usize) -> Vec<CurveSample> {
        (0..n).map(|i| CurveSample { input: i as f64 / (n - 1) as f64, measured: (i as f64 / (n - 1) as f64).powf(1.8) }).collect()
    }

    #[test]
    fn below_five_samples_uses_linear() {
        let lut = invert_to_lut(&samples(4), 8);
        assert_eq!(lut.len(), 8);
        assert!((lut[0] - 0.0).abs() < 1e-9);
        assert!((lut.last().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn five_or_more_samples_uses_akima_and_stays_monotone() {
        let lut = invert_to_lut(&samples(8), 16);
        assert_eq!(lut.len(), 16);
        for pair in lut.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-6, "LUT must stay non-decreasing: {pair:?}");
        }
    }

    #[test]
    fn unsorted_input_is_sorted_before_inversion() {
        let mut unsorted = samples(6);
        unsorted.reverse();
        let lut = invert_to_lut(&unsorted, 6);
        assert_eq!(lut.len(), 6);
        assert!((lut[0] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn single_sample_returns_a_flat_lut() {
        let lut = invert_to_lut(&[CurveSample { input: 0.5, measured: 0.3 }], 4);
        assert_eq!(lut, vec![0.5; 4]);
    }
}
