//! Cross-camera white-balance equalization.
//!
//! Once every camera has its own inverted response LUT and measured white
//! point, the calibrator reconciles them so adjacent projectors don't show
//! a visible color seam.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EqualizeMethod {
    /// Scale every camera's white point to match the group average —
    /// cheapest, ignores overall brightness.
    #[default]
    WhiteBalanceOnly,
    /// Scale every camera down to the dimmest projector's white point.
    WeakestProjector,
    /// Iteratively raise the minimum achievable luminance across cameras
    /// without clipping any channel past 1.0.
    MaximizeMinimumLuminance,
}

impl EqualizeMethod {
    /// Maps the `equalizeMethod` attribute's integer form.
    #[must_use]
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Self::WhiteBalanceOnly),
            1 => Some(Self::WeakestProjector),
            2 => Some(Self::MaximizeMinimumLuminance),
            _ => None,
        }
    }

    #[must_use]
    pub fn index(self) -> i64 {
        match self {
            Self::WhiteBalanceOnly => 0,
            Self::WeakestProjector => 1,
            Self::MaximizeMinimumLuminance => 2,
        }
    }
}

/// Convergence threshold for `MaximizeMinimumLuminance`: stop once the
/// minimum luminance changes by less than 1% of itself between iterations.
pub const CONVERGENCE_FRACTION: f64 = 0.01;

const MAX_ITERATIONS: u32 = 64;

fn luminance(rgb: [f64; 3]) -> f64 {
    0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]
}

/// Equalizes `white_points` (one RGB triple per camera) in place, and
/// returns the per-camera scale factors applied.
pub fn equalize_white_points(white_points: &mut [[f64; 3]], method: EqualizeMethod) -> Vec<f64> {
    if white_points.is_empty() {
        return Vec::new();
    }
    match method {
        EqualizeMethod::WhiteBalanceOnly => {
            let average = average_white_point(white_points);
            white_points.iter_mut().map(|wp| scale_to_match(wp, average)).collect()
        }
        EqualizeMethod::WeakestProjector => {
            let weakest = white_points.iter().copied().fold(f64::INFINITY, |acc, wp| acc.min(luminance(wp)));
            white_points.iter_mut().map(|wp| scale_to_luminance(wp, weakest)).collect()
        }
        EqualizeMethod::MaximizeMinimumLuminance => maximize_minimum_luminance(white_points),
    }
}

fn average_white_point(white_points: &[[f64; 3]]) -> [f64; 3] {
    let n = white_points.len() as f64;
    let mut sum = [0.0; 3];
    for wp in white_points {
        for c in 0..3 {
            sum[c] += wp[c];
        }
    }
    [sum[0] / n, sum[1] / n, sum[2] / n]
}

fn scale_to_match(wp: &mut [f64; 3], target: [f64; 3]) -> f64 {
    scale_to_luminance(wp, luminance(target))
}

fn scale_to_luminance(wp: &mut [f64; 3], target_luminance: f64) -> f64 {
    let current = luminance(*wp).max(1e-9);
    let scale = target_luminance / current;
    for c in wp.iter_mut() {
        *c = (*c * scale).min(1.0);
    }
    scale
}

/// Raises every camera's luminance toward the brightest achievable common
/// ceiling without clipping, stopping once the minimum-luminance delta
/// between iterations drops below 1% of the minimum.
fn maximize_minimum_luminance(white_points: &mut [[f64; 3]]) -> Vec<f64> {
    let mut scales = vec![1.0_f64; white_points.len()];
    let mut previous_min = white_points.iter().copied().map(luminance).fold(f64::INFINITY, f64::min);

    for _ in 0..MAX_ITERATIONS {
        let min_luminance = white_points.iter().copied().map(luminance).fold(f64::INFINITY, f64::min);
        for (i, wp) in white_points.iter_mut().enumerate() {
            let current = luminance(*wp).max(1e-9);
            let headroom = wp.iter().copied().fold(0.0_f64, f64::max);
            let max_scale = if headroom > 1e-9 { 1.0 / headroom } else { 1.0 };
            let desired_scale = (min_luminance / current).min(max_scale).max(1.0);
            scales[i] *= desired_scale;
            for c in wp.iter_mut() {
                *c = (*c * desired_scale).min(1.0);
            }
        }
        let new_min = white_points.iter().copied().map(luminance).fold(f64::INFINITY, f64::min);
        if (new_min - previous_min).abs() < CONVERGENCE_FRACTION * previous_min.max(1e-9) {
            break;
        }
        previous_min = new_min;
    }
    scales
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_balance_only_converges_to_group_average_luminance() {
        let mut wps = [[0.9, 0.9, 0.9], [0.5, 0.5, 0.5]];
        equalize_white_points(&mut wps, EqualizeMethod::WhiteBalanceOnly);
        let l0 = luminance(wps[0]);
        let l1 = luminance(wps[1]);
        assert!((l0 - l1).abs() < 1e-6);
    }

    #[test]
    fn weakest_projector_pulls_every_camera_down_to_the_dimmest() {
        let mut wps = [[0.9, 0.9, 0.9], [0.3, 0.3, 0.3]];
        equalize_white_points(&mut wps, EqualizeMethod::WeakestProjector);
        assert!((luminance(wps[1]) - 0.3).abs() < 1e-6);
        assert!(luminance(wps[0]) <= 0.3 + 1e-6);
    }

    #[test]
    fn maximize_minimum_luminance_never_clips_past_one() {
        let mut wps = [[0.95, 0.2, 0.2], [0.2, 0.95, 0.2]];
        equalize_white_points(&mut wps, EqualizeMethod::MaximizeMinimumLuminance);
        for wp in wps {
            for c in wp {
                assert!(c <= 1.0 + 1e-9);
            }
        }
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut wps: [[f64; 3]; 0] = [];
        assert!(equalize_white_points(&mut wps, EqualizeMethod::WhiteBalanceOnly).is_empty());
    }
}
