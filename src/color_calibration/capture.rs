//! Exposure search: adjusts a capture device's shutter speed until the
//! central 20% of the frame sits in the target luminance band.

/// Iteration cap per `find_correct_exposure` call.
pub const MAX_SHUTTERSPEED_ITERATION_COUNT: u32 = 10;

/// Multiplicative step applied to the shutter speed each retry.
pub const SHUTTER_STEP_MULTIPLIER: f64 = 1.5;

/// Target 8-bit luminance band the central region must land in.
pub const TARGET_LUMINANCE_RANGE: (u8, u8) = (100, 160);

/// A capture device abstraction: given a shutter speed, returns the mean
/// 8-bit luminance over the central 20% of the frame, or `None` on an
/// empty/failed capture. Lets the exposure search run without a real
/// camera attached — the Splash Camera's flash/clear-color setup happens
/// in the caller before invoking this.
pub trait ExposureProbe {
    fn capture_central_luminance(&mut self, shutter_speed: f64) -> Option<u8>;
}

/// Iteratively steps the shutter speed toward the target luminance band.
/// Returns the converged shutter speed, or `None` if it didn't converge
/// within [`MAX_SHUTTERSPEED_ITERATION_COUNT`] retries or a capture
/// failed.
pub fn find_correct_exposure(probe: &mut dyn ExposureProbe, initial_shutter_speed: f64) -> Option<f64> {
    let mut shutter = initial_shutter_speed;
    let (low, high) = TARGET_LUMINANCE_RANGE;
    for _ in 0..MAX_SHUTTERSPEED_ITERATION_COUNT {
        let luminance = probe.capture_central_luminance(shutter)?;
        if luminance >= low && luminance <= high {
            return Some(shutter);
        }
        if luminance < low {
            shutter *= SHUTTER_STEP_MULTIPLIER;
        } else {
            shutter /= SHUTTER_STEP_MULTIPLIER;
        }
    }
    log::warn!("color_calibration: exposure search did not converge after {MAX_SHUTTERSPEED_ITERATION_COUNT} iterations");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe {
        luminance: u8,
    }

    impl ExposureProbe for FixedProbe {
        fn capture_central_luminance(&mut self, _shutter_speed: f64) -> Option<u8> {
            Some(self.luminance)
        }
    }

    /// Luminance improves one step toward the band per call, modeling a
    /// real sensor responding to shutter-speed changes.
    struct ConvergingProbe {
        luminance: f64,
    }

    impl ExposureProbe for ConvergingProbe {
        fn capture_central_luminance(&mut self, shutter_speed: f64) -> Option<u8> {
            self.luminance = (shutter_speed * 100.0).clamp(0.0, 255.0);
            Some(self.luminance as u8)
        }
    }

    #[test]
    fn already_in_band_converges_immediately() {
        let mut probe = FixedProbe { luminance: 130 };
        assert_eq!(find_correct_exposure(&mut probe, 1.0), Some(1.0));
    }

    #[test]
    fn stuck_too_dark_exhausts_retries() {
        let mut probe = FixedProbe { luminance: 10 };
        assert_eq!(find_correct_exposure(&mut probe, 1.0), None);
    }

    #[test]
    fn empty_capture_aborts_immediately() {
        struct EmptyProbe;
        impl ExposureProbe for EmptyProbe {
            fn capture_central_luminance(&mut self, _shutter_speed: f64) -> Option<u8> {
                None
            }
        }
        assert_eq!(find_correct_exposure(&mut EmptyProbe, 1.0), None);
    }

    #[test]
    fn a_converging_probe_finds_a_shutter_speed_in_band() {
        let mut probe = ConvergingProbe { luminance: 0.0 };
        let result = find_correct_exposure(&mut probe, 0.5);
        assert!(result.is_some());
        let (low, high) = TARGET_LUMINANCE_RANGE;
        assert!(probe.luminance as u8 >= low && probe.luminance as u8 <= high);
    }
}
