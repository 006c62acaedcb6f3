//! Color calibrator: runs on the master Scene as a single asynchronous
//! task guarded by a try-lock, sweeping each Splash Camera's response
//! curve against a capture device and writing back a per-camera LUT plus
//! an equalized white point.
//!
//! The capture device is a `capture::ExposureProbe` trait object rather
//! than a concrete camera driver, so the sequencing logic here is
//! host-testable without hardware or a display — the same simplification
//! the Scene's `Camera::compute_vertex_visibility` makes for GPU passes.

pub mod capture;
pub mod lut;
pub mod response_curve;

use parking_lot::Mutex;

use crate::errors::{Result, SplashError};
use crate::value::{self, Value, Values};
use capture::ExposureProbe;
use lut::EqualizeMethod;
use response_curve::CurveSample;

/// ROI growth floor: the region of interest must cover at least this
/// fraction of the frame before the threshold search stops doubling its
/// window.
pub const MINIMUM_ROI_AREA: f64 = 0.005;

/// Number of (input, measured) samples taken per channel while building a
/// response curve.
pub const DEFAULT_COLOR_CURVE_SAMPLES: usize = 16;

/// Default calibration LUT resolution per channel.
pub const DEFAULT_COLOR_LUT_SIZE: usize = 256;

/// Number of LDR brackets captured to solve the camera response function.
pub const CRF_BRACKET_COUNT: usize = 9;

/// Default stop spacing between LDR brackets, in EV.
pub const DEFAULT_BRACKET_STOP_EV: f64 = 0.33;

/// A measured RGB response for one calibration target, keyed by channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelCurves {
    pub red: Vec<CurveSample>,
    pub green: Vec<CurveSample>,
    pub blue: Vec<CurveSample>,
}

impl ChannelCurves {
    fn to_sequence(&self) -> Values {
        [&self.red, &self.green, &self.blue]
            .into_iter()
            .map(|channel| {
                Value::Sequence(channel.iter().flat_map(|s| [Value::Real(s.input), Value::Real(s.measured)]).collect())
            })
            .collect()
    }
}

/// The full write-back payload for one Camera.
#[derive(Debug, Clone)]
pub struct CameraCalibration {
    pub camera: String,
    pub color_lut_size: i64,
    pub color_lut: Vec<f64>,
    pub color_mix_matrix: [f64; 9],
    pub color_samples: ChannelCurves,
    pub white_point: [f64; 3],
}

impl CameraCalibration {
    /// Flattens this result the way `RootObject::set` expects an
    /// attribute's `Values` argument list.
    #[must_use]
    pub fn to_attribute_sets(&self) -> Vec<(&'static str, Values)> {
        vec![
            ("colorLUTSize", value::single(self.color_lut_size)),
            ("colorLUT", self.color_lut.iter().map(|v| Value::Real(*v)).collect()),
            ("activateColorLUT", value::single(true)),
            ("colorMixMatrix", self.color_mix_matrix.iter().map(|v| Value::Real(*v)).collect()),
            ("colorSamples", self.color_samples.to_sequence()),
            ("whitePoint", self.white_point.iter().map(|v| Value::Real(*v)).collect()),
            ("brightness", value::single(1.0_f64)),
            ("colorTemperature", value::single(6500.0_f64)),
        ]
    }
}

/// One calibration target: a Splash Camera name plus the probe standing in
/// for its physical capture device.
pub struct CalibrationTarget<'a> {
    pub camera: String,
    pub probe: &'a mut dyn ExposureProbe,
    /// Mean RGB over the ROI at each of `DEFAULT_COLOR_CURVE_SAMPLES` input
    /// steps, per channel — what a real run would get from sweeping the
    /// Camera and sampling the capture device. Supplied directly here
    /// since the HDR bracket / ROI detection plumbing is camera-driver
    /// work outside this crate's testable surface.
    pub measured_curves: ChannelCurves,
    pub initial_shutter_speed: f64,
}

/// Runs the calibration sequence against pre-supplied response-curve
/// samples: finds each target's exposure, inverts its curves into a LUT,
/// equalizes white points across all targets, and returns the per-camera
/// write-back payload. A non-recoverable step (failed exposure search, or
/// an empty curve) drops that camera from the result with a warning,
/// never corrupting another camera's stored curves.
pub fn calibrate(targets: &mut [CalibrationTarget<'_>], lut_size: usize, equalize_method: EqualizeMethod) -> Vec<CameraCalibration> {
    let mut exposures = Vec::with_capacity(targets.len());
    for target in targets.iter_mut() {
        match capture::find_correct_exposure(target.probe, target.initial_shutter_speed) {
            Some(shutter) => exposures.push(Some(shutter)),
            None => {
                log::warn!("color_calibration: exposure search failed for {}", target.camera);
                exposures.push(None);
            }
        }
    }

    let mut luts = Vec::new();
    let mut white_points = Vec::new();
    for (i, target) in targets.iter().enumerate() {
        if exposures[i].is_none() {
            continue;
        }
        if target.measured_curves.red.is_empty() || target.measured_curves.green.is_empty() || target.measured_curves.blue.is_empty() {
            log::warn!("color_calibration: empty response curve for {}, aborting", target.camera);
            continue;
        }
        let red = response_curve::invert_to_lut(&target.measured_curves.red, lut_size);
        let green = response_curve::invert_to_lut(&target.measured_curves.green, lut_size);
        let blue = response_curve::invert_to_lut(&target.measured_curves.blue, lut_size);
        let white_point = [red.last().copied().unwrap_or(1.0), green.last().copied().unwrap_or(1.0), blue.last().copied().unwrap_or(1.0)];

        let mut interleaved = Vec::with_capacity(red.len() * 3);
        for i in 0..lut_size.min(red.len()) {
            interleaved.push(red[i]);
            interleaved.push(green[i]);
            interleaved.push(blue[i]);
        }

        white_points.push(white_point);
        luts.push((target.camera.clone(), interleaved, target.measured_curves.clone()));
    }

    let scales = lut::equalize_white_points(&mut white_points, equalize_method);

    luts.into_iter()
        .zip(white_points)
        .zip(scales)
        .map(|(((camera, color_lut, samples), white_point), scale)| CameraCalibration {
            camera,
            color_lut_size: lut_size as i64,
            color_lut,
            color_mix_matrix: diagonal_mix_matrix(scale),
            color_samples: samples,
            white_point,
        })
        .collect()
}

/// The equalization pass (`lut::equalize_white_points`) yields one uniform
/// scale per camera; carried into the mix matrix as a diagonal so a camera
/// that needed no correction (scale 1) writes back the identity.
fn diagonal_mix_matrix(scale: f64) -> [f64; 9] {
    [scale, 0.0, 0.0, 0.0, scale, 0.0, 0.0, 0.0, scale]
}

/// The registry-visible face of the calibrator: a `GraphObject` the
/// Factory builds under the `colorCalibrator` type string, carrying the
/// tunables a configuration (or a GUI) sets before triggering a run.
pub struct CalibratorObject {
    base: crate::graph_object::GraphObjectBase,
    equalize_method: EqualizeMethod,
    color_lut_size: usize,
    color_curve_samples: usize,
}

fn calibrator_descriptors() -> &'static [crate::attribute::AttributeDescriptor] {
    use crate::attribute::{ArgKind, AttributeDescriptor, SyncPolicy, descriptor};
    static TABLE: std::sync::OnceLock<Vec<AttributeDescriptor>> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            descriptor("equalizeMethod", vec![ArgKind::Integer], "white-balance equalization policy: 0 balance-only, 1 weakest projector, 2 maximize minimum luminance", SyncPolicy::Auto, true, false, true),
            descriptor("colorLUTSize", vec![ArgKind::Integer], "calibration LUT resolution per channel", SyncPolicy::Auto, true, false, true),
            descriptor("colorCurveSamples", vec![ArgKind::Integer], "number of sweep steps per response-curve channel", SyncPolicy::Auto, true, false, true),
        ]
    })
}

impl CalibratorObject {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut base = crate::graph_object::GraphObjectBase::new(name, "colorCalibrator", crate::graph_object::Category::Other);
        base.set_render_priority(crate::graph_object::RenderPriority::NoRender);
        Self {
            base,
            equalize_method: EqualizeMethod::default(),
            color_lut_size: DEFAULT_COLOR_LUT_SIZE,
            color_curve_samples: DEFAULT_COLOR_CURVE_SAMPLES,
        }
    }

    #[must_use]
    pub fn equalize_method(&self) -> EqualizeMethod {
        self.equalize_method
    }

    #[must_use]
    pub fn color_lut_size(&self) -> usize {
        self.color_lut_size
    }

    #[must_use]
    pub fn color_curve_samples(&self) -> usize {
        self.color_curve_samples
    }
}

impl crate::graph_object::GraphObject for CalibratorObject {
    fn base(&self) -> &crate::graph_object::GraphObjectBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut crate::graph_object::GraphObjectBase {
        &mut self.base
    }
    fn attribute_descriptors(&self) -> &[crate::attribute::AttributeDescriptor] {
        calibrator_descriptors()
    }
    fn set_attribute(&mut self, name: &str, values: &Values) -> bool {
        match name {
            "equalizeMethod" => match EqualizeMethod::from_index(values[0].as_integer()) {
                Some(method) => {
                    self.equalize_method = method;
                    true
                }
                None => false,
            },
            "colorLUTSize" => {
                let size = values[0].as_integer();
                if size <= 0 {
                    return false;
                }
                self.color_lut_size = size as usize;
                true
            }
            "colorCurveSamples" => {
                let samples = values[0].as_integer();
                if samples <= 0 {
                    return false;
                }
                self.color_curve_samples = samples as usize;
                true
            }
            _ => false,
        }
    }
    fn get_attribute(&self, name: &str) -> Option<Values> {
        match name {
            "equalizeMethod" => Some(value::single(self.equalize_method.index())),
            "colorLUTSize" => Some(value::single(self.color_lut_size as i64)),
            "colorCurveSamples" => Some(value::single(self.color_curve_samples as i64)),
            _ => None,
        }
    }
}

/// Single-flight guard: a second `run` call while one is already in
/// flight logs a warning and returns immediately instead of queueing.
#[derive(Default)]
pub struct ColorCalibrator {
    lock: Mutex<()>,
}

impl ColorCalibrator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `calibrate` if no run is already in flight. Returns
    /// `Err(SplashError::Calibration(..))` if it couldn't acquire the
    /// guard — the caller should treat this as "already running", not a
    /// hard failure.
    pub fn run(&self, targets: &mut [CalibrationTarget<'_>], lut_size: usize, equalize_method: EqualizeMethod) -> Result<Vec<CameraCalibration>> {
        let Some(_guard) = self.lock.try_lock() else {
            log::warn!("color_calibration: a calibration run is already in flight");
            return Err(SplashError::Calibration("calibration already running".into()));
        };
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        Ok(calibrate(targets, lut_size, equalize_method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe(u8);
    impl ExposureProbe for FixedProbe {
        fn capture_central_luminance(&mut self, _shutter_speed: f64) -> Option<u8> {
            Some(self.0)
        }
    }

    fn gamma_curve(gamma: f64, n: usize) -> Vec<CurveSample> {
        (0..n).map(|i| CurveSample { input: i as f64 / (n - 1) as f64, measured: (i as f64 / (n - 1) as f64).powf(gamma) }).collect()
    }

    #[test]
    fn a_camera_with_good_exposure_and_curves_produces_a_lut() {
        let mut probe = FixedProbe(130);
        let mut targets = vec![CalibrationTarget {
            camera: "cam1".into(),
            probe: &mut probe,
            measured_curves: ChannelCurves { red: gamma_curve(2.2, 8), green: gamma_curve(2.2, 8), blue: gamma_curve(2.2, 8) },
            initial_shutter_speed: 1.0,
        }];
        let results = calibrate(&mut targets, 32, EqualizeMethod::WhiteBalanceOnly);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].color_lut.len(), 32 * 3);
        assert_eq!(results[0].color_lut_size, 32);
    }

    #[test]
    fn exposure_failure_drops_the_camera_without_panicking() {
        let mut probe = FixedProbe(5); // stuck too dark
        let mut targets = vec![CalibrationTarget { camera: "cam1".into(), probe: &mut probe, measured_curves: ChannelCurves { red: gamma_curve(2.2, 8), green: gamma_curve(2.2, 8), blue: gamma_curve(2.2, 8) }, initial_shutter_speed: 1.0 }];
        let results = calibrate(&mut targets, 32, EqualizeMethod::WhiteBalanceOnly);
        assert!(results.is_empty());
    }

    #[test]
    fn empty_curves_abort_without_corrupting_other_cameras() {
        let mut probe_a = FixedProbe(130);
        let mut probe_b = FixedProbe(130);
        let mut targets = vec![
            CalibrationTarget { camera: "cam1".into(), probe: &mut probe_a, measured_curves: ChannelCurves::default(), initial_shutter_speed: 1.0 },
            CalibrationTarget { camera: "cam2".into(), probe: &mut probe_b, measured_curves: ChannelCurves { red: gamma_curve(2.2, 8), green: gamma_curve(2.2, 8), blue: gamma_curve(2.2, 8) }, initial_shutter_speed: 1.0 },
        ];
        let results = calibrate(&mut targets, 16, EqualizeMethod::WhiteBalanceOnly);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].camera, "cam2");
    }

    #[test]
    fn concurrent_run_is_rejected_while_one_is_in_flight() {
        let calibrator = ColorCalibrator::new();
        let _guard = calibrator.lock.lock();
        let mut targets: Vec<CalibrationTarget<'_>> = Vec::new();
        assert!(calibrator.run(&mut targets, 16, EqualizeMethod::WhiteBalanceOnly).is_err());
    }

    #[test]
    fn calibrator_object_rejects_unknown_method_and_non_positive_sizes() {
        use crate::value::Value;
        let mut calibrator = CalibratorObject::new("colorCalibrator");
        assert!(crate::attribute::apply_set(&mut calibrator, "equalizeMethod", &vec![Value::Integer(2)]));
        assert_eq!(calibrator.equalize_method(), EqualizeMethod::MaximizeMinimumLuminance);
        assert!(!crate::attribute::apply_set(&mut calibrator, "equalizeMethod", &vec![Value::Integer(7)]));
        assert!(!crate::attribute::apply_set(&mut calibrator, "colorLUTSize", &vec![Value::Integer(0)]));
        assert_eq!(calibrator.color_lut_size(), DEFAULT_COLOR_LUT_SIZE);
    }
}
