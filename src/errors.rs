//! Error taxonomy
//!
//! This module defines the error types used throughout the runtime core.
//!
//! # Overview
//!
//! [`SplashError`] covers every failure mode named by the error handling
//! design: configuration parsing, link transport failures, attribute
//! mis-use, GPU resource failures, timeouts and calibration failures.
//!
//! Per the propagation policy, most of these never cross a public API as a
//! `Result` — they are logged and converted to a `bool` / empty-`Values`
//! return at the boundary that produced them (see [`crate::attribute`],
//! [`crate::link`]). `SplashError` exists for the handful of operations the
//! spec allows to fail outright: configuration loading and
//! `Link::connect_to`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use splash::errors::{SplashError, Result};
//!
//! fn load_config(path: &str) -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The error type for the Splash runtime core.
#[derive(Error, Debug)]
pub enum SplashError {
    // ========================================================================
    // Configuration errors
    // ========================================================================
    /// Configuration file could not be parsed or violated the schema.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file I/O error.
    #[error("configuration I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Configuration JSON parse error.
    #[error("configuration JSON error: {0}")]
    ConfigJson(#[from] serde_json::Error),

    // ========================================================================
    // Link (inter-process transport) errors
    // ========================================================================
    /// Transport could not be established, or a frame was malformed.
    /// Fatal to the peer the error concerns, not to the process.
    #[error("link error: {0}")]
    Link(String),

    /// A buffered send exceeded its high-water-mark deadline.
    #[error("link overflow: send to {peer} did not clear its queue within {deadline_ms} ms")]
    LinkOverflow {
        /// Destination peer name.
        peer: String,
        /// The backpressure deadline that elapsed.
        deadline_ms: u64,
    },

    // ========================================================================
    // Attribute runtime errors
    // ========================================================================
    /// Unknown attribute, wrong arity, wrong kind, or a setter returned `false`.
    #[error("attribute error on {object}.{attribute}: {reason}")]
    Attribute {
        /// The object the attribute belongs to.
        object: String,
        /// The attribute name.
        attribute: String,
        /// Human-readable explanation.
        reason: String,
    },

    // ========================================================================
    // GPU / resource errors
    // ========================================================================
    /// Framebuffer incomplete, texture allocation failure, PBO map failure, ...
    #[error("resource error: {0}")]
    Resource(String),

    /// Failed to request a compatible GPU adapter.
    #[error("failed to request a GPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("failed to create the GPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    // ========================================================================
    // Timeout errors
    // ========================================================================
    /// `sendMessageWithAnswer`, a Blender wait, or a calibrator wait expired.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    // ========================================================================
    // Calibration errors
    // ========================================================================
    /// A capture, exposure-search, or CRF solve step failed or returned an
    /// empty image. Previously stored calibration is preserved.
    #[error("calibration error: {0}")]
    Calibration(String),
}

/// Alias for `Result<T, SplashError>`.
pub type Result<T> = std::result::Result<T, SplashError>;
