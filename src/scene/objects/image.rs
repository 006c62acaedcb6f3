//! Decoded image resource: a texture source the upload thread pushes into
//! a `GpuTexture` through the staging ring. Decoding itself (PNG/JPEG/HDR)
//! is delegated to the `image` crate.

use std::path::Path;
use std::sync::OnceLock;

use crate::attribute::{self, ArgKind, AttributeDescriptor, SyncPolicy};
use crate::errors::{Result, SplashError};
use crate::graph_object::{Category, GraphObject, GraphObjectBase, RenderPriority};
use crate::value::{self, Values};

fn descriptors() -> &'static [AttributeDescriptor] {
    static TABLE: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            attribute::descriptor("file", vec![ArgKind::String], "path to the source image file", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("filtering", vec![ArgKind::Bool], "enable bilinear filtering and mipmap generation", SyncPolicy::Auto, true, false, false),
            attribute::descriptor("width", vec![], "decoded width in pixels", SyncPolicy::Auto, false, false, true),
            attribute::descriptor("height", vec![], "decoded height in pixels", SyncPolicy::Auto, false, false, true),
        ]
    })
}

pub struct Image {
    base: GraphObjectBase,
    file: String,
    filtering: bool,
    width: u32,
    height: u32,
    pixels_rgba8: Vec<u8>,
    version: u64,
}

impl Image {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_type(name, "image")
    }

    /// Builds under an alternate type string (`texture_image` names the
    /// GPU-sampled variant; it shares this CPU-side representation).
    #[must_use]
    pub fn with_type(name: impl Into<String>, type_name: &'static str) -> Self {
        let mut base = GraphObjectBase::new(name, type_name, Category::Image);
        base.set_render_priority(RenderPriority::Media);
        Self { base, file: String::new(), filtering: true, width: 0, height: 0, pixels_rgba8: Vec::new(), version: 0 }
    }

    /// Decodes `self.file` and stores the result as 8-bit RGBA, bumping the
    /// version the upload thread watches.
    pub fn reload(&mut self) -> Result<()> {
        if self.file.is_empty() {
            return Err(SplashError::Resource("image has no file set".into()));
        }
        let decoded = image::open(Path::new(&self.file)).map_err(|e| SplashError::Resource(format!("decoding {}: {e}", self.file)))?;
        let rgba = decoded.to_rgba8();
        self.width = rgba.width();
        self.height = rgba.height();
        self.pixels_rgba8 = rgba.into_raw();
        self.version += 1;
        self.base.mark_updated();
        Ok(())
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels_rgba8
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn wants_filtering(&self) -> bool {
        self.filtering
    }

    /// Flattens the current pixel content into the replication frame a
    /// peer's `receive_buffer` understands.
    #[must_use]
    pub fn serialize_frame(&self) -> Vec<u8> {
        encode_frame(&ImageFrame {
            width: self.width,
            height: self.height,
            channels: 4,
            bits_per_pixel: 32,
            format: "RGBA".to_owned(),
            timestamp: crate::util::time::now_nanos() as i64,
            video_frame: false,
            pixels: self.pixels_rgba8.clone(),
        })
    }
}

impl GraphObject for Image {
    fn base(&self) -> &GraphObjectBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut GraphObjectBase {
        &mut self.base
    }
    fn attribute_descriptors(&self) -> &[AttributeDescriptor] {
        descriptors()
    }
    fn set_attribute(&mut self, name: &str, values: &Values) -> bool {
        match name {
            "file" => {
                self.file = values[0].as_string();
                self.reload().is_ok()
            }
            "filtering" => {
                self.filtering = values[0].as_bool();
                true
            }
            _ => false,
        }
    }
    fn get_attribute(&self, name: &str) -> Option<Values> {
        match name {
            "width" => Some(value::single(i64::from(self.width))),
            "height" => Some(value::single(i64::from(self.height))),
            _ => None,
        }
    }
    fn texture_version(&self) -> Option<u64> {
        Some(self.version)
    }
    fn texture_pixels(&self) -> Option<(u32, u32, Vec<u8>)> {
        if self.width == 0 || self.height == 0 || self.pixels_rgba8.is_empty() {
            return None;
        }
        Some((self.width, self.height, self.pixels_rgba8.clone()))
    }
    /// Replaces the decoded pixel buffer with a replicated frame (see
    /// [`encode_frame`]), the receiving half of a World-driven Image
    /// broadcast. A malformed frame is rejected without touching the
    /// current pixels.
    fn receive_buffer(&mut self, payload: &[u8]) -> bool {
        let Some(frame) = decode_frame(payload) else {
            return false;
        };
        self.width = frame.width;
        self.height = frame.height;
        self.pixels_rgba8 = frame.pixels;
        self.version += 1;
        self.base.mark_updated();
        true
    }
}

/// A parsed replication frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub width: u32,
    pub height: u32,
    pub channels: u16,
    pub bits_per_pixel: u16,
    pub format: String,
    pub timestamp: i64,
    pub video_frame: bool,
    pub pixels: Vec<u8>,
}

/// Flattens pixel content into its replication frame: a fixed header
/// (width, height, channels, bits per pixel, a type tag byte, the
/// length-prefixed format name, timestamp, video-frame flag) followed by
/// the raw pixel bytes in the format's natural order.
#[must_use]
pub fn encode_frame(frame: &ImageFrame) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(32 + frame.format.len() + frame.pixels.len());
    bytes.extend_from_slice(&frame.width.to_le_bytes());
    bytes.extend_from_slice(&frame.height.to_le_bytes());
    bytes.extend_from_slice(&frame.channels.to_le_bytes());
    bytes.extend_from_slice(&frame.bits_per_pixel.to_le_bytes());
    bytes.push(0); // type tag: 8-bit unsigned pixel data
    bytes.extend_from_slice(&(frame.format.len() as u32).to_le_bytes());
    bytes.extend_from_slice(frame.format.as_bytes());
    bytes.extend_from_slice(&frame.timestamp.to_le_bytes());
    bytes.push(u8::from(frame.video_frame));
    bytes.extend_from_slice(&frame.pixels);
    bytes
}

/// Parses a frame produced by [`encode_frame`]. Returns `None` on a
/// truncated header or a format-name length past the payload end.
#[must_use]
pub fn decode_frame(payload: &[u8]) -> Option<ImageFrame> {
    if payload.len() < 17 {
        return None;
    }
    let width = u32::from_le_bytes(payload[0..4].try_into().ok()?);
    let height = u32::from_le_bytes(payload[4..8].try_into().ok()?);
    let channels = u16::from_le_bytes(payload[8..10].try_into().ok()?);
    let bits_per_pixel = u16::from_le_bytes(payload[10..12].try_into().ok()?);
    let _type_tag = payload[12];
    let format_len = u32::from_le_bytes(payload[13..17].try_into().ok()?) as usize;
    let format_end = 17usize.checked_add(format_len)?;
    if payload.len() < format_end.checked_add(9)? {
        return None;
    }
    let format = String::from_utf8(payload[17..format_end].to_vec()).ok()?;
    let timestamp = i64::from_le_bytes(payload[format_end..format_end + 8].try_into().ok()?);
    let video_frame = payload[format_end + 8] != 0;
    let pixels = payload[format_end + 9..].to_vec();
    Some(ImageFrame { width, height, channels, bits_per_pixel, format, timestamp, video_frame, pixels })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_with_no_file_fails_without_panicking() {
        let mut image = Image::new("img1");
        assert!(image.reload().is_err());
        assert_eq!(image.version(), 0);
    }

    #[test]
    fn receive_buffer_replaces_pixels_and_bumps_version() {
        let mut image = Image::new("img1");
        let frame = ImageFrame {
            width: 1,
            height: 1,
            channels: 4,
            bits_per_pixel: 32,
            format: "RGBA".to_owned(),
            timestamp: 7,
            video_frame: false,
            pixels: vec![1, 2, 3, 4],
        };
        assert!(image.receive_buffer(&encode_frame(&frame)));
        assert_eq!(image.pixels(), &[1, 2, 3, 4]);
        assert_eq!(image.dimensions(), (1, 1));
        assert_eq!(image.version(), 1);
    }

    #[test]
    fn frame_header_round_trips() {
        let frame = ImageFrame {
            width: 2,
            height: 3,
            channels: 4,
            bits_per_pixel: 32,
            format: "sRGBA".to_owned(),
            timestamp: -5,
            video_frame: true,
            pixels: vec![0u8; 24],
        };
        assert_eq!(decode_frame(&encode_frame(&frame)), Some(frame));
    }

    #[test]
    fn truncated_frame_is_rejected_without_side_effects() {
        let mut image = Image::new("img1");
        assert!(!image.receive_buffer(&[1, 2, 3, 4]));
        assert_eq!(image.version(), 0);
    }
}
