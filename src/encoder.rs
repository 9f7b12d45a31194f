use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops::FilterType, ImageBuffer, ImageFormat, Rgb, RgbImage};
use std::{fmt, io::Cursor, str::FromStr};
use thiserror::Error;

pub const FALLBACK_WIDTH: u32 = 640;
pub const FALLBACK_HEIGHT: u32 = 480;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Frame buffer does not match {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },
    #[error("Failed to encode PNG: {0}")]
    Png(#[from] image::ImageError),
    #[error("Malformed data URI: {0}")]
    MalformedDataUri(String),
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// A raw RGB8 frame read from a video track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(width, height, pixels)
    }
}

/// Inline image payload, `data:<mime>;base64,<data>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    mime: String,
    data: String,
}

impl DataUri {
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self {
            mime: mime.to_string(),
            data: STANDARD.encode(bytes),
        }
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn decode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(STANDARD.decode(&self.data)?)
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime, self.data)
    }
}

impl FromStr for DataUri {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("data:")
            .ok_or_else(|| EncodeError::MalformedDataUri("missing `data:` scheme".into()))?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| EncodeError::MalformedDataUri("missing `,` separator".into()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| EncodeError::MalformedDataUri("payload is not base64".into()))?;

        Ok(Self {
            mime: mime.to_string(),
            data: data.to_string(),
        })
    }
}

/// Draws `frame` onto a raster of the native size (640x480 when unknown) and
/// serializes it as a PNG data-URI.
pub fn encode_frame(frame: &Frame, native_size: Option<(u32, u32)>) -> Result<DataUri, EncodeError> {
    let (width, height) = native_size
        .filter(|(w, h)| *w > 0 && *h > 0)
        .unwrap_or((FALLBACK_WIDTH, FALLBACK_HEIGHT));

    let raw: RgbImage =
        ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(frame.width, frame.height, frame.pixels.clone())
            .ok_or(EncodeError::InvalidFrame {
                width: frame.width,
                height: frame.height,
            })?;

    let surface = if raw.dimensions() == (width, height) {
        raw
    } else {
        image::imageops::resize(&raw, width, height, FilterType::Triangle)
    };

    let mut png = Vec::new();
    surface.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(DataUri::from_bytes("image/png", &png))
}
