//! Page images: decoding, lossless quarter-turn rotation and re-encoding.

mod preprocessing;

pub use preprocessing::{ImagePreprocessor, InkMask};

use std::borrow::Cow;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::metadata::Orientation;
use image::{ColorType, DynamicImage, ImageDecoder, ImageEncoder, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UprightError;

/// Clockwise rotation that brings a page upright.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// All four rotations in ascending order.
    pub const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    /// Clockwise degrees.
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Build from any multiple of 90 degrees (negative values wrap).
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Rotation equivalent to applying `self` and then `other`.
    pub fn then(self, other: Rotation) -> Rotation {
        let degrees = i32::from(self.degrees()) + i32::from(other.degrees());
        Rotation::from_degrees(degrees).unwrap_or_default()
    }

    /// Rotation that undoes `self`.
    pub fn inverse(self) -> Rotation {
        Rotation::from_degrees(-i32::from(self.degrees())).unwrap_or_default()
    }

    pub fn is_identity(self) -> bool {
        self == Rotation::Deg0
    }

    /// Whether the rotation swaps width and height.
    pub fn is_sideways(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Rotate an image. Quarter turns are exact pixel permutations.
    pub fn apply(self, image: &DynamicImage) -> DynamicImage {
        match self {
            Rotation::Deg0 => image.clone(),
            Rotation::Deg90 => image.rotate90(),
            Rotation::Deg180 => image.rotate180(),
            Rotation::Deg270 => image.rotate270(),
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value >= 360 {
            return Err(format!("rotation must be below 360, got {value}"));
        }
        Rotation::from_degrees(i32::from(value))
            .ok_or_else(|| format!("rotation must be a multiple of 90, got {value}"))
    }
}

/// Metadata carried over when a page is rewritten.
///
/// The EXIF orientation tag is always reset to 1: the decoded pixels
/// already have the orientation applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    /// Raw EXIF chunk (TIFF structure).
    pub exif: Option<Vec<u8>>,
    /// Embedded ICC colour profile.
    pub icc_profile: Option<Vec<u8>>,
}

/// A decoded page image together with where it came from.
#[derive(Debug)]
pub struct PageImage {
    /// Pixels with any EXIF orientation already applied.
    pub image: DynamicImage,
    /// Source path.
    pub path: PathBuf,
    /// Detected container format.
    pub format: ImageFormat,
    pub metadata: PageMetadata,
}

impl PageImage {
    /// Read and decode an image file.
    pub fn open(path: &Path) -> Result<Self, UprightError> {
        let bytes = std::fs::read(path).map_err(|source| UprightError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(path, &bytes)
    }

    /// Decode image bytes, guessing the format from content.
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self, UprightError> {
        let decode_err = |e: &dyn fmt::Display| UprightError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| decode_err(&e))?;
        let format = reader.format().ok_or_else(|| UprightError::Decode {
            path: path.to_path_buf(),
            reason: "unrecognised image format".to_string(),
        })?;

        let mut decoder = reader.into_decoder().map_err(|e| decode_err(&e))?;
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let mut exif = decoder.exif_metadata().unwrap_or(None);
        let icc_profile = decoder.icc_profile().unwrap_or(None);
        let mut image = DynamicImage::from_decoder(decoder).map_err(|e| decode_err(&e))?;

        if orientation != Orientation::NoTransforms {
            debug!("Applying EXIF orientation {:?} to {}", orientation, path.display());
            image.apply_orientation(orientation);
        }
        if let Some(chunk) = exif.as_mut() {
            Orientation::remove_from_exif_chunk(chunk);
        }

        Ok(Self {
            image,
            path: path.to_path_buf(),
            format,
            metadata: PageMetadata { exif, icc_profile },
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode `image` in this page's original format, keeping its metadata.
    pub fn encode(&self, image: &DynamicImage, jpeg_quality: u8) -> Result<Vec<u8>, UprightError> {
        encode_image(image, self.format, jpeg_quality, &self.metadata)
    }
}

/// Encode an image in the given format.
///
/// JPEG cannot carry alpha or 16-bit samples, so those are flattened first.
/// EXIF and ICC data are written for JPEG and PNG; other formats drop them.
pub fn encode_image(
    image: &DynamicImage,
    format: ImageFormat,
    jpeg_quality: u8,
    metadata: &PageMetadata,
) -> Result<Vec<u8>, UprightError> {
    let mut buf = Vec::new();

    match format {
        ImageFormat::Jpeg => {
            let flattened: Cow<'_, DynamicImage> = match image.color() {
                ColorType::L8 | ColorType::Rgb8 => Cow::Borrowed(image),
                ColorType::La8 | ColorType::L16 | ColorType::La16 => {
                    Cow::Owned(DynamicImage::ImageLuma8(image.to_luma8()))
                }
                _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
            };
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality);
            attach_metadata(&mut encoder, metadata);
            flattened.write_with_encoder(encoder)?;
        }
        ImageFormat::Png => {
            let mut encoder = PngEncoder::new(&mut buf);
            attach_metadata(&mut encoder, metadata);
            image.write_with_encoder(encoder)?;
        }
        _ => {
            if metadata != &PageMetadata::default() {
                debug!("{:?} output drops EXIF and ICC metadata", format);
            }
            image.write_to(&mut Cursor::new(&mut buf), format)?;
        }
    }

    Ok(buf)
}

fn attach_metadata<E: ImageEncoder>(encoder: &mut E, metadata: &PageMetadata) {
    if let Some(icc) = &metadata.icc_profile {
        if let Err(e) = encoder.set_icc_profile(icc.clone()) {
            debug!("ICC profile not kept: {}", e);
        }
    }
    if let Some(exif) = &metadata.exif {
        if let Err(e) = encoder.set_exif_metadata(exif.clone()) {
            debug!("EXIF not kept: {}", e);
        }
    }
}
