//! Turns a target image into the ordered list of pixels clients should paint.

use std::io::Cursor;

use image::{ImageFormat, ImageReader, RgbaImage};
use serde::{Serialize, Serializer};

use crate::palette::{self, PaletteIndex};

/// One cell of the target. Serialized as `[x, y, color]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementInstruction {
    pub x: u32,
    pub y: u32,
    pub color: PaletteIndex,
}

impl Serialize for PlacementInstruction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.x, self.y, self.color.get()).serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionReason {
    #[error("An error occurred.")]
    Decode(String),
    #[error("The file must be {expected_width}x{expected_height} pixels!")]
    Dimensions {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },
    #[error("A pixel on {x}, {y} has a wrong color. R: {r}, G: {g}, B: {b}, A: {a}")]
    WrongColor {
        x: u32,
        y: u32,
        r: u8,
        g: u8,
        b: u8,
        a: u8,
    },
}

/// Decodes PNG bytes and extracts the order list. The header is checked
/// against the expected geometry before any pixel data is decoded.
pub fn extract(
    bytes: &[u8],
    expected_width: u32,
    expected_height: u32,
) -> Result<Vec<PlacementInstruction>, RejectionReason> {
    let reader = || ImageReader::with_format(Cursor::new(bytes), ImageFormat::Png);
    let decode_failed = |err: image::ImageError| RejectionReason::Decode(err.to_string());

    let (width, height) = reader().into_dimensions().map_err(decode_failed)?;
    check_dimensions(width, height, expected_width, expected_height)?;

    let raster = reader().decode().map_err(decode_failed)?.to_rgba8();
    extract_rgba(&raster, expected_width, expected_height)
}

fn check_dimensions(
    width: u32,
    height: u32,
    expected_width: u32,
    expected_height: u32,
) -> Result<(), RejectionReason> {
    if width != expected_width || height != expected_height {
        return Err(RejectionReason::Dimensions {
            expected_width,
            expected_height,
            width,
            height,
        });
    }
    Ok(())
}

/// Scans an RGBA raster in row-major order. Non-opaque pixels produce no
/// instruction; the first opaque pixel outside the palette rejects the whole
/// image.
pub fn extract_rgba(
    raster: &RgbaImage,
    expected_width: u32,
    expected_height: u32,
) -> Result<Vec<PlacementInstruction>, RejectionReason> {
    let (width, height) = raster.dimensions();
    check_dimensions(width, height, expected_width, expected_height)?;

    let mut orders = Vec::new();
    for (i, px) in raster.as_raw().chunks_exact(4).enumerate() {
        let (r, g, b, a) = (px[0], px[1], px[2], px[3]);
        if a != u8::MAX {
            continue;
        }
        // Coordinates come from the validated width, never a fixed constant.
        let x = (i % width as usize) as u32;
        let y = (i / width as usize) as u32;
        let color = palette::lookup_rgb(r, g, b)
            .ok_or(RejectionReason::WrongColor { x, y, r, g, b, a })?;
        orders.push(PlacementInstruction { x, y, color });
    }
    Ok(orders)
}

/// Bytes of an order file: a JSON array of `[x, y, color]` triples.
pub fn encode_orders(orders: &[PlacementInstruction]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(orders)
}
