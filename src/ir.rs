//! IR radiometric decoding.
//!
//! Converts raw IR sensor samples to a fixed-point temperature map using a
//! two-constant linear calibration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sensor physical range, Kelvin.
pub const IR_TEMP_MIN_K: f32 = 0.0;
pub const IR_TEMP_MAX_K: f32 = 500.0;

pub const DEFAULT_EMISSIVITY: f32 = 0.95;
/// 20°C ambient.
pub const DEFAULT_AMBIENT_K: f32 = 293.15;

/// Linear calibration: `kelvin = c1 * raw + c2`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IrCalibration {
    pub c1: f32,
    pub c2: f32,
}

/// Decoded temperature map. Values are Kelvin × 100 (0.01 K resolution);
/// the [0, 500] K clamp guarantees they fit a u16 with margin.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IrFrame {
    pub temp_map: Vec<u16>,
    pub width: u32,
    pub height: u32,
    pub emissivity: f32,
    pub ambient_temp: f32,
    pub calibration: IrCalibration,
    pub timestamp_ns: u64,
}

impl IrFrame {
    /// Fixed-point temperature at (x, y), or `None` out of bounds.
    pub fn temp_at(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.temp_map
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Temperature at (x, y) in Kelvin.
    pub fn kelvin_at(&self, x: u32, y: u32) -> Option<f32> {
        self.temp_at(x, y).map(|centi| centi as f32 / 100.0)
    }
}

/// Decode a raw sample grid into a temperature map.
///
/// Per pixel: apply the calibration, clamp to the sensor's physical range,
/// then quantize to centikelvin. Clamp happens before the ×100 scale so the
/// quantized value can never exceed u16 range.
pub fn decode_ir_radiometric(
    raw: &[u16],
    width: u32,
    height: u32,
    calibration: IrCalibration,
) -> Result<IrFrame> {
    let num_pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| {
            Error::InvalidArgument(format!("{}x{} overflows pixel count", width, height))
        })?;
    if raw.len() != num_pixels {
        return Err(Error::InvalidArgument(format!(
            "raw sample count {} does not match {}x{} grid",
            raw.len(),
            width,
            height
        )));
    }

    let temp_map = raw
        .iter()
        .map(|&sample| {
            let kelvin = (calibration.c1 * sample as f32 + calibration.c2)
                .clamp(IR_TEMP_MIN_K, IR_TEMP_MAX_K);
            (kelvin * 100.0).round() as u16
        })
        .collect();

    Ok(IrFrame {
        temp_map,
        width,
        height,
        emissivity: DEFAULT_EMISSIVITY,
        ambient_temp: DEFAULT_AMBIENT_K,
        calibration,
        timestamp_ns: 0,
    })
}
