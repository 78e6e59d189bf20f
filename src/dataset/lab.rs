//! CIE Lab conversion for stored image containers.
//!
//! Offline utility, not on the training path: reads a split container and
//! writes a sibling container holding the same images in Lab colour space,
//! quantized to 8 bits (L scaled by 255/100, a and b offset by 128).

use std::path::Path;

use bincode::{Decode, Encode};
use std::fs::File;
use std::io::{BufReader, BufWriter};

use super::multitask::{DatasetError, MultiTaskContainer};

// sRGB D65 reference white.
const WHITE_X: f32 = 0.950_456;
const WHITE_Y: f32 = 1.0;
const WHITE_Z: f32 = 1.088_754;

/// Lab-converted images of one split, parallel to the source container.
#[derive(Encode, Decode, Clone, Debug)]
pub struct LabContainer {
    pub image_size: [u32; 2],
    /// Interleaved HWC Lab bytes per image.
    pub images: Vec<Vec<u8>>,
}

impl LabContainer {
    pub fn read(path: &Path) -> Result<Self, DatasetError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        Ok(bincode::decode_from_std_read(
            &mut reader,
            bincode::config::standard(),
        )?)
    }

    pub fn write(&self, path: &Path) -> Result<(), DatasetError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::encode_into_std_write(self, &mut writer, bincode::config::standard())?;

        Ok(())
    }
}

/// Convert an sRGB triple in [0, 1] to CIE Lab (L in [0, 100], a/b roughly
/// in [-128, 127]).
pub fn rgb_to_lab(rgb: [f32; 3]) -> [f32; 3] {
    let r = srgb_to_linear(rgb[0]);
    let g = srgb_to_linear(rgb[1]);
    let b = srgb_to_linear(rgb[2]);

    let x = 0.412_453 * r + 0.357_580 * g + 0.180_423 * b;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = 0.019_334 * r + 0.119_193 * g + 0.950_227 * b;

    let fx = lab_f(x / WHITE_X);
    let fy = lab_f(y / WHITE_Y);
    let fz = lab_f(z / WHITE_Z);

    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// Standard inverse of [rgb_to_lab]; returns sRGB in [0, 1].
pub fn lab_to_rgb(lab: [f32; 3]) -> [f32; 3] {
    let fy = (lab[0] + 16.0) / 116.0;
    let fx = fy + lab[1] / 500.0;
    let fz = fy - lab[2] / 200.0;

    let x = WHITE_X * lab_f_inv(fx);
    let y = WHITE_Y * lab_f_inv(fy);
    let z = WHITE_Z * lab_f_inv(fz);

    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_992 * y + 0.041_556 * z;
    let b = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;

    [
        linear_to_srgb(r).clamp(0.0, 1.0),
        linear_to_srgb(g).clamp(0.0, 1.0),
        linear_to_srgb(b).clamp(0.0, 1.0),
    ]
}

/// Read the RGB images of `input`, convert each pixel to 8-bit Lab and write
/// the result as a sibling [LabContainer] at `output`.
pub fn convert_container_to_lab(input: &Path, output: &Path) -> Result<(), DatasetError> {
    let container = MultiTaskContainer::read(input)?;

    let images = container
        .samples
        .iter()
        .map(|sample| {
            sample
                .image
                .chunks_exact(3)
                .flat_map(|rgb| {
                    let lab = rgb_to_lab([
                        rgb[0] as f32 / 255.0,
                        rgb[1] as f32 / 255.0,
                        rgb[2] as f32 / 255.0,
                    ]);
                    [
                        (lab[0] * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8,
                        (lab[1] + 128.0).round().clamp(0.0, 255.0) as u8,
                        (lab[2] + 128.0).round().clamp(0.0, 255.0) as u8,
                    ]
                })
                .collect()
        })
        .collect();

    let lab = LabContainer {
        image_size: container.image_size,
        images,
    };
    lab.write(output)?;

    tracing::info!(
        images = lab.images.len(),
        input = %input.display(),
        output = %output.display(),
        "converted container to Lab"
    );

    Ok(())
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

// Cube root above (6/29)^3, linear tail below.
fn lab_f(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA {
        t * t * t
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_maps_to_l100_and_neutral_chroma() {
        let lab = rgb_to_lab([1.0, 1.0, 1.0]);

        assert!((lab[0] - 100.0).abs() < 0.1, "L = {}", lab[0]);
        assert!(lab[1].abs() < 0.5, "a = {}", lab[1]);
        assert!(lab[2].abs() < 0.5, "b = {}", lab[2]);
    }

    #[test]
    fn black_maps_to_l0() {
        let lab = rgb_to_lab([0.0, 0.0, 0.0]);

        assert!(lab[0].abs() < 1e-3);
        assert!(lab[1].abs() < 1e-3);
        assert!(lab[2].abs() < 1e-3);
    }

    #[test]
    fn round_trip_recovers_rgb_within_tolerance() {
        let triples = [
            [0.2, 0.5, 0.8],
            [1.0, 0.0, 0.0],
            [0.1, 0.9, 0.3],
            [0.5, 0.5, 0.5],
            [0.0, 0.0, 1.0],
        ];

        for rgb in triples {
            let back = lab_to_rgb(rgb_to_lab(rgb));
            for channel in 0..3 {
                assert!(
                    (back[channel] - rgb[channel]).abs() < 1e-3,
                    "{rgb:?} -> {back:?}"
                );
            }
        }
    }
}
