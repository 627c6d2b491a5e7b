//! Volume value types.

use ndarray::Array3;

/// Homogeneous voxel-to-world transform, carried through unchanged.
pub type AffineTransform = [[f32; 4]; 4];

// =============================================================================
// ScanVolume
// =============================================================================

/// One input volume from the data iterator.
///
/// Consumed once per inference pass and discarded after its prediction map
/// is handed off.
#[derive(Debug, Clone)]
pub struct ScanVolume {
    /// Voxel intensities.
    pub data: Array3<f32>,
    /// Optional anatomical region-of-interest mask, same shape as `data`.
    pub lung_mask: Option<Array3<f32>>,
    /// Voxel-to-world transform produced by preprocessing.
    pub transform: AffineTransform,
    /// Patient identifier.
    pub patient_id: String,
}

impl ScanVolume {
    /// Create a volume without a mask and with an identity transform.
    pub fn new(data: Array3<f32>, patient_id: impl Into<String>) -> Self {
        Self {
            data,
            lung_mask: None,
            transform: IDENTITY_TRANSFORM,
            patient_id: patient_id.into(),
        }
    }

    /// Attach a region-of-interest mask.
    pub fn with_mask(mut self, mask: Array3<f32>) -> Self {
        self.lung_mask = Some(mask);
        self
    }

    /// Shape as `[z, y, x]`.
    pub fn shape(&self) -> [usize; 3] {
        let (z, y, x) = self.data.dim();
        [z, y, x]
    }
}

/// Identity voxel-to-world transform.
pub const IDENTITY_TRANSFORM: AffineTransform = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

// =============================================================================
// PredictionVolume
// =============================================================================

/// Full-volume prediction map assembled tile by tile.
///
/// Handed to a persistence worker after assembly; the worker owns it until
/// the write completes.
#[derive(Debug, Clone)]
pub struct PredictionVolume {
    /// Per-voxel probabilities in `[0, 1]`.
    pub data: Array3<f32>,
    /// Patient identifier the map belongs to.
    pub patient_id: String,
}

impl PredictionVolume {
    /// Shape as `[z, y, x]`.
    pub fn shape(&self) -> [usize; 3] {
        let (z, y, x) = self.data.dim();
        [z, y, x]
    }

    /// Quantize to the 8-bit unsigned range: `round(v * 255.99)`.
    ///
    /// The cast saturates, so 1.0 maps to 255 and NaN to 0.
    pub fn to_u8(&self) -> Array3<u8> {
        self.data.mapv(|v| (v * 255.99).round() as u8)
    }
}

// =============================================================================
// Tests
// =============================================================================
