//! Tiled sweep of a segmentation model over full volumes.
//!
//! For each volume the runner allocates an all-zero output of edge
//! `n_windows · stride`, visits every grid placement (z outer, y middle,
//! x inner), copies the input window into one shared buffer, runs the model,
//! and writes the returned `stride³` patch into the output lattice. The
//! assembled output is then shape-reconciled against the input, masked, and
//! handed to the saver pool.

use std::sync::Arc;
use std::time::Instant;

use ndarray::{s, Array3, ArrayView3};

use crate::logger::{TrainingLogger, Verbosity};

use super::grid::WindowGrid;
use super::prefetch::buffered;
use super::saver::{SaverPool, VolumeSink};
use super::volume::{PredictionVolume, ScanVolume};
use super::ScanError;

// ============================================================================
// PatchModel
// ============================================================================

/// A segmentation model applied to one window at a time.
///
/// The runner reuses a single input buffer across all placements, so the
/// model must be a pure function of the current buffer contents, with no
/// state carried between calls. The returned patch must have edge `stride`
/// per axis (the model applies its own valid-convolution cropping).
pub trait PatchModel {
    /// Run inference on one input window.
    fn predict_patch(&mut self, input: ArrayView3<'_, f32>) -> Array3<f32>;
}

// ============================================================================
// ScanParams
// ============================================================================

/// Parameters for the tiled inference sweep.
#[derive(Debug, Clone)]
pub struct ScanParams {
    /// Window schedule.
    pub grid: WindowGrid,

    /// Concurrent background persistence workers.
    pub n_savers: usize,

    /// Input volumes buffered ahead of inference.
    pub prefetch: usize,

    /// Verbosity level for progress output.
    pub verbosity: Verbosity,
}

impl ScanParams {
    /// Defaults for everything but the grid.
    pub fn new(grid: WindowGrid) -> Self {
        Self {
            grid,
            n_savers: 3,
            prefetch: 2,
            verbosity: Verbosity::default(),
        }
    }
}

/// Counters from a completed scan of a volume stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Volumes scanned and handed off.
    pub n_volumes: usize,
    /// Volumes flushed to the sink.
    pub n_saved: usize,
}

// ============================================================================
// ScanRunner
// ============================================================================

/// Drives a [`PatchModel`] across volumes.
pub struct ScanRunner<M: PatchModel> {
    model: M,
    params: ScanParams,
    // Shared across placements; overwritten before every model call.
    input_buffer: Array3<f32>,
}

impl<M: PatchModel> ScanRunner<M> {
    /// Create a runner for the given model and parameters.
    pub fn new(model: M, params: ScanParams) -> Self {
        let w = params.grid.window_size;
        Self {
            model,
            params,
            input_buffer: Array3::zeros((w, w, w)),
        }
    }

    /// Scan a whole volume stream, persisting each prediction map.
    ///
    /// Volumes are prefetched through a bounded buffer and completed maps
    /// are handed to a bounded saver pool; the pool is drained before
    /// returning, so every map is flushed on success.
    pub fn run<I>(&mut self, volumes: I, sink: Arc<dyn VolumeSink>) -> Result<ScanSummary, ScanError>
    where
        I: Iterator<Item = ScanVolume> + Send + 'static,
    {
        let logger = TrainingLogger::new(self.params.verbosity);
        let pool = SaverPool::new(sink, self.params.n_savers);

        let mut n_volumes = 0usize;
        let start = Instant::now();
        for volume in buffered(volumes, self.params.prefetch) {
            let patient_id = volume.patient_id.clone();
            let prediction = self.predict_volume(&volume)?;
            pool.submit(prediction)?;

            n_volumes += 1;
            logger.log_volume(n_volumes - 1, &patient_id, start.elapsed().as_secs_f64());
        }

        let n_saved = pool.drain()?;
        logger.finish();
        Ok(ScanSummary { n_volumes, n_saved })
    }

    /// Assemble the prediction map for a single volume.
    pub fn predict_volume(&mut self, volume: &ScanVolume) -> Result<PredictionVolume, ScanError> {
        let grid = self.params.grid;
        self.check_volume_fits(volume)?;

        let edge = grid.output_edge();
        let mut output = Array3::zeros((edge, edge, edge));

        let stride = grid.stride;
        for placement in grid.placements() {
            let [iz, iy, ix] = grid.input_ranges(placement);
            self.input_buffer
                .assign(&volume.data.slice(s![iz, iy, ix]));

            let patch = self.model.predict_patch(self.input_buffer.view());
            let (pz, py, px) = patch.dim();
            if [pz, py, px] != [stride, stride, stride] {
                return Err(ScanError::PatchShape {
                    expected: [stride, stride, stride],
                    got: [pz, py, px],
                });
            }

            let [oz, oy, ox] = grid.output_ranges(placement);
            output.slice_mut(s![oz, oy, ox]).assign(&patch);
        }

        let mut output = reconcile_shape(output, volume)?;

        if let Some(mask) = &volume.lung_mask {
            if mask.dim() != output.dim() {
                let (mz, my, mx) = mask.dim();
                return Err(ScanError::MaskShape {
                    patient_id: volume.patient_id.clone(),
                    mask: [mz, my, mx],
                    volume: volume.shape(),
                });
            }
            output.zip_mut_with(mask, |out, &m| *out *= m);
        }

        Ok(PredictionVolume {
            data: output,
            patient_id: volume.patient_id.clone(),
        })
    }

    fn check_volume_fits(&self, volume: &ScanVolume) -> Result<(), ScanError> {
        let required = self.params.grid.required_input_edge();
        for (axis, &got) in volume.shape().iter().enumerate() {
            if got < required {
                return Err(ScanError::VolumeTooSmall {
                    patient_id: volume.patient_id.clone(),
                    axis,
                    required,
                    got,
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Shape reconciliation
// ============================================================================

/// Align the assembled output with the input volume's shape.
///
/// When window arithmetic does not exactly tile the input, the output is
/// centered in an all-zero volume of the input's shape. The leading edge
/// gets `diff / 2` voxels of padding per axis; an odd difference puts the
/// extra voxel on the trailing edge.
fn reconcile_shape(
    output: Array3<f32>,
    volume: &ScanVolume,
) -> Result<Array3<f32>, ScanError> {
    let target = volume.shape();
    let (oz, oy, ox) = output.dim();
    let current = [oz, oy, ox];
    if current == target {
        return Ok(output);
    }
    if current.iter().zip(target.iter()).any(|(c, t)| c > t) {
        return Err(ScanError::OutputExceedsInput {
            patient_id: volume.patient_id.clone(),
            output: current,
            input: target,
        });
    }

    let lead: Vec<usize> = target
        .iter()
        .zip(current.iter())
        .map(|(t, c)| (t - c) / 2)
        .collect();

    let mut padded = Array3::zeros((target[0], target[1], target[2]));
    padded
        .slice_mut(s![
            lead[0]..lead[0] + current[0],
            lead[1]..lead[1] + current[1],
            lead[2]..lead[2] + current[2]
        ])
        .assign(&output);
    Ok(padded)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::volume::ScanVolume;

    /// Model that keeps the central `stride³` region of its input window.
    struct CropModel {
        stride: usize,
    }

    impl PatchModel for CropModel {
        fn predict_patch(&mut self, input: ArrayView3<'_, f32>) -> Array3<f32> {
            let (w, _, _) = input.dim();
            let lo = (w - self.stride) / 2;
            let hi = lo + self.stride;
            input.slice(s![lo..hi, lo..hi, lo..hi]).to_owned()
        }
    }

    fn indexed_volume(edge: usize, patient_id: &str) -> ScanVolume {
        let data = Array3::from_shape_fn((edge, edge, edge), |(z, y, x)| {
            (z * edge * edge + y * edge + x) as f32
        });
        ScanVolume::new(data, patient_id)
    }

    fn runner(grid: WindowGrid) -> ScanRunner<CropModel> {
        let stride = grid.stride;
        let mut params = ScanParams::new(grid);
        params.verbosity = Verbosity::Silent;
        ScanRunner::new(CropModel { stride }, params)
    }

    #[test]
    fn identity_window_reconstructs_input_exactly() {
        // window == stride: no cropping, output tiles the input seamlessly
        let grid = WindowGrid::new(4, 4, 3);
        let volume = indexed_volume(12, "p1");

        let prediction = runner(grid).predict_volume(&volume).unwrap();
        assert_eq!(prediction.shape(), [12, 12, 12]);
        assert_eq!(prediction.data, volume.data);
    }

    #[test]
    fn cropped_window_aligns_with_input_interior() {
        // window 6, stride 2: output edge 8, input edge 12, pad 2 per side
        let grid = WindowGrid::new(6, 2, 4);
        let volume = indexed_volume(12, "p1");

        let prediction = runner(grid).predict_volume(&volume).unwrap();
        assert_eq!(prediction.shape(), [12, 12, 12]);

        // Interior voxels line up with the input; the border is zero padding
        let interior = prediction.data.slice(s![2..10, 2..10, 2..10]);
        let expected = volume.data.slice(s![2..10, 2..10, 2..10]);
        assert_eq!(interior, expected);
        assert_eq!(prediction.data[[0, 5, 5]], 0.0);
        assert_eq!(prediction.data[[11, 5, 5]], 0.0);
    }

    #[test]
    fn every_cell_written_exactly_once() {
        // Stateful counting model: each placement paints a distinct value,
        // so a double write would leave a mismatched tile.
        struct CountingModel {
            stride: usize,
            calls: usize,
        }
        impl PatchModel for CountingModel {
            fn predict_patch(&mut self, _: ArrayView3<'_, f32>) -> Array3<f32> {
                let call = self.calls as f32;
                self.calls += 1;
                Array3::from_elem((self.stride, self.stride, self.stride), call)
            }
        }

        let grid = WindowGrid::new(4, 2, 2);
        let mut params = ScanParams::new(grid);
        params.verbosity = Verbosity::Silent;
        let mut runner = ScanRunner::new(CountingModel { stride: 2, calls: 0 }, params);

        let volume = indexed_volume(6, "p1");
        let prediction = runner.predict_volume(&volume).unwrap();

        // 8 placements in z/y/x-major order; tile (iz,iy,ix) holds 4iz+2iy+ix
        let pad = 1; // (6 - 4) / 2
        for iz in 0..2 {
            for iy in 0..2 {
                for ix in 0..2 {
                    let value = (4 * iz + 2 * iy + ix) as f32;
                    let voxel = prediction.data[[pad + iz * 2, pad + iy * 2, pad + ix * 2]];
                    assert_eq!(voxel, value);
                }
            }
        }
        assert_eq!(runner.model.calls, 8);
    }

    #[test]
    fn odd_shape_difference_pads_trailing_edge() {
        // Output edge 4, input edge 7: lead pad 1, trailing pad 2
        let grid = WindowGrid::new(4, 4, 1);
        let data = Array3::from_elem((7, 7, 7), 1.0);
        let volume = ScanVolume::new(data, "p1");

        let prediction = runner(grid).predict_volume(&volume).unwrap();
        assert_eq!(prediction.shape(), [7, 7, 7]);
        assert_eq!(prediction.data[[0, 3, 3]], 0.0);
        assert_eq!(prediction.data[[1, 1, 1]], 1.0);
        assert_eq!(prediction.data[[4, 4, 4]], 1.0);
        assert_eq!(prediction.data[[5, 3, 3]], 0.0);
        assert_eq!(prediction.data[[6, 3, 3]], 0.0);
    }

    #[test]
    fn mask_zeroes_predictions_outside_the_region() {
        let grid = WindowGrid::new(4, 4, 2);
        let mut volume = indexed_volume(8, "p1");
        let mut mask = Array3::ones((8, 8, 8));
        mask.slice_mut(s![..4, .., ..]).fill(0.0);
        volume = volume.with_mask(mask);

        let prediction = runner(grid).predict_volume(&volume).unwrap();
        assert_eq!(prediction.data[[0, 0, 0]], 0.0);
        assert_eq!(prediction.data[[2, 3, 3]], 0.0);
        assert_eq!(
            prediction.data[[5, 3, 3]],
            volume.data[[5, 3, 3]]
        );
    }

    #[test]
    fn undersized_volume_is_rejected() {
        let grid = WindowGrid::new(8, 4, 3); // needs 16 voxels per axis
        let volume = indexed_volume(12, "p1");

        let err = runner(grid).predict_volume(&volume).unwrap_err();
        assert!(matches!(err, ScanError::VolumeTooSmall { required: 16, .. }));
    }

    #[test]
    fn wrong_patch_shape_is_rejected() {
        struct WrongShapeModel;
        impl PatchModel for WrongShapeModel {
            fn predict_patch(&mut self, input: ArrayView3<'_, f32>) -> Array3<f32> {
                input.to_owned() // returns window-sized output
            }
        }

        let grid = WindowGrid::new(6, 2, 2);
        let mut params = ScanParams::new(grid);
        params.verbosity = Verbosity::Silent;
        let mut runner = ScanRunner::new(WrongShapeModel, params);

        let err = runner.predict_volume(&indexed_volume(8, "p1")).unwrap_err();
        assert!(matches!(err, ScanError::PatchShape { .. }));
    }
}
