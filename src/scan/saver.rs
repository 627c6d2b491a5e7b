//! Background persistence of prediction volumes.
//!
//! [`SaverPool`] owns a fixed set of long-lived worker threads fed through a
//! bounded queue: `submit` blocks when every worker is busy and the queue is
//! full, which caps the number of prediction volumes alive at once. `drain`
//! closes the queue and joins all workers, so every accepted volume is
//! flushed before the pool is gone.
//!
//! Workers write through a [`VolumeSink`], which keeps the disk format in
//! one place ([`DiskSink`]) and lets tests substitute instrumented sinks.
//! There is no cancellation or timeout; a sink that never returns stalls the
//! pool.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use super::volume::PredictionVolume;
use super::ScanError;

// =============================================================================
// VolumeSink
// =============================================================================

/// Destination for quantized prediction volumes.
///
/// Implementations must be safe to call from several workers at once; each
/// call receives a distinct patient id, so writers to per-patient files need
/// no locking.
pub trait VolumeSink: Send + Sync + 'static {
    /// Persist one volume under the given patient id.
    fn write(&self, patient_id: &str, volume: &Array3<u8>) -> Result<(), ScanError>;
}

// =============================================================================
// DiskSink
// =============================================================================

/// Serialized form of a prediction volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredVolume {
    /// Shape as `[z, y, x]`.
    pub shape: [usize; 3],
    /// Voxels in row-major order, quantized to `[0, 255]`.
    pub voxels: Vec<u8>,
}

/// Writes one binary file per patient id into a directory.
#[derive(Debug, Clone)]
pub struct DiskSink {
    dir: PathBuf,
}

impl DiskSink {
    /// Create the sink, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ScanError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of the artifact for a patient id.
    pub fn path_for(&self, patient_id: &str) -> PathBuf {
        self.dir.join(format!("{patient_id}.bin"))
    }

    /// Read a stored volume back.
    pub fn load(&self, patient_id: &str) -> Result<Array3<u8>, ScanError> {
        Self::load_path(&self.path_for(patient_id))
    }

    /// Read a stored volume from an explicit path.
    pub fn load_path(path: &Path) -> Result<Array3<u8>, ScanError> {
        let reader = BufReader::new(File::open(path)?);
        let stored: StoredVolume = bincode::deserialize_from(reader)?;
        let [z, y, x] = stored.shape;
        let array = Array3::from_shape_vec((z, y, x), stored.voxels)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(array)
    }
}

impl VolumeSink for DiskSink {
    fn write(&self, patient_id: &str, volume: &Array3<u8>) -> Result<(), ScanError> {
        let (z, y, x) = volume.dim();
        let stored = StoredVolume {
            shape: [z, y, x],
            voxels: volume.iter().copied().collect(),
        };
        let writer = BufWriter::new(File::create(self.path_for(patient_id))?);
        bincode::serialize_into(writer, &stored)?;
        Ok(())
    }
}

// =============================================================================
// SaverPool
// =============================================================================

/// Bounded pool of background persistence workers.
pub struct SaverPool {
    sender: Option<Sender<PredictionVolume>>,
    workers: Vec<JoinHandle<Result<usize, ScanError>>>,
}

impl SaverPool {
    /// Spawn `n_workers` long-lived workers writing through `sink`.
    ///
    /// The submit queue holds at most `n_workers` pending volumes, so at
    /// most `2 · n_workers` accepted volumes exist at once (queued plus
    /// in-flight) and callers feel backpressure beyond that.
    pub fn new(sink: Arc<dyn VolumeSink>, n_workers: usize) -> Self {
        assert!(n_workers > 0, "saver pool needs at least one worker");

        let (sender, receiver) = bounded::<PredictionVolume>(n_workers);
        let workers = (0..n_workers)
            .map(|_| {
                let receiver: Receiver<PredictionVolume> = receiver.clone();
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    let mut written = 0usize;
                    while let Ok(volume) = receiver.recv() {
                        let quantized = volume.to_u8();
                        sink.write(&volume.patient_id, &quantized)?;
                        written += 1;
                    }
                    Ok(written)
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Hand a volume to the pool, blocking while the queue is full.
    ///
    /// Fails with [`ScanError::PoolShutDown`] if every worker has already
    /// exited (e.g. after a write error).
    pub fn submit(&self, volume: PredictionVolume) -> Result<(), ScanError> {
        let sender = self.sender.as_ref().ok_or(ScanError::PoolShutDown)?;
        sender.send(volume).map_err(|_| ScanError::PoolShutDown)
    }

    /// Close the queue, join all workers, and report the volumes written.
    ///
    /// Returns the first worker error if any write failed.
    pub fn drain(mut self) -> Result<usize, ScanError> {
        self.sender.take(); // disconnect; workers finish the queue and exit

        let mut written = 0usize;
        let mut first_error = None;
        for worker in self.workers.drain(..) {
            match worker.join() {
                Ok(Ok(count)) => written += count,
                Ok(Err(error)) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                Err(_) => {
                    if first_error.is_none() {
                        first_error = Some(ScanError::WorkerPanicked);
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(written),
        }
    }
}

impl Drop for SaverPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
