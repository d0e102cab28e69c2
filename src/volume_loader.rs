use crate::decoder::{DecodeError, DicomDecoder, SliceDecoder, dicom_files_in};
use crate::slice::{SliceSample, sort_slices};
use crate::volume::{Dims, LabelVolume, Spacing, Volume};
use crate::window::{WindowSetting, WindowSource, resolve_window};

use ndarray::{Array3, ArrayViewMut2, s};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};
use web_time::Instant;

#[derive(Debug, Error)]
pub enum VolumeBuildError {
    #[error("No slices to build a volume from")]
    EmptyInput,

    #[error("Slice {index} is {found:?} (columns, rows), expected {expected:?}")]
    DimensionMismatch {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Slice {index} has {found} samples, expected {expected}")]
    PixelCountMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Failed to decode slice {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: DecodeError,
    },

    #[error("Volume build cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cooperative cancellation flag shared between a loader and its owner.
///
/// Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A base volume together with the window chosen for it at load time.
#[derive(Debug)]
pub struct LoadedSeries {
    pub volume: Volume,
    pub window: WindowSetting,
    pub window_source: WindowSource,
}

fn check_slice(
    index: usize,
    slice: &SliceSample,
    expected: (usize, usize),
) -> Result<(), VolumeBuildError> {
    let found = (slice.columns, slice.rows);
    if found != expected {
        return Err(VolumeBuildError::DimensionMismatch {
            index,
            expected,
            found,
        });
    }
    let samples = slice.expected_len();
    if slice.pixel_data.len() != samples {
        return Err(VolumeBuildError::PixelCountMismatch {
            index,
            expected: samples,
            found: slice.pixel_data.len(),
        });
    }
    Ok(())
}

/// Fold one slice into its plane, applying the slice's own rescale.
fn fold_slice<T>(
    mut plane: ArrayViewMut2<'_, T>,
    slice: &SliceSample,
    convert: impl Fn(f32) -> T,
) {
    for ((y, x), voxel) in plane.indexed_iter_mut() {
        *voxel = convert(slice.value(x, y));
    }
}

fn get_spacing(slices: &[SliceSample]) -> Spacing {
    let pixel = slices.iter().find_map(|slice| slice.pixel_spacing);
    let thickness = slices.iter().find_map(|slice| slice.slice_thickness);
    let default = Spacing::default();
    Spacing {
        pixel_x: pixel.map_or(default.pixel_x, |p| p.0),
        pixel_y: pixel.map_or(default.pixel_y, |p| p.1),
        slice_thickness: thickness.unwrap_or(default.slice_thickness),
    }
}

/// Build a volume from slices already sorted into acquisition order.
///
/// `progress` is called after each slice is folded in, with the completed
/// fraction in `[0, 1]`.
///
/// # Errors
///
/// Returns error if `slices` is empty or the slice geometry is inconsistent
pub fn build_volume_with_progress(
    slices: &[SliceSample],
    mut progress: impl FnMut(f32),
) -> Result<Volume, VolumeBuildError> {
    let first = slices.first().ok_or(VolumeBuildError::EmptyInput)?;
    let expected = (first.columns, first.rows);
    let depth = slices.len();
    let mut data = Array3::<f32>::zeros((depth, first.rows, first.columns));

    for (z, slice) in slices.iter().enumerate() {
        check_slice(z, slice, expected)?;
        fold_slice(data.slice_mut(s![z, .., ..]), slice, |v| v);
        progress((z + 1) as f32 / depth as f32);
    }

    Ok(Volume::new(data, get_spacing(slices)))
}

/// Build a volume from slices already sorted into acquisition order.
pub fn build_volume(slices: &[SliceSample]) -> Result<Volume, VolumeBuildError> {
    build_volume_with_progress(slices, |_| {})
}

/// Build a label volume sharing the slice axis of a base volume.
///
/// Only the first `min(label slices, base slices)` planes are filled; the rest
/// stay background. All label slices must agree on their in-plane size, which
/// may differ from the base grid.
pub fn build_label_volume(
    slices: &[SliceSample],
    base: Dims,
) -> Result<LabelVolume, VolumeBuildError> {
    let first = slices.first().ok_or(VolumeBuildError::EmptyInput)?;
    let expected = (first.columns, first.rows);
    if expected != (base.cols, base.rows) {
        debug!(
            "Label grid {:?} differs from base grid {:?}",
            expected,
            (base.cols, base.rows)
        );
    }
    if slices.len() > base.slices {
        warn!(
            "Ignoring {} label slices beyond the {} base slices",
            slices.len() - base.slices,
            base.slices
        );
    }

    let mut data = Array3::<u16>::zeros((base.slices, first.rows, first.columns));
    for (z, slice) in slices.iter().take(base.slices).enumerate() {
        check_slice(z, slice, expected)?;
        fold_slice(data.slice_mut(s![z, .., ..]), slice, |v| {
            v.round().clamp(0.0, u16::MAX as f32) as u16
        });
    }
    Ok(LabelVolume::new(data))
}

/// Decodes and assembles slice streams into volumes.
pub struct VolumeLoader<'a, D> {
    decoder: &'a D,
    cancel: CancellationToken,
}

impl<'a, D: SliceDecoder> VolumeLoader<'a, D> {
    pub fn new(decoder: &'a D, cancel: CancellationToken) -> Self {
        Self { decoder, cancel }
    }

    /// Decode every reference, one at a time.
    ///
    /// A single failed slice aborts the whole load.
    async fn decode_all(
        &self,
        references: &[D::Reference],
        progress: &mut impl FnMut(f32),
    ) -> Result<Vec<SliceSample>, VolumeBuildError> {
        let total = references.len();
        let mut slices = Vec::with_capacity(total);
        for (index, reference) in references.iter().enumerate() {
            let decoded = self.decoder.decode(reference).await;
            if self.cancel.is_cancelled() {
                debug!("Load cancelled after {index} slices");
                return Err(VolumeBuildError::Cancelled);
            }
            let slice = decoded.map_err(|source| VolumeBuildError::Decode { index, source })?;
            slices.push(slice);
            progress((index + 1) as f32 / total as f32);
            // let the host repaint between slices
            tokio::task::yield_now().await;
            if self.cancel.is_cancelled() {
                return Err(VolumeBuildError::Cancelled);
            }
        }
        Ok(slices)
    }

    /// Load a base volume and resolve its display window.
    ///
    /// `progress` reports the decoded fraction of the series. Decoding
    /// dominates the load; folding the sorted slices afterwards is not
    /// reported, so `1.0` arrives once the last slice is decoded.
    ///
    /// # Errors
    ///
    /// Returns error if no references are given, a slice fails to decode,
    /// slice geometry is inconsistent, or the load is cancelled
    pub async fn load(
        &self,
        references: &[D::Reference],
        mut progress: impl FnMut(f32),
    ) -> Result<LoadedSeries, VolumeBuildError> {
        if references.is_empty() {
            return Err(VolumeBuildError::EmptyInput);
        }
        let started = Instant::now();
        let mut slices = self.decode_all(references, &mut progress).await?;
        sort_slices(&mut slices);

        let (window, window_source) = resolve_window(slices.first());
        let volume = build_volume(&slices)?;
        info!(
            "Built {:?} volume in {:?} (window {}/{} from {:?})",
            volume.dims(),
            started.elapsed(),
            window.center(),
            window.width(),
            window_source
        );
        Ok(LoadedSeries {
            volume,
            window,
            window_source,
        })
    }

    /// Load a segmentation stack for an already loaded base volume.
    pub async fn load_labels(
        &self,
        references: &[D::Reference],
        base: Dims,
        mut progress: impl FnMut(f32),
    ) -> Result<LabelVolume, VolumeBuildError> {
        if references.is_empty() {
            return Err(VolumeBuildError::EmptyInput);
        }
        let mut slices = self.decode_all(references, &mut progress).await?;
        sort_slices(&mut slices);
        let labels = build_label_volume(&slices, base)?;
        info!("Built {:?} label volume", labels.dims());
        Ok(labels)
    }
}

impl VolumeLoader<'_, DicomDecoder> {
    /// Load a volume from file paths
    pub async fn load_from_file_paths(
        &self,
        paths: &[PathBuf],
        progress: impl FnMut(f32),
    ) -> Result<LoadedSeries, VolumeBuildError> {
        self.load(paths, progress).await
    }

    /// Load a volume from a directory containing .dcm files
    pub async fn load_from_directory(
        &self,
        path: impl AsRef<Path>,
        progress: impl FnMut(f32),
    ) -> Result<LoadedSeries, VolumeBuildError> {
        let paths = dicom_files_in(path)?;
        self.load(&paths, progress).await
    }

    /// Load a label volume from a directory containing .dcm files
    pub async fn load_labels_from_directory(
        &self,
        path: impl AsRef<Path>,
        base: Dims,
        progress: impl FnMut(f32),
    ) -> Result<LabelVolume, VolumeBuildError> {
        let paths = dicom_files_in(path)?;
        self.load_labels(&paths, base, progress).await
    }
}
