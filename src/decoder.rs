//! The intensity decoder seam.
//!
//! Image decoding is owned by an external collaborator. The volume loader only
//! sees [`SliceDecoder`]; [`DicomDecoder`] is the implementation used for
//! DICOM files on disk.

use std::path::{Path, PathBuf};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use futures::future::{BoxFuture, FutureExt};
use ndarray::s;
use thiserror::Error;
use tracing::{debug, warn};

use crate::slice::{PixelData, SliceOrder, SliceSample};
use crate::window::WindowSetting;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("DICOM error: {0}")]
    Read(#[from] dicom::object::ReadError),

    #[error("Pixel data error: {0}")]
    Pixel(#[from] dicom::pixeldata::Error),

    #[error("Missing attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Unsupported image: {0}")]
    Unsupported(String),
}

/// Produces one decoded slice per image reference.
///
/// Decoding may suspend (network, worker round trips); the loader awaits one
/// slice at a time.
pub trait SliceDecoder {
    type Reference: Sync;

    fn decode<'a>(
        &'a self,
        reference: &'a Self::Reference,
    ) -> BoxFuture<'a, Result<SliceSample, DecodeError>>;
}

/// Decodes single-frame DICOM objects into [`SliceSample`]s.
///
/// Only the first frame of multi-frame objects is used.
#[derive(Clone, Copy, Debug, Default)]
pub struct DicomDecoder;

impl DicomDecoder {
    pub fn decode_object(
        &self,
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<SliceSample, DecodeError> {
        if dicom_object.element(tags::PIXEL_DATA).is_err() {
            return Err(DecodeError::MissingAttribute("PixelData"));
        }
        let pixel_data = dicom_object.decode_pixel_data()?;
        if pixel_data.samples_per_pixel() != 1 {
            return Err(DecodeError::Unsupported(format!(
                "{} samples per pixel",
                pixel_data.samples_per_pixel()
            )));
        }
        // Stored values; the rescale is applied when the volume is folded.
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::None)
            .with_voi_lut(VoiLutOption::Identity);
        let frame = pixel_data
            .to_ndarray_with_options::<f32>(&options)?
            .slice_move(s![0, .., .., 0]);
        let (rows, columns) = frame.dim();
        let samples: Vec<f32> = frame.iter().copied().collect();

        let slice = Self::slice_from(dicom_object, columns, rows, PixelData::F32(samples));
        debug!(
            "Decoded {}x{} slice, order key {}",
            slice.columns,
            slice.rows,
            slice.order.key()
        );
        Ok(slice)
    }

    /// Attach the attributes of `dicom_object` to already decoded samples.
    fn slice_from(
        dicom_object: &InMemDicomObject,
        columns: usize,
        rows: usize,
        pixel_data: PixelData,
    ) -> SliceSample {
        let (rescale_slope, rescale_intercept) = Self::get_rescale(dicom_object);
        SliceSample {
            columns,
            rows,
            pixel_data,
            rescale_slope,
            rescale_intercept,
            order: Self::get_order(dicom_object),
            pixel_spacing: Self::get_pixel_spacing(dicom_object),
            slice_thickness: Self::get_float(dicom_object, tags::SLICE_THICKNESS),
            voi_window: Self::get_window(dicom_object),
            // DICOM images carry their window in the VOI LUT module only
            image_window: None,
        }
    }

    fn get_float(dicom_object: &InMemDicomObject, tag: dicom::core::Tag) -> Option<f32> {
        dicom_object.element(tag).ok()?.to_float32().ok()
    }

    fn get_int(dicom_object: &InMemDicomObject, tag: dicom::core::Tag) -> Option<i32> {
        dicom_object.element(tag).ok()?.to_int::<i32>().ok()
    }

    fn get_order(dicom_object: &InMemDicomObject) -> SliceOrder {
        SliceOrder {
            instance_number: Self::get_int(dicom_object, tags::INSTANCE_NUMBER),
            index_in_series: Self::get_int(dicom_object, tags::IN_STACK_POSITION_NUMBER),
        }
    }

    fn get_rescale(dicom_object: &InMemDicomObject) -> (f32, f32) {
        let slope = Self::get_float(dicom_object, tags::RESCALE_SLOPE).unwrap_or(1.0);
        let intercept = Self::get_float(dicom_object, tags::RESCALE_INTERCEPT).unwrap_or(0.0);
        (slope, intercept)
    }

    fn get_pixel_spacing(dicom_object: &InMemDicomObject) -> Option<(f32, f32)> {
        let pixel_spacing = dicom_object
            .element(tags::PIXEL_SPACING)
            .ok()?
            .to_multi_float32()
            .ok()?;
        // (row spacing, column spacing) on the wire
        match pixel_spacing.as_slice() {
            [row, col, ..] => Some((*col, *row)),
            _ => None,
        }
    }

    /// First window of the VOI LUT module, if any.
    fn get_window(dicom_object: &InMemDicomObject) -> Option<WindowSetting> {
        let first = |tag| {
            dicom_object
                .element(tag)
                .ok()?
                .to_multi_float32()
                .ok()?
                .first()
                .copied()
        };
        let center = first(tags::WINDOW_CENTER)?;
        let width = first(tags::WINDOW_WIDTH)?;
        WindowSetting::new(center, width)
            .inspect_err(|e| warn!("Ignoring VOI LUT window: {e}"))
            .ok()
    }
}

impl SliceDecoder for DicomDecoder {
    type Reference = PathBuf;

    fn decode<'a>(
        &'a self,
        reference: &'a PathBuf,
    ) -> BoxFuture<'a, Result<SliceSample, DecodeError>> {
        async move {
            let dicom_object = open_file(reference.as_path())?;
            self.decode_object(&dicom_object)
        }
        .boxed()
    }
}

/// Collect the `.dcm` files of a directory.
pub fn dicom_files_in(path: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<_> = std::fs::read_dir(path.as_ref())?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
        })
        .collect();
    // read_dir order is platform dependent; ties in the slice order fall back to it
    paths.sort();
    Ok(paths)
}
