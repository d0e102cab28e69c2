//! Decoded 2-D slices as handed over by a [`SliceDecoder`].
//!
//! [`SliceDecoder`]: crate::decoder::SliceDecoder

use crate::window::WindowSetting;

/// Raw stored samples of one slice, before the rescale transform.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelData {
    I16(Vec<i16>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl PixelData {
    pub fn len(&self) -> usize {
        match self {
            PixelData::I16(v) => v.len(),
            PixelData::U16(v) => v.len(),
            PixelData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw value of sample `i` as `f32`.
    #[inline]
    pub fn get(&self, i: usize) -> f32 {
        match self {
            PixelData::I16(v) => v[i] as f32,
            PixelData::U16(v) => v[i] as f32,
            PixelData::F32(v) => v[i],
        }
    }
}

/// Acquisition-order key of a slice.
///
/// Neither field is assumed to be monotonic or gap-free.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SliceOrder {
    pub instance_number: Option<i32>,
    pub index_in_series: Option<i32>,
}

impl SliceOrder {
    pub fn instance(instance_number: i32) -> Self {
        Self {
            instance_number: Some(instance_number),
            index_in_series: None,
        }
    }

    /// Instance number, then index in series, then `0`.
    pub fn key(&self) -> i32 {
        self.instance_number.or(self.index_in_series).unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SliceSample {
    pub columns: usize,
    pub rows: usize,
    pub pixel_data: PixelData,
    pub rescale_slope: f32,
    pub rescale_intercept: f32,
    pub order: SliceOrder,
    /// Pixel spacing as (column spacing, row spacing) in mm.
    pub pixel_spacing: Option<(f32, f32)>,
    pub slice_thickness: Option<f32>,
    /// First window of the acquisition's VOI LUT module.
    pub voi_window: Option<WindowSetting>,
    /// Windowing property attached to the decoded image.
    pub image_window: Option<WindowSetting>,
}

impl SliceSample {
    /// A slice with identity rescale and no geometry metadata.
    pub fn new(columns: usize, rows: usize, pixel_data: PixelData) -> Self {
        Self {
            columns,
            rows,
            pixel_data,
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            order: SliceOrder::default(),
            pixel_spacing: None,
            slice_thickness: None,
            voi_window: None,
            image_window: None,
        }
    }

    pub fn with_rescale(mut self, slope: f32, intercept: f32) -> Self {
        self.rescale_slope = slope;
        self.rescale_intercept = intercept;
        self
    }

    pub fn with_order(mut self, order: SliceOrder) -> Self {
        self.order = order;
        self
    }

    /// Number of samples `columns x rows` promises.
    pub fn expected_len(&self) -> usize {
        self.columns * self.rows
    }

    /// Rescaled value of the sample at (`x`, `y`).
    #[inline]
    pub fn value(&self, x: usize, y: usize) -> f32 {
        self.rescale(self.pixel_data.get(y * self.columns + x))
    }

    #[inline]
    pub fn rescale(&self, raw: f32) -> f32 {
        raw.mul_add(self.rescale_slope, self.rescale_intercept)
    }
}

/// Sort slices into acquisition order.
///
/// The sort is stable: slices sharing a key keep their input order.
pub fn sort_slices(slices: &mut [SliceSample]) {
    slices.sort_by_key(|slice| slice.order.key());
}
