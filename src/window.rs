use image::GrayImage;
use ndarray::ArrayView2;
use rayon::prelude::*;
use thiserror::Error;
use tracing::warn;

use crate::slice::SliceSample;

#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("Invalid window (center {center}, width {width})")]
    InvalidWindow { center: f32, width: f32 },
}

/// CT display window: a center and a width in rescaled intensity units.
///
/// A `WindowSetting` is immutable; build a new one to change the window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowSetting {
    center: f32,
    width: f32,
}

impl Default for WindowSetting {
    /// Soft-tissue abdomen window.
    fn default() -> Self {
        Self::SOFT_TISSUE
    }
}

impl WindowSetting {
    pub const SOFT_TISSUE: WindowSetting = WindowSetting {
        center: 40.0,
        width: 400.0,
    };

    /// Build a window. `width` must be positive and both values finite.
    pub fn new(center: f32, width: f32) -> Result<Self, WindowError> {
        if center.is_finite() && width.is_finite() && width > 0.0 {
            Ok(Self { center, width })
        } else {
            Err(WindowError::InvalidWindow { center, width })
        }
    }

    /// Like [`WindowSetting::new`], falling back to the default window on
    /// invalid input.
    pub fn or_default(center: f32, width: f32) -> Self {
        Self::new(center, width).unwrap_or_else(|e| {
            warn!("{e}, using default window");
            Self::default()
        })
    }

    #[inline]
    pub fn center(&self) -> f32 {
        self.center
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.center - self.width / 2.0
    }

    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.center + self.width / 2.0
    }

    /// Map a rescaled intensity to an 8-bit gray sample.
    ///
    /// Values outside the window saturate; NaN maps to 0.
    #[inline]
    pub fn to_gray8(&self, value: f32) -> u8 {
        // 255, not 256.
        let gray = (value - self.lower_bound()) / self.width * 255.0;
        gray.clamp(0.0, 255.0) as u8
    }
}

#[inline]
pub fn to_gray8(value: f32, window: &WindowSetting) -> u8 {
    window.to_gray8(value)
}

/// Where the window of a loaded series came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowSource {
    VoiLut,
    Image,
    Default,
}

/// Pick the display window for a series from its first slice.
///
/// The VOI LUT window wins over the decoded image's own window, which wins
/// over the soft-tissue default. Evaluated once per load.
pub fn resolve_window(first_slice: Option<&SliceSample>) -> (WindowSetting, WindowSource) {
    let Some(slice) = first_slice else {
        return (WindowSetting::default(), WindowSource::Default);
    };
    match (slice.voi_window, slice.image_window) {
        (Some(window), _) => (window, WindowSource::VoiLut),
        (None, Some(window)) => (window, WindowSource::Image),
        (None, None) => (WindowSetting::default(), WindowSource::Default),
    }
}

/// Window every sample of a plane into an 8-bit grayscale image.
pub fn window_plane(plane: &ArrayView2<'_, f32>, window: &WindowSetting) -> GrayImage {
    let (height, width) = plane.dim();
    let pixels: Vec<u8> = plane
        .into_par_iter()
        .map(|&v| window.to_gray8(v))
        .collect();
    // length always matches width * height
    GrayImage::from_raw(width as u32, height as u32, pixels).unwrap_or_default()
}

/// Window a decoded slice directly, without building a volume first.
pub fn window_slice(slice: &SliceSample, window: &WindowSetting) -> GrayImage {
    GrayImage::from_fn(slice.columns as u32, slice.rows as u32, |x, y| {
        image::Luma([window.to_gray8(slice.value(x as usize, y as usize))])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::PixelData;
    use ndarray::array;

    #[test]
    fn rejects_non_positive_width() {
        assert!(WindowSetting::new(0.0, 0.0).is_err());
        assert!(WindowSetting::new(0.0, -1.0).is_err());
        assert!(WindowSetting::new(f32::NAN, 10.0).is_err());
        assert_eq!(WindowSetting::or_default(40.0, 0.0), WindowSetting::SOFT_TISSUE);
    }

    #[test]
    fn soft_tissue_window() {
        let window = WindowSetting::default();
        assert_eq!(window.to_gray8(40.0), 127);
        assert_eq!(window.to_gray8(-160.0), 0);
        assert_eq!(window.to_gray8(240.0), 255);
        assert_eq!(window.to_gray8(-1000.0), 0);
        assert_eq!(window.to_gray8(3000.0), 255);
    }

    #[test]
    fn extremes_never_panic() {
        let window = WindowSetting::new(80.0, 40.0).unwrap();
        assert_eq!(window.to_gray8(f32::MIN), 0);
        assert_eq!(window.to_gray8(f32::MAX), 255);
        assert_eq!(window.to_gray8(f32::NAN), 0);
        assert_eq!(window.to_gray8(70.0), (255.0 * 0.25) as u8);
        assert_eq!(window.to_gray8(99.999), 254);
    }

    #[test]
    fn monotonic_in_value() {
        let window = WindowSetting::new(-600.0, 1500.0).unwrap();
        let mut last = 0;
        for v in (-2000..2000).step_by(7) {
            let g = window.to_gray8(v as f32);
            assert!(g >= last, "{v} -> {g} after {last}");
            last = g;
        }
        assert_eq!(window.to_gray8(-600.0), 127);
    }

    #[test]
    fn window_precedence() {
        let mut slice = SliceSample::new(1, 1, PixelData::I16(vec![0]));
        assert_eq!(resolve_window(None).1, WindowSource::Default);
        assert_eq!(resolve_window(Some(&slice)).1, WindowSource::Default);

        slice.image_window = Some(WindowSetting::new(50.0, 350.0).unwrap());
        assert_eq!(
            resolve_window(Some(&slice)),
            (WindowSetting::new(50.0, 350.0).unwrap(), WindowSource::Image)
        );

        slice.voi_window = Some(WindowSetting::new(-600.0, 1500.0).unwrap());
        assert_eq!(resolve_window(Some(&slice)).1, WindowSource::VoiLut);
    }

    #[test]
    fn windows_a_plane() {
        let plane = array![[-160.0f32, 40.0], [240.0, 1000.0]];
        let image = window_plane(&plane.view(), &WindowSetting::default());
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.as_raw(), &vec![0, 127, 255, 255]);
    }

    #[test]
    fn windows_a_slice_after_rescale() {
        let slice =
            SliceSample::new(2, 1, PixelData::I16(vec![864, 1264])).with_rescale(1.0, -1024.0);
        let image = window_slice(&slice, &WindowSetting::default());
        assert_eq!(image.as_raw(), &vec![0, 255]);
    }
}
