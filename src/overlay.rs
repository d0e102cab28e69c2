//! Segmentation overlay compositing.
//!
//! Labels are colored through a [`ColorAssignment`], filtered by
//! [`ClassVisibility`] and blended over a windowed grayscale plane according
//! to a [`BlendPolicy`]. Both the MPR panel and the native 2-D overlay go
//! through [`composite_overlay`]; they differ only in the policy they pass.

use std::collections::HashMap;

use image::{GrayImage, Rgba, RgbaImage};
use tracing::debug;

use crate::enums::{BlendPolicy, LabelClass};
use crate::volume::Plane;

/// Colors for labels with a fixed meaning.
const FIXED_COLORS: [(u16, Rgba<u8>); 3] = [
    (1, Rgba([255, 0, 0, 128])),
    (2, Rgba([0, 255, 0, 128])),
    (3, Rgba([0, 128, 255, 128])),
];

/// Round-robin palette for labels outside the fixed table.
const FALLBACK_PALETTE: [Rgba<u8>; 8] = [
    Rgba([255, 255, 0, 128]),
    Rgba([0, 255, 255, 128]),
    Rgba([255, 0, 255, 128]),
    Rgba([255, 128, 0, 128]),
    Rgba([128, 0, 255, 128]),
    Rgba([0, 255, 128, 128]),
    Rgba([255, 0, 128, 128]),
    Rgba([128, 255, 0, 128]),
];

/// Label value to color mapping.
///
/// Unknown labels get the next palette color the first time they are seen,
/// so the assignment depends on the order labels are encountered. The table
/// lives as long as the viewer session that owns it.
#[derive(Clone, Debug, Default)]
pub struct ColorAssignment {
    fallback: HashMap<u16, Rgba<u8>>,
}

impl ColorAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixed(label: u16) -> Option<Rgba<u8>> {
        FIXED_COLORS
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, color)| *color)
    }

    /// Color of `label`, assigning a fallback color on first sight.
    pub fn resolve(&mut self, label: u16) -> Rgba<u8> {
        if let Some(color) = Self::fixed(label) {
            return color;
        }
        let next = self.fallback.len();
        *self.fallback.entry(label).or_insert_with(|| {
            let color = FALLBACK_PALETTE[next % FALLBACK_PALETTE.len()];
            debug!("Assigned fallback color {:?} to label {label}", color.0);
            color
        })
    }

    /// Color of `label` without assigning one.
    pub fn get(&self, label: u16) -> Option<Rgba<u8>> {
        Self::fixed(label).or_else(|| self.fallback.get(&label).copied())
    }

    /// Number of labels holding a fallback color.
    pub fn fallback_len(&self) -> usize {
        self.fallback.len()
    }
}

/// Display filter per semantic class. Every class is visible by default.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassVisibility {
    hidden: Vec<LabelClass>,
}

impl ClassVisibility {
    pub fn is_visible(&self, class: LabelClass) -> bool {
        !self.hidden.contains(&class)
    }

    pub fn set_visible(&mut self, class: LabelClass, visible: bool) {
        self.hidden.retain(|c| *c != class);
        if !visible {
            self.hidden.push(class);
        }
    }
}

impl BlendPolicy {
    /// Weight of the label color for a resolved `color`.
    #[inline]
    fn weight(self, color: Rgba<u8>) -> f32 {
        match self {
            BlendPolicy::Flat(alpha) => alpha.clamp(0.0, 1.0),
            BlendPolicy::PerColorAlpha => color.0[3] as f32 / 255.0,
        }
    }
}

#[inline]
fn blend(gray: u8, color: Rgba<u8>, alpha: f32) -> Rgba<u8> {
    let g = gray as f32;
    let mix = |c: u8| (g * (1.0 - alpha) + c as f32 * alpha).round().clamp(0.0, 255.0) as u8;
    Rgba([mix(color.0[0]), mix(color.0[1]), mix(color.0[2]), u8::MAX])
}

/// Blend a label plane over a grayscale plane.
///
/// The output has the size of `gray`. When the label grid has a different
/// resolution, each output pixel takes its nearest label, so an up-sampled
/// mask paints `base / mask` sized blocks. Background pixels keep their gray
/// value untouched.
pub fn composite_overlay(
    gray: &GrayImage,
    labels: &Plane<'_, u16>,
    colors: &mut ColorAssignment,
    visibility: &ClassVisibility,
    policy: BlendPolicy,
) -> RgbaImage {
    let (width, height) = gray.dimensions();
    let (mask_height, mask_width) = labels.dim();
    let (width, height) = (width as usize, height as usize);
    let mut out = RgbaImage::new(width as u32, height as u32);
    if mask_width == 0 || mask_height == 0 {
        for (dst, src) in out.pixels_mut().zip(gray.pixels()) {
            *dst = Rgba([src.0[0], src.0[0], src.0[0], u8::MAX]);
        }
        return out;
    }

    for y in 0..height {
        let my = y * mask_height / height;
        for x in 0..width {
            let mx = x * mask_width / width;
            let g = gray.get_pixel(x as u32, y as u32).0[0];
            let label = labels[[my, mx]];
            let pixel = if label == 0 {
                Rgba([g, g, g, u8::MAX])
            } else {
                let color = colors.resolve(label);
                if visibility.is_visible(LabelClass::of_label(label)) {
                    blend(g, color, policy.weight(color))
                } else {
                    Rgba([g, g, g, u8::MAX])
                }
            };
            out.put_pixel(x as u32, y as u32, pixel);
        }
    }
    out
}

/// Gray plane as opaque RGBA, for frames drawn without an overlay.
pub fn gray_to_rgba(gray: &GrayImage) -> RgbaImage {
    let (width, height) = gray.dimensions();
    RgbaImage::from_fn(width, height, |x, y| {
        let g = gray.get_pixel(x, y).0[0];
        Rgba([g, g, g, u8::MAX])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn flat_gray(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([value]))
    }

    #[test]
    fn single_voxel_blend() {
        let gray = flat_gray(4, 4, 100);
        let mut labels = Array2::<u16>::zeros((4, 4));
        labels[[1, 2]] = 1;
        let out = composite_overlay(
            &gray,
            &labels.view(),
            &mut ColorAssignment::new(),
            &ClassVisibility::default(),
            BlendPolicy::Flat(0.5),
        );
        let hit = out.get_pixel(2, 1).0;
        assert!(hit[0] == 177 || hit[0] == 178, "{hit:?}");
        assert_eq!(hit[1], 50);
        assert_eq!(hit[3], 255);
        for (x, y, p) in out.enumerate_pixels() {
            if (x, y) != (2, 1) {
                assert_eq!(p.0, [100, 100, 100, 255]);
            }
        }
    }

    #[test]
    fn background_is_untouched() {
        let gray = GrayImage::from_fn(8, 8, |x, y| image::Luma([(x * 30 + y) as u8]));
        let labels = Array2::from_shape_fn((8, 8), |(y, x)| if x > y { 0 } else { (x + y) as u16 });
        let mut visibility = ClassVisibility::default();
        visibility.set_visible(LabelClass::Other, false);
        for policy in [BlendPolicy::Flat(0.9), BlendPolicy::PerColorAlpha] {
            let out = composite_overlay(
                &gray,
                &labels.view(),
                &mut ColorAssignment::new(),
                &visibility,
                policy,
            );
            for (x, y, p) in out.enumerate_pixels() {
                if labels[[y as usize, x as usize]] == 0 {
                    let g = gray.get_pixel(x, y).0[0];
                    assert_eq!(p.0, [g, g, g, 255]);
                }
            }
        }
    }

    #[test]
    fn hidden_class_renders_gray() {
        let gray = flat_gray(2, 1, 60);
        let labels = Array2::from_shape_vec((1, 2), vec![1u16, 2]).unwrap();
        let mut visibility = ClassVisibility::default();
        visibility.set_visible(LabelClass::Tumor, false);
        let out = composite_overlay(
            &gray,
            &labels.view(),
            &mut ColorAssignment::new(),
            &visibility,
            BlendPolicy::default(),
        );
        assert_ne!(out.get_pixel(0, 0).0, [60, 60, 60, 255]);
        assert_eq!(out.get_pixel(1, 0).0, [60, 60, 60, 255]);

        visibility.set_visible(LabelClass::Tumor, true);
        assert!(visibility.is_visible(LabelClass::Tumor));
    }

    #[test]
    fn per_color_alpha_policy() {
        let gray = flat_gray(1, 1, 0);
        let labels = Array2::from_elem((1, 1), 1u16);
        let out = composite_overlay(
            &gray,
            &labels.view(),
            &mut ColorAssignment::new(),
            &ClassVisibility::default(),
            BlendPolicy::PerColorAlpha,
        );
        // 255 * 128 / 255
        assert_eq!(out.get_pixel(0, 0).0, [128, 0, 0, 255]);
    }

    #[test]
    fn fallback_colors_follow_first_encounter() {
        let labels = Array2::from_shape_vec((2, 3), vec![9u16, 1, 7, 7, 9, 12]).unwrap();
        let gray = flat_gray(3, 2, 0);
        let mut first = ColorAssignment::new();
        let shown = ClassVisibility::default();
        let policy = BlendPolicy::default();
        let a = composite_overlay(&gray, &labels.view(), &mut first, &shown, policy);
        assert_eq!(first.get(9), Some(FALLBACK_PALETTE[0]));
        assert_eq!(first.get(7), Some(FALLBACK_PALETTE[1]));
        assert_eq!(first.get(12), Some(FALLBACK_PALETTE[2]));
        assert_eq!(first.fallback_len(), 3);

        let mut second = ColorAssignment::new();
        let b = composite_overlay(&gray, &labels.view(), &mut second, &shown, policy);
        assert_eq!(a, b);

        // repeated calls on the same session table are stable
        let c = composite_overlay(&gray, &labels.view(), &mut first, &shown, policy);
        assert_eq!(a, c);
    }

    #[test]
    fn palette_wraps_around() {
        let mut colors = ColorAssignment::new();
        for label in 100..(100 + FALLBACK_PALETTE.len() as u16) {
            colors.resolve(label);
        }
        assert_eq!(colors.resolve(500), FALLBACK_PALETTE[0]);
        assert_eq!(colors.resolve(1), FIXED_COLORS[0].1);
    }

    #[test]
    fn low_resolution_mask_paints_blocks() {
        let gray = flat_gray(512, 512, 0);
        let mut labels = Array2::<u16>::zeros((128, 128));
        labels[[10, 20]] = 2;
        let out = composite_overlay(
            &gray,
            &labels.view(),
            &mut ColorAssignment::new(),
            &ClassVisibility::default(),
            BlendPolicy::default(),
        );
        let painted: Vec<(u32, u32)> = out
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0 != [0, 0, 0, 255])
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(painted.len(), 16);
        for (x, y) in painted {
            assert!((80..84).contains(&x) && (40..44).contains(&y), "({x}, {y})");
        }
    }

    #[test]
    fn high_resolution_mask_is_subsampled() {
        let gray = flat_gray(2, 2, 0);
        let mut labels = Array2::<u16>::zeros((4, 4));
        labels[[2, 2]] = 1;
        let out = composite_overlay(
            &gray,
            &labels.view(),
            &mut ColorAssignment::new(),
            &ClassVisibility::default(),
            BlendPolicy::default(),
        );
        assert_ne!(out.get_pixel(1, 1).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }
}
