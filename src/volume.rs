use crate::enums::Orientation;

use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;
use thiserror::Error;
use tracing::trace;

/// A 2-D cross-section of a volume, indexed `[[row, column]]`.
///
/// For sagittal and coronal planes the row is the slice index `z`.
pub type Plane<'a, T> = ArrayView2<'a, T>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResliceError {
    #[error("Index {index} out of range for {orientation} axis of length {len}")]
    IndexOutOfRange {
        index: usize,
        len: usize,
        orientation: Orientation,
    },
}

/// Grid dimensions in voxels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dims {
    pub cols: usize,
    pub rows: usize,
    pub slices: usize,
}

impl Dims {
    pub fn voxel_count(&self) -> usize {
        self.cols * self.rows * self.slices
    }

    /// Linear index of voxel (`x`, `y`, `z`) in the volume buffer.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        z * self.rows * self.cols + y * self.cols + x
    }

    /// Number of valid indices along the axis fixed by `orientation`.
    pub fn axis_len(&self, orientation: Orientation) -> usize {
        match orientation {
            Orientation::Axial => self.slices,
            Orientation::Coronal => self.rows,
            Orientation::Sagittal => self.cols,
        }
    }

    /// (width, height) of a plane cut along `orientation`.
    pub fn plane_size(&self, orientation: Orientation) -> (usize, usize) {
        match orientation {
            // Looking down Z-axis: X is width, Y is height
            Orientation::Axial => (self.cols, self.rows),
            // Looking down Y-axis: X is width, Z is height
            Orientation::Coronal => (self.cols, self.slices),
            // Looking down X-axis: Y is width, Z is height
            Orientation::Sagittal => (self.rows, self.slices),
        }
    }

    fn of<T>(data: &Array3<T>) -> Self {
        let (slices, rows, cols) = data.dim();
        Self { cols, rows, slices }
    }
}

/// Physical voxel size in mm.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spacing {
    pub pixel_x: f32,
    pub pixel_y: f32,
    pub slice_thickness: f32,
}

impl Default for Spacing {
    fn default() -> Self {
        Self {
            pixel_x: 1.0,
            pixel_y: 1.0,
            slice_thickness: 1.0,
        }
    }
}

/// Cut a plane out of a (slices, rows, cols) grid without copying.
fn plane_of<T>(
    data: &Array3<T>,
    orientation: Orientation,
    index: usize,
) -> Result<Plane<'_, T>, ResliceError> {
    let len = Dims::of(data).axis_len(orientation);
    if index >= len {
        return Err(ResliceError::IndexOutOfRange {
            index,
            len,
            orientation,
        });
    }
    trace!("Extracting {orientation} plane {index}");
    let plane = match orientation {
        Orientation::Axial => data.slice(s![index, .., ..]),
        Orientation::Coronal => data.slice(s![.., index, ..]),
        Orientation::Sagittal => data.slice(s![.., .., index]),
    };
    Ok(plane)
}

/// Dense scalar volume in rescaled intensity units.
///
/// The buffer has shape (slices, rows, cols) in standard layout, so voxel
/// (x, y, z) lives at [`Dims::index`] of the flat buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
    spacing: Spacing,
}

impl Volume {
    pub fn new(data: Array3<f32>, spacing: Spacing) -> Self {
        Self { data, spacing }
    }

    pub fn dims(&self) -> Dims {
        Dims::of(&self.data)
    }

    pub fn spacing(&self) -> Spacing {
        self.spacing
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Flat voxel buffer, if the volume is in standard layout.
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.data.as_slice()
    }

    #[inline]
    pub fn voxel(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        self.data.get([z, y, x]).copied()
    }

    /// Largest valid index along the axis fixed by `orientation`.
    pub fn max_index(&self, orientation: Orientation) -> usize {
        self.dims().axis_len(orientation).saturating_sub(1)
    }

    /// Re-slice the volume along `orientation` at voxel `index`.
    ///
    /// Nearest voxel only: `index` is an integer grid coordinate.
    pub fn extract_plane(
        &self,
        orientation: Orientation,
        index: usize,
    ) -> Result<Plane<'_, f32>, ResliceError> {
        plane_of(&self.data, orientation, index)
    }
}

/// Segmentation labels on the same slice axis as a base [`Volume`].
///
/// `0` is background.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LabelVolume {
    data: Array3<u16>,
}

impl LabelVolume {
    pub fn new(data: Array3<u16>) -> Self {
        Self { data }
    }

    pub fn dims(&self) -> Dims {
        Dims::of(&self.data)
    }

    pub fn data(&self) -> &Array3<u16> {
        &self.data
    }

    #[inline]
    pub fn label(&self, x: usize, y: usize, z: usize) -> Option<u16> {
        self.data.get([z, y, x]).copied()
    }

    pub fn extract_plane(
        &self,
        orientation: Orientation,
        index: usize,
    ) -> Result<Plane<'_, u16>, ResliceError> {
        plane_of(&self.data, orientation, index)
    }

    /// The label plane lying under plane `index` of a base grid `base`.
    ///
    /// Label grids share the slice axis with the base but may have a
    /// different in-plane resolution; the index is scaled to the nearest
    /// label row or column.
    pub fn plane_under(
        &self,
        base: Dims,
        orientation: Orientation,
        index: usize,
    ) -> Result<Plane<'_, u16>, ResliceError> {
        let base_len = base.axis_len(orientation);
        let label_len = self.dims().axis_len(orientation);
        let index = if base_len == label_len || base_len == 0 || index >= base_len {
            index
        } else {
            index * label_len / base_len
        };
        self.extract_plane(orientation, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(slices: usize, rows: usize, cols: usize) -> Volume {
        let dims = Dims { cols, rows, slices };
        let data = Array3::from_shape_fn((slices, rows, cols), |(z, y, x)| {
            dims.index(x, y, z) as f32
        });
        Volume::new(data, Spacing::default())
    }

    #[test]
    fn flat_index_matches_buffer() {
        let volume = ramp(3, 4, 5);
        let flat = volume.as_slice().unwrap();
        for (i, v) in flat.iter().enumerate() {
            assert_eq!(*v, i as f32);
        }
    }

    #[test]
    fn sagittal_and_coronal_sample_the_grid() {
        let volume = ramp(3, 4, 5);
        let dims = volume.dims();
        for x in 0..dims.cols {
            let plane = volume.extract_plane(Orientation::Sagittal, x).unwrap();
            assert_eq!(plane.dim(), (dims.slices, dims.rows));
            for z in 0..dims.slices {
                for y in 0..dims.rows {
                    assert_eq!(plane[[z, y]], volume.voxel(x, y, z).unwrap());
                }
            }
        }
        for y in 0..dims.rows {
            let plane = volume.extract_plane(Orientation::Coronal, y).unwrap();
            assert_eq!(plane.dim(), (dims.slices, dims.cols));
            for z in 0..dims.slices {
                for x in 0..dims.cols {
                    assert_eq!(plane[[z, x]], volume.voxel(x, y, z).unwrap());
                }
            }
        }
    }

    #[test]
    fn plane_size_matches_view() {
        let volume = ramp(3, 4, 5);
        for orientation in [Orientation::Axial, Orientation::Coronal, Orientation::Sagittal] {
            let (width, height) = volume.dims().plane_size(orientation);
            let plane = volume.extract_plane(orientation, 0).unwrap();
            assert_eq!(plane.dim(), (height, width));
        }
    }

    #[test]
    fn label_plane_under_finer_base() {
        let labels = LabelVolume::new(Array3::from_shape_fn((2, 2, 2), |(z, y, x)| {
            (z * 4 + y * 2 + x) as u16
        }));
        let base = Dims {
            cols: 8,
            rows: 8,
            slices: 2,
        };
        let plane = labels.plane_under(base, Orientation::Sagittal, 5).unwrap();
        assert_eq!(plane.column(0).to_vec(), vec![1, 5]);
        let plane = labels.plane_under(base, Orientation::Axial, 1).unwrap();
        assert_eq!(plane[[0, 0]], 4);
        assert!(labels.plane_under(base, Orientation::Coronal, 8).is_err());
    }

    #[test]
    fn out_of_range_index() {
        let volume = ramp(3, 4, 5);
        assert_eq!(
            volume.extract_plane(Orientation::Sagittal, 5),
            Err(ResliceError::IndexOutOfRange {
                index: 5,
                len: 5,
                orientation: Orientation::Sagittal
            })
        );
        assert!(volume.extract_plane(Orientation::Coronal, 4).is_err());
        assert!(volume.extract_plane(Orientation::Coronal, 3).is_ok());
        assert_eq!(volume.max_index(Orientation::Coronal), 3);
    }
}
