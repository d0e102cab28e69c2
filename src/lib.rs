//! # DICOM-MPR library
//!
//! This crate reconstructs CT series into volumes and renders them with a
//! segmentation overlay for a radiology workstation.
//!
//! An ordered stack of axial slices, decoded by an external decoder, is
//! folded into a dense volume of rescaled intensities. The volume can be cut
//! along the three medical axes:
//!  - Axial (the natively acquired plane)
//!  - Coronal
//!  - Sagittal
//!
//!  Re-slicing is nearest voxel only and never copies: a plane is a view
//!  into the volume. Planes are windowed to 8-bit grayscale and a label
//!  volume of the same series can be blended on top, colored per label and
//!  filtered per class (liver, tumor, other). Label grids with a different
//!  in-plane resolution than the base are scaled by nearest neighbour.
//!
//!  The overlay is drawn next to, not by, the engine that displays the base
//!  image. [`registration`] keeps the two canvases in pixel registration
//!  while the engine pans and zooms.
//!
//! # Examples
//!
//! ## Reading a DICOM series and rendering its central sagittal plane
//!
//! ```no_run
//! # use dicom_mpr::{
//! #     config::OverlayConfig, decoder::DicomDecoder, enums::Orientation,
//! #     overlay::gray_to_rgba, volume_loader::{CancellationToken, VolumeLoader},
//! #     window::window_plane,
//! # };
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let decoder = DicomDecoder;
//! let loader = VolumeLoader::new(&decoder, CancellationToken::new());
//! let series = loader
//!     .load_from_directory("dicom", |p| println!("{:.0}%", p * 100.0))
//!     .await?;
//! let volume = &series.volume;
//! let plane = volume.extract_plane(
//!     Orientation::Sagittal,
//!     volume.max_index(Orientation::Sagittal) / 2,
//! )?;
//! gray_to_rgba(&window_plane(&plane, &series.window)).save("result.png")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decoder;
pub mod engine;
pub mod enums;
pub mod overlay;
pub mod registration;
pub mod session;
pub mod slice;
pub mod volume;
pub mod volume_loader;
pub mod window;
