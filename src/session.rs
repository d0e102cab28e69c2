use crate::config::OverlayConfig;
use crate::engine::{EngineHandle, RenderingEngine};
use crate::enums::{BlendPolicy, LabelClass, Orientation};
use crate::overlay::{ClassVisibility, ColorAssignment, composite_overlay, gray_to_rgba};
use crate::registration::{FrameOutcome, OverlayCanvas, OverlayRegistrar};
use crate::slice::SliceSample;
use crate::volume::{Dims, LabelVolume, ResliceError, Volume};
use crate::volume_loader::LoadedSeries;
use crate::window::{WindowSetting, window_plane, window_slice};

use image::RgbaImage;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Reslice(#[from] ResliceError),

    #[error("Label volume has {labels} slices, base volume has {base}")]
    LabelMismatch { base: usize, labels: usize },

    #[error("Slice has {found} samples, expected {expected}")]
    PixelCountMismatch { expected: usize, found: usize },
}

/// One viewer panel: a loaded series, its optional segmentation and the
/// display state driven by the UI.
///
/// The session owns its volumes exclusively and only reads them.
pub struct ViewerSession<E> {
    engine: EngineHandle<E>,
    volume: Volume,
    labels: Option<LabelVolume>,
    window: WindowSetting,
    orientation: Orientation,
    index: usize,
    config: OverlayConfig,
    overlay_enabled: bool,
    visibility: ClassVisibility,
    colors: ColorAssignment,
    registrar: OverlayRegistrar,
    overlay_canvas: OverlayCanvas,
}

impl<E: RenderingEngine> ViewerSession<E> {
    pub fn new(engine: EngineHandle<E>, series: LoadedSeries, config: OverlayConfig) -> Self {
        let mut session = Self {
            engine,
            volume: series.volume,
            labels: None,
            window: series.window,
            orientation: Orientation::default(),
            index: 0,
            config,
            overlay_enabled: config.overlay_enabled,
            visibility: ClassVisibility::default(),
            colors: ColorAssignment::new(),
            registrar: OverlayRegistrar::new(config.max_canvas_attempts),
            overlay_canvas: OverlayCanvas::default(),
        };
        session.index = session.volume.max_index(session.orientation) / 2;
        session
    }

    /// Attach a segmentation. It must cover the same slices as the base.
    pub fn set_labels(&mut self, labels: LabelVolume) -> Result<(), SessionError> {
        let base = self.volume.dims().slices;
        let found = labels.dims().slices;
        if base != found {
            return Err(SessionError::LabelMismatch {
                base,
                labels: found,
            });
        }
        self.labels = Some(labels);
        Ok(())
    }

    pub fn dims(&self) -> Dims {
        self.volume.dims()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn slice_index(&self) -> usize {
        self.index
    }

    pub fn window(&self) -> WindowSetting {
        self.window
    }

    pub fn overlay_canvas(&self) -> &OverlayCanvas {
        &self.overlay_canvas
    }

    pub fn colors(&self) -> &ColorAssignment {
        &self.colors
    }

    /// Switch planes, keeping the index inside the new axis.
    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
        self.index = self.index.min(self.volume.max_index(orientation));
        self.registrar.invalidate();
    }

    /// Move to `index`, clamped to `[0, max]` of the current axis.
    ///
    /// Returns the index actually used.
    pub fn set_slice_index(&mut self, index: isize) -> usize {
        let max = self.volume.max_index(self.orientation);
        self.index = index.clamp(0, max as isize) as usize;
        self.registrar.invalidate();
        self.index
    }

    pub fn set_overlay_enabled(&mut self, enabled: bool) {
        self.overlay_enabled = enabled;
    }

    pub fn set_class_visible(&mut self, class: LabelClass, visible: bool) {
        self.visibility.set_visible(class, visible);
    }

    pub fn set_window(&mut self, window: WindowSetting) {
        self.window = window;
    }

    fn blend_policy(&self) -> BlendPolicy {
        match self.orientation {
            Orientation::Axial => self.config.native_blend,
            Orientation::Coronal | Orientation::Sagittal => self.config.mpr_blend,
        }
    }

    /// Render the current plane, windowed, with the overlay if enabled.
    pub fn render(&mut self) -> Result<RgbaImage, SessionError> {
        let plane = self.volume.extract_plane(self.orientation, self.index)?;
        let gray = window_plane(&plane, &self.window);
        let policy = self.blend_policy();

        let labels = match (&self.labels, self.overlay_enabled) {
            (Some(labels), true) => labels,
            _ => return Ok(gray_to_rgba(&gray)),
        };
        let label_plane = labels.plane_under(self.volume.dims(), self.orientation, self.index)?;
        debug!("Compositing {} overlay at {}", self.orientation, self.index);
        Ok(composite_overlay(
            &gray,
            &label_plane,
            &mut self.colors,
            &self.visibility,
            policy,
        ))
    }

    /// Overlay a live decoded axial slice, bypassing the volume.
    ///
    /// `z` selects the label plane.
    pub fn render_native(
        &mut self,
        slice: &SliceSample,
        z: usize,
    ) -> Result<RgbaImage, SessionError> {
        let expected = slice.expected_len();
        if slice.pixel_data.len() != expected {
            return Err(SessionError::PixelCountMismatch {
                expected,
                found: slice.pixel_data.len(),
            });
        }
        let gray = window_slice(slice, &self.window);
        let labels = match (&self.labels, self.overlay_enabled) {
            (Some(labels), true) => labels,
            _ => return Ok(gray_to_rgba(&gray)),
        };
        let label_plane = labels.extract_plane(Orientation::Axial, z)?;
        Ok(composite_overlay(
            &gray,
            &label_plane,
            &mut self.colors,
            &self.visibility,
            self.config.native_blend,
        ))
    }

    /// Handle the engine's "frame rendered" event.
    ///
    /// Re-registers the overlay canvas; asks the engine for another frame
    /// while its canvas is still missing.
    pub fn on_frame_rendered(&mut self) -> FrameOutcome {
        let (width, height) = self.volume.dims().plane_size(self.orientation);
        let host = self.engine.host_canvas();
        let camera = self.engine.camera();
        let outcome = self.registrar.on_frame(
            &mut self.overlay_canvas,
            host.as_ref(),
            &camera,
            (width as u32, height as u32),
        );
        if let FrameOutcome::Retry { .. } = outcome {
            self.engine.request_frame();
        }
        outcome
    }
}
