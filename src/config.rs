use crate::enums::BlendPolicy;
use crate::registration::OverlayRegistrar;

/// Overlay settings of a viewer session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayConfig {
    /// Blend used for re-sliced (sagittal, coronal) planes.
    pub mpr_blend: BlendPolicy,
    /// Blend used for the natively acquired axial plane.
    pub native_blend: BlendPolicy,
    /// Host frames to wait for a missing canvas before skipping a frame.
    pub max_canvas_attempts: u32,
    pub overlay_enabled: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            mpr_blend: BlendPolicy::default(),
            native_blend: BlendPolicy::PerColorAlpha,
            max_canvas_attempts: OverlayRegistrar::DEFAULT_MAX_ATTEMPTS,
            overlay_enabled: true,
        }
    }
}
