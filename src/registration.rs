//! Pixel registration of an overlay canvas under a host-rendered canvas.
//!
//! The host canvas and its camera belong to the rendering engine. The overlay
//! is drawn independently, so every host frame we copy the host's buffer size
//! and on-screen rectangle and rebuild the image-to-canvas transform from the
//! camera.

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Host canvas is not available yet")]
    CanvasUnavailable,
}

/// An on-screen rectangle in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// The engine's canvas: internal buffer size and where it is shown.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HostCanvas {
    pub width: u32,
    pub height: u32,
    pub rect: ScreenRect,
}

/// The canvas the overlay is drawn into.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OverlayCanvas {
    pub width: u32,
    pub height: u32,
    pub style: ScreenRect,
}

/// Pan/zoom state of the engine's camera for the current frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraState {
    /// Direct zoom factor of stack viewports.
    pub scale: Option<f64>,
    /// Pan in canvas pixels.
    pub translation: Option<(f64, f64)>,
    /// Half the visible world height of orthographic cameras.
    pub parallel_scale: Option<f64>,
}

impl CameraState {
    pub fn identity() -> Self {
        Self {
            scale: Some(1.0),
            ..Self::default()
        }
    }

    /// Canvas pixels per image pixel.
    pub fn zoom(&self, host_height: u32, image_height: u32) -> f64 {
        match (self.scale, self.parallel_scale) {
            (Some(scale), _) => scale,
            (None, Some(ps)) if ps > 0.0 && image_height > 0 => {
                host_height as f64 / (image_height as f64 * ps)
            }
            _ => 1.0,
        }
    }
}

/// 2-D affine transform in canvas `setTransform(a, b, c, d, e, f)` order:
/// `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for AffineParams {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineParams {
    pub const IDENTITY: AffineParams = AffineParams {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// Append a translation, as `context.translate` does.
    pub fn translate(self, tx: f64, ty: f64) -> Self {
        Self {
            e: self.a * tx + self.c * ty + self.e,
            f: self.b * tx + self.d * ty + self.f,
            ..self
        }
    }

    /// Append a scale, as `context.scale` does.
    pub fn scale(self, sx: f64, sy: f64) -> Self {
        Self {
            a: self.a * sx,
            b: self.b * sx,
            c: self.c * sy,
            d: self.d * sy,
            ..self
        }
    }

    #[inline]
    pub fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Inverse transform (canvas to image space), if the matrix is not singular.
    pub fn invert(&self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(Self {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }
}

/// Size the overlay like the host and compute the image-to-canvas transform.
///
/// `image` is the (width, height) of the base image in pixels.
pub fn register_overlay_canvas(
    overlay: &mut OverlayCanvas,
    host: Option<&HostCanvas>,
    camera: &CameraState,
    image: (u32, u32),
) -> Result<AffineParams, RegistrationError> {
    let host = host.ok_or(RegistrationError::CanvasUnavailable)?;
    // internal buffer, not the CSS size
    overlay.width = host.width;
    overlay.height = host.height;
    overlay.style = host.rect;

    let zoom = camera.zoom(host.height, image.1);
    let (pan_x, pan_y) = camera.translation.unwrap_or((0.0, 0.0));
    let params = AffineParams::IDENTITY
        .translate(host.width as f64 / 2.0, host.height as f64 / 2.0)
        .translate(pan_x, pan_y)
        .scale(zoom, zoom)
        .translate(-(image.0 as f64) / 2.0, -(image.1 as f64) / 2.0);
    Ok(params)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RegistrationState {
    AwaitingCanvas { attempts: u32 },
    Registered(AffineParams),
    /// The host rendered since the last registration.
    Stale(AffineParams),
}

/// What the caller should do with the current host frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FrameOutcome {
    Draw(AffineParams),
    /// Try again on the host's next frame.
    Retry { attempt: u32 },
    /// Give up on this frame's overlay.
    Skip,
}

/// Re-registers the overlay on every host frame.
///
/// A missing host canvas is retried on following frames until
/// `max_attempts` tries have failed, after which the frame is skipped and the
/// counter starts over.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayRegistrar {
    state: RegistrationState,
    max_attempts: u32,
}

impl OverlayRegistrar {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: RegistrationState::AwaitingCanvas { attempts: 0 },
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// Mark the current registration as out of date.
    pub fn invalidate(&mut self) {
        if let RegistrationState::Registered(params) = self.state {
            self.state = RegistrationState::Stale(params);
        }
    }

    /// Handle a host "frame rendered" event.
    pub fn on_frame(
        &mut self,
        overlay: &mut OverlayCanvas,
        host: Option<&HostCanvas>,
        camera: &CameraState,
        image: (u32, u32),
    ) -> FrameOutcome {
        self.invalidate();
        match register_overlay_canvas(overlay, host, camera, image) {
            Ok(params) => {
                self.state = RegistrationState::Registered(params);
                FrameOutcome::Draw(params)
            }
            Err(e) => {
                let attempts = match self.state {
                    RegistrationState::AwaitingCanvas { attempts } => attempts + 1,
                    _ => 1,
                };
                if attempts >= self.max_attempts {
                    warn!("{e} after {attempts} attempts, skipping overlay frame");
                    self.state = RegistrationState::AwaitingCanvas { attempts: 0 };
                    FrameOutcome::Skip
                } else {
                    debug!("{e}, retry {attempts}/{}", self.max_attempts);
                    self.state = RegistrationState::AwaitingCanvas { attempts };
                    FrameOutcome::Retry { attempt: attempts }
                }
            }
        }
    }
}

impl Default for OverlayRegistrar {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(width: u32, height: u32) -> HostCanvas {
        HostCanvas {
            width,
            height,
            rect: ScreenRect {
                left: 12.0,
                top: 30.0,
                width: width as f64 / 2.0,
                height: height as f64 / 2.0,
            },
        }
    }

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn image_center_lands_on_canvas_center() {
        let mut overlay = OverlayCanvas::default();
        let host = host(800, 600);
        let params =
            register_overlay_canvas(&mut overlay, Some(&host), &CameraState::identity(), (512, 512))
                .unwrap();
        assert!(close(params.apply((256.0, 256.0)), (400.0, 300.0)));
        assert!(close(params.apply((0.0, 0.0)), (144.0, 44.0)));
        assert_eq!((overlay.width, overlay.height), (800, 600));
        assert_eq!(overlay.style, host.rect);
    }

    #[test]
    fn pan_and_zoom() {
        let mut overlay = OverlayCanvas::default();
        let camera = CameraState {
            scale: Some(2.0),
            translation: Some((10.0, -20.0)),
            parallel_scale: None,
        };
        let params =
            register_overlay_canvas(&mut overlay, Some(&host(512, 512)), &camera, (256, 256))
                .unwrap();
        assert!(close(params.apply((128.0, 128.0)), (266.0, 236.0)));
        assert!(close(params.apply((129.0, 128.0)), (268.0, 236.0)));
        let back = params.invert().unwrap();
        assert!(close(back.apply((266.0, 236.0)), (128.0, 128.0)));
    }

    #[test]
    fn orthographic_zoom() {
        let camera = CameraState {
            scale: None,
            translation: None,
            parallel_scale: Some(0.5),
        };
        assert_eq!(camera.zoom(512, 256), 4.0);
        assert_eq!(CameraState::default().zoom(512, 256), 1.0);
    }

    #[test]
    fn missing_canvas_is_transient() {
        let mut overlay = OverlayCanvas::default();
        assert_eq!(
            register_overlay_canvas(&mut overlay, None, &CameraState::identity(), (4, 4)),
            Err(RegistrationError::CanvasUnavailable)
        );
    }

    #[test]
    fn bounded_retries_then_skip() {
        let mut registrar = OverlayRegistrar::new(3);
        let mut overlay = OverlayCanvas::default();
        let camera = CameraState::identity();
        assert_eq!(
            registrar.on_frame(&mut overlay, None, &camera, (4, 4)),
            FrameOutcome::Retry { attempt: 1 }
        );
        assert_eq!(
            registrar.on_frame(&mut overlay, None, &camera, (4, 4)),
            FrameOutcome::Retry { attempt: 2 }
        );
        assert_eq!(registrar.on_frame(&mut overlay, None, &camera, (4, 4)), FrameOutcome::Skip);
        assert_eq!(registrar.state(), RegistrationState::AwaitingCanvas { attempts: 0 });

        let host = host(8, 8);
        let outcome = registrar.on_frame(&mut overlay, Some(&host), &camera, (4, 4));
        let FrameOutcome::Draw(params) = outcome else {
            panic!("expected a registration, got {outcome:?}");
        };
        assert_eq!(registrar.state(), RegistrationState::Registered(params));
        registrar.invalidate();
        assert_eq!(registrar.state(), RegistrationState::Stale(params));
    }
}
