//! The rendering engine seam.
//!
//! Image display, camera state and canvas compositing belong to an external
//! engine. Sessions only need its canvas geometry, its camera and a way to
//! ask for another frame.

use std::ops::Deref;
use std::sync::Arc;

use tracing::info;

use crate::registration::{CameraState, HostCanvas};

pub trait RenderingEngine {
    type Error: std::error::Error;

    /// One-time engine setup.
    fn initialize(&self) -> Result<(), Self::Error>;

    /// The canvas the engine renders into, once it is mounted.
    fn host_canvas(&self) -> Option<HostCanvas>;

    fn camera(&self) -> CameraState;

    /// Ask for a "frame rendered" notification on the next frame.
    fn request_frame(&self);
}

/// A rendering engine that has been initialized exactly once.
///
/// Created at the composition root and cloned into each viewer session;
/// holding a handle is the proof that setup ran.
#[derive(Debug)]
pub struct EngineHandle<E> {
    engine: Arc<E>,
}

impl<E> Clone for EngineHandle<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<E: RenderingEngine> EngineHandle<E> {
    pub fn initialize(engine: E) -> Result<Self, E::Error> {
        engine.initialize()?;
        info!("Rendering engine initialized");
        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}

impl<E> Deref for EngineHandle<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.engine
    }
}
