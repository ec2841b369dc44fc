pub mod gerber;
pub mod gerbv;
pub mod label;
pub mod library;
pub mod project;
pub mod raster;
pub mod scene;

use crate::domain::model::RenderSettings;
use scene::{Bounds, Scene};
use thiserror::Error;

pub use gerber::GerberLoader;
pub use gerbv::GerbvBackend;
pub use library::LibraryBackend;
pub use raster::SkiaContext;

/// Failure inside a rendering collaborator; the backend attaches the layer name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Turns layer text into a vector scene.
pub trait SceneLoader: Send + Sync {
    fn load(&self, source: &str) -> Result<Scene, RenderError>;
}

/// Canvas shared by the old and new layer of one overlay.
pub trait RasterContext: Sized {
    /// `bounds` in millimetres, `dpi` pixels per inch.
    fn new(bounds: Bounds, dpi: u32) -> Result<Self, RenderError>;

    fn render_layer(
        &mut self,
        scene: &Scene,
        settings: &RenderSettings,
        background: &RenderSettings,
    ) -> Result<(), RenderError>;

    /// PNG 編碼後的畫布
    fn dump(self) -> Result<Vec<u8>, RenderError>;
}
