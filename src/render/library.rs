use crate::core::workspace::Workspace;
use crate::domain::model::{
    ContentKind, ImageSource, LayerContent, LayerRef, OverlayImage, Palette,
};
use crate::domain::ports::OverlayRenderer;
use crate::render::scene::{Bounds, Point, Scene};
use crate::render::{RasterContext, SceneLoader};
use crate::utils::error::{DiffError, Result};
use async_trait::async_trait;
use std::borrow::Cow;
use std::marker::PhantomData;

/// 空白圖層使用的最小畫布（毫米）
const EMPTY_BOUNDS_MM: f64 = 1.0;

/// In-process backend: parse both layers, draw them onto one shared canvas,
/// keep the PNG in memory.
pub struct LibraryBackend<L, C> {
    loader: L,
    palette: Palette,
    dpi: u32,
    _context: PhantomData<fn() -> C>,
}

impl<L: SceneLoader, C: RasterContext> LibraryBackend<L, C> {
    pub fn new(loader: L, palette: Palette, dpi: u32) -> Self {
        Self {
            loader,
            palette,
            dpi,
            _context: PhantomData,
        }
    }

    fn load(&self, text: &[u8], layer: LayerRef<'_>, side: &str) -> Result<Scene> {
        let source = String::from_utf8_lossy(text);
        self.loader
            .load(&source)
            .map_err(|e| DiffError::render(layer.id, format!("{} layer: {}", side, e)))
    }

    /// Synchronous part of the render, no await points past this line.
    fn draw(&self, old: &[u8], new: &[u8], layer: LayerRef<'_>) -> Result<Vec<u8>> {
        let old_scene = self.load(old, layer, "old")?;
        let new_scene = self.load(new, layer, "new")?;

        let bounds = match (old_scene.bounds(), new_scene.bounds()) {
            (Some(a), Some(b)) => a.union(&b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => Bounds {
                min: Point::new(0.0, 0.0),
                max: Point::new(EMPTY_BOUNDS_MM, EMPTY_BOUNDS_MM),
            },
        };
        tracing::debug!(
            "Layer {} canvas {:.2}x{:.2} mm at {} dpi",
            layer.id,
            bounds.width(),
            bounds.height(),
            self.dpi
        );

        let into_render = |e: crate::render::RenderError| DiffError::render(layer.id, e);
        let mut context = C::new(bounds, self.dpi).map_err(into_render)?;
        context
            .render_layer(&old_scene, &self.palette.old, &self.palette.background)
            .map_err(into_render)?;
        context
            .render_layer(&new_scene, &self.palette.new, &self.palette.background)
            .map_err(into_render)?;
        context.dump().map_err(into_render)
    }
}

async fn read_content(content: &LayerContent) -> Result<Cow<'_, [u8]>> {
    match content {
        LayerContent::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
        LayerContent::File(path) => Ok(Cow::Owned(tokio::fs::read(path).await?)),
    }
}

#[async_trait]
impl<L, C> OverlayRenderer for LibraryBackend<L, C>
where
    L: SceneLoader,
    C: RasterContext,
{
    fn preferred_content(&self) -> ContentKind {
        ContentKind::Bytes
    }

    async fn render(
        &self,
        old: &LayerContent,
        new: &LayerContent,
        layer: LayerRef<'_>,
        _workspace: &Workspace,
    ) -> Result<OverlayImage> {
        let old_bytes = read_content(old).await?;
        let new_bytes = read_content(new).await?;
        let png = self.draw(&old_bytes, &new_bytes, layer)?;

        Ok(OverlayImage {
            layer: layer.id.clone(),
            label: layer.label.to_string(),
            source: ImageSource::Memory(png),
        })
    }
}
