use crate::core::workspace::Workspace;
use crate::domain::model::{
    BackendKind, ContentKind, LayerContent, LayerFilter, LayerId, LayerRef, OverlayImage,
    RenderOptions,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &Path,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<PathBuf>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn old_archive(&self) -> &Path;
    fn new_archive(&self) -> &Path;
    /// Output document path, `.pdf` included.
    fn output_file(&self) -> PathBuf;
    fn backend(&self) -> BackendKind;
    fn layer_filter(&self) -> LayerFilter;
    /// Extensions that must resolve in both archives. Empty means "discover".
    fn configured_layers(&self) -> Vec<LayerId>;
    /// Explicit page order, if any.
    fn layer_order(&self) -> Option<Vec<LayerId>>;
    fn layer_label(&self, layer: &LayerId) -> String;
    fn workspace_dir(&self) -> PathBuf;
    fn render_options(&self) -> RenderOptions;
}

/// 將一組新舊圖層疊合成一張點陣圖。後端在設定階段選定，整個執行期間不會切換。
#[async_trait]
pub trait OverlayRenderer: Send + Sync {
    fn preferred_content(&self) -> ContentKind;

    async fn render(
        &self,
        old: &LayerContent,
        new: &LayerContent,
        layer: LayerRef<'_>,
        workspace: &Workspace,
    ) -> Result<OverlayImage>;
}
