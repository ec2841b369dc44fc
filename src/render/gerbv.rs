use crate::core::workspace::Workspace;
use crate::domain::model::{
    ContentKind, ImageSource, LayerContent, LayerId, LayerRef, OverlayImage, Palette,
    RenderOptions,
};
use crate::domain::ports::OverlayRenderer;
use crate::render::label::burn_label;
use crate::render::project::ProjectBuilder;
use crate::utils::error::{DiffError, Result};
use async_trait::async_trait;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// 透過外部 gerbv 程式產生疊圖，每個圖層一個子行程。
pub struct GerbvBackend {
    program: PathBuf,
    dpi: u32,
    timeout: Duration,
    palette: Palette,
}

impl GerbvBackend {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            program: options.gerbv_path,
            dpi: options.dpi,
            timeout: options.timeout,
            palette: options.palette,
        }
    }

    /// Argument vector passed to gerbv for one layer.
    pub fn arguments(&self, output: &Path, descriptor: &Path) -> Vec<String> {
        vec![
            "-a".to_string(),
            "-x".to_string(),
            "png".to_string(),
            "-D".to_string(),
            self.dpi.to_string(),
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
            "-p".to_string(),
            descriptor.to_string_lossy().into_owned(),
        ]
    }

    async fn run(&self, layer: &LayerId, output: &Path, descriptor: &Path) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .args(self.arguments(output, descriptor))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Running {} for layer {}", self.program.display(), layer);
        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| DiffError::Timeout {
                layer: layer.to_string(),
                seconds: self.timeout.as_secs(),
            })?;

        let output_status = result.map_err(|e| {
            DiffError::render(
                layer,
                format!("cannot start {}: {}", self.program.display(), e),
            )
        })?;

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            return Err(DiffError::render(
                layer,
                format!("gerbv exited with {}: {}", output_status.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

/// Bytes are written into `dir`; files are used where they are.
async fn materialize(content: &LayerContent, dir: &Path, stem: &str) -> Result<PathBuf> {
    match content {
        LayerContent::File(path) => Ok(path.clone()),
        LayerContent::Bytes(bytes) => {
            let path = dir.join(format!("{}.gbr", stem));
            tokio::fs::write(&path, bytes).await?;
            Ok(path)
        }
    }
}

#[async_trait]
impl OverlayRenderer for GerbvBackend {
    fn preferred_content(&self) -> ContentKind {
        ContentKind::File
    }

    async fn render(
        &self,
        old: &LayerContent,
        new: &LayerContent,
        layer: LayerRef<'_>,
        workspace: &Workspace,
    ) -> Result<OverlayImage> {
        let stem = Workspace::page_stem(layer.page, layer.id);
        let old_path = materialize(old, &workspace.old_dir(), &stem).await?;
        let new_path = materialize(new, &workspace.new_dir(), &stem).await?;

        let project = ProjectBuilder::new()
            .old_layer(old_path)?
            .new_layer(new_path)?
            .build(self.palette)?;
        let descriptor = workspace.descriptor_path(layer.page, layer.id);
        tokio::fs::write(&descriptor, project.to_scheme()).await?;

        let output = workspace.image_path(layer.page, layer.id);
        self.run(layer.id, &output, &descriptor).await?;

        if !output.is_file() {
            return Err(DiffError::render(
                layer.id,
                format!("gerbv produced no image at {}", output.display()),
            ));
        }

        let mut pixels = image::open(&output)?.to_rgba8();
        burn_label(&mut pixels, layer.label);
        pixels.save_with_format(&output, ImageFormat::Png)?;

        Ok(OverlayImage {
            layer: layer.id.clone(),
            label: layer.label.to_string(),
            source: ImageSource::File(output),
        })
    }
}
