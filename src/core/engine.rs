use crate::core::assemble::DocumentAssembler;
use crate::core::extract::ArchiveExtractor;
use crate::core::matcher::match_layers;
use crate::core::workspace::Workspace;
use crate::domain::model::{
    ContentKind, DiffPreview, DiffReport, LayerId, LayerMatch, LayerRef, LayerSet, RunState,
};
use crate::domain::ports::{ConfigProvider, OverlayRenderer, Storage};
use crate::utils::error::{DiffError, Result};
use crate::utils::monitor::SystemMonitor;
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// 差異比對流程：解壓 → 配對 → 逐層繪製 → 組成 PDF → 清理工作目錄。
///
/// Every run owns one [`Workspace`]. Whatever happens in between, the run
/// ends in [`RunState::Cleaned`], and the recorded history shows whether it
/// passed through [`RunState::Failed`] on the way.
pub struct DiffEngine<C: ConfigProvider, R: OverlayRenderer, S: Storage> {
    config: C,
    renderer: R,
    storage: S,
    cancel: CancellationToken,
    monitor: SystemMonitor,
    history: Vec<RunState>,
}

struct Extracted {
    old: LayerSet,
    new: LayerSet,
    layer_match: LayerMatch,
    pages: Vec<LayerId>,
}

impl<C: ConfigProvider, R: OverlayRenderer, S: Storage> DiffEngine<C, R, S> {
    pub fn new(config: C, renderer: R, storage: S) -> Self {
        Self {
            config,
            renderer,
            storage,
            cancel: CancellationToken::new(),
            monitor: SystemMonitor::new(false),
            history: vec![RunState::Init],
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = SystemMonitor::new(enabled);
        self
    }

    /// Handle for cancelling the run from another task (e.g. Ctrl-C).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Init)
    }

    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    fn transition(&mut self, state: RunState) {
        tracing::debug!("State {:?} -> {:?}", self.state(), state);
        self.history.push(state);
    }

    pub async fn run(&mut self) -> Result<DiffReport> {
        self.history = vec![RunState::Init];
        let start = Instant::now();
        tracing::info!(
            "🚀 Comparing {} -> {}",
            self.config.old_archive().display(),
            self.config.new_archive().display()
        );

        let workspace = match Workspace::open(self.config.workspace_dir()) {
            Ok(workspace) => workspace,
            Err(e) => {
                self.transition(RunState::Failed);
                self.transition(RunState::Cleaned);
                return Err(e);
            }
        };

        let outcome = self.execute(&workspace).await;
        if outcome.is_err() {
            self.transition(RunState::Failed);
        }
        let cleanup = workspace.close();
        self.transition(RunState::Cleaned);
        self.monitor.log_final_stats();

        match (outcome, cleanup) {
            (Ok(report), Ok(())) => {
                tracing::info!(
                    "✅ Wrote {} page(s) to {} in {:.2?}",
                    report.pages.len(),
                    report.output_path.display(),
                    start.elapsed()
                );
                Ok(report)
            }
            (Ok(mut report), Err(e)) => {
                tracing::warn!("⚠️ Diff written but workspace cleanup failed: {}", e);
                report.cleanup_error = Some(e.to_string());
                Ok(report)
            }
            (Err(e), cleanup) => {
                if let Err(cleanup_error) = cleanup {
                    tracing::warn!("⚠️ Workspace cleanup failed: {}", cleanup_error);
                }
                tracing::error!("❌ Diff failed: {}", e);
                Err(e)
            }
        }
    }

    /// Extract, match and select without rendering anything.
    pub async fn preview(&mut self) -> Result<DiffPreview> {
        self.history = vec![RunState::Init];
        let workspace = match Workspace::open(self.config.workspace_dir()) {
            Ok(workspace) => workspace,
            Err(e) => {
                self.transition(RunState::Failed);
                self.transition(RunState::Cleaned);
                return Err(e);
            }
        };

        let outcome = self.extract_and_match(&workspace);
        if outcome.is_err() {
            self.transition(RunState::Failed);
        }
        if let Err(e) = workspace.close() {
            tracing::warn!("⚠️ Workspace cleanup failed: {}", e);
        }
        self.transition(RunState::Cleaned);

        let extracted = outcome?;
        Ok(DiffPreview {
            old_layers: extracted.old.layer_count(),
            new_layers: extracted.new.layer_count(),
            pages: extracted.pages,
            unique_to_old: extracted.layer_match.unique_to_old,
            unique_to_new: extracted.layer_match.unique_to_new,
        })
    }

    fn extract_and_match(&mut self, workspace: &Workspace) -> Result<Extracted> {
        let extractor = ArchiveExtractor::new(self.config.layer_filter())?;
        let configured = self.config.configured_layers();
        let explicit = self.config.layer_order();
        let old_archive = self.config.old_archive();
        let new_archive = self.config.new_archive();

        let (old, new) = match self.renderer.preferred_content() {
            ContentKind::Bytes => (
                extractor.read_layers(old_archive)?,
                extractor.read_layers(new_archive)?,
            ),
            ContentKind::File => {
                let wanted = requested_layers(explicit.as_deref(), &configured);
                let old_tree = extractor.unpack(old_archive, &workspace.old_dir())?;
                let new_tree = extractor.unpack(new_archive, &workspace.new_dir())?;
                (old_tree.layer_set(&wanted)?, new_tree.layer_set(&wanted)?)
            }
        };
        tracing::info!(
            "📦 {} layer(s) in {}, {} in {}",
            old.layer_count(),
            file_name(old.source()),
            new.layer_count(),
            file_name(new.source())
        );
        self.transition(RunState::Extracted);
        self.monitor.log_phase("extract");

        let layer_match = match_layers(&old, &new);
        let order = explicit.or_else(|| (!configured.is_empty()).then_some(configured));
        let pages = layer_match.select(order.as_deref())?;
        tracing::info!("🔗 {} layer(s) to compare", pages.len());
        self.transition(RunState::Matched);

        Ok(Extracted {
            old,
            new,
            layer_match,
            pages,
        })
    }

    async fn execute(&mut self, workspace: &Workspace) -> Result<DiffReport> {
        let extracted = self.extract_and_match(workspace)?;

        self.transition(RunState::Rendering);
        let total = extracted.pages.len();
        let mut images = Vec::with_capacity(total);

        for (index, layer) in extracted.pages.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(DiffError::Cancelled { completed: index });
            }

            let (old, new) = match (extracted.old.get(layer), extracted.new.get(layer)) {
                (Some(old), Some(new)) => (old, new),
                _ => {
                    return Err(DiffError::LayerNotFound {
                        layer: layer.to_string(),
                        location: "either package".to_string(),
                    })
                }
            };
            let label = self.config.layer_label(layer);
            let layer_ref = LayerRef {
                id: layer,
                label: &label,
                page: index + 1,
            };

            let image = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(DiffError::Cancelled { completed: index });
                }
                image = self.renderer.render(old, new, layer_ref, workspace) => image?,
            };
            tracing::info!("🖼️ Processed {} ({}/{})", layer, index + 1, total);
            images.push(image);
        }
        self.monitor.log_phase("render");

        let output_file = self.config.output_file();
        let title = format!(
            "{} vs {}",
            file_name(self.config.old_archive()),
            file_name(self.config.new_archive())
        );
        let document = DocumentAssembler::new(title).assemble(&images)?;
        self.transition(RunState::Assembled);

        let output_path = self.storage.write_file(&output_file, &document.bytes).await?;
        self.monitor.log_phase("assemble");

        Ok(DiffReport {
            output_path,
            pages: document.pages,
            page_size: document.page_size,
            unique_to_old: extracted.layer_match.unique_to_old,
            unique_to_new: extracted.layer_match.unique_to_new,
            cleanup_error: None,
        })
    }
}

/// On-disk lookup set: every layer either list can ask for, explicit order
/// first, so selection sees the same candidates as the in-memory scan.
/// Empty means "scan the whole tree".
fn requested_layers(explicit: Option<&[LayerId]>, configured: &[LayerId]) -> Vec<LayerId> {
    let mut wanted: Vec<LayerId> = explicit.map(<[LayerId]>::to_vec).unwrap_or_default();
    for layer in configured {
        if !wanted.contains(layer) {
            wanted.push(layer.clone());
        }
    }
    wanted
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
