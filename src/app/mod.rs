//! Wiring shared by the binaries: pick the backend, run the engine, report.

use crate::adapters::LocalStorage;
use crate::core::DiffEngine;
use crate::domain::model::{BackendKind, DiffPreview, DiffReport, LayerId};
use crate::domain::ports::{ConfigProvider, OverlayRenderer};
use crate::render::{GerberLoader, GerbvBackend, LibraryBackend, SkiaContext};
use crate::utils::error::{DiffError, Result};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Full,
    DryRun,
}

#[derive(Debug)]
pub enum RunOutcome {
    Report(DiffReport),
    Preview(DiffPreview),
}

/// 依設定選擇後端並執行一次比對。Ctrl-C 會取消尚未開始的圖層。
pub async fn execute<C: ConfigProvider>(
    config: C,
    mode: RunMode,
    monitor: bool,
) -> Result<RunOutcome> {
    let options = config.render_options();
    let backend = config.backend();
    tracing::info!("🎨 Backend: {:?} at {} dpi", backend, options.dpi);

    match backend {
        BackendKind::Library => {
            let renderer: LibraryBackend<GerberLoader, SkiaContext> =
                LibraryBackend::new(GerberLoader, options.palette, options.dpi);
            drive(config, renderer, mode, monitor).await
        }
        BackendKind::Gerbv => drive(config, GerbvBackend::new(options), mode, monitor).await,
    }
}

async fn drive<C: ConfigProvider, R: OverlayRenderer>(
    config: C,
    renderer: R,
    mode: RunMode,
    monitor: bool,
) -> Result<RunOutcome> {
    let cancel = CancellationToken::new();
    let mut engine = DiffEngine::new(config, renderer, LocalStorage::default())
        .with_cancellation(cancel.clone())
        .with_monitoring(monitor);

    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel));
    let outcome = match mode {
        RunMode::Full => engine.run().await.map(RunOutcome::Report),
        RunMode::DryRun => engine.preview().await.map(RunOutcome::Preview),
    };
    interrupt.abort();
    outcome
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("⚠️ Interrupted, stopping after the current layer");
        cancel.cancel();
    }
}

fn join<'a>(layers: impl IntoIterator<Item = &'a LayerId>) -> String {
    layers
        .into_iter()
        .map(LayerId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_report(report: &DiffReport) {
    println!("✅ Diff completed successfully!");
    println!("📁 Output saved to: {}", report.output_path.display());
    println!(
        "📄 {} page(s), {}x{} pt: {}",
        report.pages.len(),
        report.page_size.0,
        report.page_size.1,
        join(&report.pages)
    );
    if !report.unique_to_old.is_empty() {
        println!("⚠️ Only in old package: {}", join(&report.unique_to_old));
    }
    if !report.unique_to_new.is_empty() {
        println!("⚠️ Only in new package: {}", join(&report.unique_to_new));
    }
    if let Some(cleanup_error) = &report.cleanup_error {
        println!("⚠️ Workspace cleanup failed: {}", cleanup_error);
    }
}

pub fn print_preview(preview: &DiffPreview) {
    println!(
        "🔍 Dry run: {} layer(s) in old package, {} in new package",
        preview.old_layers, preview.new_layers
    );
    println!(
        "📄 Would render {} page(s): {}",
        preview.pages.len(),
        join(&preview.pages)
    );
    if !preview.unique_to_old.is_empty() {
        println!("⚠️ Only in old package: {}", join(&preview.unique_to_old));
    }
    if !preview.unique_to_new.is_empty() {
        println!("⚠️ Only in new package: {}", join(&preview.unique_to_new));
    }
}

/// Logs the failure, prints the user-facing message and returns the exit code.
pub fn report_error(e: &DiffError) -> i32 {
    tracing::error!("❌ Diff failed: {} (Category: {:?})", e, e.category());
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());
    e.exit_code()
}
