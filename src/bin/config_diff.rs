use clap::Parser;
use gerber_diff::app::{self, RunMode, RunOutcome};
use gerber_diff::domain::model::BackendKind;
use gerber_diff::domain::ports::ConfigProvider;
use gerber_diff::utils::{logger, validation::Validate};
use gerber_diff::FileConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gerber-diff-config")]
#[command(about = "Gerber diff driven by a TOML or JSON configuration file")]
struct Args {
    /// Path to the configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long, default_value = "gerber-diff.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override the backend from the config file
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Log memory and CPU usage per phase
    #[arg(long)]
    monitor: bool,

    /// Dry run - extract and match layers without rendering
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose);

    tracing::info!("📁 Loading configuration from: {}", args.config.display());

    let mut config = match FileConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config.display(), e);
            eprintln!("💡 Make sure the file exists and is valid TOML or JSON");
            std::process::exit(e.exit_code());
        }
    };

    // 應用命令列覆蓋設定
    if let Some(backend) = args.backend {
        config.backend = backend;
        tracing::info!("🔧 Backend overridden to: {:?}", backend);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config);

    let mode = if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be rendered");
        RunMode::DryRun
    } else {
        RunMode::Full
    };

    match app::execute(config, mode, args.monitor).await {
        Ok(RunOutcome::Report(report)) => app::print_report(&report),
        Ok(RunOutcome::Preview(preview)) => app::print_preview(&preview),
        Err(e) => std::process::exit(app::report_error(&e)),
    }

    Ok(())
}

fn display_config_summary(config: &FileConfig) {
    let options = config.render_options();
    tracing::info!("📋 Configuration Summary:");
    tracing::info!("  Old package: {}", config.old_archive().display());
    tracing::info!("  New package: {}", config.new_archive().display());
    tracing::info!("  Output: {}", config.output_file().display());
    tracing::info!("  Backend: {:?} ({} dpi)", config.backend(), options.dpi);
    if let Some(order) = config.layer_order() {
        let order: Vec<&str> = order.iter().map(|layer| layer.as_str()).collect();
        tracing::info!("  Layer order: {}", order.join(", "));
    } else if !config.layers.is_empty() {
        tracing::info!("  Configured layers: {}", config.layers.len());
    }
}
