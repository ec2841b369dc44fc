use clap::Parser;
use gerber_diff::app::{self, RunMode, RunOutcome};
use gerber_diff::utils::{logger, validation::Validate};
use gerber_diff::CliConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose);

    tracing::info!("Starting gerber-diff CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    let monitor_enabled = config.monitor;
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    match app::execute(config, RunMode::Full, monitor_enabled).await {
        Ok(RunOutcome::Report(report)) => app::print_report(&report),
        Ok(RunOutcome::Preview(preview)) => app::print_preview(&preview),
        Err(e) => std::process::exit(app::report_error(&e)),
    }

    Ok(())
}
