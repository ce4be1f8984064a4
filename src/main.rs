use anyhow::Context;
use backup_tool::utils::logger;
use backup_tool::{
    BackupEngine, BackupError, CliConfig, DataSource, RunReport, Settings, StorageBackend,
};
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = CliConfig::parse_args();

    // 初始化日誌
    if config.log_json {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting backup-tool");
    tracing::debug!("CLI config: {:?}", config);

    match run(&config).await {
        Ok(report) => {
            if report.summary.is_partial() {
                tracing::warn!(
                    "⚠️ {} of {} artifacts could not be archived",
                    report.summary.failed,
                    report.summary.total
                );
            }
            tracing::info!("✅ Backup completed successfully!");
            println!(
                "✅ Archived {} of {} artifacts ({} bytes) to {}",
                report.summary.archived, report.summary.total, report.bytes_written, report.destination
            );
            ExitCode::SUCCESS
        }
        Err(e) => match e.downcast_ref::<BackupError>() {
            Some(err) => {
                tracing::error!("❌ Backup failed: {:#} (Category: {:?})", e, err.category());
                tracing::error!("💡 Recovery suggestion: {}", err.recovery_suggestion());

                eprintln!("❌ {}", err.user_friendly_message());
                eprintln!("💡 {}", err.recovery_suggestion());
                ExitCode::from(err.exit_code())
            }
            None => {
                tracing::error!("❌ Backup failed: {:#}", e);
                eprintln!("❌ {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

/// Configure, then hand over to the engine; any error here ends the process.
async fn run(config: &CliConfig) -> anyhow::Result<RunReport> {
    let settings = Settings::load(
        config.datasource,
        config.storage_type,
        config.output_overrides(),
        config.config.as_deref(),
    )
    .context("loading configuration")?;
    tracing::debug!("Resolved settings: {:?}", settings);

    let source = DataSource::from_settings(settings.source);
    let sink = StorageBackend::from_settings(settings.storage)
        .await
        .context("configuring storage")?;

    let mut engine = BackupEngine::new(source, sink, settings.run);
    let report = engine.run().await.context("backup run")?;
    Ok(report)
}
