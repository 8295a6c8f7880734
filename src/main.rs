use clap::Parser;
use routebind::cli::{run_cli, Cli};
use routebind::telemetry::{init_logging_with_config, LogConfig};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut log_config = LogConfig::from_env();
    // Keep the report readable unless a level was asked for.
    if std::env::var("ROUTEBIND_LOG_LEVEL").is_err() {
        log_config.log_level = "warn".to_string();
    }
    let _guard = init_logging_with_config(&log_config)?;
    run_cli(cli)
}
