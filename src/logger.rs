use log::LevelFilter;
use simplelog::{ConfigBuilder, SimpleLogger};

/// Logs to stdout, used when no Logfire token is configured
pub fn setup_simple_logger(level: LevelFilter) -> anyhow::Result<()> {
    let logger_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("webhook_bot")
        .build();

    Ok(SimpleLogger::init(level, logger_config)?)
}
