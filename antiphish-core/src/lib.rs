pub mod config;
pub mod console;
pub mod dispatcher;
pub mod error;
pub mod formatter;
pub mod forum;
pub mod logging;
pub mod orchestrator;
pub mod paths;
pub mod provider;
pub mod types;
pub mod url_identity;

use config::Config;
use dispatcher::CommandDispatcher;
use orchestrator::ScanOrchestrator;

pub fn run_console(args: &[String]) -> anyhow::Result<()> {
  let base = paths::base_dir()?;
  let config_path = paths::config_path(&base);
  let cfg = config::load_or_create_default(&config_path)?;

  let sink = if args.iter().any(|a| a == "--verbose") {
    logging::LogSink::FileAndStderr
  } else {
    logging::LogSink::File
  };
  logging::init(
    &paths::logs_dir(&base),
    &cfg.logging.level,
    cfg.logging.retention_days,
    sink,
  )?;

  tracing::debug!(provider = ?cfg.provider.kind, mode = ?cfg.scan.mode, "configuration loaded");
  console::run_console_command(&cfg, &base, args)
}

/// Wires the configured provider, wait and bot identity into a dispatcher.
pub fn build_dispatcher(cfg: &Config) -> anyhow::Result<CommandDispatcher> {
  let provider = provider::from_config(cfg)?;
  let orchestrator = ScanOrchestrator::from_config(cfg, provider);
  CommandDispatcher::new(orchestrator, &cfg.bot)
}
