use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Config {
  pub logging: LoggingConfig,
  pub provider: ProviderConfig,
  pub scan: ScanConfig,
  pub bot: BotConfig,
  pub forum: ForumConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
  Virustotal,
  Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
  /// Submit unseen URLs, wait once, poll once.
  Poll,
  /// Submit unseen URLs and report them as submitted without polling.
  SubmitOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,

  #[serde(default = "default_retention_days")]
  pub retention_days: u64,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      retention_days: default_retention_days(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
  #[serde(default = "default_provider_kind")]
  pub kind: ProviderKind,

  #[serde(default = "default_base_url")]
  pub base_url: String,

  #[serde(default = "default_api_key_env")]
  pub api_key_env: String,

  #[serde(default = "default_timeout_seconds")]
  pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
  fn default() -> Self {
    Self {
      kind: default_provider_kind(),
      base_url: default_base_url(),
      api_key_env: default_api_key_env(),
      timeout_seconds: default_timeout_seconds(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
  #[serde(default = "default_scan_mode")]
  pub mode: ScanMode,

  #[serde(default = "default_poll_delay_seconds")]
  pub poll_delay_seconds: u64,
}

impl ScanConfig {
  pub fn poll_delay(&self) -> Duration {
    Duration::from_secs(self.poll_delay_seconds)
  }
}

impl Default for ScanConfig {
  fn default() -> Self {
    Self {
      mode: default_scan_mode(),
      poll_delay_seconds: default_poll_delay_seconds(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
  #[serde(default = "default_bot_identity")]
  pub identity: String,

  #[serde(default = "default_trigger")]
  pub trigger: String,
}

impl Default for BotConfig {
  fn default() -> Self {
    Self {
      identity: default_bot_identity(),
      trigger: default_trigger(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumConfig {
  /// Relative paths resolve against the base directory.
  #[serde(default = "default_store_file")]
  pub store_file: String,
}

impl Default for ForumConfig {
  fn default() -> Self {
    Self {
      store_file: default_store_file(),
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_retention_days() -> u64 {
  14
}

fn default_provider_kind() -> ProviderKind {
  ProviderKind::Virustotal
}

fn default_base_url() -> String {
  "https://www.virustotal.com/api/v3/".to_string()
}

fn default_api_key_env() -> String {
  "VT_API_KEY".to_string()
}

fn default_timeout_seconds() -> u64 {
  15
}

fn default_scan_mode() -> ScanMode {
  ScanMode::Poll
}

fn default_poll_delay_seconds() -> u64 {
  10
}

fn default_bot_identity() -> String {
  "@antiphish".to_string()
}

fn default_trigger() -> String {
  "@antiphish run check".to_string()
}

fn default_store_file() -> String {
  "forum.json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
  #[serde(default)]
  pub logging: Option<LoggingConfig>,

  #[serde(default)]
  pub provider: Option<ProviderConfig>,

  #[serde(default)]
  pub scan: Option<ScanConfig>,

  #[serde(default)]
  pub bot: Option<BotConfig>,

  #[serde(default)]
  pub forum: Option<ForumConfig>,
}

impl ConfigFile {
  /// Fills missing sections with defaults and keeps the user's values as written.
  fn with_defaults(self) -> Config {
    let mut cfg = Config::default();
    if let Some(l) = self.logging {
      cfg.logging = l;
    }
    if let Some(p) = self.provider {
      cfg.provider = p;
    }
    if let Some(s) = self.scan {
      cfg.scan = s;
    }
    if let Some(b) = self.bot {
      cfg.bot = b;
    }
    if let Some(f) = self.forum {
      cfg.forum = f;
    }
    cfg
  }

  /// Runtime view of the file. Provider problems are left for the provider
  /// factory to surface; an unusable bot section falls back to defaults.
  fn normalize(self) -> Config {
    let mut cfg = self.with_defaults();
    if let Some(reason) = validate_bot_config(&cfg.bot) {
      tracing::warn!(reason = %reason, "bot config invalid; using defaults");
      cfg.bot = BotConfig::default();
    }
    cfg
  }

  fn needs_upgrade(&self) -> bool {
    self.logging.is_none()
      || self.provider.is_none()
      || self.scan.is_none()
      || self.bot.is_none()
      || self.forum.is_none()
  }
}

pub fn load_or_create_default(path: &Path) -> anyhow::Result<Config> {
  load_impl(path, true)
}

pub fn load_or_default_readonly(path: &Path) -> anyhow::Result<Config> {
  load_impl(path, false)
}

fn load_impl(path: &Path, allow_writes: bool) -> anyhow::Result<Config> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", path.display()))?;
  if allow_writes {
    fs::create_dir_all(parent)?;
  }

  if !path.exists() {
    let cfg = Config::default();
    if allow_writes {
      write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
    }
    return Ok(cfg);
  }

  let raw = fs::read_to_string(path)?;
  match toml::from_str::<ConfigFile>(&raw) {
    Ok(file) => {
      let cfg = file.clone().normalize();
      if allow_writes && file.needs_upgrade() {
        let backup = parent.join(format!("config.toml.bak-{}", crate::types::now_unix_ms() / 1000));
        let _ = fs::copy(path, &backup);
        // Persist what the user wrote plus default sections, never runtime fallbacks.
        write_atomic(path, &toml::to_string_pretty(&to_config_file(&file.with_defaults()))?)?;
        eprintln!(
          "antiphish: missing config sections filled in at {} (backup: {})",
          path.display(),
          backup.display()
        );
      }
      Ok(cfg)
    }
    Err(e) => {
      let cfg = Config::default();
      if allow_writes {
        let backup = parent.join(format!("config.toml.bad-{}", crate::types::now_unix_ms() / 1000));
        let _ = fs::rename(path, &backup);
        write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
        eprintln!(
          "antiphish: invalid config at {} (backed up to {}): {e}",
          path.display(),
          backup.display()
        );
      } else {
        eprintln!(
          "antiphish: invalid config at {}; using defaults in read-only mode: {e}",
          path.display()
        );
      }
      Ok(cfg)
    }
  }
}

fn to_config_file(cfg: &Config) -> ConfigFile {
  ConfigFile {
    logging: Some(cfg.logging.clone()),
    provider: Some(cfg.provider.clone()),
    scan: Some(cfg.scan.clone()),
    bot: Some(cfg.bot.clone()),
    forum: Some(cfg.forum.clone()),
  }
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("file path has no parent: {}", path.display()))?;
  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));

  fs::write(&tmp, contents)?;
  fs::rename(&tmp, path)?;
  Ok(())
}

/// Why the HTTP provider cannot be built from `cfg`, if it cannot.
pub fn validate_provider_config(cfg: &ProviderConfig) -> Option<String> {
  if cfg.timeout_seconds == 0 {
    return Some("timeout_seconds must be > 0".to_string());
  }
  if cfg.api_key_env.trim().is_empty() {
    return Some("api_key_env must not be empty".to_string());
  }

  let Ok(url) = reqwest::Url::parse(&cfg.base_url) else {
    return Some(format!("invalid base_url: {}", cfg.base_url));
  };
  if url.scheme() != "https" {
    return Some(format!("base_url must use HTTPS: {}", cfg.base_url));
  }
  if url.host_str().is_none() {
    return Some(format!("base_url has no host: {}", cfg.base_url));
  }

  None
}

pub fn validate_bot_config(cfg: &BotConfig) -> Option<String> {
  if cfg.identity.trim().is_empty() {
    return Some("identity must not be empty".to_string());
  }
  if cfg.trigger.trim().is_empty() {
    return Some("trigger must not be empty".to_string());
  }
  if !cfg.trigger.is_ascii() {
    return Some("trigger must be ASCII".to_string());
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_writes_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let cfg = load_or_create_default(&path).unwrap();
    assert!(path.exists());
    assert_eq!(cfg.scan.mode, ScanMode::Poll);
    assert_eq!(cfg.scan.poll_delay_seconds, 10);
    assert_eq!(cfg.bot.trigger, "@antiphish run check");

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("[provider]"));
  }

  #[test]
  fn readonly_load_does_not_create_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let _ = load_or_default_readonly(&path).unwrap();
    assert!(!path.exists());
  }

  #[test]
  fn partial_file_keeps_given_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[scan]\nmode = \"submit_only\"\npoll_delay_seconds = 3\n").unwrap();

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.scan.mode, ScanMode::SubmitOnly);
    assert_eq!(cfg.scan.poll_delay(), Duration::from_secs(3));
    assert_eq!(cfg.provider.kind, ProviderKind::Virustotal);

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("[bot]"));
  }

  #[test]
  fn insecure_base_url_is_kept_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[provider]\nbase_url = \"http://vt.local/api/\"\n").unwrap();

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.provider.kind, ProviderKind::Virustotal);
    assert!(validate_provider_config(&cfg.provider).is_some());

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("http://vt.local/api/"));
    assert!(!raw.contains("offline"));
    let backups = fs::read_dir(dir.path())
      .unwrap()
      .flatten()
      .filter(|e| e.file_name().to_string_lossy().starts_with("config.toml.bak-"))
      .count();
    assert_eq!(backups, 1);
  }

  #[test]
  fn fixing_base_url_after_upgrade_restores_provider() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[provider]\nbase_url = \"http://www.virustotal.com/api/v3/\"\n").unwrap();
    let _ = load_or_create_default(&path).unwrap();

    let fixed = fs::read_to_string(&path)
      .unwrap()
      .replace("http://www.virustotal.com", "https://www.virustotal.com");
    fs::write(&path, fixed).unwrap();

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.provider.kind, ProviderKind::Virustotal);
    assert_eq!(cfg.provider.base_url, "https://www.virustotal.com/api/v3/");
    assert_eq!(validate_provider_config(&cfg.provider), None);
  }

  #[test]
  fn upgrade_does_not_persist_bot_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[bot]\nidentity = \"@antiphish\"\ntrigger = \"\"\n").unwrap();

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.bot.trigger, "@antiphish run check");
    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("trigger = \"\""));
  }

  #[test]
  fn invalid_toml_is_backed_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "this is = = not toml").unwrap();

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.bot.identity, "@antiphish");
    let backups = fs::read_dir(dir.path())
      .unwrap()
      .flatten()
      .filter(|e| e.file_name().to_string_lossy().starts_with("config.toml.bad-"))
      .count();
    assert_eq!(backups, 1);
  }

  #[test]
  fn empty_trigger_is_replaced() {
    let file = ConfigFile {
      logging: None,
      provider: None,
      scan: None,
      bot: Some(BotConfig {
        identity: "@antiphish".to_string(),
        trigger: "  ".to_string(),
      }),
      forum: None,
    };
    assert_eq!(file.normalize().bot.trigger, "@antiphish run check");
  }
}
