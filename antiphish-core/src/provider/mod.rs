use crate::config::{self, Config, ProviderKind};
use crate::error::ProviderError;
use crate::types::ScanStats;
use crate::url_identity::UrlKey;
use anyhow::Context;
use std::fmt;
use std::sync::Arc;

pub mod http;
pub mod schema;

/// Opaque analysis handle returned by a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionId(String);

impl SubmissionId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for SubmissionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
  Found(ScanStats),
  NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
  Completed(ScanStats),
  InProgress { status: String },
}

/// External URL-reputation oracle. Implementations must not cache or retry;
/// the provider itself deduplicates by key.
pub trait ReputationProvider: Send + Sync {
  fn lookup(&self, key: &UrlKey) -> Result<Lookup, ProviderError>;
  fn submit(&self, url: &str) -> Result<SubmissionId, ProviderError>;
  fn poll_analysis(&self, id: &SubmissionId) -> Result<Analysis, ProviderError>;
}

/// Answers every lookup locally with zero detections. Only built when the
/// config asks for `kind = "offline"`.
pub struct OfflineProvider;

impl ReputationProvider for OfflineProvider {
  fn lookup(&self, _key: &UrlKey) -> Result<Lookup, ProviderError> {
    Ok(Lookup::Found(ScanStats::default()))
  }

  fn submit(&self, _url: &str) -> Result<SubmissionId, ProviderError> {
    Err(ProviderError::Unavailable(
      "offline provider does not accept submissions".to_string(),
    ))
  }

  fn poll_analysis(&self, _id: &SubmissionId) -> Result<Analysis, ProviderError> {
    Err(ProviderError::Unavailable(
      "offline provider has no analyses".to_string(),
    ))
  }
}

/// Stands in for a misconfigured HTTP provider so every check ends in an
/// `Error` verdict instead of a clean report.
pub struct UnavailableProvider {
  reason: String,
}

impl UnavailableProvider {
  pub fn new(reason: impl Into<String>) -> Self {
    Self {
      reason: reason.into(),
    }
  }

  fn fail<T>(&self) -> Result<T, ProviderError> {
    Err(ProviderError::Unavailable(format!(
      "provider misconfigured: {}",
      self.reason
    )))
  }
}

impl ReputationProvider for UnavailableProvider {
  fn lookup(&self, _key: &UrlKey) -> Result<Lookup, ProviderError> {
    self.fail()
  }

  fn submit(&self, _url: &str) -> Result<SubmissionId, ProviderError> {
    self.fail()
  }

  fn poll_analysis(&self, _id: &SubmissionId) -> Result<Analysis, ProviderError> {
    self.fail()
  }
}

pub fn from_config(cfg: &Config) -> anyhow::Result<Arc<dyn ReputationProvider>> {
  match cfg.provider.kind {
    ProviderKind::Offline => {
      tracing::warn!("using offline reputation provider; verdicts carry no detections");
      Ok(Arc::new(OfflineProvider))
    }
    ProviderKind::Virustotal => {
      if let Some(reason) = config::validate_provider_config(&cfg.provider) {
        tracing::error!(reason = %reason, "provider config invalid; checks will report errors");
        return Ok(Arc::new(UnavailableProvider::new(reason)));
      }
      let provider = http::HttpProvider::from_config(&cfg.provider)
        .context("configure VirusTotal provider")?;
      Ok(Arc::new(provider))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ScanMode;
  use crate::orchestrator::{NoDelay, ScanOrchestrator};
  use crate::types::Outcome;

  #[test]
  fn invalid_provider_config_yields_error_verdicts() {
    let mut cfg = Config::default();
    cfg.provider.base_url = "http://www.virustotal.com/api/v3/".to_string();

    let provider = from_config(&cfg).unwrap();
    let orchestrator = ScanOrchestrator::new(provider, Box::new(NoDelay), ScanMode::Poll);
    let verdict = orchestrator.check_url("http://phishing.example/login").unwrap();
    assert_eq!(verdict.outcome(), Outcome::Error);
    assert_eq!(verdict.message(), Some("API error: provider unavailable"));
  }

  #[test]
  fn zero_timeout_never_falls_back_to_offline() {
    let mut cfg = Config::default();
    cfg.provider.timeout_seconds = 0;

    let provider = from_config(&cfg).unwrap();
    let key = crate::url_identity::key_for("http://example.com").unwrap();
    assert!(matches!(provider.lookup(&key), Err(ProviderError::Unavailable(_))));
  }
}

#[cfg(test)]
pub(crate) mod stub {
  use super::*;
  use std::collections::VecDeque;
  use std::sync::Mutex;

  #[derive(Debug, Clone, PartialEq, Eq)]
  pub enum Call {
    Lookup(String),
    Submit(String),
    Poll(String),
  }

  /// Scripted provider: each queue is consumed in order, and every call is
  /// recorded for assertions.
  #[derive(Default)]
  pub struct StubProvider {
    lookups: Mutex<VecDeque<Result<Lookup, ProviderError>>>,
    submits: Mutex<VecDeque<Result<SubmissionId, ProviderError>>>,
    polls: Mutex<VecDeque<Result<Analysis, ProviderError>>>,
    calls: Mutex<Vec<Call>>,
  }

  impl StubProvider {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn on_lookup(self, r: Result<Lookup, ProviderError>) -> Self {
      self.lookups.lock().unwrap().push_back(r);
      self
    }

    pub fn on_submit(self, r: Result<SubmissionId, ProviderError>) -> Self {
      self.submits.lock().unwrap().push_back(r);
      self
    }

    pub fn on_poll(self, r: Result<Analysis, ProviderError>) -> Self {
      self.polls.lock().unwrap().push_back(r);
      self
    }

    pub fn calls(&self) -> Vec<Call> {
      self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
      self.calls().iter().filter(|c| pred(c)).count()
    }
  }

  impl ReputationProvider for StubProvider {
    fn lookup(&self, key: &UrlKey) -> Result<Lookup, ProviderError> {
      self.calls.lock().unwrap().push(Call::Lookup(key.to_string()));
      self
        .lookups
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(Ok(Lookup::NotFound))
    }

    fn submit(&self, url: &str) -> Result<SubmissionId, ProviderError> {
      self.calls.lock().unwrap().push(Call::Submit(url.to_string()));
      self
        .submits
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(ProviderError::Unavailable("no scripted submit".to_string())))
    }

    fn poll_analysis(&self, id: &SubmissionId) -> Result<Analysis, ProviderError> {
      self.calls.lock().unwrap().push(Call::Poll(id.to_string()));
      self
        .polls
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(ProviderError::Unavailable("no scripted poll".to_string())))
    }
  }
}
