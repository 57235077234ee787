use crate::config::{Config, ScanMode};
use crate::error::{CheckError, ProviderError};
use crate::provider::{Analysis, Lookup, ReputationProvider, SubmissionId};
use crate::types::{ScanRequest, Verdict};
use crate::url_identity::{self, UrlKey};
use std::sync::Arc;
use std::time::Duration;

pub const SUBMITTED_MESSAGE: &str = "URL submitted for scanning. Please try again later.";
pub const PENDING_MESSAGE: &str = "Scan still processing. Please try again later.";

/// The single wait between submission and the poll. Blocks only the calling
/// thread.
pub trait DelayStrategy: Send + Sync {
  fn wait_before_poll(&self);
}

pub struct FixedDelay(pub Duration);

impl DelayStrategy for FixedDelay {
  fn wait_before_poll(&self) {
    if !self.0.is_zero() {
      std::thread::sleep(self.0);
    }
  }
}

pub struct NoDelay;

impl DelayStrategy for NoDelay {
  fn wait_before_poll(&self) {}
}

/// Where a check stopped. Logged with every verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
  Found,
  LookupFailed,
  Submitted,
  SubmitFailed,
  Completed,
  StillPending,
  PollFailed,
}

pub struct ScanOrchestrator {
  provider: Arc<dyn ReputationProvider>,
  delay: Box<dyn DelayStrategy>,
  mode: ScanMode,
}

impl ScanOrchestrator {
  pub fn new(
    provider: Arc<dyn ReputationProvider>,
    delay: Box<dyn DelayStrategy>,
    mode: ScanMode,
  ) -> Self {
    Self {
      provider,
      delay,
      mode,
    }
  }

  pub fn from_config(cfg: &Config, provider: Arc<dyn ReputationProvider>) -> Self {
    Self::new(provider, Box::new(FixedDelay(cfg.scan.poll_delay())), cfg.scan.mode)
  }

  pub fn check_url(&self, url: &str) -> Result<Verdict, CheckError> {
    self.check(&ScanRequest::new(url))
  }

  /// Runs one check to a terminal verdict. Only malformed input fails the
  /// call; every provider failure becomes `Verdict::Error`.
  pub fn check(&self, request: &ScanRequest) -> Result<Verdict, CheckError> {
    let key = url_identity::key_for(&request.url)?;
    let (terminal, verdict) = self.run(&request.url, &key);

    tracing::info!(
      url_key = %key,
      terminal = ?terminal,
      outcome = ?verdict.outcome(),
      elapsed_ms = crate::types::now_unix_ms().saturating_sub(request.created_at_unix_ms),
      "reputation check finished"
    );
    Ok(verdict)
  }

  fn run(&self, url: &str, key: &UrlKey) -> (Terminal, Verdict) {
    match self.provider.lookup(key) {
      Ok(Lookup::Found(stats)) => return (Terminal::Found, Verdict::Found { stats }),
      Ok(Lookup::NotFound) => {
        tracing::debug!(url_key = %key, "no existing verdict; submitting");
      }
      Err(e) => {
        tracing::warn!(url_key = %key, error = %e, "lookup failed");
        return (Terminal::LookupFailed, Verdict::error(lookup_error_message(&e)));
      }
    }

    let id = match self.provider.submit(url) {
      Ok(id) => id,
      Err(e) => {
        tracing::warn!(url_key = %key, error = %e, "submission failed");
        return (
          Terminal::SubmitFailed,
          Verdict::error(format!(
            "Failed to submit URL for scanning ({}).",
            error_detail(&e)
          )),
        );
      }
    };

    if self.mode == ScanMode::SubmitOnly {
      return (
        Terminal::Submitted,
        Verdict::Submitted {
          message: SUBMITTED_MESSAGE.to_string(),
        },
      );
    }

    self.delay.wait_before_poll();
    self.poll(key, &id)
  }

  fn poll(&self, key: &UrlKey, id: &SubmissionId) -> (Terminal, Verdict) {
    match self.provider.poll_analysis(id) {
      Ok(Analysis::Completed(stats)) => (Terminal::Completed, Verdict::Found { stats }),
      Ok(Analysis::InProgress { status }) => {
        tracing::info!(url_key = %key, analysis_id = %id, status = %status, "analysis not finished");
        (
          Terminal::StillPending,
          Verdict::Pending {
            message: PENDING_MESSAGE.to_string(),
          },
        )
      }
      Err(e) => {
        tracing::warn!(url_key = %key, analysis_id = %id, error = %e, "poll failed");
        (
          Terminal::PollFailed,
          Verdict::error(format!(
            "Failed to fetch scan results ({}).",
            error_detail(&e)
          )),
        )
      }
    }
  }
}

fn lookup_error_message(e: &ProviderError) -> String {
  match e {
    ProviderError::Rejected { status, .. } => format!("API error: {status}"),
    other => format!("API error: {}", error_detail(other)),
  }
}

fn error_detail(e: &ProviderError) -> String {
  match e {
    ProviderError::Rejected { status, .. } => format!("HTTP {status}"),
    ProviderError::Unavailable(_) => "provider unavailable".to_string(),
    ProviderError::Malformed(_) => "unexpected provider response".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::provider::stub::{Call, StubProvider};
  use crate::types::{Outcome, ScanStats};
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct CountingDelay(Arc<AtomicUsize>);

  impl DelayStrategy for CountingDelay {
    fn wait_before_poll(&self) {
      self.0.fetch_add(1, Ordering::SeqCst);
    }
  }

  fn stats(h: u64, m: u64, s: u64, u: u64) -> ScanStats {
    ScanStats {
      harmless: h,
      malicious: m,
      suspicious: s,
      undetected: u,
    }
  }

  fn orchestrator(stub: Arc<StubProvider>, mode: ScanMode) -> (ScanOrchestrator, Arc<AtomicUsize>) {
    let waits = Arc::new(AtomicUsize::new(0));
    let o = ScanOrchestrator::new(stub, Box::new(CountingDelay(waits.clone())), mode);
    (o, waits)
  }

  #[test]
  fn existing_report_is_found_without_submission() {
    let stub = Arc::new(StubProvider::new().on_lookup(Ok(Lookup::Found(stats(10, 0, 1, 3)))));
    let (o, waits) = orchestrator(stub.clone(), ScanMode::Poll);

    let v = o.check_url("http://example.com").unwrap();
    assert_eq!(v, Verdict::Found { stats: stats(10, 0, 1, 3) });
    assert_eq!(v.stats().unwrap().total(), 14);
    assert_eq!(stub.calls(), vec![Call::Lookup("aHR0cDovL2V4YW1wbGUuY29t".to_string())]);
    assert_eq!(waits.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn unseen_url_is_submitted_waited_and_polled_once() {
    let stub = Arc::new(
      StubProvider::new()
        .on_lookup(Ok(Lookup::NotFound))
        .on_submit(Ok(SubmissionId::new("u-1")))
        .on_poll(Ok(Analysis::Completed(stats(1, 1, 0, 0)))),
    );
    let (o, waits) = orchestrator(stub.clone(), ScanMode::Poll);

    let v = o.check_url("http://example.com").unwrap();
    assert_eq!(v.outcome(), Outcome::Found);
    assert_eq!(v.stats().unwrap().total(), 2);
    assert_eq!(waits.load(Ordering::SeqCst), 1);
    assert_eq!(
      stub.calls(),
      vec![
        Call::Lookup("aHR0cDovL2V4YW1wbGUuY29t".to_string()),
        Call::Submit("http://example.com".to_string()),
        Call::Poll("u-1".to_string()),
      ]
    );
  }

  #[test]
  fn queued_analysis_is_pending_not_error() {
    let stub = Arc::new(
      StubProvider::new()
        .on_lookup(Ok(Lookup::NotFound))
        .on_submit(Ok(SubmissionId::new("u-2")))
        .on_poll(Ok(Analysis::InProgress {
          status: "queued".to_string(),
        })),
    );
    let (o, _) = orchestrator(stub, ScanMode::Poll);

    let v = o.check_url("https://example.org/login").unwrap();
    assert_eq!(v.outcome(), Outcome::Pending);
    assert!(v.message().unwrap().contains("still processing"));
  }

  #[test]
  fn failed_submission_is_error_and_never_polls() {
    let stub = Arc::new(
      StubProvider::new()
        .on_lookup(Ok(Lookup::NotFound))
        .on_submit(Err(ProviderError::Rejected {
          operation: "submit",
          status: 400,
        })),
    );
    let (o, waits) = orchestrator(stub.clone(), ScanMode::Poll);

    let v = o.check_url("http://example.com").unwrap();
    assert_eq!(v.outcome(), Outcome::Error);
    assert!(v.message().unwrap().contains("Failed to submit"));
    assert!(v.message().unwrap().contains("400"));
    assert_eq!(stub.count(|c| matches!(c, Call::Poll(_))), 0);
    assert_eq!(waits.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn unexpected_lookup_status_is_error_with_code() {
    let stub = Arc::new(StubProvider::new().on_lookup(Err(ProviderError::Rejected {
      operation: "lookup",
      status: 429,
    })));
    let (o, _) = orchestrator(stub.clone(), ScanMode::Poll);

    let v = o.check_url("http://example.com").unwrap();
    assert_eq!(v, Verdict::error("API error: 429"));
    assert_eq!(stub.count(|c| matches!(c, Call::Submit(_))), 0);
  }

  #[test]
  fn poll_transport_failure_is_error() {
    let stub = Arc::new(
      StubProvider::new()
        .on_lookup(Ok(Lookup::NotFound))
        .on_submit(Ok(SubmissionId::new("u-3")))
        .on_poll(Err(ProviderError::Unavailable("timed out".to_string()))),
    );
    let (o, _) = orchestrator(stub.clone(), ScanMode::Poll);

    let v = o.check_url("http://example.com").unwrap();
    assert_eq!(v.outcome(), Outcome::Error);
    assert_eq!(stub.count(|c| matches!(c, Call::Poll(_))), 1);
  }

  #[test]
  fn submit_only_mode_skips_wait_and_poll() {
    let stub = Arc::new(
      StubProvider::new()
        .on_lookup(Ok(Lookup::NotFound))
        .on_submit(Ok(SubmissionId::new("u-4"))),
    );
    let (o, waits) = orchestrator(stub.clone(), ScanMode::SubmitOnly);

    let v = o.check_url("http://example.com").unwrap();
    assert_eq!(
      v,
      Verdict::Submitted {
        message: SUBMITTED_MESSAGE.to_string()
      }
    );
    assert_eq!(waits.load(Ordering::SeqCst), 0);
    assert_eq!(stub.count(|c| matches!(c, Call::Poll(_))), 0);
  }

  #[test]
  fn invalid_url_fails_before_provider() {
    let stub = Arc::new(StubProvider::new());
    let (o, _) = orchestrator(stub.clone(), ScanMode::Poll);

    assert!(matches!(o.check_url(""), Err(CheckError::InvalidInput(_))));
    assert!(matches!(o.check_url("not a url"), Err(CheckError::InvalidInput(_))));
    assert!(stub.calls().is_empty());
  }

  #[test]
  fn offline_provider_reports_found() {
    let o = ScanOrchestrator::new(
      Arc::new(crate::provider::OfflineProvider),
      Box::new(NoDelay),
      ScanMode::Poll,
    );
    let v = o.check_url("https://example.com").unwrap();
    assert_eq!(v.stats().unwrap().total(), 0);
  }
}
