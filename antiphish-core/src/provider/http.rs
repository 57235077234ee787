use super::schema::{AnalysisReport, SubmissionReceipt, UrlReport};
use super::{Analysis, Lookup, ReputationProvider, SubmissionId};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::url_identity::UrlKey;
use anyhow::Context;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::USER_AGENT;
use reqwest::redirect::Policy;
use reqwest::Url;
use std::io::Read;
use std::time::Duration;

const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;
const API_KEY_HEADER: &str = "x-apikey";

/// VirusTotal v3 style client: `/urls/{key}`, `POST /urls`, `/analyses/{id}`.
pub struct HttpProvider {
  client: Client,
  base: Url,
  api_key: String,
}

impl HttpProvider {
  pub fn from_config(cfg: &ProviderConfig) -> anyhow::Result<Self> {
    let api_key = std::env::var(&cfg.api_key_env)
      .ok()
      .filter(|k| !k.trim().is_empty())
      .ok_or_else(|| anyhow::anyhow!("API key missing: set {}", cfg.api_key_env))?;

    Self::new(&cfg.base_url, api_key, Duration::from_secs(cfg.timeout_seconds))
  }

  pub fn new(base_url: &str, api_key: String, timeout: Duration) -> anyhow::Result<Self> {
    let base = Url::parse(base_url).with_context(|| format!("invalid provider base URL: {base_url}"))?;
    if base.cannot_be_a_base() {
      anyhow::bail!("provider base URL cannot carry a path: {base_url}");
    }

    let client = Client::builder()
      .timeout(timeout)
      .redirect(Policy::none())
      .build()
      .context("build HTTP client")?;

    Ok(Self {
      client,
      base,
      api_key,
    })
  }

  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  fn send(
    &self,
    operation: &'static str,
    request: RequestBuilder,
  ) -> Result<(u16, Vec<u8>), ProviderError> {
    let response = request
      .header(API_KEY_HEADER, &self.api_key)
      .header(USER_AGENT, format!("antiphish/{}", env!("CARGO_PKG_VERSION")))
      .send()
      .map_err(|e| ProviderError::Unavailable(format!("{operation}: {e}")))?;

    let status = response.status().as_u16();
    let body = read_response_with_limit(response, MAX_RESPONSE_BYTES)
      .map_err(|e| ProviderError::Unavailable(format!("{operation}: {e}")))?;
    tracing::debug!(operation, status, bytes = body.len(), "provider responded");
    Ok((status, body))
  }
}

impl ReputationProvider for HttpProvider {
  fn lookup(&self, key: &UrlKey) -> Result<Lookup, ProviderError> {
    let url = self.endpoint(&["urls", key.as_str()]);
    let (status, body) = self.send("lookup", self.client.get(url))?;
    classify_lookup(status, &body)
  }

  fn submit(&self, url: &str) -> Result<SubmissionId, ProviderError> {
    let endpoint = self.endpoint(&["urls"]);
    let (status, body) = self.send("submit", self.client.post(endpoint).form(&[("url", url)]))?;
    classify_submission(status, &body)
  }

  fn poll_analysis(&self, id: &SubmissionId) -> Result<Analysis, ProviderError> {
    let url = self.endpoint(&["analyses", id.as_str()]);
    let (status, body) = self.send("poll", self.client.get(url))?;
    classify_analysis(status, &body)
  }
}

pub(crate) fn classify_lookup(status: u16, body: &[u8]) -> Result<Lookup, ProviderError> {
  match status {
    200 => {
      let report: UrlReport =
        serde_json::from_slice(body).map_err(|e| ProviderError::Malformed(format!("lookup: {e}")))?;
      // A record without analysis stats has never been scanned.
      Ok(match report.data.attributes.last_analysis_stats {
        Some(stats) => Lookup::Found(stats),
        None => Lookup::NotFound,
      })
    }
    404 => Ok(Lookup::NotFound),
    other => Err(ProviderError::Rejected {
      operation: "lookup",
      status: other,
    }),
  }
}

pub(crate) fn classify_submission(status: u16, body: &[u8]) -> Result<SubmissionId, ProviderError> {
  if status != 200 {
    return Err(ProviderError::Rejected {
      operation: "submit",
      status,
    });
  }

  let receipt: SubmissionReceipt =
    serde_json::from_slice(body).map_err(|e| ProviderError::Malformed(format!("submit: {e}")))?;
  let id = receipt.data.id.trim();
  if id.is_empty() {
    return Err(ProviderError::Malformed("submit: empty analysis id".to_string()));
  }
  Ok(SubmissionId::new(id))
}

pub(crate) fn classify_analysis(status: u16, body: &[u8]) -> Result<Analysis, ProviderError> {
  if status != 200 {
    return Err(ProviderError::Rejected {
      operation: "poll",
      status,
    });
  }

  let report: AnalysisReport =
    serde_json::from_slice(body).map_err(|e| ProviderError::Malformed(format!("poll: {e}")))?;
  let attrs = report.data.attributes;
  if attrs.status == "completed" {
    if let Some(stats) = attrs.stats {
      return Ok(Analysis::Completed(stats));
    }
  }
  Ok(Analysis::InProgress {
    status: attrs.status,
  })
}

fn read_response_with_limit(response: Response, max_bytes: usize) -> anyhow::Result<Vec<u8>> {
  let mut out = Vec::new();
  let mut limited = response.take((max_bytes.saturating_add(1)) as u64);
  limited.read_to_end(&mut out).context("read response body")?;

  if out.len() > max_bytes {
    anyhow::bail!("response exceeds max size {} bytes", max_bytes);
  }

  Ok(out)
}
