use crate::error::CheckError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::Url;
use std::fmt;

/// Provider lookup key for a URL. Unpadded base64url of the exact URL bytes,
/// so it can be dropped straight into a request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UrlKey(String);

impl UrlKey {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for UrlKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

pub fn key_for(url: &str) -> Result<UrlKey, CheckError> {
  validate_url(url)?;
  Ok(UrlKey(URL_SAFE_NO_PAD.encode(url.as_bytes())))
}

pub fn validate_url(url: &str) -> Result<(), CheckError> {
  if url.is_empty() {
    return Err(CheckError::InvalidInput("URL must not be empty".to_string()));
  }
  if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
    return Err(CheckError::InvalidInput(
      "URL must not contain whitespace".to_string(),
    ));
  }

  let parsed = Url::parse(url).map_err(|e| CheckError::InvalidInput(format!("{url}: {e}")))?;
  if parsed.scheme() != "http" && parsed.scheme() != "https" {
    return Err(CheckError::InvalidInput(format!(
      "unsupported scheme `{}`; expected http or https",
      parsed.scheme()
    )));
  }
  if parsed.host_str().is_none() {
    return Err(CheckError::InvalidInput(format!("{url}: missing host")));
  }

  Ok(())
}
