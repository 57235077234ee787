use serde::{Deserialize, Serialize};

/// Per-engine detection counts for a URL. Only the four categories the bot
/// reports are kept; anything else the provider sends is dropped on parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
  #[serde(default)]
  pub harmless: u64,
  #[serde(default)]
  pub malicious: u64,
  #[serde(default)]
  pub suspicious: u64,
  #[serde(default)]
  pub undetected: u64,
}

impl ScanStats {
  pub fn total(&self) -> u64 {
    self
      .harmless
      .saturating_add(self.malicious)
      .saturating_add(self.suspicious)
      .saturating_add(self.undetected)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
  Found,
  Submitted,
  Pending,
  Error,
}

/// Normalized result of one reputation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Verdict {
  Found { stats: ScanStats },
  Submitted { message: String },
  Pending { message: String },
  Error { message: String },
}

impl Verdict {
  pub fn error(message: impl Into<String>) -> Self {
    Self::Error {
      message: message.into(),
    }
  }

  pub fn outcome(&self) -> Outcome {
    match self {
      Verdict::Found { .. } => Outcome::Found,
      Verdict::Submitted { .. } => Outcome::Submitted,
      Verdict::Pending { .. } => Outcome::Pending,
      Verdict::Error { .. } => Outcome::Error,
    }
  }

  pub fn stats(&self) -> Option<&ScanStats> {
    match self {
      Verdict::Found { stats } => Some(stats),
      _ => None,
    }
  }

  pub fn message(&self) -> Option<&str> {
    match self {
      Verdict::Found { .. } => None,
      Verdict::Submitted { message } | Verdict::Pending { message } | Verdict::Error { message } => {
        Some(message.as_str())
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
  pub url: String,
  pub created_at_unix_ms: u64,
}

impl ScanRequest {
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      created_at_unix_ms: now_unix_ms(),
    }
  }
}

/// Text posted back to a chat or a forum thread, always authored by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReply {
  pub author: String,
  pub body: String,
}

pub fn now_unix_ms() -> u64 {
  use std::time::{SystemTime, UNIX_EPOCH};
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_stat_keys_default_to_zero() {
    let stats: ScanStats = serde_json::from_str(r#"{"malicious": 2, "timeout": 7}"#).unwrap();
    assert_eq!(stats.malicious, 2);
    assert_eq!(stats.harmless, 0);
    assert_eq!(stats.total(), 2);
  }

  #[test]
  fn verdict_serializes_with_status_tag() {
    let v = Verdict::Pending {
      message: "later".to_string(),
    };
    let json = serde_json::to_value(&v).unwrap();
    assert_eq!(json["status"], "pending");
    assert_eq!(json["message"], "later");
    assert_eq!(v.outcome(), Outcome::Pending);
    assert!(v.stats().is_none());
  }
}
