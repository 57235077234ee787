use crate::types::ScanStats;
use serde::Deserialize;

/// `GET /urls/{key}` body. Only the fields the bot reads are modeled.
#[derive(Debug, Clone, Deserialize)]
pub struct UrlReport {
  pub data: UrlReportData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlReportData {
  #[serde(default)]
  pub attributes: UrlAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UrlAttributes {
  #[serde(default)]
  pub last_analysis_stats: Option<ScanStats>,
}

/// `POST /urls` body.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionReceipt {
  pub data: SubmissionData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionData {
  pub id: String,
}

/// `GET /analyses/{id}` body.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisReport {
  pub data: AnalysisData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisData {
  pub attributes: AnalysisAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisAttributes {
  pub status: String,
  #[serde(default)]
  pub stats: Option<ScanStats>,
}
