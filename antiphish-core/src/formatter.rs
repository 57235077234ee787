use crate::types::Verdict;

pub fn format(verdict: &Verdict) -> String {
  match verdict {
    Verdict::Found { stats } => format!(
      "Total scans: {}\nHarmless: {}\nMalicious: {}\nSuspicious: {}\nUndetected: {}",
      stats.total(),
      stats.harmless,
      stats.malicious,
      stats.suspicious,
      stats.undetected
    ),
    Verdict::Submitted { message } | Verdict::Pending { message } | Verdict::Error { message } => {
      message.clone()
    }
  }
}

/// Reply body posted by the bot. Found verdicts get a header naming the URL.
pub fn format_report(url: &str, verdict: &Verdict) -> String {
  match verdict {
    Verdict::Found { .. } => format!("Scan results for {url}:\n{}", format(verdict)),
    _ => format(verdict),
  }
}
