use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
  #[error("invalid URL: {0}")]
  InvalidInput(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
  #[error("URL not provided in command.")]
  MissingArgument,

  #[error(transparent)]
  Check(#[from] CheckError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
  /// Transport failure: DNS, TLS, connect, timeout or an unreadable body.
  #[error("provider unavailable: {0}")]
  Unavailable(String),

  #[error("provider rejected {operation} with HTTP {status}")]
  Rejected { operation: &'static str, status: u16 },

  #[error("malformed provider response: {0}")]
  Malformed(String),
}

#[derive(Error, Debug)]
pub enum ForumError {
  #[error("post not found: {0}")]
  UnknownPost(String),

  #[error("invalid credentials")]
  Unauthorized,

  #[error("user already exists: {0}")]
  UserExists(String),

  #[error("{0}")]
  Invalid(String),

  #[error(transparent)]
  Storage(#[from] anyhow::Error),
}
