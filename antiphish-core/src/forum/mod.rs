use crate::error::ForumError;
use crate::types::now_unix_ms;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

pub mod file_store;

pub use file_store::JsonFileForum;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
  pub id: String,
  pub author: String,
  pub title: String,
  pub content: String,
  pub created_at_unix_ms: u64,
  #[serde(default)]
  pub replies: Vec<Reply>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
  pub id: String,
  pub author: String,
  pub content: String,
  pub created_at_unix_ms: u64,
  /// Post or reply id this bot answer responds to.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub in_reply_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Bot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
  pub username: String,
  pub role: Role,
  #[serde(default)]
  pub password_salt: Option<String>,
  #[serde(default)]
  pub password_sha256: Option<String>,
}

/// Forum storage as seen by the bot. Ordering and uniqueness are the only
/// guarantees: posts list newest first, ids are UUIDs, usernames are unique.
pub trait ForumStore: Send + Sync {
  fn create_post(&self, author: &str, title: &str, content: &str) -> Result<Post, ForumError>;
  fn append_reply(&self, post_id: &str, author: &str, content: &str) -> Result<Reply, ForumError>;
  /// Appends a reply that answers the post body or one of its replies.
  fn append_answer(
    &self,
    post_id: &str,
    in_reply_to: &str,
    author: &str,
    content: &str,
  ) -> Result<Reply, ForumError>;
  fn list_posts(&self) -> Result<Vec<Post>, ForumError>;
  fn get_post(&self, post_id: &str) -> Result<Post, ForumError>;
  fn register(&self, username: &str, password: &str) -> Result<(), ForumError>;
  fn authenticate(&self, username: &str, password: &str) -> Result<bool, ForumError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForumState {
  #[serde(default)]
  pub accounts: Vec<Account>,
  #[serde(default)]
  pub posts: Vec<Post>,
}

impl ForumState {
  pub fn seeded(bot_identity: &str) -> Self {
    let mut state = Self::default();
    state.ensure_bot_account(bot_identity);
    state
  }

  pub fn ensure_bot_account(&mut self, bot_identity: &str) {
    if self.accounts.iter().any(|a| a.username == bot_identity) {
      return;
    }
    self.accounts.push(Account {
      username: bot_identity.to_string(),
      role: Role::Bot,
      password_salt: None,
      password_sha256: None,
    });
  }

  fn create_post(&mut self, author: &str, title: &str, content: &str) -> Result<Post, ForumError> {
    require_non_empty("author", author)?;
    require_non_empty("title", title)?;
    require_non_empty("content", content)?;

    let post = Post {
      id: uuid::Uuid::new_v4().to_string(),
      author: author.to_string(),
      title: title.trim().to_string(),
      content: content.to_string(),
      created_at_unix_ms: now_unix_ms(),
      replies: Vec::new(),
    };
    self.posts.push(post.clone());
    Ok(post)
  }

  fn append_reply(
    &mut self,
    post_id: &str,
    in_reply_to: Option<&str>,
    author: &str,
    content: &str,
  ) -> Result<Reply, ForumError> {
    require_non_empty("author", author)?;
    require_non_empty("content", content)?;

    let post = self
      .posts
      .iter_mut()
      .find(|p| p.id == post_id)
      .ok_or_else(|| ForumError::UnknownPost(post_id.to_string()))?;

    if let Some(target) = in_reply_to {
      if target != post.id && !post.replies.iter().any(|r| r.id == target) {
        return Err(ForumError::Invalid(format!("no item {target} in post {post_id}")));
      }
    }

    let reply = Reply {
      id: uuid::Uuid::new_v4().to_string(),
      author: author.to_string(),
      content: content.to_string(),
      created_at_unix_ms: now_unix_ms(),
      in_reply_to: in_reply_to.map(str::to_string),
    };
    post.replies.push(reply.clone());
    Ok(reply)
  }

  fn list_posts(&self) -> Vec<Post> {
    // Reverse first so equal timestamps still come out newest first under a stable sort.
    let mut out: Vec<Post> = self.posts.iter().rev().cloned().collect();
    out.sort_by(|a, b| b.created_at_unix_ms.cmp(&a.created_at_unix_ms));
    out
  }

  fn get_post(&self, post_id: &str) -> Result<Post, ForumError> {
    self
      .posts
      .iter()
      .find(|p| p.id == post_id)
      .cloned()
      .ok_or_else(|| ForumError::UnknownPost(post_id.to_string()))
  }

  fn register(&mut self, username: &str, password: &str) -> Result<(), ForumError> {
    require_non_empty("username", username)?;
    require_non_empty("password", password)?;
    if self.accounts.iter().any(|a| a.username == username) {
      return Err(ForumError::UserExists(username.to_string()));
    }

    let salt = uuid::Uuid::new_v4().simple().to_string();
    self.accounts.push(Account {
      username: username.to_string(),
      role: Role::User,
      password_sha256: Some(password_digest(&salt, password)),
      password_salt: Some(salt),
    });
    Ok(())
  }

  fn authenticate(&self, username: &str, password: &str) -> bool {
    let Some(account) = self.accounts.iter().find(|a| a.username == username) else {
      return false;
    };
    match (&account.password_salt, &account.password_sha256) {
      (Some(salt), Some(digest)) => password_digest(salt, password) == *digest,
      _ => false,
    }
  }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ForumError> {
  if value.trim().is_empty() {
    return Err(ForumError::Invalid(format!("{field} must not be empty")));
  }
  Ok(())
}

fn password_digest(salt: &str, password: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(salt.as_bytes());
  hasher.update(password.as_bytes());
  hasher
    .finalize()
    .iter()
    .map(|b| format!("{b:02x}"))
    .collect()
}

pub struct InMemoryForum {
  state: Mutex<ForumState>,
}

impl InMemoryForum {
  pub fn new(bot_identity: &str) -> Self {
    Self {
      state: Mutex::new(ForumState::seeded(bot_identity)),
    }
  }

  fn with_state<T>(
    &self,
    f: impl FnOnce(&mut ForumState) -> Result<T, ForumError>,
  ) -> Result<T, ForumError> {
    let mut guard = self
      .state
      .lock()
      .map_err(|_| ForumError::Storage(anyhow::anyhow!("forum state lock poisoned")))?;
    f(&mut guard)
  }
}

impl ForumStore for InMemoryForum {
  fn create_post(&self, author: &str, title: &str, content: &str) -> Result<Post, ForumError> {
    self.with_state(|s| s.create_post(author, title, content))
  }

  fn append_reply(&self, post_id: &str, author: &str, content: &str) -> Result<Reply, ForumError> {
    self.with_state(|s| s.append_reply(post_id, None, author, content))
  }

  fn append_answer(
    &self,
    post_id: &str,
    in_reply_to: &str,
    author: &str,
    content: &str,
  ) -> Result<Reply, ForumError> {
    self.with_state(|s| s.append_reply(post_id, Some(in_reply_to), author, content))
  }

  fn list_posts(&self) -> Result<Vec<Post>, ForumError> {
    self.with_state(|s| Ok(s.list_posts()))
  }

  fn get_post(&self, post_id: &str) -> Result<Post, ForumError> {
    self.with_state(|s| s.get_post(post_id))
  }

  fn register(&self, username: &str, password: &str) -> Result<(), ForumError> {
    self.with_state(|s| s.register(username, password))
  }

  fn authenticate(&self, username: &str, password: &str) -> Result<bool, ForumError> {
    self.with_state(|s| Ok(s.authenticate(username, password)))
  }
}
