use crate::config::{self, BotConfig};
use crate::error::{CheckError, DispatchError, ForumError};
use crate::forum::{ForumStore, Post, Reply};
use crate::formatter;
use crate::orchestrator::ScanOrchestrator;
use crate::types::{BotReply, ScanRequest};
use crate::url_identity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
  Reply(BotReply),
  Unrecognized,
}

/// Turns chat messages and forum content into reputation checks and routes
/// the rendered verdict back as a single bot-authored reply.
pub struct CommandDispatcher {
  orchestrator: ScanOrchestrator,
  identity: String,
  trigger: String,
  /// Lowercased copy used for matching; never empty.
  needle: String,
}

impl CommandDispatcher {
  /// Fails when the identity or trigger is blank or the trigger is not ASCII.
  pub fn new(orchestrator: ScanOrchestrator, bot: &BotConfig) -> anyhow::Result<Self> {
    if let Some(reason) = config::validate_bot_config(bot) {
      anyhow::bail!("invalid bot config: {reason}");
    }
    Ok(Self {
      orchestrator,
      identity: bot.identity.trim().to_string(),
      trigger: bot.trigger.trim().to_string(),
      needle: bot.trigger.trim().to_ascii_lowercase(),
    })
  }

  pub fn identity(&self) -> &str {
    &self.identity
  }

  pub fn trigger(&self) -> &str {
    &self.trigger
  }

  /// Standalone chat command: the trigger must open the message.
  /// `Ok(None)` means the message is not a command at all.
  pub fn parse_command(&self, text: &str) -> Result<Option<String>, DispatchError> {
    let trimmed = text.trim();
    let Some(head) = trimmed.get(..self.needle.len()) else {
      return Ok(None);
    };
    if !head.eq_ignore_ascii_case(&self.needle) {
      return Ok(None);
    }

    let rest = &trimmed[self.needle.len()..];
    if !starts_at_token_boundary(rest) {
      return Ok(None);
    }
    url_argument(rest).map(Some)
  }

  /// Command embedded anywhere in forum content. `None` when the content does
  /// not carry the trigger.
  pub fn find_inline_command(&self, content: &str) -> Option<Result<String, DispatchError>> {
    // ASCII lowercasing keeps byte offsets aligned with `content`.
    let lowered = content.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lowered[from..].find(&self.needle) {
      let end = from + pos + self.needle.len();
      let rest = &content[end..];
      if starts_at_token_boundary(rest) {
        return Some(url_argument(rest));
      }
      from = end;
    }
    None
  }

  pub fn handle_chat(&self, message: &str) -> ChatOutcome {
    match self.parse_command(message) {
      Ok(None) => ChatOutcome::Unrecognized,
      Ok(Some(url)) => ChatOutcome::Reply(self.bot_reply(self.respond(&url))),
      Err(e) => {
        tracing::info!(error = %e, "rejected chat command");
        ChatOutcome::Reply(self.bot_reply(user_message(&e)))
      }
    }
  }

  pub fn handle_post(&self, store: &dyn ForumStore, post: &Post) -> Result<Option<Reply>, ForumError> {
    if post.author == self.identity {
      return Ok(None);
    }
    self.answer_inline(store, &post.id, &post.id, &post.content)
  }

  pub fn handle_reply(
    &self,
    store: &dyn ForumStore,
    post_id: &str,
    reply: &Reply,
  ) -> Result<Option<Reply>, ForumError> {
    if reply.author == self.identity {
      return Ok(None);
    }
    self.answer_inline(store, post_id, &reply.id, &reply.content)
  }

  /// Runs the check for one forum item and appends exactly one bot reply,
  /// linked to `item_id` (the post itself or one of its replies).
  pub fn answer_inline(
    &self,
    store: &dyn ForumStore,
    post_id: &str,
    item_id: &str,
    content: &str,
  ) -> Result<Option<Reply>, ForumError> {
    let body = match self.find_inline_command(content) {
      None => return Ok(None),
      Some(Ok(url)) => self.respond(&url),
      Some(Err(e)) => {
        tracing::info!(post_id, error = %e, "rejected inline command");
        user_message(&e)
      }
    };

    let reply = store.append_answer(post_id, item_id, &self.identity, &body)?;
    tracing::info!(post_id, item_id, reply_id = %reply.id, "bot reply posted");
    Ok(Some(reply))
  }

  fn respond(&self, url: &str) -> String {
    let request = ScanRequest::new(url);
    match self.orchestrator.check(&request) {
      Ok(verdict) => formatter::format_report(url, &verdict),
      Err(e) => user_message(&DispatchError::Check(e)),
    }
  }

  fn bot_reply(&self, body: String) -> BotReply {
    BotReply {
      author: self.identity.clone(),
      body,
    }
  }
}

fn starts_at_token_boundary(rest: &str) -> bool {
  rest.is_empty() || rest.starts_with(char::is_whitespace)
}

fn url_argument(rest: &str) -> Result<String, DispatchError> {
  let url = rest
    .split_whitespace()
    .next()
    .ok_or(DispatchError::MissingArgument)?;
  url_identity::validate_url(url)?;
  Ok(url.to_string())
}

pub fn user_message(e: &DispatchError) -> String {
  match e {
    DispatchError::MissingArgument => e.to_string(),
    DispatchError::Check(CheckError::InvalidInput(detail)) => {
      format!("Cannot check that URL: {detail}")
    }
  }
}
