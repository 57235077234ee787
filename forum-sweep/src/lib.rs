use antiphish_core::config::{self, ProviderKind};
use antiphish_core::dispatcher::CommandDispatcher;
use antiphish_core::forum::{ForumStore, JsonFileForum, Post};
use antiphish_core::paths;
use anyhow::Context;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOptions {
  pub dry_run: bool,
}

impl SweepOptions {
  pub fn from_args(args: &[String]) -> Self {
    Self {
      dry_run: args.iter().any(|a| a == "--dry-run"),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
  pub posts_scanned: usize,
  pub commands_found: usize,
  pub replies_posted: usize,
  pub failures: usize,
}

pub fn run(opts: SweepOptions) -> anyhow::Result<SweepSummary> {
  tracing_subscriber::fmt()
    .with_ansi(false)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();

  let base = paths::base_dir()?;
  let config_path = paths::config_path(&base);
  let mut cfg = if opts.dry_run {
    config::load_or_default_readonly(&config_path)?
  } else {
    config::load_or_create_default(&config_path)?
  };
  if opts.dry_run {
    // Dry runs only parse content; never contact the provider.
    cfg.provider.kind = ProviderKind::Offline;
  }

  let store_path = paths::forum_store_path(&base, &cfg.forum.store_file);
  let forum = JsonFileForum::open(&store_path, &cfg.bot.identity)
    .with_context(|| format!("open forum store {}", store_path.display()))?;
  let dispatcher = antiphish_core::build_dispatcher(&cfg)?;

  println!(
    "Forum sweep starting: store={} dry_run={}",
    store_path.display(),
    opts.dry_run
  );

  let summary = sweep(&dispatcher, &forum, opts.dry_run)?;
  println!(
    "Forum sweep complete: posts={} commands={} replies={} failures={}",
    summary.posts_scanned, summary.commands_found, summary.replies_posted, summary.failures
  );
  Ok(summary)
}

/// Answers every command in the store that no bot reply answers yet.
pub fn sweep(
  dispatcher: &CommandDispatcher,
  store: &dyn ForumStore,
  dry_run: bool,
) -> anyhow::Result<SweepSummary> {
  let mut summary = SweepSummary::default();
  let is_command = |content: &str| dispatcher.find_inline_command(content).is_some();

  for post in store.list_posts()? {
    summary.posts_scanned += 1;

    for item in open_commands(&post, dispatcher.identity(), is_command) {
      summary.commands_found += 1;

      if dry_run {
        println!("DRY-RUN: would answer {} in post {}", item.id, post.id);
        continue;
      }

      match dispatcher.answer_inline(store, &post.id, item.id, item.content) {
        Ok(Some(_)) => summary.replies_posted += 1,
        Ok(None) => {}
        Err(e) => {
          summary.failures += 1;
          tracing::error!(
            post_id = %post.id,
            item_id = item.id,
            error = %e,
            "failed to post bot reply (continuing)"
          );
        }
      }
    }
  }

  Ok(summary)
}

/// A post body or reply that carries a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenItem<'a> {
  pub id: &'a str,
  pub content: &'a str,
}

/// Commands in a thread that no bot reply answers yet, oldest first.
/// A bot reply closes the item named by its `in_reply_to`; one without a link
/// closes the latest command still open before it.
pub fn open_commands<'a>(
  post: &'a Post,
  bot_identity: &str,
  is_command: impl Fn(&str) -> bool,
) -> Vec<OpenItem<'a>> {
  let answered: HashSet<&str> = post
    .replies
    .iter()
    .filter(|r| r.author == bot_identity)
    .filter_map(|r| r.in_reply_to.as_deref())
    .collect();
  let is_open = |id: &str, author: &str, content: &str| {
    author != bot_identity && !answered.contains(id) && is_command(content)
  };

  let mut open = Vec::new();
  if is_open(&post.id, &post.author, &post.content) {
    open.push(OpenItem {
      id: &post.id,
      content: &post.content,
    });
  }

  for r in &post.replies {
    if r.author == bot_identity {
      if r.in_reply_to.is_none() {
        open.pop();
      }
    } else if is_open(&r.id, &r.author, &r.content) {
      open.push(OpenItem {
        id: &r.id,
        content: &r.content,
      });
    }
  }
  open
}
