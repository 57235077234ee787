use crate::config::Config;
use crate::dispatcher::{ChatOutcome, CommandDispatcher};
use crate::forum::{ForumStore, JsonFileForum, Post};
use crate::{formatter, paths};
use anyhow::Context;
use std::io::BufRead;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;

enum ChatEvent {
  Line(String),
  /// `None` when the worker panicked before producing a reply.
  Answered(u64, Option<ChatOutcome>),
  InputClosed,
  Stop,
}

pub fn run_console_command(cfg: &Config, base: &Path, args: &[String]) -> anyhow::Result<()> {
  let args = strip_global_flags(args);

  if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
    print_help();
    return Ok(());
  }

  if let Some(i) = args.iter().position(|a| a == "--check") {
    return run_check(cfg, &args[i + 1..]);
  }

  if let Some(i) = args.iter().position(|a| a == "--command") {
    return run_command(cfg, &args[i + 1..]);
  }

  if args.iter().any(|a| a == "--chat") {
    return run_chat(Arc::new(crate::build_dispatcher(cfg)?));
  }

  if let Some(i) = args.iter().position(|a| a == "--forum") {
    return run_forum(cfg, base, &args[i + 1..]);
  }

  eprintln!("Unknown command.");
  print_help();
  Ok(())
}

fn run_check(cfg: &Config, tail: &[String]) -> anyhow::Result<()> {
  let url = tail
    .first()
    .ok_or_else(|| anyhow::anyhow!("expected: --check <url>"))?;
  let provider = crate::provider::from_config(cfg)?;
  let orchestrator = crate::orchestrator::ScanOrchestrator::from_config(cfg, provider);

  let verdict = orchestrator.check_url(url)?;
  println!("{}", formatter::format_report(url, &verdict));
  Ok(())
}

fn run_command(cfg: &Config, tail: &[String]) -> anyhow::Result<()> {
  if tail.is_empty() {
    anyhow::bail!("expected: --command \"@antiphish run check <url>\"");
  }
  let dispatcher = crate::build_dispatcher(cfg)?;
  match dispatcher.handle_chat(&tail.join(" ")) {
    ChatOutcome::Reply(reply) => println!("{}: {}", reply.author, reply.body),
    ChatOutcome::Unrecognized => println!("Unknown command."),
  }
  Ok(())
}

/// Reads one message per stdin line. Every message gets its own worker so a
/// check waiting on the provider never holds up the next one.
fn run_chat(dispatcher: Arc<CommandDispatcher>) -> anyhow::Result<()> {
  let (tx, rx) = mpsc::channel::<ChatEvent>();

  let ctrlc_tx = tx.clone();
  ctrlc::set_handler(move || {
    let _ = ctrlc_tx.send(ChatEvent::Stop);
  })?;

  let reader_tx = tx.clone();
  thread::spawn(move || {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
      let Ok(line) = line else {
        break;
      };
      if reader_tx.send(ChatEvent::Line(line)).is_err() {
        return;
      }
    }
    let _ = reader_tx.send(ChatEvent::InputClosed);
  });

  println!(
    "Chat mode. Type `{} <url>`; Ctrl+C or EOF to quit.",
    dispatcher.trigger()
  );
  tracing::info!("chat loop started");

  let mut next_id: u64 = 0;
  let mut in_flight: usize = 0;
  let mut accepting = true;

  while accepting || in_flight > 0 {
    let Ok(event) = rx.recv() else {
      break;
    };
    match event {
      ChatEvent::Line(line) if accepting => {
        if line.trim().is_empty() {
          continue;
        }
        next_id += 1;
        in_flight += 1;
        let id = next_id;
        let worker_tx = tx.clone();
        let d = dispatcher.clone();
        thread::spawn(move || {
          let outcome = answer_line(&d, &line);
          let _ = worker_tx.send(ChatEvent::Answered(id, outcome));
        });
      }
      ChatEvent::Line(_) => {}
      ChatEvent::Answered(id, outcome) => {
        in_flight = in_flight.saturating_sub(1);
        match outcome {
          Some(ChatOutcome::Reply(reply)) => println!("[#{id}] {}: {}", reply.author, reply.body),
          Some(ChatOutcome::Unrecognized) => println!("[#{id}] Unknown command."),
          None => println!("[#{id}] Check failed unexpectedly."),
        }
      }
      ChatEvent::InputClosed | ChatEvent::Stop => {
        if accepting && in_flight > 0 {
          println!("Waiting for {in_flight} running check(s) to finish...");
        }
        accepting = false;
      }
    }
  }

  tracing::info!(messages = next_id, "chat loop stopped");
  Ok(())
}

// A panicking check must still count as answered or the loop never drains.
fn answer_line(dispatcher: &CommandDispatcher, line: &str) -> Option<ChatOutcome> {
  match panic::catch_unwind(AssertUnwindSafe(|| dispatcher.handle_chat(line))) {
    Ok(outcome) => Some(outcome),
    Err(_) => {
      tracing::error!("chat worker panicked");
      None
    }
  }
}

fn run_forum(cfg: &Config, base: &Path, tail: &[String]) -> anyhow::Result<()> {
  let store_path = paths::forum_store_path(base, &cfg.forum.store_file);
  let forum = JsonFileForum::open(&store_path, &cfg.bot.identity)
    .with_context(|| format!("open forum store {}", store_path.display()))?;

  let sub = tail.first().map(|s| s.as_str()).unwrap_or("");
  let arg = |i: usize| tail.get(i).map(|s| s.as_str()).unwrap_or("");

  match sub {
    "register" => {
      if arg(1).is_empty() || arg(2).is_empty() {
        anyhow::bail!("expected: --forum register <user> <password>");
      }
      forum.register(arg(1), arg(2))?;
      println!("User created: {}", arg(1));
      Ok(())
    }
    "post" => {
      let (user, password, title) = (arg(1), arg(2), arg(3));
      let content = tail.get(4..).map(|rest| rest.join(" ")).unwrap_or_default();
      if user.is_empty() || title.is_empty() || content.is_empty() {
        anyhow::bail!("expected: --forum post <user> <password> <title> <content>");
      }
      require_login(&forum, user, password)?;

      let post = forum.create_post(user, title, &content)?;
      println!("Created post {}", post.id);
      if forum_mentions_bot(cfg, &post.content) {
        let dispatcher = crate::build_dispatcher(cfg)?;
        if let Some(reply) = dispatcher.handle_post(&forum, &post)? {
          println!("{}: {}", reply.author, reply.content);
        }
      }
      Ok(())
    }
    "reply" => {
      let (user, password, post_id) = (arg(1), arg(2), arg(3));
      let content = tail.get(4..).map(|rest| rest.join(" ")).unwrap_or_default();
      if user.is_empty() || post_id.is_empty() || content.is_empty() {
        anyhow::bail!("expected: --forum reply <user> <password> <post-id> <content>");
      }
      require_login(&forum, user, password)?;

      let reply = forum.append_reply(post_id, user, &content)?;
      println!("Added reply {}", reply.id);
      if forum_mentions_bot(cfg, &reply.content) {
        let dispatcher = crate::build_dispatcher(cfg)?;
        if let Some(bot) = dispatcher.handle_reply(&forum, post_id, &reply)? {
          println!("{}: {}", bot.author, bot.content);
        }
      }
      Ok(())
    }
    "list" => {
      let posts = forum.list_posts()?;
      if posts.is_empty() {
        println!("No posts yet.");
        return Ok(());
      }
      for p in posts {
        println!(
          "- {} \"{}\" by {} created_at_unix_ms={} replies={}",
          p.id,
          p.title,
          p.author,
          p.created_at_unix_ms,
          p.replies.len()
        );
      }
      Ok(())
    }
    "show" => {
      if arg(1).is_empty() {
        anyhow::bail!("expected: --forum show <post-id>");
      }
      print_post(&forum.get_post(arg(1))?);
      Ok(())
    }
    _ => {
      eprintln!(
        "Unknown `--forum` subcommand. Expected: register|post|reply|list|show"
      );
      print_help();
      Ok(())
    }
  }
}

fn require_login(forum: &dyn ForumStore, user: &str, password: &str) -> anyhow::Result<()> {
  if !forum.authenticate(user, password)? {
    return Err(crate::error::ForumError::Unauthorized.into());
  }
  Ok(())
}

// Skips building an HTTP client (and requiring an API key) for ordinary posts.
fn forum_mentions_bot(cfg: &Config, content: &str) -> bool {
  content
    .to_ascii_lowercase()
    .contains(&cfg.bot.trigger.trim().to_ascii_lowercase())
}

fn print_post(post: &Post) {
  println!("{} by {}", post.title, post.author);
  println!("{}", post.content);
  for r in &post.replies {
    println!("--- {} (reply {})", r.author, r.id);
    println!("{}", r.content);
  }
}

fn strip_global_flags(args: &[String]) -> Vec<String> {
  args
    .iter()
    .skip(1)
    .filter(|a| a.as_str() != "--verbose")
    .cloned()
    .collect()
}

fn print_help() {
  println!("antiphish v{}", env!("CARGO_PKG_VERSION"));
  println!("Commands:");
  println!("  --verbose (global; mirror logs to stderr)");
  println!("  --check <url>");
  println!("  --command \"@antiphish run check <url>\"");
  println!("  --chat");
  println!("  --forum register <user> <password>");
  println!("  --forum post <user> <password> <title> <content>");
  println!("  --forum reply <user> <password> <post-id> <content>");
  println!("  --forum list");
  println!("  --forum show <post-id>");
}
