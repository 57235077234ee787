use super::{ForumState, ForumStore, Post, Reply};
use crate::error::ForumError;
use anyhow::Context;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

const LOCK_WAIT: Duration = Duration::from_secs(10);
const LOCK_RETRY: Duration = Duration::from_millis(25);
// A writer holds the lock for one load/modify/save; anything older was left by a crash.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(60);

/// Whole-file JSON store shared by the console and `forum-sweep`. Every
/// mutation runs under a `<file>.lock` sibling created with `create_new`, so
/// writers in different processes never overwrite each other's changes.
/// Readers rely on the atomic rename and take no lock.
pub struct JsonFileForum {
  path: PathBuf,
  lock_path: PathBuf,
  bot_identity: String,
  lock_wait: Duration,
  local: Mutex<()>,
}

impl JsonFileForum {
  pub fn open(path: &Path, bot_identity: &str) -> anyhow::Result<Self> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let store = Self {
      path: path.to_path_buf(),
      lock_path: sibling(path, ".lock"),
      bot_identity: bot_identity.to_string(),
      lock_wait: LOCK_WAIT,
      local: Mutex::new(()),
    };

    let lock = LockFile::acquire(&store.lock_path, store.lock_wait)?;
    if !path.exists() {
      store.save(&ForumState::seeded(bot_identity))?;
      tracing::info!(path = %path.display(), "created forum store");
    }
    drop(lock);
    Ok(store)
  }

  #[cfg(test)]
  fn with_lock_wait(mut self, wait: Duration) -> Self {
    self.lock_wait = wait;
    self
  }

  fn load(&self) -> anyhow::Result<ForumState> {
    let raw = fs::read(&self.path).with_context(|| format!("read {}", self.path.display()))?;
    let mut state: ForumState =
      serde_json::from_slice(&raw).with_context(|| format!("parse {}", self.path.display()))?;
    state.ensure_bot_account(&self.bot_identity);
    Ok(state)
  }

  fn save(&self, state: &ForumState) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(state)?;
    write_atomic(&self.path, &bytes)
  }

  fn read<T>(&self, f: impl FnOnce(&ForumState) -> Result<T, ForumError>) -> Result<T, ForumError> {
    let state = self.load()?;
    f(&state)
  }

  fn write<T>(
    &self,
    f: impl FnOnce(&mut ForumState) -> Result<T, ForumError>,
  ) -> Result<T, ForumError> {
    let _local = self
      .local
      .lock()
      .map_err(|_| ForumError::Storage(anyhow::anyhow!("forum store lock poisoned")))?;
    let _lock = LockFile::acquire(&self.lock_path, self.lock_wait)?;

    let mut state = self.load()?;
    let out = f(&mut state)?;
    self.save(&state)?;
    Ok(out)
  }
}

/// Exclusive lock held as a file; removed on drop.
struct LockFile {
  path: PathBuf,
}

impl LockFile {
  fn acquire(path: &Path, wait: Duration) -> anyhow::Result<Self> {
    let started = Instant::now();
    loop {
      match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
          let _ = writeln!(file, "{}", std::process::id());
          return Ok(Self {
            path: path.to_path_buf(),
          });
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
          if lock_is_stale(path) {
            tracing::warn!(path = %path.display(), "removing stale forum store lock");
            let _ = fs::remove_file(path);
            continue;
          }
          if started.elapsed() >= wait {
            anyhow::bail!("forum store is locked by another writer: {}", path.display());
          }
          thread::sleep(LOCK_RETRY);
        }
        Err(e) => return Err(e).with_context(|| format!("create lock {}", path.display())),
      }
    }
  }
}

impl Drop for LockFile {
  fn drop(&mut self) {
    let _ = fs::remove_file(&self.path);
  }
}

fn lock_is_stale(path: &Path) -> bool {
  fs::metadata(path)
    .and_then(|m| m.modified())
    .ok()
    .and_then(|modified| modified.elapsed().ok())
    .map(|age| age > LOCK_STALE_AFTER)
    .unwrap_or(false)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
  let mut name = path.file_name().unwrap_or_default().to_os_string();
  name.push(suffix);
  path.with_file_name(name)
}

impl ForumStore for JsonFileForum {
  fn create_post(&self, author: &str, title: &str, content: &str) -> Result<Post, ForumError> {
    self.write(|s| s.create_post(author, title, content))
  }

  fn append_reply(&self, post_id: &str, author: &str, content: &str) -> Result<Reply, ForumError> {
    self.write(|s| s.append_reply(post_id, None, author, content))
  }

  fn append_answer(
    &self,
    post_id: &str,
    in_reply_to: &str,
    author: &str,
    content: &str,
  ) -> Result<Reply, ForumError> {
    self.write(|s| s.append_reply(post_id, Some(in_reply_to), author, content))
  }

  fn list_posts(&self) -> Result<Vec<Post>, ForumError> {
    self.read(|s| Ok(s.list_posts()))
  }

  fn get_post(&self, post_id: &str) -> Result<Post, ForumError> {
    self.read(|s| s.get_post(post_id))
  }

  fn register(&self, username: &str, password: &str) -> Result<(), ForumError> {
    self.write(|s| s.register(username, password))
  }

  fn authenticate(&self, username: &str, password: &str) -> Result<bool, ForumError> {
    self.read(|s| Ok(s.authenticate(username, password)))
  }
}

fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("file path has no parent: {}", path.display()))?;
  fs::create_dir_all(parent)?;

  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));
  fs::write(&tmp, contents).with_context(|| format!("write {}", tmp.display()))?;
  fs::rename(&tmp, path).with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
  Ok(())
}
