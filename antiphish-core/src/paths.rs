use std::path::{Path, PathBuf};

pub fn base_dir() -> anyhow::Result<PathBuf> {
  if let Some(dir) = std::env::var_os("ANTIPHISH_HOME").filter(|v| !v.is_empty()) {
    return Ok(PathBuf::from(dir));
  }
  let home = std::env::var_os("HOME")
    .or_else(|| std::env::var_os("USERPROFILE"))
    .filter(|v| !v.is_empty())
    .ok_or_else(|| anyhow::anyhow!("cannot locate home directory; set ANTIPHISH_HOME"))?;
  Ok(PathBuf::from(home).join(".antiphish"))
}

pub fn config_path(base: &Path) -> PathBuf {
  base.join("config.toml")
}

pub fn logs_dir(base: &Path) -> PathBuf {
  base.join("logs")
}

pub fn forum_store_path(base: &Path, store_file: &str) -> PathBuf {
  let p = Path::new(store_file);
  if p.is_absolute() {
    p.to_path_buf()
  } else {
    base.join(p)
  }
}
