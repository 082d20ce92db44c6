//! Bootstrap helpers for intentbot.
//!
//! Environment files are loaded before any config is resolved.
//!
//! File: `~/.intentbot/.env` (standard dotenvy format)

use std::path::PathBuf;

/// Base directory for intentbot files: `~/.intentbot`.
pub fn intentbot_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".intentbot")
}

/// Path to the intentbot-specific `.env` file: `~/.intentbot/.env`.
pub fn intentbot_env_path() -> PathBuf {
    intentbot_dir().join(".env")
}

/// Load env vars from `~/.intentbot/.env` (in addition to the standard `.env`).
///
/// Call this **after** `dotenvy::dotenv()` so that the standard `./.env`
/// takes priority over `~/.intentbot/.env`. dotenvy never overwrites
/// existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.intentbot/.env`
pub fn load_intentbot_env() {
    let path = intentbot_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        eprintln!("Warning: failed to load {}: {}", path.display(), e);
    }
}
