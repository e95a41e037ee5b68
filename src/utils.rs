use once_cell::sync::Lazy;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

const APP_DIR: &str = "event-scout";
const DATABASE_FILE: &str = "events.sqlite";
const CONFIG_FILE: &str = "config.json";

static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    dirs::data_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
});

pub fn database_path() -> PathBuf {
    DATA_ROOT.join(DATABASE_FILE)
}

pub fn config_path() -> PathBuf {
    DATA_ROOT.join(CONFIG_FILE)
}

pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
