use std::path::PathBuf;

/// LeetSync data directory (~/.leetsync)
pub fn leetsync_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".leetsync")
}

pub fn config_json_path() -> PathBuf {
    leetsync_dir().join("config.json")
}

pub fn store_json_path() -> PathBuf {
    leetsync_dir().join("store.json")
}

pub fn ensure_leetsync_dir() -> std::io::Result<PathBuf> {
    let dir = leetsync_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
