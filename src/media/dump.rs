use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};

/// `camera_{source}_stream{index}_{YYYYmmdd_HHMMSS}.{encoder_type}`
pub fn dump_file_name(source: &str, index: u8, encoder_type: &str, at: DateTime<Local>) -> String {
    format!(
        "camera_{}_stream{}_{}.{}",
        source,
        index,
        at.format("%Y%m%d_%H%M%S"),
        encoder_type
    )
}

/// Creates `dir` if needed and removes any file already at the target path.
pub fn prepare_dump_path(dir: &Path, file_name: &str) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create dump folder {}", dir.display()))?;
    let path = dir.join(file_name);
    if path.exists() {
        std::fs::remove_file(&path)
            .with_context(|| format!("remove existing dump {}", path.display()))?;
        log::info!("removed existing dump file: {}", path.display());
    }
    Ok(path)
}
