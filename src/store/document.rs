//! On-disk form of the job table: one JSON document holding the queue and
//! the history.

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::scheduler::JobTable;

/// Loads the job table. A missing or empty document is the bootstrap case and
/// yields an empty table.
pub async fn load(path: &Path) -> Result<JobTable> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(JobTable::new()),
        Err(e) => return Err(e.into()),
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(JobTable::new());
    }

    Ok(serde_json::from_slice(&bytes)?)
}

/// Overwrites the whole document with `table`.
///
/// The new contents go to a sibling file which is then renamed over the
/// document, so readers only ever see a complete document.
pub async fn save(path: &Path, table: &JobTable) -> Result<()> {
    let data = serde_json::to_vec_pretty(table)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp_path = temp_path(path);
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(&data).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
