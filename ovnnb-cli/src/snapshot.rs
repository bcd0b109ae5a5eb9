//! JSON snapshot files backing the in-memory database.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ovnnb::db::{MemoryDb, Snapshot};
use ovnnb::model::{Model, NbGlobal};
use serde_json::Value;
use tracing::debug;

/// Reads the database stored at `path`.
pub async fn load(path: &Path) -> Result<MemoryDb> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot: Snapshot =
        serde_json::from_slice(&content).with_context(|| format!("Invalid snapshot {}", path.display()))?;
    let db = MemoryDb::from_snapshot(snapshot).with_context(|| format!("Invalid snapshot {}", path.display()))?;
    debug!(path = %path.display(), "Loaded snapshot");
    Ok(db)
}

/// Writes `db` to `path`, replacing the previous file atomically.
pub async fn save(path: &Path, db: &MemoryDb) -> Result<()> {
    let content = serde_json::to_vec_pretty(&db.snapshot().await)?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    debug!(path = %path.display(), "Saved snapshot");
    Ok(())
}

/// Creates a database at `path` holding only an empty `NB_Global` row.
pub async fn init(path: &Path) -> Result<()> {
    if tokio::fs::try_exists(path).await? {
        bail!("{} already exists", path.display());
    }
    let db = MemoryDb::new();
    let Value::Object(row) = serde_json::to_value(NbGlobal::default())? else {
        bail!("NB_Global did not serialize to a row");
    };
    db.seed(NbGlobal::TABLE, row).await?;
    save(path, &db).await
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
