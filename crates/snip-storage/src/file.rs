use crate::table::UrlTable;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use snip_core::error::Result;
use snip_core::repository::{validate_owner, validate_save, Repository};
use snip_core::{Deadline, ShortCode, StorageError, UrlMapping, UrlRecord};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One value in a persisted snapshot.
///
/// Older files store the bare long URL; this repository writes the full
/// record so the owner and creation time survive a restart.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Url(String),
    Record {
        long_url: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        created_at: Timestamp,
    },
}

impl StoredEntry {
    fn into_record(self) -> UrlRecord {
        match self {
            StoredEntry::Url(long_url) => UrlRecord {
                long_url,
                owner: None,
                created_at: Timestamp::UNIX_EPOCH,
            },
            StoredEntry::Record {
                long_url,
                user_id,
                created_at,
            } => UrlRecord {
                long_url,
                owner: user_id.filter(|owner| !owner.is_empty()),
                created_at,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct SnapshotEntry<'a> {
    long_url: &'a str,
    user_id: Option<&'a str>,
    created_at: Timestamp,
}

/// Serializes the whole forward map as one newline-terminated JSON object.
fn snapshot_line(table: &UrlTable) -> Result<String> {
    let snapshot: BTreeMap<&str, SnapshotEntry<'_>> = table
        .forward()
        .iter()
        .map(|(code, record)| {
            (
                code.as_str(),
                SnapshotEntry {
                    long_url: &record.long_url,
                    user_id: record.owner(),
                    created_at: record.created_at,
                },
            )
        })
        .collect();

    let mut line = serde_json::to_string(&snapshot)
        .map_err(|e| StorageError::InvalidData(format!("cannot serialize snapshot: {e}")))?;
    line.push('\n');
    Ok(line)
}

/// Result of replaying a snapshot file.
#[derive(Debug, Default)]
struct Replay {
    forward: HashMap<ShortCode, UrlRecord>,
    snapshots: usize,
    torn_tail: bool,
}

impl Replay {
    fn needs_compaction(&self) -> bool {
        self.snapshots > 1 || self.torn_tail
    }
}

async fn replay(path: &Path) -> Result<Replay> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Replay::default()),
        Err(err) => {
            return Err(StorageError::Unavailable(format!(
                "cannot read {}: {err}",
                path.display()
            )))
        }
    };

    let mut replay = Replay::default();
    let snapshots =
        serde_json::Deserializer::from_str(&content).into_iter::<HashMap<String, StoredEntry>>();

    for snapshot in snapshots {
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            // Only a value cut off by the end of the file is a torn write.
            Err(err) if err.is_eof() => {
                warn!(path = %path.display(), error = %err, "dropping torn snapshot at end of file");
                replay.torn_tail = true;
                break;
            }
            Err(err) => {
                return Err(StorageError::InvalidData(format!(
                    "{} line {} column {}: {err}",
                    path.display(),
                    err.line(),
                    err.column()
                )))
            }
        };

        replay.snapshots += 1;
        for (code, entry) in snapshot {
            let record = entry.into_record();
            if code.is_empty() || record.long_url.is_empty() {
                warn!(path = %path.display(), code = %code, "skipping empty mapping in snapshot");
                continue;
            }
            replay.forward.insert(ShortCode::new_unchecked(code), record);
        }
    }

    Ok(replay)
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Copies the file aside before a compaction discards a torn tail.
async fn backup(path: &Path) -> Result<()> {
    let backup = sibling_path(path, ".bak");
    tokio::fs::copy(path, &backup).await.map_err(|e| {
        StorageError::Io(format!("cannot back up {}: {e}", path.display()))
    })?;
    warn!(path = %path.display(), backup = %backup.display(), "kept a copy of the damaged snapshot file");
    Ok(())
}

/// Rewrites the file as a single snapshot via a temp file and a rename.
async fn compact(path: &Path, table: &UrlTable) -> Result<()> {
    let line = snapshot_line(table)?;
    let temp = sibling_path(path, ".tmp");

    let written = async {
        let mut file = File::create(&temp).await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_all().await?;
        tokio::fs::rename(&temp, path).await
    }
    .await;

    if let Err(err) = written {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(StorageError::Io(format!(
            "cannot compact {}: {err}",
            path.display()
        )));
    }

    info!(path = %path.display(), mappings = table.len(), "compacted snapshot file");
    Ok(())
}

#[derive(Debug)]
struct FileState {
    table: UrlTable,
    file: File,
    /// Length of the file after the last acknowledged snapshot.
    len: u64,
}

impl FileState {
    /// Appends the current forward map and syncs it to disk.
    ///
    /// On failure the file is truncated back to the last acknowledged
    /// snapshot so a restart replays the same state the caller saw.
    async fn append_snapshot(&mut self) -> Result<()> {
        let line = snapshot_line(&self.table)?;

        let written = async {
            self.file.write_all(line.as_bytes()).await?;
            self.file.flush().await?;
            self.file.sync_data().await
        }
        .await;

        match written {
            Ok(()) => {
                self.len += line.len() as u64;
                Ok(())
            }
            Err(err) => {
                if let Err(truncate_err) = self.file.set_len(self.len).await {
                    warn!(error = %truncate_err, "failed to truncate partial snapshot");
                }
                Err(err.into())
            }
        }
    }
}

/// File-backed implementation of the Repository trait.
///
/// Holds the same forward map and reverse index as the in-memory backend
/// and appends a full snapshot of the forward map on every save. A single
/// mutex orders all reads and writes; a save is acknowledged only after
/// both the maps and the file are updated.
///
/// Snapshots are read as a stream of JSON objects, newline-separated or
/// not, and entries may be bare long URLs. Written entries are always
/// `{"long_url", "user_id", "created_at"}` objects, so a reader that
/// expects `{code: long_url}` cannot load files written here.
#[derive(Debug)]
pub struct FileRepository {
    path: PathBuf,
    state: Mutex<Option<FileState>>,
}

impl FileRepository {
    /// Opens (or creates) the snapshot file and replays it.
    ///
    /// Fails with `Unavailable` if the file cannot be opened and with
    /// `InvalidData` if a snapshot other than the last one is corrupt.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let replay = replay(&path).await?;
        let needs_compaction = replay.needs_compaction();
        let torn_tail = replay.torn_tail;
        let table = UrlTable::from_forward(replay.forward);

        if torn_tail {
            backup(&path).await?;
        }
        if needs_compaction {
            compact(&path, &table).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                StorageError::Unavailable(format!("cannot open {}: {e}", path.display()))
            })?;
        let len = file.metadata().await?.len();

        info!(path = %path.display(), mappings = table.len(), "opened file repository");

        Ok(Self {
            path,
            state: Mutex::new(Some(FileState { table, file, len })),
        })
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn save(&self, deadline: &Deadline, code: &ShortCode, record: UrlRecord) -> Result<()> {
        validate_save(code, &record)?;

        let mut guard = deadline.run(self.state.lock()).await?;
        let state = guard.as_mut().ok_or(StorageError::Closed)?;

        // Last point where cancellation may win; the write below commits.
        deadline.check()?;
        state.table.insert(code, record)?;

        if let Err(err) = state.append_snapshot().await {
            state.table.remove(code);
            warn!(code = %code, error = %err, "rolled back mapping after failed write");
            return Err(err);
        }

        debug!(code = %code, path = %self.path.display(), "saved mapping");
        Ok(())
    }

    async fn get(&self, deadline: &Deadline, code: &ShortCode) -> Result<Option<UrlRecord>> {
        let guard = deadline.run(self.state.lock()).await?;
        let state = guard.as_ref().ok_or(StorageError::Closed)?;

        Ok(state.table.get(code).cloned())
    }

    async fn find_by_long_url(
        &self,
        deadline: &Deadline,
        long_url: &str,
        owner: Option<&str>,
    ) -> Result<Option<ShortCode>> {
        let guard = deadline.run(self.state.lock()).await?;
        let state = guard.as_ref().ok_or(StorageError::Closed)?;

        Ok(state.table.find(long_url, owner).cloned())
    }

    async fn list_by_owner(&self, deadline: &Deadline, owner: &str) -> Result<Vec<UrlMapping>> {
        let owner = validate_owner(owner)?;
        let guard = deadline.run(self.state.lock()).await?;
        let state = guard.as_ref().ok_or(StorageError::Closed)?;

        Ok(state.table.list_by_owner(owner))
    }

    async fn ping(&self, deadline: &Deadline) -> Result<()> {
        let guard = deadline.run(self.state.lock()).await?;
        let state = guard.as_ref().ok_or(StorageError::Closed)?;

        state
            .file
            .metadata()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", self.path.display())))
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        let Some(state) = guard.take() else {
            return Ok(());
        };

        if let Err(err) = state.file.sync_all().await {
            warn!(path = %self.path.display(), error = %err, "failed to sync snapshot file on close");
            return Err(err.into());
        }

        info!(path = %self.path.display(), "closed file repository");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
