//! Per-run clip persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use reel_media::move_file;
use reel_models::{Clip, JobRecord, JobState, RunSummary, ShotId};

use crate::error::StoreResult;

/// Persisted content of `clips/status.json`.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct StatusFile {
    /// Shot id → last-known job record
    #[serde(default)]
    jobs: BTreeMap<u32, JobRecord>,
    /// Shot id → completed clip record
    #[serde(default)]
    clips: BTreeMap<u32, Clip>,
}

/// Clip store for one pipeline run.
///
/// Layout under the run directory:
/// `clips/shot_<id>.mp4`, `clips/status.json`, `staging/`, `final/`,
/// `summary.json`.
pub struct ClipStore {
    run_dir: PathBuf,
    state: Mutex<StatusFile>,
}

impl ClipStore {
    /// Open (or create) the store for a run directory, loading any
    /// previously persisted state.
    pub async fn open(run_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let run_dir = run_dir.as_ref().to_path_buf();

        tokio::fs::create_dir_all(run_dir.join("clips")).await?;
        tokio::fs::create_dir_all(run_dir.join("staging")).await?;
        tokio::fs::create_dir_all(run_dir.join("final")).await?;

        let status_path = run_dir.join("clips").join("status.json");
        let state = match tokio::fs::read(&status_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatusFile::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            run_dir,
            state: Mutex::new(state),
        })
    }

    /// The run directory this store owns.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Directory the generation client stages downloads into.
    pub fn staging_dir(&self) -> PathBuf {
        self.run_dir.join("staging")
    }

    /// Directory holding persisted clips.
    pub fn clips_dir(&self) -> PathBuf {
        self.run_dir.join("clips")
    }

    /// Directory assembly outputs land in.
    pub fn final_dir(&self) -> PathBuf {
        self.run_dir.join("final")
    }

    fn status_path(&self) -> PathBuf {
        self.run_dir.join("clips").join("status.json")
    }

    /// Persist a completed clip.
    ///
    /// Moves the staged file into `clips/` and records the clip together
    /// with a Completed job record; the file move happens before the record
    /// write, so a crash in between resubmits the shot rather than
    /// referencing a missing file. A prior clip for the same shot is
    /// replaced.
    pub async fn save(&self, clip: Clip, attempts: u32) -> StoreResult<Clip> {
        let dest = self.clips_dir().join(format!("{}.mp4", clip.shot_id.file_stem()));
        move_file(&clip.path, &dest).await?;

        let saved = clip.at_path(&dest);

        let mut state = self.state.lock().await;
        state.clips.insert(saved.shot_id.as_u32(), saved.clone());
        state.jobs.insert(
            saved.shot_id.as_u32(),
            JobRecord {
                shot_id: saved.shot_id,
                state: JobState::Completed,
                attempts,
                error: None,
            },
        );
        self.flush(&state).await?;

        info!(shot_id = %saved.shot_id, "Clip persisted to {}", saved.path.display());
        Ok(saved)
    }

    /// Load the clip record for a shot, if one was completed.
    pub async fn load(&self, shot_id: ShotId) -> Option<Clip> {
        self.state.lock().await.clips.get(&shot_id.as_u32()).cloned()
    }

    /// Load the clip record for a shot and verify its file is still intact.
    ///
    /// Used on resume: a record whose file vanished or changed size is
    /// treated as absent so the shot gets regenerated.
    pub async fn load_verified(&self, shot_id: ShotId) -> Option<Clip> {
        let clip = self.load(shot_id).await?;
        match tokio::fs::metadata(&clip.path).await {
            Ok(meta) if meta.len() == clip.size_bytes => Some(clip),
            Ok(meta) => {
                debug!(
                    shot_id = %shot_id,
                    expected = clip.size_bytes,
                    actual = meta.len(),
                    "Stored clip size mismatch, discarding record"
                );
                None
            }
            Err(_) => None,
        }
    }

    /// All completed clips in ascending shot-id order.
    pub async fn list_completed(&self) -> Vec<Clip> {
        // BTreeMap iteration is already ascending by shot id.
        self.state.lock().await.clips.values().cloned().collect()
    }

    /// Persist a job record (any state).
    pub async fn record_job(&self, record: JobRecord) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.jobs.insert(record.shot_id.as_u32(), record);
        self.flush(&state).await
    }

    /// Persist several job records in one write.
    pub async fn record_jobs(&self, records: Vec<JobRecord>) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for record in records {
            state.jobs.insert(record.shot_id.as_u32(), record);
        }
        self.flush(&state).await
    }

    /// All persisted job records in ascending shot-id order.
    pub async fn load_records(&self) -> Vec<JobRecord> {
        self.state.lock().await.jobs.values().cloned().collect()
    }

    /// Write the final run summary to `summary.json`.
    pub async fn write_summary(&self, summary: &RunSummary) -> StoreResult<()> {
        let path = self.run_dir.join("summary.json");
        write_json_atomic(&path, summary).await
    }

    /// Rewrite `status.json` via temp + rename.
    async fn flush(&self, state: &StatusFile) -> StoreResult<()> {
        write_json_atomic(&self.status_path(), state).await
    }
}

/// Serialize `value` to `path` atomically (temp file + rename).
async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{FailureKind, JobError};
    use tempfile::TempDir;

    async fn staged_clip(store: &ClipStore, id: u32, bytes: &[u8]) -> Clip {
        let staged = store.staging_dir().join(format!("shot_{:03}.mp4", id));
        tokio::fs::write(&staged, bytes).await.unwrap();
        Clip::new(ShotId(id), &staged, 8.0, bytes.len() as u64, "deadbeef")
    }

    #[tokio::test]
    async fn test_save_moves_clip_and_records_completion() {
        let dir = TempDir::new().unwrap();
        let store = ClipStore::open(dir.path()).await.unwrap();

        let clip = staged_clip(&store, 1, b"some clip bytes").await;
        let saved = store.save(clip, 2).await.unwrap();

        assert_eq!(saved.path, store.clips_dir().join("shot_001.mp4"));
        assert!(saved.path.exists());
        assert!(!store.staging_dir().join("shot_001.mp4").exists());

        let records = store.load_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, JobState::Completed);
        assert_eq!(records[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_reopen_recovers_state() {
        let dir = TempDir::new().unwrap();
        {
            let store = ClipStore::open(dir.path()).await.unwrap();
            let clip = staged_clip(&store, 3, b"persisted clip data").await;
            store.save(clip, 1).await.unwrap();
            store
                .record_job(JobRecord {
                    shot_id: ShotId(4),
                    state: JobState::Failed,
                    attempts: 3,
                    error: Some(JobError::new(FailureKind::Transient, "503")),
                })
                .await
                .unwrap();
        }

        let reopened = ClipStore::open(dir.path()).await.unwrap();
        assert!(reopened.load_verified(ShotId(3)).await.is_some());
        assert!(reopened.load(ShotId(4)).await.is_none());

        let records = reopened.load_records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].state, JobState::Failed);
    }

    #[tokio::test]
    async fn test_load_verified_rejects_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = ClipStore::open(dir.path()).await.unwrap();

        let clip = staged_clip(&store, 5, b"bytes that will vanish").await;
        let saved = store.save(clip, 1).await.unwrap();

        tokio::fs::remove_file(&saved.path).await.unwrap();
        assert!(store.load(ShotId(5)).await.is_some());
        assert!(store.load_verified(ShotId(5)).await.is_none());
    }

    #[tokio::test]
    async fn test_list_completed_is_ordered() {
        let dir = TempDir::new().unwrap();
        let store = ClipStore::open(dir.path()).await.unwrap();

        for id in [7u32, 2, 5] {
            let clip = staged_clip(&store, id, b"ordered clip bytes").await;
            store.save(clip, 1).await.unwrap();
        }

        let clips = store.list_completed().await;
        let ids: Vec<u32> = clips.iter().map(|c| c.shot_id.as_u32()).collect();
        assert_eq!(ids, vec![2, 5, 7]);
    }

    #[tokio::test]
    async fn test_regeneration_replaces_record() {
        let dir = TempDir::new().unwrap();
        let store = ClipStore::open(dir.path()).await.unwrap();

        let first = staged_clip(&store, 1, b"first version").await;
        store.save(first, 1).await.unwrap();

        let second = staged_clip(&store, 1, b"second, longer version").await;
        let saved = store.save(second, 2).await.unwrap();

        let clips = store.list_completed().await;
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].size_bytes, saved.size_bytes);
        assert_eq!(
            tokio::fs::read(&clips[0].path).await.unwrap(),
            b"second, longer version"
        );
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = ClipStore::open(dir.path()).await.unwrap();

        let clip = staged_clip(&store, 1, b"clean write test").await;
        store.save(clip, 1).await.unwrap();

        let mut entries = tokio::fs::read_dir(store.clips_dir()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            assert!(!name.ends_with(".tmp"), "leftover temp file {name}");
        }
    }
}
