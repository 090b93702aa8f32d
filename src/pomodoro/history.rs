//! User data: tasks, session history and pomodoro settings
//!
//! The timer only appends finished sessions here and reads task progress and
//! settings back. Everything else in the blob (categories, notes, archived
//! tasks) is carried through untouched.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

use super::{SessionRecord, SessionType, TaskId};

/// Work sessions a task is expected to take when it has no estimate
pub const DEFAULT_ESTIMATED_POMODOROS: u32 = 3;

/// Durations and auto-advance switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimerSettings {
    /// Minutes
    pub work_duration: f64,
    pub short_break_duration: f64,
    pub long_break_duration: f64,
    /// Every Nth completed work session earns a long break
    pub sessions_until_long_break: u32,
    /// Start the break by itself when a work session finishes on time
    pub auto_start_breaks: bool,
    /// Start the next work session by itself when a break finishes on time
    pub auto_start_pomodoros: bool,
    /// Settings owned by other parts of the dashboard
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            work_duration: 30.0,
            short_break_duration: 5.0,
            long_break_duration: 10.0,
            sessions_until_long_break: 4,
            auto_start_breaks: false,
            auto_start_pomodoros: false,
            extra: Map::new(),
        }
    }
}

impl TimerSettings {
    /// Configured length for a session type, in minutes
    pub fn duration_for(&self, session_type: SessionType) -> f64 {
        match session_type {
            SessionType::Work => self.work_duration,
            SessionType::ShortBreak => self.short_break_duration,
            SessionType::LongBreak => self.long_break_duration,
        }
    }

    /// Which break follows once `completed_work_sessions` work sessions are done
    pub fn break_after(&self, completed_work_sessions: u32) -> SessionType {
        let every = self.sessions_until_long_break;
        if every > 0 && completed_work_sessions > 0 && completed_work_sessions % every == 0 {
            SessionType::LongBreak
        } else {
            SessionType::ShortBreak
        }
    }
}

/// A to-do item that pomodoros count toward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_pomodoros: Option<u32>,
    /// Finished sessions credited to this task
    #[serde(default)]
    pub pomodoro_sessions: Vec<SessionRecord>,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(title: impl Into<String>, estimated_pomodoros: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            completed: false,
            estimated_pomodoros,
            pomodoro_sessions: Vec::new(),
            created: Utc::now(),
            extra: Map::new(),
        }
    }

    pub fn completed_work_sessions(&self) -> u32 {
        self.pomodoro_sessions
            .iter()
            .filter(|s| s.completed && s.session_type == SessionType::Work)
            .count() as u32
    }

    pub fn estimate(&self) -> u32 {
        self.estimated_pomodoros
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_ESTIMATED_POMODOROS)
    }

    pub fn progress(&self) -> TaskProgress {
        TaskProgress {
            completed_work_sessions: self.completed_work_sessions(),
            estimated_pomodoros: self.estimate(),
            task_completed: self.completed,
        }
    }
}

/// What the timer needs to know about a task to pick the next session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskProgress {
    pub completed_work_sessions: u32,
    pub estimated_pomodoros: u32,
    /// The task itself was checked off
    pub task_completed: bool,
}

impl TaskProgress {
    /// All estimated work sessions are done
    pub fn reached_estimate(&self) -> bool {
        self.completed_work_sessions >= self.estimated_pomodoros
    }
}

/// Everything the dashboard keeps apart from the live timer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Append-only log of finished sessions, completed or abandoned
    #[serde(default)]
    pub pomodoro_sessions: Vec<SessionRecord>,
    #[serde(default)]
    pub settings: TimerSettings,
    /// Categories, notes, archived tasks
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserData {
    pub fn add_task(&mut self, task: Task) -> TaskId {
        let id = task.id;
        self.tasks.push(task);
        id
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Look a task up by id, id prefix or case-insensitive title
    pub fn find_task(&self, reference: &str) -> Option<&Task> {
        let reference = reference.trim();
        if let Ok(id) = Uuid::parse_str(reference) {
            return self.task(id);
        }
        if let Some(task) = self
            .tasks
            .iter()
            .find(|t| t.title.eq_ignore_ascii_case(reference))
        {
            return Some(task);
        }
        let mut by_prefix = self
            .tasks
            .iter()
            .filter(|t| !reference.is_empty() && t.id.to_string().starts_with(reference));
        match (by_prefix.next(), by_prefix.next()) {
            (Some(task), None) => Some(task),
            _ => None,
        }
    }

    /// Open tasks in creation order
    pub fn open_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| !t.completed)
    }

    /// Check a task off; returns false if it does not exist
    pub fn complete_task(&mut self, id: TaskId) -> bool {
        match self.task_mut(id) {
            Some(task) => {
                task.completed = true;
                true
            }
            None => false,
        }
    }
}

/// Port through which the timer reports finished sessions
pub trait SessionHistory {
    /// Append a finalized session; completed ones are also credited to their task
    fn record(&mut self, record: SessionRecord) -> StoreResult<()>;

    fn task_progress(&self, task_id: TaskId) -> Option<TaskProgress>;

    fn settings(&self) -> TimerSettings;
}

impl SessionHistory for UserData {
    fn record(&mut self, record: SessionRecord) -> StoreResult<()> {
        if record.completed {
            if let Some(task) = record.task_id.and_then(|id| self.task_mut(id)) {
                task.pomodoro_sessions.push(record.clone());
            }
        }
        self.pomodoro_sessions.push(record);
        Ok(())
    }

    fn task_progress(&self, task_id: TaskId) -> Option<TaskProgress> {
        self.task(task_id).map(Task::progress)
    }

    fn settings(&self) -> TimerSettings {
        self.settings.clone()
    }
}

/// Backup a corrupted file by renaming it with a .backup extension
fn backup_corrupted_file(path: &Path) {
    let backup_path = path.with_extension("json.backup");
    if let Err(e) = std::fs::rename(path, &backup_path) {
        tracing::warn!(
            "Failed to backup corrupted file {} to {}: {}",
            path.display(),
            backup_path.display(),
            e
        );
    } else {
        tracing::info!("Corrupted user data backed up to {}", backup_path.display());
    }
}

/// User data persisted as a JSON file, saved after every recorded session
#[derive(Debug)]
pub struct UserDataStore {
    data: UserData,
    store_path: PathBuf,
}

impl UserDataStore {
    /// Create an empty store with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            data: UserData::default(),
            store_path: path,
        }
    }

    /// Load from disk; a missing file yields empty data
    pub fn load_from(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(Self::with_path(path.to_path_buf()));
        }

        let parsed = String::from_utf8(std::fs::read(path)?)
            .map_err(StoreError::from)
            .and_then(|content| {
                if content.trim().is_empty() {
                    Ok(UserData::default())
                } else {
                    serde_json::from_str(&content).map_err(StoreError::from)
                }
            });

        match parsed {
            Ok(data) => Ok(Self {
                data,
                store_path: path.to_path_buf(),
            }),
            Err(e) => {
                tracing::error!("User data file is corrupted: {}", e);
                backup_corrupted_file(path);
                Err(e)
            }
        }
    }

    /// Load from disk, starting empty if the file cannot be used
    pub fn load_or_default(path: &Path) -> Self {
        Self::load_from(path).unwrap_or_else(|e| {
            tracing::warn!(
                "{}. Starting with empty user data.",
                e.describe("Could not load user data")
            );
            Self::with_path(path.to_path_buf())
        })
    }

    pub fn data(&self) -> &UserData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut UserData {
        &mut self.data
    }

    /// Save to disk
    pub fn save(&self) -> StoreResult<()> {
        if let Some(parent) = self.store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.data)?;
        let temp_path = self.store_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.store_path)?;
        Ok(())
    }
}

impl SessionHistory for UserDataStore {
    fn record(&mut self, record: SessionRecord) -> StoreResult<()> {
        self.data.record(record)?;
        self.save()
    }

    fn task_progress(&self, task_id: TaskId) -> Option<TaskProgress> {
        self.data.task_progress(task_id)
    }

    fn settings(&self) -> TimerSettings {
        self.data.settings()
    }
}
