use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::ConversationId;

use crate::interrupt::ResumePoint;
use crate::state::State;

/// Last committed state of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub conversation_id: ConversationId,
    pub state: State,
    /// Set while the conversation waits for approval.
    pub resume: Option<ResumePoint>,
    /// Completed turns.
    pub turn: usize,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(conversation_id: ConversationId, state: State) -> Self {
        Self {
            conversation_id,
            state,
            resume: None,
            turn: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.resume.is_some()
    }
}

/// Per-conversation persistence. Saves replace the previous checkpoint.
pub trait CheckpointStore: Send + Sync + 'static {
    fn load<'a>(&'a self, id: &'a ConversationId) -> BoxFuture<'a, Result<Option<Checkpoint>>>;

    fn save<'a>(&'a self, checkpoint: &'a Checkpoint) -> BoxFuture<'a, Result<()>>;

    /// Returns whether a checkpoint existed.
    fn delete<'a>(&'a self, id: &'a ConversationId) -> BoxFuture<'a, Result<bool>>;
}

fn storage_err(context: &str, e: impl std::fmt::Display) -> TrellisError {
    TrellisError::Checkpoint(format!("{}: {}", context, e))
}

/// Checkpoint store backed by SQLite, one row per conversation.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open or create the checkpoint database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| storage_err("open", e))?;
        Self::init(conn)
    }

    /// In-memory database, for tests and throwaway runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| storage_err("open", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS checkpoints (
                 conversation_id TEXT PRIMARY KEY,
                 state_json TEXT NOT NULL,
                 resume_json TEXT,
                 turn INTEGER NOT NULL DEFAULT 0,
                 updated_at TEXT NOT NULL
             );",
        )
        .map_err(|e| storage_err("initialize schema", e))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load_sync(&self, id: &ConversationId) -> Result<Option<Checkpoint>> {
        let conn = self.conn.lock().map_err(|e| storage_err("lock", e))?;
        let row = conn
            .query_row(
                "SELECT state_json, resume_json, turn, updated_at
                 FROM checkpoints WHERE conversation_id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| storage_err("load", e))?;

        let Some((state_json, resume_json, turn, updated_at)) = row else {
            return Ok(None);
        };

        let state: State = serde_json::from_str(&state_json)?;
        let resume = resume_json
            .as_deref()
            .map(serde_json::from_str::<ResumePoint>)
            .transpose()?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        debug!(conversation_id = %id, turn, suspended = resume.is_some(), "Loaded checkpoint");
        Ok(Some(Checkpoint {
            conversation_id: id.clone(),
            state,
            resume,
            turn: turn.max(0) as usize,
            updated_at,
        }))
    }

    fn save_sync(&self, cp: &Checkpoint) -> Result<()> {
        let state_json = serde_json::to_string(&cp.state)?;
        let resume_json = cp.resume.as_ref().map(serde_json::to_string).transpose()?;

        let conn = self.conn.lock().map_err(|e| storage_err("lock", e))?;
        conn.execute(
            "INSERT INTO checkpoints (conversation_id, state_json, resume_json, turn, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(conversation_id) DO UPDATE SET
                 state_json = excluded.state_json,
                 resume_json = excluded.resume_json,
                 turn = excluded.turn,
                 updated_at = excluded.updated_at",
            params![
                cp.conversation_id.as_str(),
                state_json,
                resume_json,
                cp.turn as i64,
                cp.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| storage_err("save", e))?;

        debug!(conversation_id = %cp.conversation_id, turn = cp.turn, "Saved checkpoint");
        Ok(())
    }

    fn delete_sync(&self, id: &ConversationId) -> Result<bool> {
        let conn = self.conn.lock().map_err(|e| storage_err("lock", e))?;
        let deleted = conn
            .execute(
                "DELETE FROM checkpoints WHERE conversation_id = ?1",
                params![id.as_str()],
            )
            .map_err(|e| storage_err("delete", e))?;
        Ok(deleted > 0)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load<'a>(&'a self, id: &'a ConversationId) -> BoxFuture<'a, Result<Option<Checkpoint>>> {
        Box::pin(async move { self.load_sync(id) })
    }

    fn save<'a>(&'a self, checkpoint: &'a Checkpoint) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.save_sync(checkpoint) })
    }

    fn delete<'a>(&'a self, id: &'a ConversationId) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { self.delete_sync(id) })
    }
}

/// Process-local checkpoint store.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<ConversationId, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.lock().map(|m| m.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load<'a>(&'a self, id: &'a ConversationId) -> BoxFuture<'a, Result<Option<Checkpoint>>> {
        Box::pin(async move {
            let map = self.checkpoints.lock().map_err(|e| storage_err("lock", e))?;
            Ok(map.get(id).cloned())
        })
    }

    fn save<'a>(&'a self, checkpoint: &'a Checkpoint) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut map = self.checkpoints.lock().map_err(|e| storage_err("lock", e))?;
            map.insert(checkpoint.conversation_id.clone(), checkpoint.clone());
            Ok(())
        })
    }

    fn delete<'a>(&'a self, id: &'a ConversationId) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut map = self.checkpoints.lock().map_err(|e| storage_err("lock", e))?;
            Ok(map.remove(id).is_some())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::{ApprovalPolicy, InterruptRequest};
    use crate::state::StateUpdate;
    use serde_json::json;
    use trellis_core::types::{ChatMessage, ToolCall};
    use trellis_test_utils::temp_sqlite_path;

    fn sample_state() -> State {
        let mut state = State::from_human("10대 고객은 몇 명이야?");
        state.apply(
            StateUpdate::message(ChatMessage::assistant("SELECT COUNT(*) FROM client"))
                .with_field("generated_sql", "SELECT COUNT(*) FROM client")
                .with_field("result_set", json!([{"COUNT(*)": 42}])),
        );
        state
    }

    fn sample_point() -> ResumePoint {
        ResumePoint {
            graph: "data_explorer".into(),
            step: "sql_executor".into(),
            steps_taken: 2,
            request: InterruptRequest::new(
                &[ToolCall::new("execute_query", json!({"sql": "SELECT 1"})).with_id("c1")],
                ApprovalPolicy::full(),
            ),
            stash: Some(json!({"role": "assistant", "content": ""})),
            child: None,
        }
    }

    #[tokio::test]
    async fn sqlite_round_trip() {
        let (_dir, path) = temp_sqlite_path();
        let store = SqliteCheckpointStore::open(&path).unwrap();
        let id = ConversationId::new();

        let mut cp = Checkpoint::new(id.clone(), sample_state());
        cp.resume = Some(sample_point());
        cp.turn = 3;
        store.save(&cp).await.unwrap();

        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.state, cp.state);
        assert_eq!(loaded.resume, cp.resume);
        assert_eq!(loaded.turn, 3);
    }

    #[tokio::test]
    async fn sqlite_save_replaces() {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        let id = ConversationId::new();

        let mut cp = Checkpoint::new(id.clone(), sample_state());
        cp.resume = Some(sample_point());
        store.save(&cp).await.unwrap();

        cp.resume = None;
        cp.turn = 1;
        store.save(&cp).await.unwrap();

        let loaded = store.load(&id).await.unwrap().unwrap();
        assert!(!loaded.is_suspended());
        assert_eq!(loaded.turn, 1);
    }

    #[tokio::test]
    async fn sqlite_survives_reopen() {
        let (_dir, path) = temp_sqlite_path();
        let id = ConversationId::new();
        {
            let store = SqliteCheckpointStore::open(&path).unwrap();
            store
                .save(&Checkpoint::new(id.clone(), sample_state()))
                .await
                .unwrap();
        }
        let store = SqliteCheckpointStore::open(&path).unwrap();
        assert!(store.load(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_and_missing() {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        let id = ConversationId::new();
        assert!(store.load(&id).await.unwrap().is_none());
        assert!(!store.delete(&id).await.unwrap());

        store
            .save(&Checkpoint::new(id.clone(), sample_state()))
            .await
            .unwrap();
        assert!(store.delete(&id).await.unwrap());
        assert!(store.load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_isolates_ids() {
        let store = MemoryCheckpointStore::new();
        let a = ConversationId::new();
        let b = ConversationId::new();
        store.save(&Checkpoint::new(a.clone(), sample_state())).await.unwrap();

        assert!(store.load(&a).await.unwrap().is_some());
        assert!(store.load(&b).await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }
}
