use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colony_core::{
    AgentRecord, ColonyError, Message, MessageId, Performative, Result, Task, TaskId, TaskStatus,
};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::Store;

fn db_err(e: rusqlite::Error) -> ColonyError {
    ColonyError::Store(e.to_string())
}

/// SQLite-backed [`Store`]. One connection behind a mutex, WAL journal.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> colony_core::Result<Self> {
        info!(?path, "opening store");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && path != Path::new(":memory:")
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                sender TEXT NOT NULL,
                receiver TEXT NOT NULL,
                performative TEXT NOT NULL,
                content TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                in_reply_to TEXT,
                delivered INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_pending ON messages(receiver, delivered, seq);

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                assigned_to TEXT,
                status TEXT NOT NULL,
                priority_rank INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                body TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(assigned_to, status);

            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )
        .map_err(db_err)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> colony_core::Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    fn row_to_message(row: &Row<'_>) -> rusqlite::Result<RawMessage> {
        Ok(RawMessage {
            id: row.get(0)?,
            sender: row.get(1)?,
            receiver: row.get(2)?,
            performative: row.get(3)?,
            content: row.get(4)?,
            conversation_id: row.get(5)?,
            in_reply_to: row.get(6)?,
            delivered: row.get::<_, i64>(7)? != 0,
            created_at: row.get(8)?,
        })
    }

    fn write_task(conn: &Connection, task: &Task) -> Result<()> {
        let body = serde_json::to_string(task)?;
        conn.execute(
            "INSERT INTO tasks (id, assigned_to, status, priority_rank, created_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                assigned_to = excluded.assigned_to,
                status = excluded.status,
                priority_rank = excluded.priority_rank,
                body = excluded.body",
            params![
                task.id.to_string(),
                task.assigned_to,
                task.status.as_str(),
                task.priority as i64,
                task.created_at.to_rfc3339(),
                body,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn read_task(conn: &Connection, id: TaskId) -> Result<Option<Task>> {
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM tasks WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        match body {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }
}

const MESSAGE_COLUMNS: &str = "id, sender, receiver, performative, content, conversation_id, \
                               in_reply_to, delivered, created_at";

/// A message row before its text columns are parsed.
struct RawMessage {
    id: String,
    sender: String,
    receiver: String,
    performative: String,
    content: String,
    conversation_id: String,
    in_reply_to: Option<String>,
    delivered: bool,
    created_at: String,
}

impl RawMessage {
    fn into_message(self) -> Result<Message> {
        let uuid = |s: &str| {
            Uuid::parse_str(s).map_err(|e| ColonyError::Store(format!("bad uuid '{s}': {e}")))
        };
        let performative: Performative = self.performative.parse().map_err(ColonyError::Store)?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| ColonyError::Store(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc);
        Ok(Message {
            id: uuid(&self.id)?,
            sender: self.sender,
            receiver: self.receiver,
            performative,
            content: serde_json::from_str(&self.content)?,
            conversation_id: uuid(&self.conversation_id)?,
            in_reply_to: self.in_reply_to.as_deref().map(uuid).transpose()?,
            delivered: self.delivered,
            created_at,
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_message(&self, message: &Message) -> Result<()> {
        let content = serde_json::to_string(&message.content)?;
        let db = self.db.lock();
        db.execute(
            "INSERT OR IGNORE INTO messages
                (id, sender, receiver, performative, content, conversation_id, in_reply_to, delivered, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                message.id.to_string(),
                message.sender,
                message.receiver,
                message.performative.as_str(),
                content,
                message.conversation_id.to_string(),
                message.in_reply_to.map(|id| id.to_string()),
                message.delivered as i64,
                message.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_pending_messages(&self, receiver: &str, limit: usize) -> Result<Vec<Message>> {
        let rows: Vec<RawMessage> = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE receiver = ?1 AND delivered = 0
                     ORDER BY seq ASC LIMIT ?2"
                ))
                .map_err(db_err)?;
            stmt.query_map(params![receiver, limit as i64], Self::row_to_message)
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?
        };
        rows.into_iter().map(RawMessage::into_message).collect()
    }

    async fn mark_delivered(&self, id: MessageId) -> Result<bool> {
        let db = self.db.lock();
        let rows = db
            .execute(
                "UPDATE messages SET delivered = 1 WHERE id = ?1 AND delivered = 0",
                params![id.to_string()],
            )
            .map_err(db_err)?;
        Ok(rows > 0)
    }

    async fn pending_count(&self, receiver: &str) -> Result<usize> {
        let db = self.db.lock();
        let count: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE receiver = ?1 AND delivered = 0",
                params![receiver],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }

    async fn load_message(&self, id: MessageId) -> Result<Option<Message>> {
        let raw = {
            let db = self.db.lock();
            db.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                Self::row_to_message,
            )
            .optional()
            .map_err(db_err)?
        };
        raw.map(RawMessage::into_message).transpose()
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        let db = self.db.lock();
        Self::write_task(&db, task)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let db = self.db.lock();
        Self::read_task(&db, id)
    }

    async fn load_due_tasks(&self, agent_id: &str, limit: usize) -> Result<Vec<Task>> {
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(db_err)?;
        let bodies: Vec<String> = {
            let mut stmt = tx
                .prepare(
                    "SELECT body FROM tasks
                     WHERE assigned_to = ?1 AND status = 'pending'
                     ORDER BY priority_rank DESC, created_at ASC LIMIT ?2",
                )
                .map_err(db_err)?;
            stmt.query_map(params![agent_id, limit as i64], |row| row.get(0))
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?
        };

        let now = Utc::now();
        let mut claimed = Vec::with_capacity(bodies.len());
        for body in bodies {
            let mut task: Task = serde_json::from_str(&body)?;
            task.status = TaskStatus::InProgress;
            task.updated_at = now;
            Self::write_task(&tx, &task)?;
            claimed.push(task);
        }
        tx.commit().map_err(db_err)?;

        if !claimed.is_empty() {
            debug!(agent_id, count = claimed.len(), "claimed due tasks");
        }
        Ok(claimed)
    }

    async fn save_task_result(
        &self,
        task_id: TaskId,
        result: Value,
        status: TaskStatus,
    ) -> Result<Task> {
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(db_err)?;
        let mut task = Self::read_task(&tx, task_id)?.ok_or(ColonyError::TaskNotFound(task_id))?;
        if task.status.is_terminal() {
            return Err(ColonyError::TaskAlreadyTerminal {
                task_id,
                status: task.status.to_string(),
            });
        }
        task.result = Some(result);
        task.status = status;
        task.updated_at = Utc::now();
        Self::write_task(&tx, &task)?;
        tx.commit().map_err(db_err)?;
        Ok(task)
    }

    async fn save_agent(&self, record: &AgentRecord) -> Result<()> {
        let body = serde_json::to_string(record)?;
        let db = self.db.lock();
        db.execute(
            "INSERT INTO agents (id, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![record.id, body, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_agents(&self) -> Result<Vec<AgentRecord>> {
        let bodies: Vec<String> = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare("SELECT body FROM agents ORDER BY id")
                .map_err(db_err)?;
            stmt.query_map([], |row| row.get(0))
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?
        };
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(ColonyError::from))
            .collect()
    }
}
