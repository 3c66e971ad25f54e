use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Entity;
use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("{0} not found")] NotFound(Entity),
    #[error("conflict")] Conflict,
    #[error("{0}")] Storage(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait BoardRepo: Send + Sync {
    /// Create the board if missing; existing boards are returned untouched.
    async fn upsert_board(&self, boardname: &str) -> RepoResult<Board>;
}

#[async_trait]
pub trait ThreadRepo: Send + Sync {
    async fn create_thread(&self, new: NewThread) -> RepoResult<Thread>;
    /// Newest `created_on` first, at most `limit` threads.
    async fn list_threads(&self, boardname: &str, limit: usize) -> RepoResult<Vec<Thread>>;
    async fn find_thread(&self, boardname: &str, id: Id) -> RepoResult<Thread>;
    /// Hard delete. Replies of the thread are left in place.
    async fn delete_thread(&self, boardname: &str, id: Id) -> RepoResult<()>;
    async fn report_thread(&self, boardname: &str, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait ReplyRepo: Send + Sync {
    /// Bumps the owning thread and inserts the reply as one atomic step.
    /// Fails with `NotFound(Thread)` when the board has no such thread.
    async fn create_reply(&self, new: NewReply) -> RepoResult<Reply>;
    /// Newest `created_on` first; `None` returns every reply.
    async fn list_replies(&self, thread_id: Id, limit: Option<usize>) -> RepoResult<Vec<Reply>>;
    async fn find_reply(&self, thread_id: Id, reply_id: Id) -> RepoResult<Reply>;
    /// Replace the text with [`DELETED_TEXT`] and bump the reply only.
    async fn soft_delete_reply(&self, thread_id: Id, reply_id: Id, at: DateTime<Utc>) -> RepoResult<()>;
    async fn report_reply(&self, thread_id: Id, reply_id: Id) -> RepoResult<()>;
}

/// Connection lifecycle of the storage handle.
#[async_trait]
pub trait StorageLifecycle: Send + Sync {
    /// Cheap round trip used by the health endpoint.
    async fn ping(&self) -> RepoResult<()>;
    async fn close(&self);
}

pub trait Repo: BoardRepo + ThreadRepo + ReplyRepo + StorageLifecycle {}

impl<T> Repo for T where T: BoardRepo + ThreadRepo + ReplyRepo + StorageLifecycle {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

    use serde::{Deserialize, Serialize};

    use crate::sequence::{Counters, Sequence};

    const SNAPSHOT_FILE: &str = "state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        boards: BTreeMap<String, Board>,
        threads: BTreeMap<Id, Thread>,
        replies: BTreeMap<Id, Reply>,
        counters: Counters,
        #[serde(skip)]
        version: u64,
    }

    /// Encoded state taken under the write lock that produced it.
    struct Snapshot {
        version: u64,
        bytes: Vec<u8>,
    }

    /// Process-local store. Every mutation happens under one write lock and
    /// is encoded there; when a data directory was given the encoded state
    /// is written to disk before the mutation returns.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
        /// Version of the snapshot currently on disk.
        written: Arc<Mutex<u64>>,
    }

    impl InMemRepo {
        /// Load `<dir>/state.json` if present and persist there after writes.
        /// A snapshot that cannot be read or parsed is an error, never an
        /// empty store.
        pub fn open(dir: impl AsRef<Path>) -> RepoResult<Self> {
            let path = dir.as_ref().join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&path)?;
            Ok(Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(path)),
                written: Arc::new(Mutex::new(0)),
            })
        }

        /// No snapshot; state dies with the process.
        pub fn ephemeral() -> Self {
            Self {
                state: Arc::new(RwLock::new(State::default())),
                snapshot_path: None,
                written: Arc::new(Mutex::new(0)),
            }
        }

        fn load_state_from(path: &Path) -> RepoResult<State> {
            match std::fs::read(path) {
                Ok(bytes) => {
                    let state = serde_json::from_slice::<State>(&bytes).map_err(|e| {
                        RepoError::Storage(format!("snapshot '{}' is unreadable: {e}", path.display()))
                    })?;
                    log::info!("loaded snapshot '{}'", path.display());
                    Ok(state)
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    log::info!("no snapshot at '{}'; starting empty", path.display());
                    Ok(State::default())
                }
                Err(e) => Err(RepoError::Storage(format!("failed to read snapshot '{}': {e}", path.display()))),
            }
        }

        /// Encode the state the caller just mutated. Must run under the same
        /// write guard so versions follow mutation order.
        fn snapshot(&self, s: &mut State) -> RepoResult<Option<Snapshot>> {
            if self.snapshot_path.is_none() {
                return Ok(None);
            }
            s.version += 1;
            let bytes = serde_json::to_vec_pretty(&*s)
                .map_err(|e| RepoError::Storage(format!("failed to encode snapshot: {e}")))?;
            Ok(Some(Snapshot { version: s.version, bytes }))
        }

        async fn persist(&self, snapshot: Option<Snapshot>) -> RepoResult<()> {
            let (Some(path), Some(snapshot)) = (self.snapshot_path.clone(), snapshot) else {
                return Ok(());
            };
            let written = self.written.clone();
            tokio::task::spawn_blocking(move || write_snapshot(&path, &written, snapshot))
                .await
                .map_err(|e| RepoError::Storage(format!("snapshot task failed: {e}")))?
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Storage("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Storage("state lock poisoned".into()))
        }

        fn thread_in_board(s: &State, boardname: &str, id: Id) -> RepoResult<()> {
            match s.threads.get(&id) {
                Some(t) if t.boardname == boardname => Ok(()),
                _ => Err(RepoError::NotFound(Entity::Thread)),
            }
        }

        fn reply_mut(s: &mut State, thread_id: Id, reply_id: Id) -> RepoResult<&mut Reply> {
            s.replies
                .get_mut(&reply_id)
                .filter(|r| r.thread_id == thread_id)
                .ok_or(RepoError::NotFound(Entity::Reply))
        }
    }

    /// Write via a per-version temp file and rename. A snapshot older than
    /// the one already on disk is dropped.
    fn write_snapshot(path: &Path, written: &Mutex<u64>, snapshot: Snapshot) -> RepoResult<()> {
        let mut on_disk = written
            .lock()
            .map_err(|_| RepoError::Storage("snapshot lock poisoned".into()))?;
        if snapshot.version <= *on_disk {
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                RepoError::Storage(format!("failed to create '{}': {e}", dir.display()))
            })?;
        }
        let tmp = path.with_extension(format!("json.{}.tmp", snapshot.version));
        std::fs::write(&tmp, &snapshot.bytes)
            .and_then(|_| std::fs::rename(&tmp, path))
            .map_err(|e| {
                log::error!("failed to write snapshot '{}': {e}", path.display());
                RepoError::Storage(format!("failed to write snapshot: {e}"))
            })?;
        *on_disk = snapshot.version;
        Ok(())
    }

    #[async_trait]
    impl BoardRepo for InMemRepo {
        async fn upsert_board(&self, boardname: &str) -> RepoResult<Board> {
            let (board, snapshot) = {
                let mut s = self.write()?;
                if let Some(b) = s.boards.get(boardname) {
                    return Ok(b.clone());
                }
                let board = Board { boardname: boardname.to_owned(), created_on: Utc::now() };
                s.boards.insert(board.boardname.clone(), board.clone());
                (board, self.snapshot(&mut s)?)
            };
            self.persist(snapshot).await?;
            Ok(board)
        }
    }

    #[async_trait]
    impl ThreadRepo for InMemRepo {
        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            let (thread, snapshot) = {
                let mut s = self.write()?;
                let now = Utc::now();
                let id = s.counters.next(Sequence::Thread);
                let thread = Thread {
                    id,
                    boardname: new.boardname,
                    text: new.text,
                    created_on: now,
                    bumped_on: now,
                    reported: false,
                    delete_password: new.delete_password,
                };
                s.threads.insert(id, thread.clone());
                (thread, self.snapshot(&mut s)?)
            };
            self.persist(snapshot).await?;
            Ok(thread)
        }

        async fn list_threads(&self, boardname: &str, limit: usize) -> RepoResult<Vec<Thread>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.threads.values()
                .filter(|t| t.boardname == boardname)
                .cloned()
                .collect();
            newest_first(&mut v, |t| (t.created_on, t.id));
            v.truncate(limit);
            Ok(v)
        }

        async fn find_thread(&self, boardname: &str, id: Id) -> RepoResult<Thread> {
            let s = self.read()?;
            s.threads
                .get(&id)
                .filter(|t| t.boardname == boardname)
                .cloned()
                .ok_or(RepoError::NotFound(Entity::Thread))
        }

        async fn delete_thread(&self, boardname: &str, id: Id) -> RepoResult<()> {
            let snapshot = {
                let mut s = self.write()?;
                Self::thread_in_board(&s, boardname, id)?;
                s.threads.remove(&id);
                self.snapshot(&mut s)?
            };
            self.persist(snapshot).await
        }

        async fn report_thread(&self, boardname: &str, id: Id) -> RepoResult<()> {
            let snapshot = {
                let mut s = self.write()?;
                let thread = s.threads
                    .get_mut(&id)
                    .filter(|t| t.boardname == boardname)
                    .ok_or(RepoError::NotFound(Entity::Thread))?;
                thread.reported = true;
                self.snapshot(&mut s)?
            };
            self.persist(snapshot).await
        }
    }

    #[async_trait]
    impl ReplyRepo for InMemRepo {
        async fn create_reply(&self, new: NewReply) -> RepoResult<Reply> {
            let (reply, snapshot) = {
                let mut s = self.write()?;
                let now = Utc::now();
                let thread = s.threads
                    .get_mut(&new.thread_id)
                    .filter(|t| t.boardname == new.boardname)
                    .ok_or(RepoError::NotFound(Entity::Thread))?;
                thread.bumped_on = thread.bumped_on.max(now);
                let thread_id = thread.id;
                let id = s.counters.next(Sequence::Reply);
                let reply = Reply {
                    id,
                    thread_id,
                    text: new.text,
                    created_on: now,
                    bumped_on: now,
                    reported: false,
                    delete_password: new.delete_password,
                };
                s.replies.insert(id, reply.clone());
                (reply, self.snapshot(&mut s)?)
            };
            self.persist(snapshot).await?;
            Ok(reply)
        }

        async fn list_replies(&self, thread_id: Id, limit: Option<usize>) -> RepoResult<Vec<Reply>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.replies
                .values()
                .filter(|r| r.thread_id == thread_id)
                .cloned()
                .collect();
            newest_first(&mut v, |r| (r.created_on, r.id));
            if let Some(n) = limit {
                v.truncate(n);
            }
            Ok(v)
        }

        async fn find_reply(&self, thread_id: Id, reply_id: Id) -> RepoResult<Reply> {
            let s = self.read()?;
            s.replies
                .get(&reply_id)
                .filter(|r| r.thread_id == thread_id)
                .cloned()
                .ok_or(RepoError::NotFound(Entity::Reply))
        }

        async fn soft_delete_reply(&self, thread_id: Id, reply_id: Id, at: DateTime<Utc>) -> RepoResult<()> {
            let snapshot = {
                let mut s = self.write()?;
                let reply = Self::reply_mut(&mut s, thread_id, reply_id)?;
                reply.text = DELETED_TEXT.to_owned();
                reply.bumped_on = reply.bumped_on.max(at);
                self.snapshot(&mut s)?
            };
            self.persist(snapshot).await
        }

        async fn report_reply(&self, thread_id: Id, reply_id: Id) -> RepoResult<()> {
            let snapshot = {
                let mut s = self.write()?;
                Self::reply_mut(&mut s, thread_id, reply_id)?.reported = true;
                self.snapshot(&mut s)?
            };
            self.persist(snapshot).await
        }
    }

    #[async_trait]
    impl StorageLifecycle for InMemRepo {
        async fn ping(&self) -> RepoResult<()> {
            self.read().map(|_| ())
        }

        async fn close(&self) {
            let snapshot = match self.write() {
                Ok(mut s) => self.snapshot(&mut s),
                Err(e) => Err(e),
            };
            let result = match snapshot {
                Ok(snapshot) => self.persist(snapshot).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                log::error!("final snapshot failed: {e}");
            }
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use std::time::Duration;

    use sqlx::postgres::PgPoolOptions;
    use sqlx::{Pool, Postgres};

    use crate::sequence::{next_value, Sequence};

    const THREAD_COLUMNS: &str = "id, boardname, text, created_on, bumped_on, reported, delete_password";
    const REPLY_COLUMNS: &str = "id, thread_id, text, created_on, bumped_on, reported, delete_password";

    fn storage(e: sqlx::Error) -> RepoError {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                log::warn!("postgres unique violation: {db}");
                return RepoError::Conflict;
            }
        }
        log::error!("postgres error: {e}");
        RepoError::Storage(e.to_string())
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Open a pool and bring the schema up to date.
        pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(5))
                .connect(url)
                .await?;
            let repo = Self::new(pool);
            repo.migrate().await?;
            Ok(repo)
        }

        pub async fn migrate(&self) -> Result<(), sqlx::Error> {
            sqlx::migrate!("./migrations").run(&self.pool).await?;
            Ok(())
        }
    }

    #[async_trait]
    impl BoardRepo for PgRepo {
        async fn upsert_board(&self, boardname: &str) -> RepoResult<Board> {
            // DO UPDATE (not DO NOTHING) so RETURNING yields the existing row
            sqlx::query_as::<_, Board>(
                "INSERT INTO boards (boardname) VALUES ($1) \
                 ON CONFLICT (boardname) DO UPDATE SET boardname = EXCLUDED.boardname \
                 RETURNING boardname, created_on",
            )
            .bind(boardname)
            .fetch_one(&self.pool).await.map_err(storage)
        }
    }

    #[async_trait]
    impl ThreadRepo for PgRepo {
        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            let mut tx = self.pool.begin().await.map_err(storage)?;
            let id = next_value(&mut *tx, Sequence::Thread).await.map_err(storage)?;
            let thread = sqlx::query_as::<_, Thread>(&format!(
                "INSERT INTO threads (id, boardname, text, delete_password, created_on, bumped_on, reported) \
                 VALUES ($1, $2, $3, $4, $5, $5, FALSE) RETURNING {THREAD_COLUMNS}"
            ))
            .bind(id)
            .bind(&new.boardname)
            .bind(&new.text)
            .bind(&new.delete_password)
            .bind(Utc::now())
            .fetch_one(&mut *tx).await.map_err(storage)?;
            tx.commit().await.map_err(storage)?;
            Ok(thread)
        }

        async fn list_threads(&self, boardname: &str, limit: usize) -> RepoResult<Vec<Thread>> {
            sqlx::query_as::<_, Thread>(&format!(
                "SELECT {THREAD_COLUMNS} FROM threads WHERE boardname = $1 \
                 ORDER BY created_on DESC, id DESC LIMIT $2"
            ))
            .bind(boardname)
            .bind(limit as i64)
            .fetch_all(&self.pool).await.map_err(storage)
        }

        async fn find_thread(&self, boardname: &str, id: Id) -> RepoResult<Thread> {
            sqlx::query_as::<_, Thread>(&format!(
                "SELECT {THREAD_COLUMNS} FROM threads WHERE boardname = $1 AND id = $2"
            ))
            .bind(boardname)
            .bind(id)
            .fetch_optional(&self.pool).await.map_err(storage)?
            .ok_or(RepoError::NotFound(Entity::Thread))
        }

        async fn delete_thread(&self, boardname: &str, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM threads WHERE boardname = $1 AND id = $2")
                .bind(boardname)
                .bind(id)
                .execute(&self.pool).await.map_err(storage)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound(Entity::Thread)); }
            Ok(())
        }

        async fn report_thread(&self, boardname: &str, id: Id) -> RepoResult<()> {
            let res = sqlx::query("UPDATE threads SET reported = TRUE WHERE boardname = $1 AND id = $2")
                .bind(boardname)
                .bind(id)
                .execute(&self.pool).await.map_err(storage)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound(Entity::Thread)); }
            Ok(())
        }
    }

    #[async_trait]
    impl ReplyRepo for PgRepo {
        async fn create_reply(&self, new: NewReply) -> RepoResult<Reply> {
            let now = Utc::now();
            let mut tx = self.pool.begin().await.map_err(storage)?;
            let thread_id = sqlx::query_scalar::<_, Id>(
                "UPDATE threads SET bumped_on = GREATEST(bumped_on, $3) \
                 WHERE boardname = $1 AND id = $2 RETURNING id",
            )
            .bind(&new.boardname)
            .bind(new.thread_id)
            .bind(now)
            .fetch_optional(&mut *tx).await.map_err(storage)?
            .ok_or(RepoError::NotFound(Entity::Thread))?; // dropping tx rolls back
            let id = next_value(&mut *tx, Sequence::Reply).await.map_err(storage)?;
            let reply = sqlx::query_as::<_, Reply>(&format!(
                "INSERT INTO replies (id, thread_id, text, delete_password, created_on, bumped_on, reported) \
                 VALUES ($1, $2, $3, $4, $5, $5, FALSE) RETURNING {REPLY_COLUMNS}"
            ))
            .bind(id)
            .bind(thread_id)
            .bind(&new.text)
            .bind(&new.delete_password)
            .bind(now)
            .fetch_one(&mut *tx).await.map_err(storage)?;
            tx.commit().await.map_err(storage)?;
            Ok(reply)
        }

        async fn list_replies(&self, thread_id: Id, limit: Option<usize>) -> RepoResult<Vec<Reply>> {
            // LIMIT NULL means no limit
            sqlx::query_as::<_, Reply>(&format!(
                "SELECT {REPLY_COLUMNS} FROM replies WHERE thread_id = $1 \
                 ORDER BY created_on DESC, id DESC LIMIT $2"
            ))
            .bind(thread_id)
            .bind(limit.map(|n| n as i64))
            .fetch_all(&self.pool).await.map_err(storage)
        }

        async fn find_reply(&self, thread_id: Id, reply_id: Id) -> RepoResult<Reply> {
            sqlx::query_as::<_, Reply>(&format!(
                "SELECT {REPLY_COLUMNS} FROM replies WHERE thread_id = $1 AND id = $2"
            ))
            .bind(thread_id)
            .bind(reply_id)
            .fetch_optional(&self.pool).await.map_err(storage)?
            .ok_or(RepoError::NotFound(Entity::Reply))
        }

        async fn soft_delete_reply(&self, thread_id: Id, reply_id: Id, at: DateTime<Utc>) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE replies SET text = $3, bumped_on = GREATEST(bumped_on, $4) \
                 WHERE thread_id = $1 AND id = $2",
            )
            .bind(thread_id)
            .bind(reply_id)
            .bind(DELETED_TEXT)
            .bind(at)
            .execute(&self.pool).await.map_err(storage)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound(Entity::Reply)); }
            Ok(())
        }

        async fn report_reply(&self, thread_id: Id, reply_id: Id) -> RepoResult<()> {
            let res = sqlx::query("UPDATE replies SET reported = TRUE WHERE thread_id = $1 AND id = $2")
                .bind(thread_id)
                .bind(reply_id)
                .execute(&self.pool).await.map_err(storage)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound(Entity::Reply)); }
            Ok(())
        }
    }

    #[async_trait]
    impl StorageLifecycle for PgRepo {
        async fn ping(&self) -> RepoResult<()> {
            sqlx::query("SELECT 1").execute(&self.pool).await.map_err(storage)?;
            Ok(())
        }

        async fn close(&self) {
            self.pool.close().await;
        }
    }
}
