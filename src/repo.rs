use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("storage error: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait GuidRepo: Send + Sync {
    async fn get_guid(&self, id: &str) -> RepoResult<Option<GuidRecord>>;
    async fn register_guid(&self, kind: ReferentKind) -> RepoResult<GuidRecord>;
}

#[async_trait]
pub trait NodeRepo: Send + Sync {
    async fn create_node(&self, creator: &str, new: NewNode) -> RepoResult<Node>;
    async fn get_node(&self, id: &str) -> RepoResult<Node>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn insert_comment(&self, comment: Comment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: &str) -> RepoResult<Comment>;
    // Versioned write of the lifecycle fields; never touches the ledger.
    async fn commit_comment(&self, comment: &Comment) -> RepoResult<Comment>;
    async fn list_by_node(&self, node_id: &str, deleted: Option<bool>) -> RepoResult<Vec<Comment>>;
    async fn list_by_target(&self, target_id: &str) -> RepoResult<Vec<Comment>>;
}

#[async_trait]
pub trait ReportRepo: Send + Sync {
    async fn upsert_report(&self, comment_id: &str, report: Report) -> RepoResult<Report>;
    async fn get_report(&self, comment_id: &str, reporter: &str) -> RepoResult<Option<Report>>;
}

pub trait Repo: GuidRepo + NodeRepo + CommentRepo + ReportRepo {}

impl<T> Repo for T where T: GuidRepo + NodeRepo + CommentRepo + ReportRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};

    const SNAPSHOT_FILE: &str = "state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        guids: HashMap<Guid, ReferentKind>,
        nodes: HashMap<Guid, Node>,
        comments: HashMap<Guid, Comment>,
    }

    impl State {
        fn fresh_guid(&mut self, kind: ReferentKind) -> Guid {
            loop {
                let id = new_guid();
                if !self.guids.contains_key(&id) {
                    self.guids.insert(id.clone(), kind);
                    return id;
                }
            }
        }
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
        }

        pub fn with_snapshot_dir(dir: impl AsRef<Path>) -> Self {
            let path = dir.as_ref().join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&path);
            Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
        }

        pub fn from_env() -> Self {
            match std::env::var("MARGIN_DATA_DIR") {
                Ok(dir) => Self::with_snapshot_dir(dir),
                Err(_) => Self::new(),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("[inmem] Loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::error!("[inmem] Failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    log::warn!("[inmem] No snapshot at '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            }
        }

        // Called with the write guard held so snapshots land in mutation order.
        // Failures are logged; the in-memory state stays authoritative.
        fn persist(&self, state: &State) {
            let Some(path) = self.snapshot_path.as_ref() else { return };
            match serde_json::to_vec_pretty(state) {
                Ok(bytes) => {
                    if let Some(dir) = path.parent() {
                        let _ = std::fs::create_dir_all(dir);
                    }
                    if let Err(e) = std::fs::write(path.as_path(), bytes) {
                        log::error!("[inmem] Failed to write snapshot '{}': {e}", path.display());
                    }
                }
                Err(e) => log::error!("[inmem] Failed to encode snapshot: {e}"),
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl GuidRepo for InMemRepo {
        async fn get_guid(&self, id: &str) -> RepoResult<Option<GuidRecord>> {
            let s = self.read()?;
            Ok(s.guids.get(id).map(|kind| GuidRecord { id: id.to_string(), kind: *kind }))
        }

        async fn register_guid(&self, kind: ReferentKind) -> RepoResult<GuidRecord> {
            let mut s = self.write()?;
            let id = s.fresh_guid(kind);
            self.persist(&s);
            Ok(GuidRecord { id, kind })
        }
    }

    #[async_trait]
    impl NodeRepo for InMemRepo {
        async fn create_node(&self, creator: &str, new: NewNode) -> RepoResult<Node> {
            let mut s = self.write()?;
            let id = s.fresh_guid(ReferentKind::Node);
            let mut contributors: std::collections::BTreeSet<UserId> = new.contributors.into_iter().collect();
            contributors.insert(creator.to_string());
            let node = Node {
                id: id.clone(),
                title: new.title,
                is_public: new.is_public,
                comment_level: new.comment_level,
                contributors,
                created_at: Utc::now(),
            };
            s.nodes.insert(id, node.clone());
            self.persist(&s);
            Ok(node)
        }

        async fn get_node(&self, id: &str) -> RepoResult<Node> {
            let s = self.read()?;
            s.nodes.get(id).cloned().ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn insert_comment(&self, mut comment: Comment) -> RepoResult<Comment> {
            let mut s = self.write()?;
            if s.guids.contains_key(&comment.id) {
                comment.id = s.fresh_guid(ReferentKind::Comment);
            } else {
                s.guids.insert(comment.id.clone(), ReferentKind::Comment);
            }
            s.comments.insert(comment.id.clone(), comment.clone());
            self.persist(&s);
            Ok(comment)
        }

        async fn get_comment(&self, id: &str) -> RepoResult<Comment> {
            let s = self.read()?;
            s.comments.get(id).cloned().ok_or(RepoError::NotFound)
        }

        async fn commit_comment(&self, comment: &Comment) -> RepoResult<Comment> {
            let mut s = self.write()?;
            let stored = s.comments.get_mut(&comment.id).ok_or(RepoError::NotFound)?;
            if stored.version != comment.version {
                return Err(RepoError::Conflict);
            }
            stored.content = comment.content.clone();
            stored.is_deleted = comment.is_deleted;
            stored.is_modified = comment.is_modified;
            stored.modified_at = comment.modified_at;
            stored.version += 1;
            let updated = stored.clone();
            self.persist(&s);
            Ok(updated)
        }

        async fn list_by_node(&self, node_id: &str, deleted: Option<bool>) -> RepoResult<Vec<Comment>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.comments.values()
                .filter(|c| c.node_id == node_id)
                .filter(|c| deleted.map(|d| c.is_deleted == d).unwrap_or(true))
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));    // ascending
            Ok(v)
        }

        async fn list_by_target(&self, target_id: &str) -> RepoResult<Vec<Comment>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.comments.values()
                .filter(|c| c.target_id == target_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }
    }

    #[async_trait]
    impl ReportRepo for InMemRepo {
        async fn upsert_report(&self, comment_id: &str, report: Report) -> RepoResult<Report> {
            let mut s = self.write()?;
            let comment = s.comments.get_mut(comment_id).ok_or(RepoError::NotFound)?;
            comment.reports.insert(report.reporter_id.clone(), report.clone());
            self.persist(&s);
            Ok(report)
        }

        async fn get_report(&self, comment_id: &str, reporter: &str) -> RepoResult<Option<Report>> {
            let s = self.read()?;
            let comment = s.comments.get(comment_id).ok_or(RepoError::NotFound)?;
            Ok(comment.reports.get(reporter).cloned())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::{Pool, Postgres};

    const GUID_ATTEMPTS: usize = 8;

    const COMMENT_COLUMNS: &str =
        "id, author, target_id, node_id, content, is_deleted, is_modified, created_at, modified_at, version";

    impl From<sqlx::Error> for RepoError {
        fn from(e: sqlx::Error) -> Self {
            match e {
                sqlx::Error::RowNotFound => RepoError::NotFound,
                sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23505") => RepoError::Conflict,
                other => RepoError::Internal(other.to_string()),
            }
        }
    }

    #[derive(sqlx::FromRow)]
    struct CommentRow {
        id: String,
        author: String,
        target_id: String,
        node_id: String,
        content: String,
        is_deleted: bool,
        is_modified: bool,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
        version: i64,
    }

    impl From<CommentRow> for Comment {
        fn from(r: CommentRow) -> Self {
            Comment {
                id: r.id,
                author: r.author,
                target_id: r.target_id,
                node_id: r.node_id,
                content: r.content,
                is_deleted: r.is_deleted,
                is_modified: r.is_modified,
                created_at: r.created_at,
                modified_at: r.modified_at,
                reports: HashMap::new(),
                version: r.version,
            }
        }
    }

    #[derive(sqlx::FromRow)]
    struct ReportRow {
        reporter_id: String,
        category: String,
        message: String,
    }

    impl TryFrom<ReportRow> for Report {
        type Error = RepoError;
        fn try_from(r: ReportRow) -> Result<Self, Self::Error> {
            let category = ReportCategory::parse(&r.category)
                .ok_or_else(|| RepoError::Internal(format!("unknown report category '{}'", r.category)))?;
            Ok(Report { reporter_id: r.reporter_id, category, message: r.message })
        }
    }

    #[derive(sqlx::FromRow)]
    struct NodeRow {
        id: String,
        title: String,
        is_public: bool,
        comment_level: String,
        created_at: DateTime<Utc>,
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        async fn insert_guid<'c, E>(exec: E, id: &str, kind: ReferentKind) -> RepoResult<bool>
        where
            E: sqlx::Executor<'c, Database = Postgres>,
        {
            let res = sqlx::query("INSERT INTO guids (id, kind) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
                .bind(id)
                .bind(kind.as_str())
                .execute(exec)
                .await?;
            Ok(res.rows_affected() == 1)
        }

        async fn load_reports(&self, comment_id: &str) -> RepoResult<HashMap<UserId, Report>> {
            let rows = sqlx::query_as::<_, ReportRow>(
                "SELECT reporter_id, category, message FROM comment_reports WHERE comment_id = $1",
            )
            .bind(comment_id)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter()
                .map(|r| Report::try_from(r).map(|rep| (rep.reporter_id.clone(), rep)))
                .collect()
        }
    }

    #[async_trait]
    impl GuidRepo for PgRepo {
        async fn get_guid(&self, id: &str) -> RepoResult<Option<GuidRecord>> {
            let kind: Option<String> = sqlx::query_scalar("SELECT kind FROM guids WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            match kind {
                None => Ok(None),
                Some(k) => {
                    let kind = ReferentKind::parse(&k)
                        .ok_or_else(|| RepoError::Internal(format!("unknown referent kind '{k}'")))?;
                    Ok(Some(GuidRecord { id: id.to_string(), kind }))
                }
            }
        }

        async fn register_guid(&self, kind: ReferentKind) -> RepoResult<GuidRecord> {
            for _ in 0..GUID_ATTEMPTS {
                let id = new_guid();
                if Self::insert_guid(&self.pool, &id, kind).await? {
                    return Ok(GuidRecord { id, kind });
                }
            }
            Err(RepoError::Conflict)
        }
    }

    #[async_trait]
    impl NodeRepo for PgRepo {
        async fn create_node(&self, creator: &str, new: NewNode) -> RepoResult<Node> {
            let mut tx = self.pool.begin().await?;
            let mut id = None;
            for _ in 0..GUID_ATTEMPTS {
                let candidate = new_guid();
                if Self::insert_guid(&mut *tx, &candidate, ReferentKind::Node).await? {
                    id = Some(candidate);
                    break;
                }
            }
            let id = id.ok_or(RepoError::Conflict)?;
            let row = sqlx::query_as::<_, NodeRow>(
                "INSERT INTO nodes (id, title, is_public, comment_level) VALUES ($1,$2,$3,$4) \
                 RETURNING id, title, is_public, comment_level, created_at",
            )
            .bind(&id)
            .bind(&new.title)
            .bind(new.is_public)
            .bind(new.comment_level.as_str())
            .fetch_one(&mut *tx)
            .await?;
            let mut contributors: std::collections::BTreeSet<UserId> = new.contributors.into_iter().collect();
            contributors.insert(creator.to_string());
            for user in &contributors {
                sqlx::query("INSERT INTO node_contributors (node_id, user_id) VALUES ($1,$2) ON CONFLICT DO NOTHING")
                    .bind(&id)
                    .bind(user)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(Node {
                id: row.id,
                title: row.title,
                is_public: row.is_public,
                comment_level: CommentLevel::parse(&row.comment_level).unwrap_or_default(),
                contributors,
                created_at: row.created_at,
            })
        }

        async fn get_node(&self, id: &str) -> RepoResult<Node> {
            let row = sqlx::query_as::<_, NodeRow>(
                "SELECT id, title, is_public, comment_level, created_at FROM nodes WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
            let contributors: Vec<String> = sqlx::query_scalar("SELECT user_id FROM node_contributors WHERE node_id = $1")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
            let comment_level = CommentLevel::parse(&row.comment_level)
                .ok_or_else(|| RepoError::Internal(format!("unknown comment level '{}'", row.comment_level)))?;
            Ok(Node {
                id: row.id,
                title: row.title,
                is_public: row.is_public,
                comment_level,
                contributors: contributors.into_iter().collect(),
                created_at: row.created_at,
            })
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn insert_comment(&self, mut comment: Comment) -> RepoResult<Comment> {
            let mut tx = self.pool.begin().await?;
            let mut registered = Self::insert_guid(&mut *tx, &comment.id, ReferentKind::Comment).await?;
            let mut attempts = 1;
            while !registered && attempts < GUID_ATTEMPTS {
                comment.id = new_guid();
                registered = Self::insert_guid(&mut *tx, &comment.id, ReferentKind::Comment).await?;
                attempts += 1;
            }
            if !registered {
                return Err(RepoError::Conflict);
            }
            let sql = format!(
                "INSERT INTO comments ({COMMENT_COLUMNS}) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10) RETURNING {COMMENT_COLUMNS}"
            );
            let row = sqlx::query_as::<_, CommentRow>(&sql)
                .bind(&comment.id)
                .bind(&comment.author)
                .bind(&comment.target_id)
                .bind(&comment.node_id)
                .bind(&comment.content)
                .bind(comment.is_deleted)
                .bind(comment.is_modified)
                .bind(comment.created_at)
                .bind(comment.modified_at)
                .bind(comment.version)
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(row.into())
        }

        async fn get_comment(&self, id: &str) -> RepoResult<Comment> {
            let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
            let row = sqlx::query_as::<_, CommentRow>(&sql)
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
            let mut comment: Comment = row.into();
            comment.reports = self.load_reports(id).await?;
            Ok(comment)
        }

        async fn commit_comment(&self, comment: &Comment) -> RepoResult<Comment> {
            let sql = format!(
                "UPDATE comments SET content = $3, is_deleted = $4, is_modified = $5, modified_at = $6, \
                 version = version + 1 WHERE id = $1 AND version = $2 RETURNING {COMMENT_COLUMNS}"
            );
            let row = sqlx::query_as::<_, CommentRow>(&sql)
                .bind(&comment.id)
                .bind(comment.version)
                .bind(&comment.content)
                .bind(comment.is_deleted)
                .bind(comment.is_modified)
                .bind(comment.modified_at)
                .fetch_optional(&self.pool)
                .await?;
            match row {
                Some(row) => {
                    let mut updated: Comment = row.into();
                    updated.reports = self.load_reports(&updated.id).await?;
                    Ok(updated)
                }
                None => {
                    let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM comments WHERE id = $1")
                        .bind(&comment.id)
                        .fetch_optional(&self.pool)
                        .await?;
                    Err(if exists.is_some() { RepoError::Conflict } else { RepoError::NotFound })
                }
            }
        }

        async fn list_by_node(&self, node_id: &str, deleted: Option<bool>) -> RepoResult<Vec<Comment>> {
            let sql = format!(
                "SELECT {COMMENT_COLUMNS} FROM comments WHERE node_id = $1 \
                 AND ($2::BOOLEAN IS NULL OR is_deleted = $2) ORDER BY created_at ASC"
            );
            let rows = sqlx::query_as::<_, CommentRow>(&sql)
                .bind(node_id)
                .bind(deleted)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(Comment::from).collect())
        }

        async fn list_by_target(&self, target_id: &str) -> RepoResult<Vec<Comment>> {
            let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE target_id = $1 ORDER BY created_at ASC");
            let rows = sqlx::query_as::<_, CommentRow>(&sql)
                .bind(target_id)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(Comment::from).collect())
        }
    }

    #[async_trait]
    impl ReportRepo for PgRepo {
        async fn upsert_report(&self, comment_id: &str, report: Report) -> RepoResult<Report> {
            let row = sqlx::query_as::<_, ReportRow>(
                "INSERT INTO comment_reports (comment_id, reporter_id, category, message) VALUES ($1,$2,$3,$4) \
                 ON CONFLICT (comment_id, reporter_id) DO UPDATE SET category = EXCLUDED.category, message = EXCLUDED.message \
                 RETURNING reporter_id, category, message",
            )
            .bind(comment_id)
            .bind(&report.reporter_id)
            .bind(report.category.as_str())
            .bind(&report.message)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                // comment_id foreign key
                sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23503") => RepoError::NotFound,
                other => other.into(),
            })?;
            Report::try_from(row)
        }

        async fn get_report(&self, comment_id: &str, reporter: &str) -> RepoResult<Option<Report>> {
            let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM comments WHERE id = $1")
                .bind(comment_id)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                return Err(RepoError::NotFound);
            }
            let row = sqlx::query_as::<_, ReportRow>(
                "SELECT reporter_id, category, message FROM comment_reports WHERE comment_id = $1 AND reporter_id = $2",
            )
            .bind(comment_id)
            .bind(reporter)
            .fetch_optional(&self.pool)
            .await?;
            row.map(Report::try_from).transpose()
        }
    }
}
