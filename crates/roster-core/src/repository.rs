//! Account and audit persistence
//!
//! Repository traits plus the PostgreSQL implementation (SQLx).
//! Every default read applies the active-account predicate
//! (`is_deleted = FALSE`); the `*_including_deleted` methods are the only
//! reads that bypass it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::{FromRow, QueryBuilder};

use crate::config::DatabaseConfig;
use crate::{
    AuditAction, AuditEntry, NewAuditEntry, NewUser, Page, Result, RosterError, User, UserRole,
    UserSearch,
};

/// Trait for account storage
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Whether any account, deleted or not, already uses `username`
    async fn username_exists(&self, username: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Active account by id
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Active account by exact username (input is trimmed)
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Insert an account; a taken username is [`RosterError::Conflict`]
    async fn insert(&self, user: NewUser) -> Result<User>;

    /// Persist email, password hash, role and modification stamps
    async fn update(&self, user: &User) -> Result<()>;

    /// Flag an active account deleted. Returns false if there was none.
    async fn soft_delete(&self, id: i64, deleted_by: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Filter, sort and page active accounts
    async fn search(&self, search: &UserSearch) -> Result<Page<User>>;

    /// Privileged read that also returns soft-deleted rows
    async fn find_by_id_including_deleted(&self, id: i64) -> Result<Option<User>>;

    /// Privileged count over every row, deleted or not
    async fn count_all_including_deleted(&self) -> Result<i64>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<()>;
}

/// Trait for the append-only audit log
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry>;

    /// Newest entries first
    async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>>;
}

/// Escape LIKE metacharacters so search text matches literally
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// PostgreSQL account and audit store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store connection
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.postgres_url)
            .await
            .map_err(|e| RosterError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Migration failed: {e}")))?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, role, is_deleted, \
                            created_at, updated_at, created_by, last_modified_by";

/// Account row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    role: i16,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    created_by: String,
    last_modified_by: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = RosterError;

    fn try_from(row: UserRow) -> Result<Self> {
        let role = UserRole::from_code(i64::from(row.role)).map_err(|e| {
            RosterError::DatabaseError(format!("User {} has invalid role: {e}", row.id))
        })?;

        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: row.created_by,
            last_modified_by: row.last_modified_by,
        })
    }
}

/// Audit row from database
#[derive(Debug, FromRow)]
struct AuditRow {
    id: i64,
    action: String,
    entity_name: String,
    entity_key: String,
    performed_by: String,
    ip_address: Option<String>,
    performed_at: DateTime<Utc>,
    changes: Option<serde_json::Value>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = RosterError;

    fn try_from(row: AuditRow) -> Result<Self> {
        Ok(AuditEntry {
            id: row.id,
            action: row.action.parse::<AuditAction>()?,
            entity_name: row.entity_name,
            entity_key: row.entity_key,
            performed_by: row.performed_by,
            ip_address: row.ip_address,
            performed_at: row.performed_at,
            changes: row.changes,
        })
    }
}

fn push_search_filters(qb: &mut QueryBuilder<'_, Postgres>, search: &UserSearch) {
    qb.push(" WHERE is_deleted = FALSE");

    if let Some(text) = &search.text {
        let pattern = format!("%{}%", escape_like(text));
        qb.push(" AND (username ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(role) = search.role {
        qb.push(" AND role = ").push_bind(role.code());
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn username_exists(&self, username: &str, exclude_id: Option<i64>) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE username = $1 AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(username.trim())
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to check username: {e}")))?;

        Ok(exists)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND is_deleted = FALSE"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to get user: {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND is_deleted = FALSE"
        ))
        .bind(username.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to get user: {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn insert(&self, user: NewUser) -> Result<User> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (
                username, email, password_hash, role, is_deleted,
                created_at, updated_at, created_by, last_modified_by
            ) VALUES ($1, $2, $3, $4, FALSE, $5, $5, $6, $6)
            RETURNING id
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.code())
        .bind(user.created_at)
        .bind(&user.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RosterError::Conflict(format!("Username '{}' already exists", user.username))
            }
            _ => RosterError::DatabaseError(format!("Failed to create user: {e}")),
        })?;

        Ok(user.into_user(id))
    }

    async fn update(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                email = $2,
                password_hash = $3,
                role = $4,
                updated_at = $5,
                last_modified_by = $6
            WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.code())
        .bind(user.updated_at)
        .bind(&user.last_modified_by)
        .execute(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to update user: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(RosterError::NotFound(format!("User {}", user.id)));
        }
        Ok(())
    }

    async fn soft_delete(&self, id: i64, deleted_by: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users SET is_deleted = TRUE, updated_at = $2, last_modified_by = $3
            WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(deleted_by)
        .execute(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to delete user: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn search(&self, search: &UserSearch) -> Result<Page<User>> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_search_filters(&mut count_query, search);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Failed to count users: {e}")))?;

        let mut items_query = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_search_filters(&mut items_query, search);
        // Column and direction come from closed enums, never from input text
        let direction = search.direction.as_sql();
        items_query
            .push(format!(
                " ORDER BY {} {direction}, id {direction} LIMIT ",
                search.sort.column()
            ))
            .push_bind(search.page_size)
            .push(" OFFSET ")
            .push_bind(search.offset());

        let rows: Vec<UserRow> = items_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Failed to search users: {e}")))?;

        let items = rows
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            page: search.page,
            page_size: search.page_size,
            total_count: total,
        })
    }

    async fn find_by_id_including_deleted(&self, id: i64) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RosterError::DatabaseError(format!("Failed to get user: {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn count_all_including_deleted(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Failed to count users: {e}")))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Ping failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl AuditRepository for PgStore {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO audit_logs (
                action, entity_name, entity_key, performed_by,
                ip_address, performed_at, changes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(entry.action.as_str())
        .bind(&entry.entity_name)
        .bind(&entry.entity_key)
        .bind(&entry.performed_by)
        .bind(&entry.ip_address)
        .bind(entry.performed_at)
        .bind(&entry.changes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to append audit entry: {e}")))?;

        Ok(entry.into_entry(id))
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, action, entity_name, entity_key, performed_by,
                   ip_address, performed_at, changes
            FROM audit_logs
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to read audit log: {e}")))?;

        rows.into_iter().map(AuditEntry::try_from).collect()
    }
}
