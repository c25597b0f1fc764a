//! Roster Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used by the Roster services:
//! - Account model and the role mapping table
//! - Audit log entries
//! - Search specifications and paged results
//! - Common error types
//! - Repository traits with PostgreSQL and in-memory implementations
//! - Configuration management

pub mod config;
pub mod memory;
pub mod repository;

pub use config::{
    AppConfig, ConfigError, CredentialConfig, DatabaseConfig, Environment, JwtSettings,
    LocalizationConfig, LoggingConfig, ServerConfig, StorageBackend,
};
pub use memory::MemoryStore;
pub use repository::{AuditRepository, PgStore, UserRepository};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Roster operations
#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RosterError>;

// ============================================================================
// Roles
// ============================================================================

/// Account role
///
/// Stored as a small integer and exposed on the API by name. Both directions
/// go through [`UserRole::TABLE`], so an unknown code or name is rejected at
/// either boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UserRole {
    Admin,
    User,
    ReadOnlyUser,
}

/// Rejected role code or name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl From<UnknownRole> for RosterError {
    fn from(err: UnknownRole) -> Self {
        RosterError::ValidationError(err.to_string())
    }
}

impl UserRole {
    /// Mapping between role, stored code and API name
    pub const TABLE: [(UserRole, i16, &'static str); 3] = [
        (UserRole::Admin, 1, "Admin"),
        (UserRole::User, 2, "User"),
        (UserRole::ReadOnlyUser, 3, "ReadOnlyUser"),
    ];

    /// Every role, in code order
    pub const ALL: [UserRole; 3] = [UserRole::Admin, UserRole::User, UserRole::ReadOnlyUser];

    // TABLE rows follow declaration order
    fn entry(self) -> (UserRole, i16, &'static str) {
        Self::TABLE[self as usize]
    }

    /// Stored integer code
    pub fn code(self) -> i16 {
        self.entry().1
    }

    /// API name
    pub fn as_str(self) -> &'static str {
        self.entry().2
    }

    /// Decode a stored integer code
    pub fn from_code(code: i64) -> std::result::Result<Self, UnknownRole> {
        Self::TABLE
            .into_iter()
            .find(|(_, c, _)| i64::from(*c) == code)
            .map(|(role, _, _)| role)
            .ok_or_else(|| UnknownRole(code.to_string()))
    }
}

impl FromStr for UserRole {
    type Err = UnknownRole;

    /// Names are matched case-insensitively
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::TABLE
            .into_iter()
            .find(|(_, _, name)| name.eq_ignore_ascii_case(trimmed))
            .map(|(role, _, _)| role)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for UserRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Accepted inbound role representations
#[derive(Deserialize)]
#[serde(untagged)]
enum RoleRepr {
    Code(i64),
    Name(String),
}

impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let parsed = match RoleRepr::deserialize(deserializer)? {
            RoleRepr::Code(code) => UserRole::from_code(code),
            // Query strings deliver codes as text
            RoleRepr::Name(name) => name.parse().or_else(|e| {
                name.trim()
                    .parse::<i64>()
                    .map_err(|_| e)
                    .and_then(UserRole::from_code)
            }),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Accounts
// ============================================================================

/// Stored account record
///
/// This is the only type that carries the password hash. Anything leaving
/// the service boundary is mapped to a projection first.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub last_modified_by: Option<String>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .field("is_deleted", &self.is_deleted)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("created_by", &self.created_by)
            .field("last_modified_by", &self.last_modified_by)
            .finish()
    }
}

/// Account to be inserted; the store assigns the id
///
/// The creator also becomes the first modifier, and `updated_at` starts at
/// `created_at`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl NewUser {
    pub(crate) fn into_user(self, id: i64) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            is_deleted: false,
            created_at: self.created_at,
            updated_at: Some(self.created_at),
            last_modified_by: Some(self.created_by.clone()),
            created_by: self.created_by,
        }
    }
}

// ============================================================================
// Audit Log
// ============================================================================

/// Audited action tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    Insert,
    Update,
    UpdateProfile,
    Delete,
    LoginFailed,
    RoleChanged,
    View,
    ViewList,
    DataTableQuery,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "Insert",
            Self::Update => "Update",
            Self::UpdateProfile => "UpdateProfile",
            Self::Delete => "Delete",
            Self::LoginFailed => "LoginFailed",
            Self::RoleChanged => "RoleChanged",
            Self::View => "View",
            Self::ViewList => "ViewList",
            Self::DataTableQuery => "DataTableQuery",
        }
    }
}

impl FromStr for AuditAction {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Insert" => Ok(Self::Insert),
            "Update" => Ok(Self::Update),
            "UpdateProfile" => Ok(Self::UpdateProfile),
            "Delete" => Ok(Self::Delete),
            "LoginFailed" => Ok(Self::LoginFailed),
            "RoleChanged" => Ok(Self::RoleChanged),
            "View" => Ok(Self::View),
            "ViewList" => Ok(Self::ViewList),
            "DataTableQuery" => Ok(Self::DataTableQuery),
            other => Err(RosterError::ValidationError(format!(
                "Unknown audit action: {other}"
            ))),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum stored length of an audit entity key
pub const AUDIT_ENTITY_KEY_MAX: usize = 100;

/// Audit entry to be appended
#[derive(Debug, Clone, Serialize)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub entity_name: String,
    pub entity_key: String,
    pub performed_by: String,
    pub ip_address: Option<String>,
    pub performed_at: DateTime<Utc>,
    pub changes: Option<serde_json::Value>,
}

/// Persisted audit entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub action: AuditAction,
    pub entity_name: String,
    pub entity_key: String,
    pub performed_by: String,
    pub ip_address: Option<String>,
    pub performed_at: DateTime<Utc>,
    pub changes: Option<serde_json::Value>,
}

impl NewAuditEntry {
    pub(crate) fn into_entry(self, id: i64) -> AuditEntry {
        AuditEntry {
            id,
            action: self.action,
            entity_name: self.entity_name,
            entity_key: self.entity_key,
            performed_by: self.performed_by,
            ip_address: self.ip_address,
            performed_at: self.performed_at,
            changes: self.changes,
        }
    }
}

// ============================================================================
// Search
// ============================================================================

/// Sortable account columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Username,
    Email,
    Role,
    CreatedAt,
    UpdatedAt,
}

impl SortKey {
    /// Lenient parse; anything unrecognised sorts by username
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::Username;
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "email" => Self::Email,
            "role" => Self::Role,
            "created" | "createdat" | "created_at" => Self::CreatedAt,
            "updated" | "updatedat" | "updated_at" => Self::UpdatedAt,
            _ => Self::Username,
        }
    }

    /// Column name used in ORDER BY
    pub fn column(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
            Self::Role => "role",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// `asc` in any case is ascending, any other value is descending.
    /// A missing value is ascending.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None => Self::Ascending,
            Some(dir) if dir.trim().eq_ignore_ascii_case("asc") => Self::Ascending,
            Some(_) => Self::Descending,
        }
    }

    pub fn is_ascending(self) -> bool {
        matches!(self, Self::Ascending)
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Largest page size a search may request
pub const MAX_PAGE_SIZE: i64 = 100;

/// Page size used when none (or a non-positive one) is requested
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Account search parameters
///
/// `page` is 1-based. Stores assume the values are already normalised,
/// see [`UserSearch::normalized`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSearch {
    pub text: Option<String>,
    pub role: Option<UserRole>,
    pub page: i64,
    pub page_size: i64,
    pub sort: SortKey,
    pub direction: SortDirection,
}

impl Default for UserSearch {
    fn default() -> Self {
        Self {
            text: None,
            role: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortKey::Username,
            direction: SortDirection::Ascending,
        }
    }
}

impl UserSearch {
    /// Clamp paging and drop blank search text
    pub fn normalized(mut self) -> Self {
        if self.page <= 0 {
            self.page = 1;
        }
        if self.page_size <= 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        } else if self.page_size > MAX_PAGE_SIZE {
            self.page_size = MAX_PAGE_SIZE;
        }
        self.text = self
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }

    /// Rows skipped before the requested page
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.page_size)
    }
}

/// One page of results plus the total number of matching rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total_count: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_count: self.total_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_table_round_trip() {
        for (index, role) in UserRole::ALL.into_iter().enumerate() {
            assert_eq!(UserRole::TABLE[index].0, role);
            assert_eq!(UserRole::from_code(i64::from(role.code())).unwrap(), role);
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert_eq!(UserRole::Admin.code(), 1);
        assert_eq!(UserRole::User.code(), 2);
        assert_eq!(UserRole::ReadOnlyUser.code(), 3);
    }

    #[test]
    fn test_role_rejects_unknown() {
        assert!(UserRole::from_code(0).is_err());
        assert!(UserRole::from_code(4).is_err());
        assert!("superuser".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_role_serde_boundary() {
        assert_eq!(
            serde_json::to_value(UserRole::ReadOnlyUser).unwrap(),
            serde_json::json!("ReadOnlyUser")
        );

        let by_name: UserRole = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(by_name, UserRole::Admin);

        let by_code: UserRole = serde_json::from_str("3").unwrap();
        assert_eq!(by_code, UserRole::ReadOnlyUser);

        let textual_code: UserRole = serde_json::from_str("\"2\"").unwrap();
        assert_eq!(textual_code, UserRole::User);

        assert!(serde_json::from_str::<UserRole>("7").is_err());
        assert!(serde_json::from_str::<UserRole>("\"7\"").is_err());
        assert!(serde_json::from_str::<UserRole>("\"Root\"").is_err());
    }

    #[test]
    fn test_user_debug_redacts_hash() {
        let user = NewUser {
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password_hash: "c2VjcmV0".to_string(),
            role: UserRole::User,
            created_at: Utc::now(),
            created_by: "system".to_string(),
        }
        .into_user(1);

        let rendered = format!("{user:?}");
        assert!(!rendered.contains("c2VjcmV0"));
        assert!(rendered.contains("<redacted>"));
        assert_eq!(user.last_modified_by.as_deref(), Some("system"));
        assert_eq!(user.updated_at, Some(user.created_at));
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(SortKey::parse(None), SortKey::Username);
        assert_eq!(SortKey::parse(Some("EMAIL")), SortKey::Email);
        assert_eq!(SortKey::parse(Some("role")), SortKey::Role);
        assert_eq!(SortKey::parse(Some("created")), SortKey::CreatedAt);
        assert_eq!(SortKey::parse(Some("createdAt")), SortKey::CreatedAt);
        assert_eq!(SortKey::parse(Some("updated")), SortKey::UpdatedAt);
        assert_eq!(SortKey::parse(Some("password_hash")), SortKey::Username);
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!(SortDirection::parse(None), SortDirection::Ascending);
        assert_eq!(SortDirection::parse(Some("ASC")), SortDirection::Ascending);
        assert_eq!(SortDirection::parse(Some("desc")), SortDirection::Descending);
        assert_eq!(SortDirection::parse(Some("sideways")), SortDirection::Descending);
    }

    #[test]
    fn test_search_normalization() {
        let search = UserSearch {
            page: 0,
            page_size: 0,
            text: Some("   ".to_string()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(search.page, 1);
        assert_eq!(search.page_size, 10);
        assert_eq!(search.text, None);

        let search = UserSearch {
            page: 3,
            page_size: 500,
            text: Some("  ali ".to_string()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(search.page_size, 100);
        assert_eq!(search.offset(), 200);
        assert_eq!(search.text.as_deref(), Some("ali"));
    }

    #[test]
    fn test_audit_action_names() {
        for action in [
            AuditAction::Insert,
            AuditAction::Update,
            AuditAction::UpdateProfile,
            AuditAction::Delete,
            AuditAction::LoginFailed,
            AuditAction::RoleChanged,
            AuditAction::View,
            AuditAction::ViewList,
            AuditAction::DataTableQuery,
        ] {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
            assert!(action.as_str().len() <= 20);
        }
    }
}
