//! In-memory account and audit store
//!
//! Mirrors the PostgreSQL semantics (unique usernames across all rows,
//! active-account predicate, case-insensitive search) so services and the
//! HTTP layer can be exercised without a database.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::repository::{AuditRepository, UserRepository};
use crate::{
    AuditEntry, NewAuditEntry, NewUser, Page, Result, RosterError, SortKey, User, UserSearch,
};

#[derive(Default)]
struct UserTable {
    rows: BTreeMap<i64, User>,
    next_id: i64,
}

#[derive(Default)]
struct AuditTable {
    rows: Vec<AuditEntry>,
    next_id: i64,
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<UserTable>,
    audit: RwLock<AuditTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_text(user: &User, needle: &str) -> bool {
    user.username.to_lowercase().contains(needle) || user.email.to_lowercase().contains(needle)
}

fn compare_by(key: SortKey, a: &User, b: &User) -> Ordering {
    let primary = match key {
        SortKey::Username => a.username.cmp(&b.username),
        SortKey::Email => a.email.cmp(&b.email),
        SortKey::Role => a.role.code().cmp(&b.role.code()),
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    };
    primary.then(a.id.cmp(&b.id))
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn username_exists(&self, username: &str, exclude_id: Option<i64>) -> Result<bool> {
        let username = username.trim();
        let table = self.users.read().await;
        Ok(table
            .rows
            .values()
            .any(|u| u.username == username && Some(u.id) != exclude_id))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let table = self.users.read().await;
        Ok(table.rows.get(&id).filter(|u| !u.is_deleted).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.trim();
        let table = self.users.read().await;
        Ok(table
            .rows
            .values()
            .find(|u| !u.is_deleted && u.username == username)
            .cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User> {
        let mut table = self.users.write().await;
        if table.rows.values().any(|u| u.username == user.username) {
            return Err(RosterError::Conflict(format!(
                "Username '{}' already exists",
                user.username
            )));
        }

        table.next_id += 1;
        let stored = user.into_user(table.next_id);
        table.rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut table = self.users.write().await;
        let row = table
            .rows
            .get_mut(&user.id)
            .filter(|u| !u.is_deleted)
            .ok_or_else(|| RosterError::NotFound(format!("User {}", user.id)))?;

        row.email = user.email.clone();
        row.password_hash = user.password_hash.clone();
        row.role = user.role;
        row.updated_at = user.updated_at;
        row.last_modified_by = user.last_modified_by.clone();
        Ok(())
    }

    async fn soft_delete(&self, id: i64, deleted_by: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut table = self.users.write().await;
        match table.rows.get_mut(&id).filter(|u| !u.is_deleted) {
            Some(row) => {
                row.is_deleted = true;
                row.updated_at = Some(at);
                row.last_modified_by = Some(deleted_by.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn search(&self, search: &UserSearch) -> Result<Page<User>> {
        let needle = search.text.as_deref().map(str::to_lowercase);
        let table = self.users.read().await;

        let mut matched: Vec<&User> = table
            .rows
            .values()
            .filter(|u| !u.is_deleted)
            .filter(|u| needle.as_deref().map_or(true, |n| matches_text(u, n)))
            .filter(|u| search.role.map_or(true, |r| u.role == r))
            .collect();

        matched.sort_by(|a, b| {
            let ordering = compare_by(search.sort, a, b);
            if search.direction.is_ascending() {
                ordering
            } else {
                ordering.reverse()
            }
        });

        let total_count = matched.len() as i64;
        let offset = usize::try_from(search.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(search.page_size).unwrap_or(0);
        let items = matched
            .into_iter()
            .skip(offset)
            .take(take)
            .cloned()
            .collect();

        Ok(Page {
            items,
            page: search.page,
            page_size: search.page_size,
            total_count,
        })
    }

    async fn find_by_id_including_deleted(&self, id: i64) -> Result<Option<User>> {
        Ok(self.users.read().await.rows.get(&id).cloned())
    }

    async fn count_all_including_deleted(&self) -> Result<i64> {
        Ok(self.users.read().await.rows.len() as i64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry> {
        let mut table = self.audit.write().await;
        table.next_id += 1;
        let stored = entry.into_entry(table.next_id);
        table.rows.push(stored.clone());
        Ok(stored)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let take = usize::try_from(limit).unwrap_or(0);
        let table = self.audit.read().await;
        Ok(table.rows.iter().rev().take(take).cloned().collect())
    }
}
