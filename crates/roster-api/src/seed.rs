//! Demo account seeding
//!
//! Five accounts per role: `admin1..5`, `user1..5`, `readonly1..5`, each
//! `<name>@test.local` with the shared demo password. Seeding is skipped
//! once the store holds at least as many accounts (deleted ones included).

use std::collections::HashSet;

use chrono::Utc;
use roster_core::{NewUser, UserRepository, UserRole, UserSearch, MAX_PAGE_SIZE};
use tracing::info;

use crate::auth::password::CredentialHasher;
use crate::error::AppError;

pub const DEMO_PASSWORD: &str = "123456789!";
pub const SEED_ACTOR: &str = "seed";

const PER_ROLE: usize = 5;
const DEMO_PREFIXES: [(&str, UserRole); 3] = [
    ("admin", UserRole::Admin),
    ("user", UserRole::User),
    ("readonly", UserRole::ReadOnlyUser),
];

fn demo_accounts() -> Vec<(String, UserRole)> {
    DEMO_PREFIXES
        .iter()
        .flat_map(|(prefix, role)| (1..=PER_ROLE).map(move |i| (format!("{prefix}{i}"), *role)))
        .collect()
}

/// Lower-cased usernames of every live account
async fn existing_usernames(store: &dyn UserRepository) -> Result<HashSet<String>, AppError> {
    let mut names = HashSet::new();
    let mut search = UserSearch {
        page_size: MAX_PAGE_SIZE,
        ..Default::default()
    };
    loop {
        let page = store.search(&search).await?;
        let fetched = page.items.len() as i64;
        names.extend(page.items.into_iter().map(|u| u.username.to_lowercase()));
        if fetched < search.page_size || search.offset() + fetched >= page.total_count {
            break;
        }
        search.page += 1;
    }
    Ok(names)
}

/// Insert the missing demo accounts
///
/// Returns how many were created. Live usernames are skipped
/// case-insensitively, and names still held by deleted accounts are skipped
/// too.
pub async fn seed_demo_users(
    store: &dyn UserRepository,
    hasher: CredentialHasher,
) -> Result<usize, AppError> {
    let accounts = demo_accounts();
    let total = store.count_all_including_deleted().await?;
    if total >= accounts.len() as i64 {
        info!(existing = total, "Demo seed skipped");
        return Ok(0);
    }

    let existing = existing_usernames(store).await?;
    let mut missing = Vec::new();
    for (name, role) in accounts {
        if existing.contains(&name.to_lowercase()) {
            continue;
        }
        // Deleted accounts keep their names
        if store.username_exists(&name, None).await? {
            info!(username = %name, "Demo account name held by a deleted account, skipped");
            continue;
        }
        missing.push((name, role));
    }
    if missing.is_empty() {
        return Ok(0);
    }

    let password_hash = tokio::task::spawn_blocking(move || hasher.hash(DEMO_PASSWORD))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {e}")))?
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let now = Utc::now();
    let mut created = 0;
    for (username, role) in missing {
        store
            .insert(NewUser {
                email: format!("{username}@test.local"),
                username,
                password_hash: password_hash.clone(),
                role,
                created_at: now,
                created_by: SEED_ACTOR.to_string(),
            })
            .await?;
        created += 1;
    }

    info!(created, "Demo accounts seeded");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::MemoryStore;

    fn hasher() -> CredentialHasher {
        CredentialHasher::with_iterations(1_000)
    }

    #[test]
    fn test_demo_accounts() {
        let accounts = demo_accounts();
        assert_eq!(accounts.len(), 15);
        assert_eq!(accounts[0], ("admin1".to_string(), UserRole::Admin));
        assert_eq!(accounts[5], ("user1".to_string(), UserRole::User));
        assert_eq!(accounts[14], ("readonly5".to_string(), UserRole::ReadOnlyUser));
    }

    #[tokio::test]
    async fn test_seed_creates_all_then_skips() {
        let store = MemoryStore::new();
        assert_eq!(seed_demo_users(&store, hasher()).await.unwrap(), 15);
        assert_eq!(store.count_all_including_deleted().await.unwrap(), 15);

        let admin = store.find_by_username("admin3").await.unwrap().unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert_eq!(admin.email, "admin3@test.local");
        assert_eq!(admin.created_by, "seed");
        assert!(hasher().verify(DEMO_PASSWORD, &admin.password_hash).unwrap());

        assert_eq!(seed_demo_users(&store, hasher()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seed_skips_existing_case_insensitively() {
        let store = MemoryStore::new();
        store
            .insert(NewUser {
                username: "Admin1".to_string(),
                email: "boss@x.com".to_string(),
                password_hash: "x".to_string(),
                role: UserRole::Admin,
                created_at: Utc::now(),
                created_by: "test".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(seed_demo_users(&store, hasher()).await.unwrap(), 14);
        assert!(store.find_by_username("admin1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seed_skips_names_held_by_deleted_accounts() {
        let store = MemoryStore::new();
        let held = store
            .insert(NewUser {
                username: "user2".to_string(),
                email: "old@x.com".to_string(),
                password_hash: "x".to_string(),
                role: UserRole::User,
                created_at: Utc::now(),
                created_by: "test".to_string(),
            })
            .await
            .unwrap();
        assert!(store.soft_delete(held.id, "test", Utc::now()).await.unwrap());

        assert_eq!(seed_demo_users(&store, hasher()).await.unwrap(), 14);
        assert_eq!(store.count_all_including_deleted().await.unwrap(), 15);
        assert!(store.find_by_username("user2").await.unwrap().is_none());
        assert!(store.find_by_username("user3").await.unwrap().is_some());
    }
}
