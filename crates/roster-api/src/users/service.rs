//! Account service layer
//!
//! Composes the user store, the credential hasher and the audit log. Each
//! successful mutation appends exactly one audit entry keyed `Id=<id>`.

use std::sync::Arc;

use chrono::Utc;
use roster_core::{AuditAction, NewUser, Page, User, UserRepository, UserRole, UserSearch};
use tracing::{debug, info, warn};

use super::models::{
    CreateUserRequest, GridRequest, GridResponse, UpdateProfileRequest, UpdateUserRequest,
    UserListQuery, UserPublic,
};
use crate::audit::{AuditLog, RequestContext};
use crate::auth::password::{CredentialHasher, PasswordError};
use crate::error::AppError;

const ENTITY: &str = "User";

fn entity_key(id: i64) -> String {
    format!("Id={id}")
}

fn not_found() -> AppError {
    AppError::NotFound("User not found.".to_string())
}

/// Account service
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserRepository>,
    hasher: CredentialHasher,
    audit: AuditLog,
}

impl UserService {
    pub fn new(store: Arc<dyn UserRepository>, hasher: CredentialHasher, audit: AuditLog) -> Self {
        Self {
            store,
            hasher,
            audit,
        }
    }

    pub fn store(&self) -> &Arc<dyn UserRepository> {
        &self.store
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Hash on the blocking pool; PBKDF2 is deliberately slow
    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    /// Create an account
    ///
    /// # Returns
    ///
    /// * `Ok(UserPublic)` - The stored account
    /// * `Err(AppError::Conflict)` - If the username is taken, deleted accounts included
    pub async fn create(
        &self,
        request: CreateUserRequest,
        ctx: &RequestContext,
    ) -> Result<UserPublic, AppError> {
        let username = request.username.trim().to_string();
        if self.store.username_exists(&username, None).await? {
            return Err(AppError::Conflict(format!(
                "Username '{username}' already exists."
            )));
        }

        let password_hash = self.hash_password(request.password).await?;
        let user = self
            .store
            .insert(NewUser {
                username,
                email: request.email.trim().to_string(),
                password_hash,
                role: request.role,
                created_at: Utc::now(),
                created_by: ctx.actor.clone(),
            })
            .await?;

        let public = UserPublic::from(&user);
        self.audit
            .record_change::<UserPublic, _>(
                AuditAction::Insert,
                ENTITY,
                &entity_key(user.id),
                None,
                Some(&public),
                ctx,
                Some("User created"),
            )
            .await?;

        info!(user_id = user.id, username = %user.username, role = %user.role, "User created");
        Ok(public)
    }

    /// Replace email and role; re-hash only when a new password is given
    pub async fn update(
        &self,
        id: i64,
        request: UpdateUserRequest,
        ctx: &RequestContext,
    ) -> Result<UserPublic, AppError> {
        let mut user = self.store.find_by_id(id).await?.ok_or_else(not_found)?;
        let before = UserPublic::from(&user);

        if before.role != request.role {
            debug!(user_id = id, from = %before.role, to = %request.role, "Role change requested");
        }
        user.email = request.email.trim().to_string();
        user.role = request.role;

        self.apply_update(
            user,
            before,
            request.new_password,
            AuditAction::Update,
            "User updated",
            ctx,
        )
        .await
    }

    /// Caller's own email and password; the role is never touched
    pub async fn update_profile(
        &self,
        id: i64,
        request: UpdateProfileRequest,
        ctx: &RequestContext,
    ) -> Result<UserPublic, AppError> {
        let mut user = self.store.find_by_id(id).await?.ok_or_else(not_found)?;
        let before = UserPublic::from(&user);

        user.email = request.email.trim().to_string();

        self.apply_update(
            user,
            before,
            request.new_password,
            AuditAction::UpdateProfile,
            "Profile updated",
            ctx,
        )
        .await
    }

    async fn apply_update(
        &self,
        mut user: User,
        before: UserPublic,
        new_password: Option<String>,
        action: AuditAction,
        description: &str,
        ctx: &RequestContext,
    ) -> Result<UserPublic, AppError> {
        if let Some(password) = new_password.filter(|p| !p.trim().is_empty()) {
            user.password_hash = self.hash_password(password).await?;
        }
        user.updated_at = Some(Utc::now());
        user.last_modified_by = Some(ctx.actor.clone());

        self.store.update(&user).await?;

        let after = UserPublic::from(&user);
        self.audit
            .record_change(
                action,
                ENTITY,
                &entity_key(user.id),
                Some(&before),
                Some(&after),
                ctx,
                Some(description),
            )
            .await?;

        Ok(after)
    }

    /// Flag an account deleted
    ///
    /// Returns `false` without writing anything when the account is absent
    /// or already deleted.
    pub async fn soft_delete(&self, id: i64, ctx: &RequestContext) -> Result<bool, AppError> {
        let Some(user) = self.store.find_by_id(id).await? else {
            return Ok(false);
        };

        if !self.store.soft_delete(id, &ctx.actor, Utc::now()).await? {
            return Ok(false);
        }

        let before = UserPublic::from(&user);
        self.audit
            .record_change::<_, UserPublic>(
                AuditAction::Delete,
                ENTITY,
                &entity_key(id),
                Some(&before),
                None,
                ctx,
                Some("User soft-deleted"),
            )
            .await?;

        info!(user_id = id, performed_by = %ctx.actor, "User soft-deleted");
        Ok(true)
    }

    /// Paged, filtered, sorted account list
    pub async fn list(&self, search: UserSearch) -> Result<Page<UserPublic>, AppError> {
        let search = search.normalized();
        let page = self.store.search(&search).await?;
        Ok(page.map(UserPublic::from))
    }

    pub async fn get(&self, id: i64) -> Result<Option<UserPublic>, AppError> {
        Ok(self.store.find_by_id(id).await?.map(UserPublic::from))
    }

    /// Audited single-account read
    pub async fn view(&self, id: i64, ctx: &RequestContext) -> Result<Option<UserPublic>, AppError> {
        self.audit
            .record(
                AuditAction::View,
                ENTITY,
                &entity_key(id),
                ctx,
                Some(serde_json::json!({ "description": "Viewed user details" })),
            )
            .await?;
        self.get(id).await
    }

    /// Audited list read
    pub async fn browse(
        &self,
        query: &UserListQuery,
        ctx: &RequestContext,
    ) -> Result<Page<UserPublic>, AppError> {
        let search = query.to_search();
        let key = format!(
            "Page={}; Search={}",
            search.page,
            query.search.as_deref().unwrap_or_default()
        );
        self.audit
            .record(
                AuditAction::ViewList,
                ENTITY,
                &key,
                ctx,
                Some(serde_json::json!({ "description": "User list viewed" })),
            )
            .await?;
        self.list(search).await
    }

    /// Audited server-side grid read
    ///
    /// `recordsTotal` and `recordsFiltered` both carry the matching count.
    pub async fn grid(
        &self,
        request: &GridRequest,
        role: Option<UserRole>,
        ctx: &RequestContext,
    ) -> Result<GridResponse, AppError> {
        let search = request.to_search(role);
        self.audit
            .record(
                AuditAction::DataTableQuery,
                ENTITY,
                &format!("Page={}", search.page),
                ctx,
                Some(serde_json::json!({ "description": "User list loaded via DataTable" })),
            )
            .await?;

        let page = self.list(search).await?;
        Ok(GridResponse {
            draw: request.draw,
            records_total: page.total_count,
            records_filtered: page.total_count,
            data: page.items,
        })
    }

    /// Look up and verify in one step
    ///
    /// An unknown username still pays for one derivation so both failure
    /// paths take the same time. A stored hash that cannot be decoded counts
    /// as a mismatch.
    pub(crate) async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, AppError> {
        let user = self.store.find_by_username(username.trim()).await?;
        let hasher = self.hasher;
        let password = password.to_string();

        let (user, valid) = tokio::task::spawn_blocking(move || match user {
            Some(user) => {
                let valid = match hasher.verify(&password, &user.password_hash) {
                    Ok(valid) => valid,
                    Err(PasswordError::InvalidHashFormat) => {
                        warn!(user_id = user.id, "Stored password hash is malformed");
                        false
                    }
                    Err(PasswordError::HashingFailed(_)) => false,
                };
                (Some(user), valid)
            }
            None => {
                hasher.verify_dummy(&password);
                (None, false)
            }
        })
        .await
        .map_err(|e| AppError::Internal(format!("Verification task failed: {e}")))?;

        Ok(user.filter(|_| valid))
    }

    /// Projection of the account when the credentials match
    pub async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserPublic>, AppError> {
        Ok(self
            .authenticate(username, password)
            .await?
            .map(UserPublic::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::{AuditRepository, MemoryStore, SortDirection, SortKey};

    fn service() -> (UserService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = UserService::new(
            store.clone(),
            CredentialHasher::with_iterations(1_000),
            AuditLog::new(store.clone()),
        );
        (service, store)
    }

    fn admin() -> RequestContext {
        RequestContext::new("admin1", Some("127.0.0.1".to_string()))
    }

    fn create_request(username: &str, role: UserRole) -> CreateUserRequest {
        CreateUserRequest {
            username: username.to_string(),
            email: format!("{}@x.com", username.trim()),
            password: "Passw0rd!".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (service, _) = service();
        let mut request = create_request("  alice ", UserRole::User);
        request.email = " alice@x.com ".to_string();

        let created = service.create(request, &admin()).await.unwrap();
        let fetched = service.get(created.id).await.unwrap().unwrap();

        assert_eq!(fetched.username, "alice");
        assert_eq!(fetched.email, "alice@x.com");
        assert_eq!(fetched.role, UserRole::User);
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_duplicate_conflicts() {
        let (service, _) = service();
        let first = service
            .create(create_request("alice", UserRole::User), &admin())
            .await
            .unwrap();

        let err = service
            .create(create_request("alice", UserRole::Admin), &admin())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Case-sensitive uniqueness
        assert!(service
            .create(create_request("Alice", UserRole::User), &admin())
            .await
            .is_ok());
        assert!(service.get(first.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_stamps_actor_and_audits() {
        let (service, store) = service();
        let created = service
            .create(create_request("bob", UserRole::ReadOnlyUser), &admin())
            .await
            .unwrap();

        let row = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(row.created_by, "admin1");
        assert_eq!(row.last_modified_by.as_deref(), Some("admin1"));
        assert_ne!(row.password_hash, "Passw0rd!");

        let entries = store.recent(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::Insert);
        assert_eq!(entries[0].entity_key, format!("Id={}", created.id));
        let changes = entries[0].changes.as_ref().unwrap();
        assert_eq!(changes["description"], "User created");
        assert_eq!(changes["newValues"]["username"], "bob");
        assert!(changes.get("oldValues").is_none());
        assert!(!changes.to_string().contains(&row.password_hash));
    }

    #[tokio::test]
    async fn test_update_changes_role_and_password() {
        let (service, store) = service();
        let created = service
            .create(create_request("carol", UserRole::User), &admin())
            .await
            .unwrap();

        let updated = service
            .update(
                created.id,
                UpdateUserRequest {
                    email: "carol@new.com".to_string(),
                    role: UserRole::Admin,
                    new_password: Some("NewPassw0rd!".to_string()),
                },
                &admin(),
            )
            .await
            .unwrap();

        assert_eq!(updated.email, "carol@new.com");
        assert_eq!(updated.role, UserRole::Admin);
        assert!(service
            .validate_credentials("carol", "NewPassw0rd!")
            .await
            .unwrap()
            .is_some());
        assert!(service
            .validate_credentials("carol", "Passw0rd!")
            .await
            .unwrap()
            .is_none());

        let entries = store.recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, AuditAction::Update);
        let changes = entries[0].changes.as_ref().unwrap();
        assert_eq!(changes["oldValues"]["role"], "User");
        assert_eq!(changes["newValues"]["role"], "Admin");
    }

    #[tokio::test]
    async fn test_update_without_password_keeps_hash() {
        let (service, store) = service();
        let created = service
            .create(create_request("dave", UserRole::User), &admin())
            .await
            .unwrap();
        let before = store.find_by_id(created.id).await.unwrap().unwrap();

        service
            .update(
                created.id,
                UpdateUserRequest {
                    email: "dave@x.com".to_string(),
                    role: UserRole::User,
                    new_password: None,
                },
                &admin(),
            )
            .await
            .unwrap();

        let after = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(after.password_hash, before.password_hash);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (service, store) = service();
        let err = service
            .update(
                99,
                UpdateUserRequest {
                    email: "x@x.com".to_string(),
                    role: UserRole::User,
                    new_password: None,
                },
                &admin(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_profile_never_changes_role() {
        let (service, store) = service();
        let created = service
            .create(create_request("erin", UserRole::ReadOnlyUser), &admin())
            .await
            .unwrap();

        let ctx = RequestContext::new("erin", None);
        let updated = service
            .update_profile(
                created.id,
                UpdateProfileRequest {
                    email: "erin@new.com".to_string(),
                    new_password: None,
                },
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(updated.role, UserRole::ReadOnlyUser);
        assert_eq!(updated.email, "erin@new.com");

        let entries = store.recent(1).await.unwrap();
        assert_eq!(entries[0].action, AuditAction::UpdateProfile);
        assert_eq!(entries[0].performed_by, "erin");
        assert_eq!(entries[0].entity_key, format!("Id={}", created.id));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_but_keeps_row() {
        let (service, store) = service();
        let created = service
            .create(create_request("frank", UserRole::User), &admin())
            .await
            .unwrap();

        assert!(service.soft_delete(created.id, &admin()).await.unwrap());
        assert!(service.get(created.id).await.unwrap().is_none());

        let row = store
            .find_by_id_including_deleted(created.id)
            .await
            .unwrap()
            .unwrap();
        assert!(row.is_deleted);

        let entries = store.recent(1).await.unwrap();
        assert_eq!(entries[0].action, AuditAction::Delete);
        let changes = entries[0].changes.as_ref().unwrap();
        assert_eq!(changes["oldValues"]["username"], "frank");
        assert!(changes.get("newValues").is_none());

        // Second delete is a no-op and is not audited
        assert!(!service.soft_delete(created.id, &admin()).await.unwrap());
        assert_eq!(store.recent(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_each_mutation_audits_once() {
        let (service, store) = service();
        let created = service
            .create(create_request("gina", UserRole::User), &admin())
            .await
            .unwrap();
        service
            .update(
                created.id,
                UpdateUserRequest {
                    email: "gina@x.com".to_string(),
                    role: UserRole::User,
                    new_password: None,
                },
                &admin(),
            )
            .await
            .unwrap();
        service
            .update_profile(
                created.id,
                UpdateProfileRequest {
                    email: "gina@y.com".to_string(),
                    new_password: None,
                },
                &admin(),
            )
            .await
            .unwrap();
        service.soft_delete(created.id, &admin()).await.unwrap();

        let actions: Vec<AuditAction> = store
            .recent(10)
            .await
            .unwrap()
            .into_iter()
            .rev()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::Insert,
                AuditAction::Update,
                AuditAction::UpdateProfile,
                AuditAction::Delete
            ]
        );
    }

    #[tokio::test]
    async fn test_list_clamps_paging() {
        let (service, _) = service();
        for i in 0..3 {
            service
                .create(create_request(&format!("user{i}"), UserRole::User), &admin())
                .await
                .unwrap();
        }

        let page = service
            .list(UserSearch {
                page: 0,
                page_size: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!((page.page, page.page_size), (1, 10));
        assert_eq!(page.total_count, 3);

        let page = service
            .list(UserSearch {
                page_size: 500,
                sort: SortKey::Username,
                direction: SortDirection::Descending,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.page_size, 100);
        assert_eq!(page.items[0].username, "user2");
    }

    #[tokio::test]
    async fn test_audited_reads() {
        let (service, store) = service();
        let created = service
            .create(create_request("hank", UserRole::User), &admin())
            .await
            .unwrap();

        assert!(service.view(created.id, &admin()).await.unwrap().is_some());
        let query = UserListQuery {
            search: Some("ha".to_string()),
            page: Some(2),
            ..Default::default()
        };
        service.browse(&query, &admin()).await.unwrap();

        let grid: GridRequest = serde_json::from_value(serde_json::json!({
            "draw": 3, "start": 0, "length": 10
        }))
        .unwrap();
        let response = service.grid(&grid, None, &admin()).await.unwrap();
        assert_eq!(response.draw, 3);
        assert_eq!(response.records_total, 1);
        assert_eq!(response.records_filtered, 1);

        let entries = store.recent(3).await.unwrap();
        assert_eq!(entries[0].action, AuditAction::DataTableQuery);
        assert_eq!(entries[0].entity_key, "Page=1");
        assert_eq!(entries[1].action, AuditAction::ViewList);
        assert_eq!(entries[1].entity_key, "Page=2; Search=ha");
        assert_eq!(entries[2].action, AuditAction::View);
        assert_eq!(entries[2].entity_key, format!("Id={}", created.id));
    }

    #[tokio::test]
    async fn test_validate_credentials() {
        let (service, _) = service();
        service
            .create(create_request("ivy", UserRole::User), &admin())
            .await
            .unwrap();

        let found = service
            .validate_credentials(" ivy ", "Passw0rd!")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.username, "ivy");

        assert!(service
            .validate_credentials("ivy", "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(service
            .validate_credentials("nobody", "Passw0rd!")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_malformed_stored_hash_is_mismatch() {
        let (service, store) = service();
        store
            .insert(NewUser {
                username: "legacy".to_string(),
                email: "legacy@x.com".to_string(),
                password_hash: "not-a-hash".to_string(),
                role: UserRole::User,
                created_at: Utc::now(),
                created_by: "test".to_string(),
            })
            .await
            .unwrap();

        assert!(service
            .validate_credentials("legacy", "anything")
            .await
            .unwrap()
            .is_none());
    }
}
