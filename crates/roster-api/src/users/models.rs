//! Account DTOs
//!
//! - UserPublic: the only account shape that leaves the service
//! - Create/Update/Profile requests with field validation
//! - List query and paged response
//! - Server-side grid request/response

use chrono::{DateTime, Utc};
use roster_core::{Page, SortDirection, SortKey, User, UserRole, UserSearch};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Public projection of an account
///
/// Has no password hash field, so no response can carry one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[schema(value_type = String, example = "User")]
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserPublic {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}

/// Blank or whitespace-only optional passwords mean "no change"
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Usernames are stored trimmed, so length rules apply to the trimmed text
fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(value.trim().to_string())
}

/// Create account request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 3, max = 50, message = "Username must be between 3 and 50 characters."))]
    pub username: String,
    #[validate(
        email(message = "Email must be a valid email address."),
        length(max = 100, message = "Email must be at most 100 characters.")
    )]
    pub email: String,
    #[validate(length(min = 8, max = 100, message = "Password must be between 8 and 100 characters."))]
    pub password: String,
    #[schema(value_type = String, example = "User")]
    pub role: UserRole,
}

/// Full account update (Admin)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(
        email(message = "Email must be a valid email address."),
        length(max = 100, message = "Email must be at most 100 characters.")
    )]
    pub email: String,
    #[schema(value_type = String, example = "ReadOnlyUser")]
    pub role: UserRole,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(min = 8, max = 100, message = "Password must be between 8 and 100 characters."))]
    pub new_password: Option<String>,
}

/// Self-service profile update; there is no role field to set
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(
        email(message = "Email must be a valid email address."),
        length(max = 100, message = "Email must be at most 100 characters.")
    )]
    pub email: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(min = 8, max = 100, message = "Password must be between 8 and 100 characters."))]
    pub new_password: Option<String>,
}

/// Query parameters for the account list
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    /// Substring of username or email
    pub search: Option<String>,
    /// Exact role filter (name or code)
    #[param(value_type = Option<String>)]
    pub role: Option<UserRole>,
    /// 1-based page number
    #[param(default = 1)]
    pub page: Option<i64>,
    /// Page size, clamped to 1..=100
    #[param(default = 10)]
    pub page_size: Option<i64>,
    /// username, email, role, created or updated
    pub sort: Option<String>,
    /// asc or desc
    pub dir: Option<String>,
}

impl UserListQuery {
    /// Normalised search: bad paging is clamped, unknown sort keys fall back
    /// to username, and any direction other than `asc` sorts descending
    pub fn to_search(&self) -> UserSearch {
        UserSearch {
            text: self.search.clone(),
            role: self.role,
            page: self.page.unwrap_or(1),
            page_size: self.page_size.unwrap_or(10),
            sort: SortKey::parse(self.sort.as_deref()),
            direction: SortDirection::parse(self.dir.as_deref()),
        }
        .normalized()
    }
}

/// Paged account list
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    pub items: Vec<UserPublic>,
    pub page: i64,
    pub page_size: i64,
    pub total_count: i64,
}

impl From<Page<UserPublic>> for UserListResponse {
    fn from(page: Page<UserPublic>) -> Self {
        Self {
            items: page.items,
            page: page.page,
            page_size: page.page_size,
            total_count: page.total_count,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct GridSearch {
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct GridOrder {
    #[serde(default)]
    pub column: usize,
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct GridColumn {
    pub data: Option<String>,
}

/// Server-side grid request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GridRequest {
    pub draw: i64,
    pub start: i64,
    pub length: i64,
    pub search: Option<GridSearch>,
    pub order: Vec<GridOrder>,
    pub columns: Vec<GridColumn>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GridQuery {
    /// Exact role filter (name or code)
    #[param(value_type = Option<String>)]
    pub role: Option<UserRole>,
}

impl GridRequest {
    /// 1-based page derived from the row window
    pub fn page(&self) -> i64 {
        if self.length <= 0 {
            1
        } else {
            self.start.max(0) / self.length + 1
        }
    }

    /// Column named by the first order entry; username when absent,
    /// out of range or not sortable
    pub fn sort_key(&self) -> SortKey {
        let data = self
            .order
            .first()
            .and_then(|order| self.columns.get(order.column))
            .and_then(|column| column.data.as_deref());

        match data {
            Some("email") => SortKey::Email,
            Some("role") => SortKey::Role,
            Some("createdAt") => SortKey::CreatedAt,
            _ => SortKey::Username,
        }
    }

    /// `desc` in any case is descending, everything else ascending
    pub fn direction(&self) -> SortDirection {
        match self.order.first().and_then(|o| o.dir.as_deref()) {
            Some(dir) if dir.eq_ignore_ascii_case("desc") => SortDirection::Descending,
            _ => SortDirection::Ascending,
        }
    }

    pub fn to_search(&self, role: Option<UserRole>) -> UserSearch {
        UserSearch {
            text: self.search.as_ref().and_then(|s| s.value.clone()),
            role,
            page: self.page(),
            page_size: self.length,
            sort: self.sort_key(),
            direction: self.direction(),
        }
        .normalized()
    }
}

/// Server-side grid response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GridResponse {
    pub draw: i64,
    pub records_total: i64,
    pub records_filtered: i64,
    pub data: Vec<UserPublic>,
}
