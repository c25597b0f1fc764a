//! Audit trail for account operations
//!
//! Every mutating or viewing operation appends exactly one entry through
//! [`AuditLog`]. Appends are awaited by the caller, so a failed write fails
//! the request that triggered it.
//!
//! Each stored entry is also emitted at INFO level with the "audit" target,
//! making audit events easy to filter and route separately from
//! application logs.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;
use roster_core::{
    AuditAction, AuditEntry, AuditRepository, NewAuditEntry, Result, AUDIT_ENTITY_KEY_MAX,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::auth::middleware::AuthenticatedUser;

/// Performer recorded when no identity is attached to the request
pub const SYSTEM_ACTOR: &str = "system";

const IP_ADDRESS_MAX: usize = 64;
const ACTOR_MAX: usize = 100;

/// Who is acting and from where
///
/// Usable as an extractor: the performer is the authenticated username, or
/// `"system"`; the origin comes from proxy headers, then the peer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: String,
    pub ip_address: Option<String>,
}

impl RequestContext {
    pub fn new(actor: impl Into<String>, ip_address: Option<String>) -> Self {
        Self {
            actor: actor.into(),
            ip_address,
        }
    }

    pub fn system() -> Self {
        Self::new(SYSTEM_ACTOR, None)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let actor = parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|user| user.username.clone())
            .unwrap_or_else(|| SYSTEM_ACTOR.to_string());

        let ip_address = extract_ip_address(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(Self { actor, ip_address })
    }
}

/// Build the `{description, oldValues, newValues}` payload, omitting nulls
pub fn change_payload(
    description: Option<&str>,
    old_values: Option<Value>,
    new_values: Option<Value>,
) -> Value {
    let mut payload = Map::new();
    if let Some(description) = description {
        payload.insert("description".to_string(), Value::String(description.to_string()));
    }
    if let Some(old) = old_values.filter(|v| !v.is_null()) {
        payload.insert("oldValues".to_string(), old);
    }
    if let Some(new) = new_values.filter(|v| !v.is_null()) {
        payload.insert("newValues".to_string(), new);
    }
    Value::Object(payload)
}

fn truncate(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

/// Append-only audit writer
#[derive(Clone)]
pub struct AuditLog {
    repo: Arc<dyn AuditRepository>,
}

impl AuditLog {
    pub fn new(repo: Arc<dyn AuditRepository>) -> Self {
        Self { repo }
    }

    /// Append one entry
    pub async fn record(
        &self,
        action: AuditAction,
        entity_name: &str,
        entity_key: &str,
        ctx: &RequestContext,
        changes: Option<Value>,
    ) -> Result<AuditEntry> {
        let entry = NewAuditEntry {
            action,
            entity_name: entity_name.to_string(),
            entity_key: truncate(entity_key, AUDIT_ENTITY_KEY_MAX),
            performed_by: truncate(&ctx.actor, ACTOR_MAX),
            ip_address: ctx.ip_address.as_deref().map(|ip| truncate(ip, IP_ADDRESS_MAX)),
            performed_at: Utc::now(),
            changes,
        };

        let stored = self.repo.append(entry).await?;

        info!(
            target: "audit",
            audit_id = stored.id,
            action = %stored.action,
            entity = %stored.entity_name,
            key = %stored.entity_key,
            performed_by = %stored.performed_by,
            ip_address = ?stored.ip_address,
            "Audit entry recorded"
        );

        Ok(stored)
    }

    /// Append one entry describing a before/after change
    #[allow(clippy::too_many_arguments)]
    pub async fn record_change<O, N>(
        &self,
        action: AuditAction,
        entity_name: &str,
        entity_key: &str,
        old_values: Option<&O>,
        new_values: Option<&N>,
        ctx: &RequestContext,
        description: Option<&str>,
    ) -> Result<AuditEntry>
    where
        O: Serialize + Sync,
        N: Serialize + Sync,
    {
        let old_values = old_values
            .map(serde_json::to_value)
            .transpose()
            .map_err(anyhow::Error::from)?;
        let new_values = new_values
            .map(serde_json::to_value)
            .transpose()
            .map_err(anyhow::Error::from)?;

        let payload = change_payload(description, old_values, new_values);
        self.record(action, entity_name, entity_key, ctx, Some(payload))
            .await
    }

    /// Newest entries first
    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        self.repo.recent(limit).await
    }
}

/// Extract IP address from request headers
///
/// Checks X-Forwarded-For (first hop), then X-Real-IP.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    // Check X-Forwarded-For (proxy/load balancer)
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            // Take the first IP in the chain (client IP)
            if let Some(first_ip) = xff_str.split(',').next().map(str::trim) {
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    // Check X-Real-IP (nginx proxy)
    headers
        .get("x-real-ip")
        .and_then(|ip| ip.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::MemoryStore;
    use serde_json::json;

    fn log() -> (AuditLog, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (AuditLog::new(store.clone()), store)
    }

    #[test]
    fn test_change_payload_omits_nulls() {
        let payload = change_payload(Some("User soft-deleted"), Some(json!({"id": 1})), None);
        assert_eq!(
            payload,
            json!({"description": "User soft-deleted", "oldValues": {"id": 1}})
        );

        let payload = change_payload(None, Some(Value::Null), Some(json!({"id": 2})));
        assert_eq!(payload, json!({"newValues": {"id": 2}}));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ééé", 2), "éé");
    }

    #[tokio::test]
    async fn test_record_stores_entry() {
        let (audit, store) = log();
        let ctx = RequestContext::new("admin1", Some("10.0.0.1".to_string()));

        let entry = audit
            .record(AuditAction::View, "User", "Id=7", &ctx, None)
            .await
            .unwrap();

        assert_eq!(entry.id, 1);
        assert_eq!(entry.action, AuditAction::View);
        assert_eq!(entry.performed_by, "admin1");
        assert_eq!(entry.ip_address.as_deref(), Some("10.0.0.1"));

        let stored = store.recent(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].entity_key, "Id=7");
    }

    #[tokio::test]
    async fn test_record_truncates_long_key() {
        let (audit, _) = log();
        let key = format!("Page=1; Search={}", "x".repeat(200));
        let entry = audit
            .record(AuditAction::ViewList, "User", &key, &RequestContext::system(), None)
            .await
            .unwrap();
        assert_eq!(entry.entity_key.chars().count(), AUDIT_ENTITY_KEY_MAX);
        assert_eq!(entry.performed_by, "system");
    }

    #[tokio::test]
    async fn test_record_change_payload() {
        let (audit, _) = log();
        let entry = audit
            .record_change(
                AuditAction::Update,
                "User",
                "Id=3",
                Some(&json!({"email": "old@x.com"})),
                Some(&json!({"email": "new@x.com"})),
                &RequestContext::system(),
                Some("User updated"),
            )
            .await
            .unwrap();

        assert_eq!(
            entry.changes,
            Some(json!({
                "description": "User updated",
                "oldValues": {"email": "old@x.com"},
                "newValues": {"email": "new@x.com"}
            }))
        );
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );

        let ip = extract_ip_address(&headers);
        assert_eq!(ip, Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.1".parse().unwrap());

        let ip = extract_ip_address(&headers);
        assert_eq!(ip, Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_missing_headers() {
        let headers = HeaderMap::new();
        assert_eq!(extract_ip_address(&headers), None);
    }

    #[tokio::test]
    async fn test_context_extractor_defaults_to_system() {
        let (mut parts, _) = axum::http::Request::builder()
            .uri("/")
            .header("x-real-ip", "192.0.2.9")
            .body(())
            .unwrap()
            .into_parts();

        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx, RequestContext::new("system", Some("192.0.2.9".to_string())));
    }
}
