//! Request authentication and workspace permission matching.
//!
//! Three verifier strategies exist, mirroring the callers the API
//! serves: raw `x-api-key` (indexing CLI), `Authorization: Bearer`
//! (API clients), and bearer plus an upstream identity header from
//! Open WebUI. Chat routes accept bearer or the identity pair; document
//! routes accept api-key or bearer. A successful match yields the
//! caller's workspace access list.

use anyhow::{bail, Result};
use axum::http::HeaderMap;

use crate::config::PermissionGrant;
use crate::models::WorkspaceAccess;

const OWUI_EMAIL_HEADER: &str = "x-openwebui-user-email";

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String> {
    let header = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| anyhow::anyhow!("Missing Authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| anyhow::anyhow!("Invalid Authorization header format"))?;
    if token.is_empty() {
        bail!("Missing bearer token");
    }
    Ok(token.to_string())
}

/// Match a credential (and optional user identity) against the grants,
/// expanding `workspace:rw` / `workspace` strings into access entries.
pub fn match_permissions(
    grants: &[PermissionGrant],
    api_key: &str,
    user_email: Option<&str>,
) -> Vec<WorkspaceAccess> {
    grants
        .iter()
        .filter(|grant| grant.api_keys.iter().any(|k| k == api_key))
        .filter(|grant| match user_email {
            Some(email) => grant.users.iter().any(|u| u == email),
            None => true,
        })
        .flat_map(|grant| {
            grant.workspaces.iter().map(|workspace| {
                let (name, access) = workspace
                    .split_once(':')
                    .unwrap_or((workspace.as_str(), "r"));
                WorkspaceAccess {
                    workspace: name.to_string(),
                    read: true,
                    write: access == "rw",
                }
            })
        })
        .collect()
}

fn verify_api_key(headers: &HeaderMap, grants: &[PermissionGrant]) -> Result<Vec<WorkspaceAccess>> {
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| anyhow::anyhow!("Missing x-api-key header"))?;
    let permissions = match_permissions(grants, api_key, None);
    if permissions.is_empty() {
        bail!("No matching permissions");
    }
    Ok(permissions)
}

fn verify_bearer(headers: &HeaderMap, grants: &[PermissionGrant]) -> Result<Vec<WorkspaceAccess>> {
    let token = extract_bearer_token(headers)?;
    let permissions = match_permissions(grants, &token, None);
    if permissions.is_empty() {
        bail!("No matching permissions");
    }
    Ok(permissions)
}

fn verify_owui(headers: &HeaderMap, grants: &[PermissionGrant]) -> Result<Vec<WorkspaceAccess>> {
    let email = headers
        .get(OWUI_EMAIL_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| anyhow::anyhow!("Missing {} header", OWUI_EMAIL_HEADER))?;
    let token = extract_bearer_token(headers)?;
    let permissions = match_permissions(grants, &token, Some(email));
    if permissions.is_empty() {
        bail!("No matching permissions");
    }
    Ok(permissions)
}

/// Chat routes: bearer token, falling back to the OWUI identity pair.
pub fn authorize_chat(headers: &HeaderMap, grants: &[PermissionGrant]) -> Result<Vec<WorkspaceAccess>> {
    verify_bearer(headers, grants).or_else(|_| verify_owui(headers, grants))
}

/// Document routes: api key, falling back to bearer token.
pub fn authorize_documents(
    headers: &HeaderMap,
    grants: &[PermissionGrant],
) -> Result<Vec<WorkspaceAccess>> {
    verify_api_key(headers, grants).or_else(|_| verify_bearer(headers, grants))
}
