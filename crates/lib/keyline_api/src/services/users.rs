//! User profile reads.

use uuid::Uuid;

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::UserResponse;

/// The calling identity with its effective roles and aggregated
/// permission names.
pub async fn me(state: &AppState, identity_id: Uuid) -> ApiResult<UserResponse> {
    let identity = state
        .identities
        .find_by_id(identity_id)
        .await?
        .filter(|i| !i.deleted)
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let roles = state.identities.effective_role_names(identity.id).await?;
    let permissions = state
        .identities
        .effective_permission_names(identity.id)
        .await?;

    Ok(UserResponse {
        id: identity.id,
        username: identity.username,
        email: identity.email,
        display_name: identity.display_name,
        two_factor_enabled: identity.two_factor_enabled,
        roles,
        permissions,
        created_at: identity.created_at,
    })
}
