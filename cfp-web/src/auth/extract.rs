//! Request extractors for the logged-in user

use super::session::{hash_token, token_from_headers};
use crate::db::{sessions, users};
use crate::db::users::User;
use crate::error::ApiError;
use crate::permissions::Actor;
use crate::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use cfp_common::{db::PROGRAMME_COMMITTEE, time};
use tracing::debug;

/// Authenticated, active user; rejects with 401 otherwise
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub is_committee: bool,
    /// Raw session token the request authenticated with
    pub session: SessionToken,
}

#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        Actor {
            user_guid: self.user.guid,
            is_superuser: self.user.is_superuser,
            is_committee: self.is_committee,
        }
    }
}

/// Optional variant of [`CurrentUser`]; never rejects
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

async fn resolve(parts: &Parts, state: &AppState) -> Result<Option<CurrentUser>, ApiError> {
    let Some(token) = token_from_headers(&parts.headers) else {
        return Ok(None);
    };

    let Some(record) = sessions::find_session(&state.db, &hash_token(&token), time::now()).await?
    else {
        debug!("Unknown or expired session token");
        return Ok(None);
    };

    let Some(user) = users::find_by_guid(&state.db, record.user_guid).await? else {
        return Ok(None);
    };
    if !user.is_active {
        return Ok(None);
    }

    let is_committee = users::is_in_group(&state.db, user.guid, PROGRAMME_COMMITTEE).await?;

    Ok(Some(CurrentUser {
        user,
        is_committee,
        session: SessionToken(token),
    }))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve(parts, state).await?.ok_or(ApiError::Unauthenticated)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(resolve(parts, state).await?))
    }
}
