//! User accounts.

use emporio_core::AppError;
use emporio_server::{HandlerContext, HandlerResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `POST /v1/user/account/signup` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserDetails {
    /// Phone number the account is registered with.
    pub phone_number: String,
}

/// Signup response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSignupResponse {
    /// Generated account id.
    pub user_id: String,
    /// Phone number as stored.
    pub phone_number: String,
}

const INSERT_USER: &str = "INSERT INTO users (id, phone_number) VALUES ($1, $2)";

/// Registers an account in the request's transaction. It is committed only
/// if the whole request succeeds.
pub async fn signup(ctx: HandlerContext, details: NewUserDetails) -> HandlerResult<UserSignupResponse> {
    let phone_number = details.phone_number.trim().to_owned();
    if phone_number.is_empty() {
        return Err(AppError::validation("phoneNumber must not be empty"));
    }

    let user_id = Uuid::new_v4();
    ctx.session()?
        .execute(INSERT_USER, &[user_id.into(), phone_number.as_str().into()])
        .await?;
    tracing::info!(user_id = %user_id, "user registered");

    Ok(UserSignupResponse {
        user_id: user_id.to_string(),
        phone_number,
    })
}
