use anyhow::Context;

use crate::error::AppResult;

/// Runs bcrypt on the blocking pool.
pub async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .context("password hashing task failed")??;
    Ok(hashed)
}

pub async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("password verification task failed")??;
    Ok(matches)
}
