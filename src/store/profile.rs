use sqlx::SqlitePool;

use crate::error::PersistenceError;
use crate::network::Network;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub username: String,
    pub is_chat_bot: bool,
}

impl Profile {
    /// Name shown to the counterparty: name, else `@username`, else the address.
    pub fn display_name(profile: Option<&Self>, address: &str) -> String {
        match profile {
            Some(profile) if !profile.name.is_empty() => profile.name.clone(),
            Some(profile) if !profile.username.is_empty() => format!("@{}", profile.username),
            _ => address.to_string(),
        }
    }
}

pub async fn profile_by_address(
    pool: &SqlitePool,
    network: Network,
    address: &str,
) -> Result<Option<Profile>, PersistenceError> {
    let profile = sqlx::query_as(
        r"
        SELECT p.id, p.name, p.username, p.is_chat_bot
        FROM profiles p
        JOIN addresses a ON a.profile_id = p.id
        WHERE a.network = ?1 AND a.address = ?2
        ",
    )
    .bind(network.as_str())
    .bind(address)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

pub async fn insert_profile(pool: &SqlitePool, profile: &Profile) -> Result<(), PersistenceError> {
    sqlx::query("INSERT INTO profiles (id, name, username, is_chat_bot) VALUES (?1, ?2, ?3, ?4)")
        .bind(&profile.id)
        .bind(&profile.name)
        .bind(&profile.username)
        .bind(profile.is_chat_bot)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn insert_address(
    pool: &SqlitePool,
    profile_id: &str,
    network: Network,
    address: &str,
) -> Result<(), PersistenceError> {
    sqlx::query("INSERT INTO addresses (profile_id, network, address) VALUES (?1, ?2, ?3)")
        .bind(profile_id)
        .bind(network.as_str())
        .bind(address)
        .execute(pool)
        .await?;

    Ok(())
}
