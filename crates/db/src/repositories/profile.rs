use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use questpal_core::domain::chat::ChatId;
use questpal_core::domain::geo::LatLon;
use questpal_core::domain::profile::{Area, Profile, RewardChoice, RewardSelection, Toggle};

use super::{ProfileRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProfileRepository {
    pool: DbPool,
}

impl SqlProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SELECT_PROFILE: &str = "SELECT area_latitude, area_longitude, area_radius_m, rewards_json
 FROM chat_profile WHERE chat_id = ?";

fn decode_error(error: impl ToString) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn row_to_profile(row: &SqliteRow) -> Result<Profile, RepositoryError> {
    let latitude: Option<f64> = row.try_get("area_latitude").map_err(decode_error)?;
    let longitude: Option<f64> = row.try_get("area_longitude").map_err(decode_error)?;
    let radius_m: Option<i64> = row.try_get("area_radius_m").map_err(decode_error)?;
    let rewards_json: String = row.try_get("rewards_json").map_err(decode_error)?;

    let area = match (latitude, longitude, radius_m) {
        (Some(latitude), Some(longitude), Some(radius_m)) => {
            let radius_m = u32::try_from(radius_m).map_err(decode_error)?;
            Some(Area::new(LatLon::new(latitude, longitude), radius_m))
        }
        _ => None,
    };
    let rewards: RewardSelection = serde_json::from_str(&rewards_json).map_err(decode_error)?;

    Ok(Profile { area, rewards })
}

async fn load_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    chat_id: ChatId,
) -> Result<Profile, RepositoryError> {
    let row = sqlx::query(SELECT_PROFILE).bind(chat_id.0).fetch_optional(&mut **tx).await?;
    match row {
        Some(ref row) => row_to_profile(row),
        None => Ok(Profile::default()),
    }
}

async fn upsert_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    chat_id: ChatId,
    profile: &Profile,
) -> Result<(), RepositoryError> {
    let rewards_json = serde_json::to_string(&profile.rewards).map_err(decode_error)?;
    let area = profile.area.as_ref();

    sqlx::query(
        "INSERT INTO chat_profile (chat_id, area_latitude, area_longitude, area_radius_m,
                                   rewards_json, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(chat_id) DO UPDATE SET
             area_latitude = excluded.area_latitude,
             area_longitude = excluded.area_longitude,
             area_radius_m = excluded.area_radius_m,
             rewards_json = excluded.rewards_json,
             updated_at = excluded.updated_at",
    )
    .bind(chat_id.0)
    .bind(area.map(|area| area.center.latitude))
    .bind(area.map(|area| area.center.longitude))
    .bind(area.map(|area| i64::from(area.radius_m)))
    .bind(rewards_json)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl ProfileRepository for SqlProfileRepository {
    async fn get_profile(&self, chat_id: ChatId) -> Result<Profile, RepositoryError> {
        let row = sqlx::query(SELECT_PROFILE).bind(chat_id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(ref row) => row_to_profile(row),
            None => Ok(Profile::default()),
        }
    }

    async fn delete_profile(&self, chat_id: ChatId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM chat_profile WHERE chat_id = ?")
            .bind(chat_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_area(&self, chat_id: ChatId, area: Area) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut profile = load_in_tx(&mut tx, chat_id).await?;
        profile.area = Some(area);
        upsert_in_tx(&mut tx, chat_id, &profile).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn toggle_reward(
        &self,
        chat_id: ChatId,
        choice: RewardChoice,
    ) -> Result<Toggle, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut profile = load_in_tx(&mut tx, chat_id).await?;
        let toggle = profile.rewards.toggle(choice);
        upsert_in_tx(&mut tx, chat_id, &profile).await?;
        tx.commit().await?;
        Ok(toggle)
    }
}
