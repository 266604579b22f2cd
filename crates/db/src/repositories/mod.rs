use async_trait::async_trait;
use thiserror::Error;

use questpal_core::domain::chat::ChatId;
use questpal_core::domain::profile::{Area, Profile, RewardChoice, RewardSelection, Toggle};

pub mod memory;
pub mod profile;

pub use memory::InMemoryProfileRepository;
pub use profile::SqlProfileRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Per-conversation state that outlives a hunt. Unknown conversations read as
/// a default profile.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_profile(&self, chat_id: ChatId) -> Result<Profile, RepositoryError>;

    async fn set_area(&self, chat_id: ChatId, area: Area) -> Result<(), RepositoryError>;

    /// Forgets everything stored for the chat. Returns whether anything was stored.
    async fn delete_profile(&self, chat_id: ChatId) -> Result<bool, RepositoryError>;

    /// Flips one reward in the stored selection and returns what happened.
    async fn toggle_reward(
        &self,
        chat_id: ChatId,
        choice: RewardChoice,
    ) -> Result<Toggle, RepositoryError>;

    async fn get_area(&self, chat_id: ChatId) -> Result<Option<Area>, RepositoryError> {
        Ok(self.get_profile(chat_id).await?.area)
    }

    async fn get_rewards(&self, chat_id: ChatId) -> Result<RewardSelection, RepositoryError> {
        Ok(self.get_profile(chat_id).await?.rewards)
    }
}
