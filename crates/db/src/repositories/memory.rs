use std::collections::HashMap;

use tokio::sync::RwLock;

use questpal_core::domain::chat::ChatId;
use questpal_core::domain::profile::{Area, Profile, RewardChoice, Toggle};

use super::{ProfileRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<ChatId, Profile>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn get_profile(&self, chat_id: ChatId) -> Result<Profile, RepositoryError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(&chat_id).cloned().unwrap_or_default())
    }

    async fn delete_profile(&self, chat_id: ChatId) -> Result<bool, RepositoryError> {
        Ok(self.profiles.write().await.remove(&chat_id).is_some())
    }

    async fn set_area(&self, chat_id: ChatId, area: Area) -> Result<(), RepositoryError> {
        let mut profiles = self.profiles.write().await;
        profiles.entry(chat_id).or_default().area = Some(area);
        Ok(())
    }

    async fn toggle_reward(
        &self,
        chat_id: ChatId,
        choice: RewardChoice,
    ) -> Result<Toggle, RepositoryError> {
        let mut profiles = self.profiles.write().await;
        Ok(profiles.entry(chat_id).or_default().rewards.toggle(choice))
    }
}

#[cfg(test)]
mod tests {
    use questpal_core::domain::chat::ChatId;
    use questpal_core::domain::geo::LatLon;
    use questpal_core::domain::profile::{Area, RewardChoice, Toggle};

    use crate::repositories::{InMemoryProfileRepository, ProfileRepository};

    #[tokio::test]
    async fn unknown_chat_reads_as_default_profile() {
        let repo = InMemoryProfileRepository::new();
        let profile = repo.get_profile(ChatId(7)).await.expect("get");

        assert!(!profile.has_area());
        assert!(!profile.has_quests());
        assert!(!repo.delete_profile(ChatId(7)).await.expect("delete"));
    }

    #[tokio::test]
    async fn area_and_rewards_are_kept_per_chat() {
        let repo = InMemoryProfileRepository::new();
        let area = Area::new(LatLon::new(52.52, 13.405), 1_500);

        repo.set_area(ChatId(1), area).await.expect("set area");
        let toggled = repo.toggle_reward(ChatId(1), RewardChoice::Pokemon(25)).await.expect("toggle");

        assert_eq!(toggled, Toggle::Added);
        assert_eq!(repo.get_area(ChatId(1)).await.expect("area"), Some(area));
        assert_eq!(repo.get_rewards(ChatId(1)).await.expect("rewards").pokemon, vec![25]);
        assert_eq!(repo.get_area(ChatId(2)).await.expect("other chat"), None);

        let toggled = repo.toggle_reward(ChatId(1), RewardChoice::Pokemon(25)).await.expect("toggle");
        assert_eq!(toggled, Toggle::Removed);
        assert!(!repo.get_profile(ChatId(1)).await.expect("profile").has_quests());
    }
}
