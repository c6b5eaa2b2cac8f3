use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceTier {
    Internship,
    Graduate,
    #[default]
    Entry,
    WorkingStudent,
}

/// Subscription level. Only affects delivery volume downstream, never scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Premium,
}

/// A candidate's matching preferences, one record per email identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub email: String,
    /// Ordered by preference.
    #[serde(default)]
    pub target_cities: Vec<String>,
    #[serde(default)]
    pub languages_spoken: BTreeSet<String>,
    #[serde(default)]
    pub company_types: BTreeSet<String>,
    #[serde(default)]
    pub roles_selected: BTreeSet<String>,
    #[serde(default)]
    pub career_path: Option<String>,
    #[serde(default)]
    pub experience_tier: ExperienceTier,
    #[serde(default)]
    pub subscription_tier: SubscriptionTier,
}

impl UserPreferences {
    /// Rejects profiles that cannot be keyed. Runs before any matching tier.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.trim().is_empty() {
            return Err(ValidationError::MissingEmail);
        }
        Ok(())
    }

    /// True when `city` (case-insensitive) is one of the target cities.
    pub fn targets_city(&self, city: &str) -> bool {
        let city = city.trim();
        !city.is_empty()
            && self
                .target_cities
                .iter()
                .any(|c| c.trim().eq_ignore_ascii_case(city))
    }

    pub fn career_path_normalized(&self) -> Option<String> {
        self.career_path
            .as_deref()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
    }

    /// Coarse signature shared by users who would get the same AI ranking:
    /// sorted lowercase cities plus career path.
    pub fn cluster_key(&self) -> String {
        let cities: BTreeSet<String> = self
            .target_cities
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        let cities: Vec<String> = cities.into_iter().collect();
        format!(
            "{}|{}",
            cities.join(","),
            self.career_path_normalized().unwrap_or_default()
        )
    }
}
