use serde::{Deserialize, Serialize};

/// Member standing derived from the running point total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// Points required to enter this tier.
    pub fn threshold(self) -> i64 {
        match self {
            Tier::Bronze => 0,
            Tier::Silver => 500,
            Tier::Gold => 1000,
            Tier::Platinum => 2000,
        }
    }

    pub fn for_points(points: i64) -> Self {
        [Tier::Platinum, Tier::Gold, Tier::Silver]
            .into_iter()
            .find(|tier| points >= tier.threshold())
            .unwrap_or(Tier::Bronze)
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Bronze => "Bronze",
            Tier::Silver => "Silver",
            Tier::Gold => "Gold",
            Tier::Platinum => "Platinum",
        }
    }
}
