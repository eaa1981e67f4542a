use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Billing plan tier for a brand. Drives queue priority and the UX completion
/// estimate; plan management itself lives with the billing collaborator.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanTier {
    Enterprise,
    Professional,
    Starter,
    Free,
}

impl PlanTier {
    /// Queue priority class; lower dequeues first.
    pub fn queue_priority(self) -> u8 {
        match self {
            PlanTier::Enterprise => 0,
            PlanTier::Professional => 1,
            PlanTier::Starter => 2,
            PlanTier::Free => 3,
        }
    }

    /// Rough completion estimate surfaced to polling clients. UX hint only.
    pub fn estimated_seconds(self) -> u32 {
        match self {
            PlanTier::Enterprise => 15,
            PlanTier::Professional => 30,
            PlanTier::Starter => 45,
            PlanTier::Free => 60,
        }
    }
}

/// A brand's plan ceiling and current monthly usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandLimits {
    pub brand_id: Uuid,
    pub plan_tier: PlanTier,
    pub monthly_generations: i32,
    pub max_monthly_generations: i32,
}

impl BrandLimits {
    pub fn at_quota(&self) -> bool {
        self.monthly_generations >= self.max_monthly_generations
    }
}
