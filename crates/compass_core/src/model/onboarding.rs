//! Onboarding singleton state.

use super::flag;
use crate::db::Record;
use crate::schema::{RecordSchema, Validated, ONBOARDING_SCHEMA};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Goal chosen during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingGoal {
    SelfDiscovery,
    PartnerCommunication,
    ExpandingKnowledge,
}

impl OnboardingGoal {
    pub const NAMES: &'static [&'static str] =
        &["self_discovery", "partner_communication", "expanding_knowledge"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelfDiscovery => "self_discovery",
            Self::PartnerCommunication => "partner_communication",
            Self::ExpandingKnowledge => "expanding_knowledge",
        }
    }
}

/// Stored onboarding row. Exactly one exists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OnboardingRow {
    pub completed: i64,
    pub goal: Option<OnboardingGoal>,
    /// `1..=5` when answered.
    pub comfort_level: Option<i64>,
    pub first_concept_viewed: i64,
}

impl Validated for OnboardingRow {
    fn schema() -> &'static RecordSchema {
        &ONBOARDING_SCHEMA
    }
}

/// Onboarding state with flags decoded to booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingState {
    pub completed: bool,
    pub goal: Option<OnboardingGoal>,
    pub comfort_level: Option<i64>,
    pub first_concept_viewed: bool,
}

impl From<&OnboardingRow> for OnboardingState {
    fn from(row: &OnboardingRow) -> Self {
        Self {
            completed: row.completed == 1,
            goal: row.goal,
            comfort_level: row.comfort_level,
            first_concept_viewed: row.first_concept_viewed == 1,
        }
    }
}

/// Sparse onboarding change; `None` fields are left untouched.
///
/// Nested options distinguish "clear the value" (`Some(None)`) from
/// "leave it" (`None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OnboardingUpdate {
    pub completed: Option<bool>,
    pub goal: Option<Option<OnboardingGoal>>,
    pub comfort_level: Option<Option<i64>>,
    pub first_concept_viewed: Option<bool>,
}

impl OnboardingUpdate {
    pub fn is_empty(&self) -> bool {
        self.to_fields().is_empty()
    }

    /// Only the supplied fields, in stored form.
    pub fn to_fields(&self) -> Record {
        let mut fields = Record::new();
        if let Some(completed) = self.completed {
            fields.insert("completed".to_string(), Value::from(flag(completed)));
        }
        if let Some(goal) = self.goal {
            fields.insert(
                "goal".to_string(),
                goal.map_or(Value::Null, |goal| Value::from(goal.as_str())),
            );
        }
        if let Some(level) = self.comfort_level {
            fields.insert("comfort_level".to_string(), level.map_or(Value::Null, Value::from));
        }
        if let Some(viewed) = self.first_concept_viewed {
            fields.insert("first_concept_viewed".to_string(), Value::from(flag(viewed)));
        }
        fields
    }
}
