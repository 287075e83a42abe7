//! Per-collection field rules.

use super::{FieldKind, FieldSpec, Presence, RecordSchema};
use crate::model::{ConceptStatus, OnboardingGoal};

pub static USER_CONCEPT_SCHEMA: RecordSchema = RecordSchema {
    collection: "user_concepts",
    fields: &[
        FieldSpec::new("concept_id", FieldKind::NonEmptyText, Presence::Required),
        FieldSpec::new(
            "status",
            FieldKind::Enum(ConceptStatus::NAMES),
            Presence::DefaultText("unexplored"),
        ),
        FieldSpec::new("is_unlocked", FieldKind::Flag, Presence::DefaultInt(0)),
        FieldSpec::new("is_mastered", FieldKind::Flag, Presence::DefaultInt(0)),
        FieldSpec::new("explored_at", FieldKind::Timestamp, Presence::Nullable),
        FieldSpec::new("updated_at", FieldKind::Timestamp, Presence::Required),
    ],
};

pub static JOURNAL_ENTRY_SCHEMA: RecordSchema = RecordSchema {
    collection: "journal_entries",
    fields: &[
        FieldSpec::new("id", FieldKind::NonEmptyText, Presence::Required),
        FieldSpec::new("concept_id", FieldKind::Text, Presence::Nullable),
        FieldSpec::new("content", FieldKind::Text, Presence::DefaultText("")),
        FieldSpec::new("created_at", FieldKind::Timestamp, Presence::Required),
        FieldSpec::new("updated_at", FieldKind::Timestamp, Presence::Required),
    ],
};

pub static ONBOARDING_SCHEMA: RecordSchema = RecordSchema {
    collection: "onboarding",
    fields: &[
        FieldSpec::new("completed", FieldKind::Flag, Presence::DefaultInt(0)),
        FieldSpec::new(
            "goal",
            FieldKind::Enum(OnboardingGoal::NAMES),
            Presence::Nullable,
        ),
        FieldSpec::new(
            "comfort_level",
            FieldKind::Integer { min: 1, max: 5 },
            Presence::Nullable,
        ),
        FieldSpec::new("first_concept_viewed", FieldKind::Flag, Presence::DefaultInt(0)),
    ],
};

pub static PATHWAY_PROGRESS_SCHEMA: RecordSchema = RecordSchema {
    collection: "pathway_progress",
    fields: &[
        FieldSpec::new("pathway_id", FieldKind::NonEmptyText, Presence::Required),
        FieldSpec::new("started_at", FieldKind::Timestamp, Presence::Required),
        FieldSpec::new("completed_at", FieldKind::Timestamp, Presence::Nullable),
        FieldSpec::new(
            "concepts_completed",
            FieldKind::TextList,
            Presence::DefaultEmptyList,
        ),
    ],
};

pub static PATHWAY_COMPLETION_SCHEMA: RecordSchema = RecordSchema {
    collection: "pathway_concept_completions",
    fields: &[
        FieldSpec::new("pathway_id", FieldKind::NonEmptyText, Presence::Required),
        FieldSpec::new("concept_id", FieldKind::NonEmptyText, Presence::Required),
        FieldSpec::new("completed_at", FieldKind::Timestamp, Presence::Required),
    ],
};
