//! Migration bodies. Keys and table names are spelled out literally so a
//! later rename elsewhere cannot change what a shipped step does.

use super::{KeyValueContext, SqlContext};
use crate::db::{completion_key, StorageError, StorageResult};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

const KV_USER_CONCEPTS: &str = "compass.user_concepts";
const KV_ONBOARDING: &str = "compass.onboarding";
const KV_PATHWAY_PROGRESS: &str = "compass.pathway_progress";
const KV_PATHWAY_COMPLETIONS: &str = "compass.pathway_concept_completions";

// v1

pub(super) fn add_concept_progress_flags_sql(ctx: &SqlContext<'_>) -> StorageResult<()> {
    ctx.add_column_if_missing("user_concepts", "is_unlocked", "INTEGER NOT NULL DEFAULT 0")?;
    ctx.add_column_if_missing("user_concepts", "is_mastered", "INTEGER NOT NULL DEFAULT 0")?;
    Ok(())
}

pub(super) fn add_concept_progress_flags_kv(ctx: &KeyValueContext<'_>) -> StorageResult<()> {
    let Some(mut concepts) = read_object(ctx, KV_USER_CONCEPTS)? else {
        ctx.log("no stored concepts");
        return Ok(());
    };

    let mut touched = 0;
    for concept in concepts.values_mut() {
        if let Value::Object(fields) = concept {
            let mut changed = false;
            for flag in ["is_unlocked", "is_mastered"] {
                if !fields.contains_key(flag) {
                    fields.insert(flag.to_string(), Value::from(0));
                    changed = true;
                }
            }
            if changed {
                touched += 1;
            }
        }
    }

    if touched > 0 {
        write_object(ctx, KV_USER_CONCEPTS, concepts)?;
    }
    ctx.log(&format!("filled progress flags on {touched} concepts"));
    Ok(())
}

// v2

pub(super) fn add_onboarding_details_sql(ctx: &SqlContext<'_>) -> StorageResult<()> {
    ctx.add_column_if_missing("onboarding", "comfort_level", "INTEGER")?;
    ctx.add_column_if_missing(
        "onboarding",
        "first_concept_viewed",
        "INTEGER NOT NULL DEFAULT 0",
    )?;
    Ok(())
}

pub(super) fn add_onboarding_details_kv(ctx: &KeyValueContext<'_>) -> StorageResult<()> {
    let Some(mut onboarding) = read_object(ctx, KV_ONBOARDING)? else {
        ctx.log("no stored onboarding state");
        return Ok(());
    };

    let mut changed = false;
    if !onboarding.contains_key("comfort_level") {
        onboarding.insert("comfort_level".to_string(), Value::Null);
        changed = true;
    }
    if !onboarding.contains_key("first_concept_viewed") {
        onboarding.insert("first_concept_viewed".to_string(), Value::from(0));
        changed = true;
    }

    if changed {
        write_object(ctx, KV_ONBOARDING, onboarding)?;
        ctx.log("filled onboarding details");
    }
    Ok(())
}

// v3

pub(super) fn normalize_pathway_completions_sql(ctx: &SqlContext<'_>) -> StorageResult<()> {
    ctx.execute_batch(
        "CREATE TABLE IF NOT EXISTS pathway_concept_completions (
            pathway_id TEXT NOT NULL,
            concept_id TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            PRIMARY KEY (pathway_id, concept_id)
        );
        CREATE INDEX IF NOT EXISTS idx_pathway_completions_pathway
            ON pathway_concept_completions(pathway_id);",
    )?;

    if !ctx.has_column("pathway_progress", "concepts_completed")? {
        ctx.log("no legacy completion lists to back-fill");
        return Ok(());
    }

    let copied = ctx.execute(
        "INSERT OR IGNORE INTO pathway_concept_completions (pathway_id, concept_id, completed_at)
         SELECT p.pathway_id, j.value, COALESCE(p.completed_at, p.started_at)
         FROM pathway_progress p,
              json_each(
                  CASE WHEN json_valid(p.concepts_completed)
                       THEN CASE WHEN json_type(p.concepts_completed) = 'array'
                                 THEN p.concepts_completed ELSE '[]' END
                       ELSE '[]' END
              ) j
         WHERE j.type = 'text' AND j.value <> '';",
        Vec::new(),
    )?;
    ctx.log(&format!("back-filled {copied} pathway completions"));
    Ok(())
}

/// Fans each legacy inline `concepts_completed` entry out into its own
/// completion record. The legacy field stays in place.
pub(super) fn normalize_pathway_completions_kv(ctx: &KeyValueContext<'_>) -> StorageResult<()> {
    let Some(progress) = read_object(ctx, KV_PATHWAY_PROGRESS)? else {
        ctx.log("no stored pathway progress");
        return Ok(());
    };
    let mut completions = read_object(ctx, KV_PATHWAY_COMPLETIONS)?.unwrap_or_default();
    let fallback_time = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let mut created = 0;
    for (pathway_id, record) in &progress {
        let Value::Object(fields) = record else {
            continue;
        };
        let Some(Value::Array(concepts)) = fields.get("concepts_completed") else {
            continue;
        };
        let completed_at = fields
            .get("completed_at")
            .and_then(Value::as_str)
            .or_else(|| fields.get("started_at").and_then(Value::as_str))
            .unwrap_or(fallback_time.as_str())
            .to_string();

        for concept_id in concepts
            .iter()
            .filter_map(Value::as_str)
            .filter(|concept_id| !concept_id.is_empty())
        {
            let key = completion_key(pathway_id, concept_id);
            if completions.contains_key(&key) {
                continue;
            }
            let mut completion = Map::new();
            completion.insert("pathway_id".to_string(), Value::from(pathway_id.as_str()));
            completion.insert("concept_id".to_string(), Value::from(concept_id));
            completion.insert("completed_at".to_string(), Value::from(completed_at.as_str()));
            completions.insert(key, Value::Object(completion));
            created += 1;
        }
    }

    write_object(ctx, KV_PATHWAY_COMPLETIONS, completions)?;
    ctx.log(&format!("fanned out {created} pathway completions"));
    Ok(())
}

fn read_object(ctx: &KeyValueContext<'_>, key: &str) -> StorageResult<Option<Map<String, Value>>> {
    let Some(raw) = ctx.get_value(key)? else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(&raw)? {
        Value::Object(map) => Ok(Some(map)),
        other => Err(StorageError::Corrupt {
            key: key.to_string(),
            message: format!("expected object, found {}", json_type_name(&other)),
        }),
    }
}

fn write_object(ctx: &KeyValueContext<'_>, key: &str, map: Map<String, Value>) -> StorageResult<()> {
    ctx.set_value(key, &Value::Object(map).to_string())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
