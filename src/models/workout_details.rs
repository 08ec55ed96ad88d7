use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::AppError;

pub const VERSION_250424: i64 = 250424;
pub const VERSION_250627: i64 = 250627;

pub const UNIT_KG: &str = "公斤";
pub const UNIT_LB: &str = "磅";
pub const UNIT_COUNT: &str = "次";
pub const UNIT_SECOND: &str = "秒";

const LB_TO_KG: f64 = 0.45;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document has no version field")]
    MissingVersion,
    #[error("unsupported document version {0}")]
    UnsupportedVersion(String),
}

impl DocumentError {
    /// Request payloads are the caller's fault.
    pub fn into_bad_request(self) -> AppError {
        AppError::bad_request(self.to_string())
    }
}

/// Stored documents failing to parse are surfaced, never repaired.
impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        AppError::malformed(err.to_string())
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Converts a weight to kilograms. Unknown or empty units pass through.
pub fn normalize_weight(weight: f64, unit: &str) -> f64 {
    match unit {
        UNIT_LB => round1(weight * LB_TO_KG),
        _ => weight,
    }
}

// Lenient scalars: legacy clients send numbers as strings and vice versa.

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

fn parse_number_text(text: &str) -> Result<f64, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| format!("expected a number, got {trimmed:?}"))
}

fn flexible_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(0.0),
        Some(Scalar::Int(n)) => Ok(n as f64),
        Some(Scalar::Float(n)) => Ok(n),
        Some(Scalar::Text(s)) => parse_number_text(&s).map_err(serde::de::Error::custom),
        Some(Scalar::Bool(_)) => Err(serde::de::Error::custom("expected a number, got a boolean")),
    }
}

fn flexible_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    flexible_f64(deserializer).map(|n| n.round() as i64)
}

fn flexible_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(String::new()),
        Some(Scalar::Int(n)) => Ok(n.to_string()),
        Some(Scalar::Float(n)) => Ok(n.to_string()),
        Some(Scalar::Text(s)) => Ok(s),
        Some(Scalar::Bool(b)) => Ok(b.to_string()),
    }
}

fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Scalar::Bool(b)) => Ok(b),
        Some(Scalar::Int(n)) => Ok(n != 0),
        Some(Scalar::Float(n)) => Ok(n != 0.0),
        Some(Scalar::Text(s)) => Ok(matches!(s.trim(), "true" | "1")),
    }
}

/// A quantity with its unit, e.g. `{num: 20, unit: "公斤"}`.
///
/// Deserializes from the object form, a bare number, or a numeric string;
/// the scalar forms leave `unit` empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Measure {
    pub num: f64,
    pub unit: String,
}

impl Measure {
    pub fn new(num: f64, unit: &str) -> Self {
        Self {
            num,
            unit: unit.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for Measure {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Object {
            #[serde(default, deserialize_with = "flexible_f64")]
            num: f64,
            #[serde(default, deserialize_with = "flexible_string")]
            unit: String,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Object(Object),
            Scalar(Scalar),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(Measure::default()),
            Some(Raw::Object(o)) => Ok(Measure {
                num: o.num,
                unit: o.unit,
            }),
            Some(Raw::Scalar(Scalar::Int(n))) => Ok(Measure::new(n as f64, "")),
            Some(Raw::Scalar(Scalar::Float(n))) => Ok(Measure::new(n, "")),
            Some(Raw::Scalar(Scalar::Text(s))) => parse_number_text(&s)
                .map(|n| Measure::new(n, ""))
                .map_err(serde::de::Error::custom),
            Some(Raw::Scalar(Scalar::Bool(_))) => {
                Err(serde::de::Error::custom("expected a measure, got a boolean"))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRef {
    #[serde(default, deserialize_with = "flexible_i64")]
    pub id: i64,
    #[serde(default, deserialize_with = "flexible_string")]
    pub zh_name: String,
}

// Canonical (250627) plan content.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDetails {
    pub v: i64,
    pub steps: Vec<PlanStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default, deserialize_with = "flexible_string")]
    pub step_uid: String,
    #[serde(default)]
    pub set_type: Value,
    #[serde(default, deserialize_with = "flexible_i64")]
    pub set_count: i64,
    #[serde(default)]
    pub set_rest_duration: Measure,
    #[serde(default)]
    pub set_weight: Measure,
    #[serde(default, deserialize_with = "flexible_string")]
    pub set_note: String,
    #[serde(default)]
    pub set_tags: Vec<Value>,
    #[serde(default)]
    pub actions: Vec<PlanAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanAction {
    #[serde(default)]
    pub action: ActionRef,
    #[serde(default)]
    pub reps: Measure,
    #[serde(default)]
    pub weight: Measure,
    #[serde(default)]
    pub rest_duration: Measure,
}

// 250424 plan content.

#[derive(Debug, Deserialize)]
struct LegacyPlanStep {
    #[serde(default)]
    set_type: Value,
    #[serde(default, deserialize_with = "flexible_i64")]
    set_count: i64,
    #[serde(default, deserialize_with = "flexible_f64")]
    set_rest_duration: f64,
    #[serde(default, deserialize_with = "flexible_f64")]
    set_weight: f64,
    #[serde(default, deserialize_with = "flexible_string")]
    set_note: String,
    #[serde(default)]
    actions: Vec<LegacyPlanAction>,
}

#[derive(Debug, Deserialize)]
struct LegacyPlanAction {
    #[serde(default, deserialize_with = "flexible_i64")]
    action_id: i64,
    #[serde(default)]
    action: Option<ActionRef>,
    #[serde(default, deserialize_with = "flexible_f64")]
    reps: f64,
    #[serde(default, deserialize_with = "flexible_string")]
    reps_unit: String,
    #[serde(default, deserialize_with = "flexible_f64")]
    weight: f64,
    #[serde(default, deserialize_with = "flexible_f64")]
    rest_duration: f64,
}

impl LegacyPlanStep {
    fn upgrade(self, index: usize) -> PlanStep {
        PlanStep {
            step_uid: format!("step-{index}"),
            set_type: self.set_type,
            set_count: self.set_count,
            set_rest_duration: Measure::new(self.set_rest_duration, UNIT_SECOND),
            set_weight: Measure::new(self.set_weight, UNIT_KG),
            set_note: self.set_note,
            set_tags: Vec::new(),
            actions: self
                .actions
                .into_iter()
                .map(|a| {
                    let mut action = a.action.unwrap_or_default();
                    if action.id == 0 {
                        action.id = a.action_id;
                    }
                    let reps_unit = reps_unit_or_count(a.reps_unit);
                    PlanAction {
                        action,
                        reps: Measure {
                            num: a.reps,
                            unit: reps_unit,
                        },
                        weight: Measure::new(a.weight, UNIT_KG),
                        rest_duration: Measure::new(a.rest_duration, UNIT_SECOND),
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LegacyPlanDocument {
    #[serde(default)]
    steps: Vec<LegacyPlanStep>,
}

#[derive(Debug, Deserialize)]
struct CurrentPlanDocument {
    #[serde(default)]
    steps: Vec<PlanStep>,
}

fn read_version(value: &Value) -> Result<i64, DocumentError> {
    let raw = value.get("v").ok_or(DocumentError::MissingVersion)?;
    let version = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match version {
        Some(v @ (VERSION_250424 | VERSION_250627)) => Ok(v),
        _ => Err(DocumentError::UnsupportedVersion(raw.to_string())),
    }
}

fn upgrade_plan_steps(version: i64, value: Value) -> Result<Vec<PlanStep>, DocumentError> {
    if version == VERSION_250424 {
        let doc: LegacyPlanDocument = serde_json::from_value(value)?;
        return Ok(doc
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| step.upgrade(i))
            .collect());
    }

    let doc: CurrentPlanDocument = serde_json::from_value(value)?;
    Ok(doc
        .steps
        .into_iter()
        .enumerate()
        .map(|(i, mut step)| {
            if step.step_uid.is_empty() {
                step.step_uid = format!("step-{i}");
            }
            step
        })
        .collect())
}

impl PlanDetails {
    pub fn empty() -> Self {
        Self {
            v: VERSION_250627,
            steps: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DocumentError> {
        if raw.trim().is_empty() {
            return Ok(Self::empty());
        }
        Self::from_value(serde_json::from_str(raw)?)
    }

    /// Accepts either version and normalizes to 250627. A JSON string
    /// holding an encoded document is unwrapped first.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        if let Value::String(encoded) = &value {
            return Self::parse(encoded);
        }
        let version = read_version(&value)?;
        Ok(Self {
            v: VERSION_250627,
            steps: upgrade_plan_steps(version, value)?,
        })
    }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string(self)?)
    }
}

// Progress documents.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub v: i64,
    pub steps: Vec<PlanStep>,
    pub sets: Vec<ProgressSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSet {
    pub step_uid: String,
    pub set_uid: String,
    pub actions: Vec<ProgressAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressAction {
    pub act_uid: String,
    pub action: ActionRef,
    pub reps: f64,
    pub reps_unit: String,
    pub weight: f64,
    pub weight_unit: String,
    pub completed: bool,
    pub completed_at: i64,
}

#[derive(Debug, Deserialize)]
struct LegacyProgressSet {
    #[serde(default, deserialize_with = "flexible_i64")]
    step_idx: i64,
    #[serde(default, deserialize_with = "flexible_i64")]
    set_idx: i64,
    #[serde(default)]
    actions: Vec<LegacyProgressAction>,
}

#[derive(Debug, Deserialize)]
struct LegacyProgressAction {
    #[serde(default, deserialize_with = "flexible_i64")]
    action_id: i64,
    #[serde(default, deserialize_with = "flexible_f64")]
    reps: f64,
    #[serde(default, deserialize_with = "flexible_string")]
    reps_unit: String,
    #[serde(default, deserialize_with = "flexible_f64")]
    weight: f64,
    #[serde(default, deserialize_with = "flexible_string")]
    weight_unit: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    completed: bool,
    #[serde(default, deserialize_with = "flexible_i64")]
    completed_at: i64,
}

#[derive(Debug, Deserialize)]
struct CurrentProgressSet {
    #[serde(default, deserialize_with = "flexible_string")]
    step_uid: String,
    #[serde(default, deserialize_with = "flexible_string")]
    set_uid: String,
    #[serde(default)]
    actions: Vec<CurrentProgressAction>,
}

#[derive(Debug, Deserialize)]
struct CurrentProgressAction {
    #[serde(default, deserialize_with = "flexible_string")]
    act_uid: String,
    #[serde(default)]
    action: Option<ActionRef>,
    #[serde(default, deserialize_with = "flexible_i64")]
    action_id: i64,
    #[serde(default)]
    reps: Measure,
    #[serde(default)]
    reps_unit: Option<String>,
    #[serde(default)]
    weight: Measure,
    #[serde(default)]
    weight_unit: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    completed: bool,
    #[serde(default, deserialize_with = "flexible_i64")]
    completed_at: i64,
}

/// An explicit `*_unit` field wins over the unit carried by the measure.
fn resolve_unit(explicit: Option<String>, measure: &Measure) -> String {
    match explicit {
        Some(unit) if !unit.is_empty() => unit,
        _ => measure.unit.clone(),
    }
}

#[derive(Debug, Deserialize)]
struct LegacyProgressDocument {
    #[serde(default)]
    sets: Vec<LegacyProgressSet>,
}

#[derive(Debug, Deserialize)]
struct CurrentProgressDocument {
    #[serde(default)]
    sets: Vec<CurrentProgressSet>,
}

fn action_name(steps: &[PlanStep], step_idx: usize, action_id: i64) -> String {
    steps
        .get(step_idx)
        .and_then(|step| step.actions.iter().find(|a| a.action.id == action_id))
        .map(|a| a.action.zh_name.clone())
        .unwrap_or_default()
}

impl Progress {
    pub fn empty() -> Self {
        Self {
            v: VERSION_250627,
            steps: Vec::new(),
            sets: Vec::new(),
        }
    }

    /// Parses a stored progress document. An empty column means nothing
    /// has been saved yet.
    pub fn parse(raw: &str) -> Result<Self, DocumentError> {
        if raw.trim().is_empty() {
            return Ok(Self::empty());
        }
        let value: Value = serde_json::from_str(raw)?;
        let version = read_version(&value)?;
        let steps = upgrade_plan_steps(version, value.clone())?;

        let sets = if version == VERSION_250424 {
            let doc: LegacyProgressDocument = serde_json::from_value(value)?;
            doc.sets
                .into_iter()
                .map(|set| {
                    let (i, j) = (set.step_idx, set.set_idx);
                    let actions = set
                        .actions
                        .into_iter()
                        .enumerate()
                        .map(|(k, a)| ProgressAction {
                            act_uid: format!("act-{i}-{j}-{k}"),
                            action: ActionRef {
                                id: a.action_id,
                                zh_name: action_name(&steps, i.max(0) as usize, a.action_id),
                            },
                            reps: a.reps,
                            reps_unit: reps_unit_or_count(a.reps_unit),
                            weight: a.weight,
                            weight_unit: a.weight_unit,
                            completed: a.completed,
                            completed_at: a.completed_at,
                        })
                        .collect();
                    ProgressSet {
                        step_uid: format!("step-{i}"),
                        set_uid: format!("set-{i}-{j}"),
                        actions,
                    }
                })
                .collect()
        } else {
            let doc: CurrentProgressDocument = serde_json::from_value(value)?;
            doc.sets
                .into_iter()
                .map(|set| ProgressSet {
                    step_uid: set.step_uid,
                    set_uid: set.set_uid,
                    actions: set
                        .actions
                        .into_iter()
                        .map(|a| {
                            let mut action = a.action.unwrap_or_default();
                            if action.id == 0 {
                                action.id = a.action_id;
                            }
                            ProgressAction {
                                act_uid: a.act_uid,
                                action,
                                reps: a.reps.num,
                                reps_unit: resolve_unit(a.reps_unit, &a.reps),
                                weight: a.weight.num,
                                weight_unit: resolve_unit(a.weight_unit, &a.weight),
                                completed: a.completed,
                                completed_at: a.completed_at,
                            }
                        })
                        .collect(),
                })
                .collect()
        };

        Ok(Self {
            v: VERSION_250627,
            steps,
            sets,
        })
    }

    pub fn completed_actions(&self) -> impl Iterator<Item = (&ProgressSet, &ProgressAction)> {
        self.sets
            .iter()
            .flat_map(|set| set.actions.iter().map(move |action| (set, action)))
            .filter(|(_, action)| action.completed)
    }

    /// Σ reps × kg over completed count-unit actions, rounded to 0.1.
    pub fn total_volume(&self) -> f64 {
        let sum: f64 = self
            .completed_actions()
            .map(|(_, a)| action_volume(a.reps, &a.reps_unit, a.weight, &a.weight_unit))
            .sum();
        round1(sum)
    }

    /// One history entry per completed action. Actions without a usable
    /// completion time are stamped with `now`.
    pub fn history_entries(&self, now: DateTime<Utc>) -> Vec<HistoryEntry> {
        self.completed_actions()
            .map(|(set, a)| HistoryEntry {
                workout_action_id: a.action.id,
                action_name: a.action.zh_name.clone(),
                reps: a.reps.round() as i32,
                reps_unit: a.reps_unit.clone(),
                weight: a.weight,
                weight_unit: a.weight_unit.clone(),
                step_uid: set.step_uid.clone(),
                set_uid: set.set_uid.clone(),
                act_uid: a.act_uid.clone(),
                completed_at: DateTime::from_timestamp(a.completed_at, 0)
                    .filter(|_| a.completed_at > 0)
                    .unwrap_or(now),
            })
            .collect()
    }
}

/// Legacy documents leave the reps unit blank for counted reps.
fn reps_unit_or_count(unit: String) -> String {
    if unit.is_empty() {
        UNIT_COUNT.to_string()
    } else {
        unit
    }
}

pub fn action_volume(reps: f64, reps_unit: &str, weight: f64, weight_unit: &str) -> f64 {
    if reps_unit == UNIT_COUNT {
        reps * normalize_weight(weight, weight_unit)
    } else {
        0.0
    }
}

/// A completed set action about to be written as a history row.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub workout_action_id: i64,
    pub action_name: String,
    pub reps: i32,
    pub reps_unit: String,
    pub weight: f64,
    pub weight_unit: String,
    pub step_uid: String,
    pub set_uid: String,
    pub act_uid: String,
    pub completed_at: DateTime<Utc>,
}
