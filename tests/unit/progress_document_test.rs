use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

use fithub::models::{Progress, UNIT_COUNT, UNIT_KG, UNIT_LB, VERSION_250627};

#[test]
fn test_legacy_progress_is_upgraded() {
    let raw = json!({
        "v": "250424",
        "steps": [{
            "set_count": 2,
            "set_weight": 20,
            "actions": [{"action_id": 7, "action": {"id": 7, "zh_name": "深蹲"}, "reps": 10}]
        }],
        "sets": [
            {"step_idx": 0, "set_idx": 0, "actions": [
                {"action_id": 7, "reps": "10", "reps_unit": "次", "weight": "20", "weight_unit": "公斤", "completed": 1, "completed_at": 1751000000}
            ]},
            {"step_idx": 0, "set_idx": 1, "actions": [
                {"action_id": 7, "reps": 8, "reps_unit": "次", "weight": 50, "weight_unit": "磅", "completed": "true"}
            ]}
        ]
    })
    .to_string();

    let progress = Progress::parse(&raw).unwrap();
    assert_eq!(progress.v, VERSION_250627);
    assert_eq!(progress.steps[0].step_uid, "step-0");
    assert_eq!(progress.sets[1].set_uid, "set-0-1");

    let first = &progress.sets[0].actions[0];
    assert_eq!(first.act_uid, "act-0-0-0");
    assert_eq!(first.action.zh_name, "深蹲");
    assert_eq!(first.reps_unit, UNIT_COUNT);
    assert_eq!(first.weight_unit, UNIT_KG);
    assert!(first.completed);

    assert_eq!(progress.sets[1].actions[0].weight_unit, UNIT_LB);
    // 10 × 20 + 8 × round1(50 × 0.45)
    assert_eq!(progress.total_volume(), 380.0);
}

#[test]
fn test_history_entries_cover_completed_actions_only() {
    let raw = json!({
        "v": 250627,
        "steps": [],
        "sets": [{"step_uid": "s1", "set_uid": "s1-a", "actions": [
            {"act_uid": "a0", "action": {"id": 3, "zh_name": "卧推"}, "reps": {"num": 5, "unit": "次"}, "weight": {"num": 60, "unit": "公斤"}, "completed": true, "completed_at": 0},
            {"act_uid": "a1", "action_id": 3, "reps": 5, "reps_unit": "次", "weight": 60, "weight_unit": "公斤", "completed": false}
        ]}]
    })
    .to_string();

    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let progress = Progress::parse(&raw).unwrap();
    let entries = progress.history_entries(now);

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].act_uid, "a0");
    assert_eq!(entries[0].action_name, "卧推");
    assert_eq!(entries[0].reps, 5);
    assert_eq!(entries[0].weight, 60.0);
    assert_eq!(progress.total_volume(), 300.0);
}

#[test]
fn test_time_based_reps_carry_no_volume() {
    let raw = json!({
        "v": 250627,
        "sets": [{"step_uid": "s1", "set_uid": "s1-a", "actions": [
            {"act_uid": "a0", "action_id": 9, "reps": {"num": 60, "unit": "秒"}, "weight": 10, "weight_unit": "公斤", "completed": true}
        ]}]
    })
    .to_string();

    assert_eq!(Progress::parse(&raw).unwrap().total_volume(), 0.0);
}

#[test]
fn test_empty_and_unknown_documents() {
    assert!(Progress::parse("  ").unwrap().sets.is_empty());
    assert!(Progress::parse(r#"{"v": 1}"#).is_err());
    assert!(Progress::parse(r#"{"steps": []}"#).is_err());
    assert!(Progress::parse("not json").is_err());
}
