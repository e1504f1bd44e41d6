#![cfg(target_arch = "wasm32")]

use wasm_bindgen_test::*;

use waterfall_crawler::{GameEngine, GameState, RuleResolution, Snapshot};

#[wasm_bindgen_test]
fn engine_starts_with_dealt_rows() {
    let engine = GameEngine::new(None, Some(3)).expect("engine");
    let state: GameState =
        serde_json::from_str(&engine.state_json().expect("state json")).expect("state");
    assert_eq!(state.active_occupancy(), 5);
    assert_eq!(state.preview_occupancy(), 5);
}

#[wasm_bindgen_test]
fn rejected_command_surfaces_a_reason() {
    let mut engine = GameEngine::new(None, Some(3)).expect("engine");
    let before = engine.state_json().expect("state json");
    let result = engine.apply_command_json(r#"{"type":"end_turn"}"#);
    assert!(result.is_err());
    assert_eq!(engine.state_json().expect("state json"), before);
}

#[wasm_bindgen_test]
fn hero_skill_command_round_trips() {
    let mut engine = GameEngine::new(Some(r#"{"rules":{"base_max_hp":12}}"#.into()), Some(8))
        .expect("engine");
    let json = engine
        .apply_command_json(r#"{"type":"select_hero_skill","skill":"vitality"}"#)
        .expect("select skill");
    let resolution: RuleResolution = serde_json::from_str(&json).expect("resolution");
    assert_eq!(resolution.state.hero_skill.map(|_| ()), Some(()));
    assert_eq!(engine.max_hp().expect("max hp"), 17);
}

#[wasm_bindgen_test]
fn snapshot_reloads() {
    let mut engine = GameEngine::new(None, Some(21)).expect("engine");
    let saved = engine.snapshot_json().expect("snapshot");
    let snapshot = Snapshot::from_json(&saved).expect("parse");
    assert_eq!(snapshot.version, waterfall_crawler::SNAPSHOT_VERSION);

    engine.restart().expect("restart");
    engine.load_snapshot_json(&saved).expect("load");
    assert_eq!(engine.snapshot_json().expect("snapshot"), saved);
}

#[wasm_bindgen_test]
fn config_errors_are_reported() {
    assert!(GameEngine::new(Some(r#"{"rules":{"hero_attacks_per_turn":0}}"#.into()), None).is_err());
}
