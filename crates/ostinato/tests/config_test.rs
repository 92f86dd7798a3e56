/// Integration tests for loading configuration and move files from disk
use anyhow::Result;
use ostinato::{config, moves, simulate};
use std::fs;

const CONFIG_TOML: &str = r#"
[generator]
horizon = 0.5

[[steppers]]
name = "a"
step_distance = 0.25
kinematics = { kind = "corexy", sign = "+" }

[[steppers]]
name = "b"
step_distance = 0.25
kinematics = { kind = "corexy", sign = "-" }
"#;

const MOVES_JSON: &str = r#"[
    {"start_time": 0.0, "duration": 1.0, "start_pos": [0, 0, 0], "start_v": [1, 1, 0]},
    {"start_time": 2.0, "duration": 1.0, "start_pos": [1, 1, 0], "start_v": [1, -1, 0]}
]"#;

#[test]
fn test_load_toml_config() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("kernel.toml");
    fs::write(&path, CONFIG_TOML)?;

    let config = config::load(&path)?;
    assert_eq!(config.steppers.len(), 2);
    assert_eq!(config.generator.horizon, 0.5);
    Ok(())
}

#[test]
fn test_detects_json_without_extension() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("kernel.conf");
    fs::write(
        &path,
        r#"{"steppers": [{"name": "x", "step_distance": 0.01,
            "kinematics": {"kind": "cartesian", "axis": "x"}}]}"#,
    )?;

    let config = config::load(&path)?;
    assert_eq!(config.steppers[0].name, "x");
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("kernel.toml");
    fs::write(
        &path,
        r#"
        [[steppers]]
        name = "x"
        step_distance = 0.0
        kinematics = { kind = "cartesian", axis = "x" }
        "#,
    )?;

    let err = config::load(&path).unwrap_err();
    assert!(err.to_string().starts_with("invalid config"));
    assert!(format!("{err:#}").contains("steppers.x.step_distance"));
    Ok(())
}

#[test]
fn test_missing_file_names_path() {
    let err = config::load("/nonexistent/kernel.toml").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/kernel.toml"));
}

#[test]
fn test_generate_from_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config_path = dir.path().join("kernel.toml");
    let moves_path = dir.path().join("moves.json");
    fs::write(&config_path, CONFIG_TOML)?;
    fs::write(&moves_path, MOVES_JSON)?;

    let config = config::load(&config_path)?;
    let moves = moves::from_file(&moves_path)?;
    let until = moves::end_time(&moves);
    assert_eq!(until, 3.0);

    let outputs = simulate::run(&config, &moves, until, &mut ())?;
    // first move drives only the plus belt, the second only the minus belt
    let a = &outputs[0];
    let b = &outputs[1];
    assert_eq!((a.name.as_str(), a.steps, a.position), ("a", 8, 2.0));
    assert_eq!((b.name.as_str(), b.steps, b.position), ("b", 8, 2.0));
    assert!(a.events.iter().all(|e| e.time() <= 1.0));
    assert!(b.events.iter().all(|e| e.time() >= 2.0));

    let json = serde_json::to_value(&outputs)?;
    assert_eq!(json[0]["events"][1]["kind"], "step");
    assert_eq!(json[0]["events"][1]["dir"], "forward");
    assert!(json[0].get("fault").is_none());
    Ok(())
}
