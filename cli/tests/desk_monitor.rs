use std::path::Path;
use std::path::PathBuf;

use anyhow::Result;
use predicates::str::contains;
use pretty_assertions::assert_eq;
use serde_json::Value as JsonValue;
use serde_json::json;
use tempfile::TempDir;

const CONFIG: &str = r#"
[monitor]
debounce_ms = 0

[user]
identity = "editor-1"

[[groups]]
id = "s1"
kind = "stage"
stage = "s1"

[[groups]]
id = "news:output"
kind = "desk_output"
desk = "news"
desk_type = "production"
"#;

fn desk_monitor() -> Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("desk-monitor")?;
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("DESK_MONITOR_DEBOUNCE_MS");
    cmd.env_remove("DESK_MONITOR_AUTOREFRESH");
    Ok(cmd)
}

fn write(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, contents)?;
    Ok(path)
}

fn story(id: &str, created: &str) -> JsonValue {
    json!({
        "repo": "archive",
        "item": {
            "id": id,
            "fields": {
                "task": { "desk": "news", "stage": "s1" },
                "state": "in_progress",
                "headline": format!("story {id}"),
                "versioncreated": created
            }
        }
    })
}

fn events(stdout: &[u8]) -> Result<Vec<JsonValue>> {
    let text = String::from_utf8(stdout.to_vec())?;
    text.lines()
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}

fn window_ids(event: &JsonValue) -> Vec<String> {
    event["window"]["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn groups_lists_configured_groups() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write(dir.path(), "desk.toml", CONFIG)?;

    desk_monitor()?
        .args(["groups", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("s1"))
        .stdout(contains("news:output"))
        .stdout(contains("desk_output"));
    Ok(())
}

#[test]
fn compile_prints_criteria_for_one_group() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write(dir.path(), "desk.toml", CONFIG)?;

    let output = desk_monitor()?
        .args(["compile", "--config"])
        .arg(&config)
        .args(["--group", "news:output", "--query", "flood", "--facet", "urgency=1,2"])
        .output()?;
    assert!(output.status.success());
    let criteria: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(criteria["query"], JsonValue::Null);
    assert_eq!(criteria["highlight"], json!(true));
    assert_eq!(criteria["size"], json!(25));
    assert_eq!(
        criteria["routing"],
        json!({ "mode": "fan_out", "repos": ["archive", "published"] })
    );
    assert!(
        criteria["post_filters"]
            .as_array()
            .is_some_and(|filters| !filters.is_empty())
    );
    Ok(())
}

#[test]
fn compile_rejects_unknown_group() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write(dir.path(), "desk.toml", CONFIG)?;

    desk_monitor()?
        .args(["compile", "--config"])
        .arg(&config)
        .args(["--group", "sports"])
        .assert()
        .failure()
        .stderr(contains("group sports is not configured"));
    Ok(())
}

#[test]
fn invalid_config_is_reported() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write(dir.path(), "desk.toml", "[user]\nidentity = \"\"\n")?;

    desk_monitor()?
        .args(["groups", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(contains("identity must not be empty"));
    Ok(())
}

#[test]
fn replay_prints_window_events() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write(dir.path(), "desk.toml", CONFIG)?;
    let store = write(
        dir.path(),
        "store.json",
        &json!([story("a", "2024-05-01T10:00:00"), story("b", "2024-05-01T11:00:00")])
            .to_string(),
    )?;
    let script = write(
        dir.path(),
        "script.json",
        &json!([
            { "step": "preview", "item": { "id": "a", "stage": "s1", "desk": "news" } },
            { "step": "upsert", "item": story("c", "2024-05-01T12:00:00")["item"] },
            { "step": "signal", "signal": { "kind": "content_update", "stages": ["s1"] } },
            { "step": "wait", "ms": 300 },
            { "step": "apply_pending", "group": "s1" }
        ])
        .to_string(),
    )?;

    let output = desk_monitor()?
        .args(["replay", "--config"])
        .arg(&config)
        .arg("--store")
        .arg(&store)
        .arg("--script")
        .arg(&script)
        .output()?;
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let events = events(&output.stdout)?;
    let s1: Vec<&JsonValue> = events.iter().filter(|event| event["group"] == "s1").collect();
    assert_eq!(s1.first().map(|event| window_ids(event)), Some(vec!["b".to_string(), "a".to_string()]));
    assert!(s1.iter().any(|event| {
        event["event"] == "refresh_available" && event["pending_count"] == json!(1)
    }));
    assert_eq!(
        s1.last().map(|event| window_ids(event)),
        Some(vec!["c".to_string(), "b".to_string(), "a".to_string()])
    );
    Ok(())
}
