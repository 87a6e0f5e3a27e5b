#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// スタックファイルを置いた一時プロジェクト
fn project(kdl: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("stack.kdl"), kdl).unwrap();
    fs::create_dir(dir.path().join("config")).unwrap();
    dir
}

/// ユーザー設定と環境変数の影響を受けない tier コマンド
fn tier(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tier").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("TIERFLOW_STACK_PATH")
        .env("XDG_CONFIG_HOME", dir.path().join("config"))
        .env("NO_COLOR", "1");
    cmd
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("tier").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("インフラは、依存グラフになった"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("destroy"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("tier").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tierflow"));
}

/// planコマンドのヘルプに --replace が出ることを確認
#[test]
fn test_plan_help() {
    let mut cmd = Command::cargo_bin("tier").unwrap();
    cmd.arg("plan")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--replace"))
        .stdout(predicate::str::contains("--engine"));
}

/// 不正なコマンドでエラーになることを確認
#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("tier").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

/// スタックファイルがなければエラー
#[test]
fn test_validate_without_stack_file() {
    let dir = tempfile::tempdir().unwrap();
    tier(&dir).arg("validate").assert().failure();
}

#[test]
fn test_validate_default_stack() {
    let dir = project(r#"stack "demo""#);
    tier(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("スタックは正常です"))
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("aws_db_instance"));
}

/// マルチ AZ の DB を単一 AZ のサブネットに置くと検証エラー
#[test]
fn test_validate_single_az_database_fails() {
    let dir = project(
        r#"
        stack "single"
        network {
            public-subnet "a" cidr="15.32.1.0/25" az="us-west-2a"
        }
    "#,
    );
    tier(&dir)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("subnet-group"));
}

#[test]
fn test_file_option() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.kdl");
    fs::write(&path, r#"stack "custom""#).unwrap();

    tier(&dir)
        .arg("--file")
        .arg(&path)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("custom"));
}

#[test]
fn test_synth_writes_document() {
    let dir = project(r#"stack "demo""#);
    tier(&dir).arg("synth").assert().success();

    let path = dir.path().join("out").join("demo").join("main.tf.json");
    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert!(doc["resource"]["aws_vpc"].is_object());
    assert_eq!(doc["output"].as_object().unwrap().len(), 17);
}

#[test]
fn test_graph_dot() {
    let dir = project(r#"stack "demo""#);
    tier(&dir)
        .args(["graph", "--format", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("digraph resources"));
}

#[test]
fn test_graph_text_lists_waves() {
    let dir = project(r#"stack "demo""#);
    tier(&dir)
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wave 1"));
}

#[test]
fn test_plan_fresh_stack() {
    let dir = project(r#"stack "demo""#);
    tier(&dir)
        .args(["plan", "--engine", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("38 to create"));
}

/// --yes がなければ何も適用しない
#[test]
fn test_apply_requires_yes() {
    let dir = project(r#"stack "demo""#);
    tier(&dir)
        .args(["apply", "--engine", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));

    assert!(!dir.path().join(".tierflow/demo/state.json").exists());
}

#[test]
fn test_apply_then_plan_has_no_changes() {
    let dir = project(r#"stack "demo""#);
    tier(&dir)
        .args(["apply", "--engine", "local", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("適用が完了しました"));
    assert!(dir.path().join(".tierflow/demo/state.json").exists());

    tier(&dir)
        .args(["plan", "--engine", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("変更はありません"))
        .stdout(predicate::str::contains("38 unchanged"));
}

#[test]
fn test_plan_replace_unknown_address_fails() {
    let dir = project(r#"stack "demo""#);
    tier(&dir)
        .args(["plan", "--engine", "local", "--replace", "aws_vpc.missing"])
        .assert()
        .failure();
}

#[test]
fn test_output_json_after_apply() {
    let dir = project(r#"stack "demo""#);
    tier(&dir)
        .args(["apply", "--engine", "local", "--yes"])
        .assert()
        .success();

    let output = tier(&dir)
        .args(["output", "--engine", "local", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let outputs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(outputs["vpc_id"].as_str().unwrap().starts_with("vpc-"));
}

#[test]
fn test_output_text() {
    let dir = project(r#"stack "demo""#);
    tier(&dir)
        .args(["apply", "--engine", "local", "--yes"])
        .assert()
        .success();

    tier(&dir)
        .args(["output", "--engine", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vpc_id = vpc-"))
        .stdout(predicate::str::contains("db_instance_endpoint = "));
}

#[test]
fn test_destroy_removes_everything() {
    let dir = project(r#"stack "demo""#);
    tier(&dir)
        .args(["apply", "--engine", "local", "--yes"])
        .assert()
        .success();

    tier(&dir)
        .args(["destroy", "--engine", "local", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("38 to delete"));

    tier(&dir)
        .args(["plan", "--engine", "local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("38 to create"));
}
