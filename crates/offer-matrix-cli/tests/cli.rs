// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end runs of the `offer-matrix` binary.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

const OFFERS: &str = r#"[
  {"source_file":"bta.pdf","insurer":"BTA","programs":[
    {"program_code":"B1","premium_eur":"120,50","features":{"MR":"v","Homeopāts":"nav"}}]},
  {"source_file":"ergo.pdf","insurer":"ERGO","programs":[
    {"program_code":"E1","premium_eur":99,"features":{"Augsto tehnoloģiju izmeklējumi":"v"}}]}
]"#;

fn offer_matrix() -> Command {
    Command::cargo_bin("offer-matrix").unwrap()
}

fn offers_file(dir: &Path) -> PathBuf {
    let file = dir.join("offers.json");
    fs::write(&file, OFFERS).unwrap();
    file
}

fn encode_hidden(labels: &[&str]) -> String {
    let mut cmd = offer_matrix();
    cmd.args(["token", "encode"]);
    for label in labels {
        cmd.args(["--hidden", label]);
    }
    let out = cmd.output().unwrap();
    assert!(out.status.success());
    String::from_utf8(out.stdout).unwrap().trim().to_string()
}

#[test]
fn renders_aliases_on_one_row() {
    let dir = tempfile::tempdir().unwrap();
    offer_matrix()
        .arg("render")
        .arg(offers_file(dir.path()))
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Augsto tehnoloģiju izmeklējumi")
                .and(predicate::str::contains("ERGO"))
                .and(predicate::str::contains("120.50")),
        );
}

#[test]
fn hidden_token_hides_rows() {
    let dir = tempfile::tempdir().unwrap();
    let file = offers_file(dir.path());
    let token = encode_hidden(&["Homeopātija"]);

    offer_matrix()
        .arg("render")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Homeopāts"));
    offer_matrix()
        .arg("render")
        .arg(&file)
        .args(["--hidden-token", &token])
        .assert()
        .success()
        .stdout(predicate::str::contains("Homeopāts").not());
}

#[test]
fn saved_preferences_apply_to_render() {
    let dir = tempfile::tempdir().unwrap();
    let file = offers_file(dir.path());
    let config = dir.path().join("config");

    offer_matrix()
        .args(["prefs", "save", "Acme", "--hidden", "Homeopāts", "--config-dir"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("saved preferences for Acme"));
    assert!(config.join("offer-matrix.acme.json").exists());

    offer_matrix()
        .args(["prefs", "show", "Acme", "--config-dir"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Homeopāts"));

    offer_matrix()
        .arg("render")
        .arg(&file)
        .args(["--namespace", "Acme", "--config-dir"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Homeopāts").not());
}

#[test]
fn showing_missing_preferences_fails() {
    let dir = tempfile::tempdir().unwrap();
    offer_matrix()
        .args(["prefs", "show", "Nobody", "--config-dir"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no preferences saved"));
}

#[test]
fn tokens_round_trip_non_ascii_labels() {
    let token = encode_hidden(&["Homeopāts", "Sporta ārsts"]);
    offer_matrix()
        .args(["token", "decode", &token])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Homeopāts").and(predicate::str::contains("Sporta ārsts")),
        );
}

#[test]
fn malformed_tokens_decode_empty_unless_strict() {
    offer_matrix()
        .args(["token", "decode", "%%%"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"hidden\": []"));
    offer_matrix()
        .args(["token", "decode", "--strict", "%%%"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed token"));
}

#[test]
fn share_url_carries_token_and_hidden_rows() {
    offer_matrix()
        .args(["share-url", "https://offers.example/matrix", "tok-1", "--hidden", "MR"])
        .assert()
        .success()
        .stdout(predicate::str::contains("share=tok-1").and(predicate::str::contains("hf=")));
    offer_matrix()
        .args(["share-url", "not a url", "tok-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid base url"));
}
