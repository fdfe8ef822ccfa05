//! End-to-end tests for the dpm binary.

use mockito::{Matcher, Server};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const ENVELOPE_OK: &str = r#"{"success":true,"errors":[],"result":null}"#;

/// A package folder and a `dpm` command running inside it with a clean
/// environment.
struct TestContext {
    folder: TempDir,
}

impl TestContext {
    fn new() -> Self {
        let folder = TempDir::new().expect("failed to create temp dir");
        Self { folder }
    }

    fn with_package(name: &str, version: &str) -> Self {
        let ctx = Self::new();
        ctx.write(
            "package.json",
            &format!(r#"{{"name":"{name}","version":"{version}"}}"#),
        );
        ctx.write("index.js", "module.exports = () => 42;\n");
        ctx
    }

    fn write(&self, rel: &str, content: &str) {
        std::fs::write(self.folder.path().join(rel), content).expect("failed to write fixture");
    }

    fn path(&self) -> &Path {
        self.folder.path()
    }

    fn dpm_cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_dpm"));
        cmd.current_dir(self.path());
        for var in ["CF_ID", "CF_EMAIL", "CF_KEY", "DPM_NAMESPACE", "DPM_API_URL"] {
            cmd.env_remove(var);
        }
        cmd
    }

    fn dpm_with_credentials(&self, server: &Server) -> Command {
        let mut cmd = self.dpm_cmd();
        cmd.env("CF_ID", "acc")
            .env("CF_EMAIL", "dev@example.com")
            .env("CF_KEY", "secret")
            .env("DPM_API_URL", server.url());
        cmd
    }
}

fn run(mut cmd: Command) -> (Output, String, String) {
    let output = cmd.output().expect("failed to run dpm");
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (output, stdout, stderr)
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let mut cmd = ctx.dpm_cmd();
    cmd.arg("--help");
    let (output, stdout, _) = run(cmd);
    assert!(output.status.success());
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("publish"));
    assert!(stdout.contains("serve"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let mut cmd = ctx.dpm_cmd();
    cmd.arg("--version");
    let (output, stdout, _) = run(cmd);
    assert!(output.status.success());
    assert!(stdout.starts_with("dpm "));
}

#[test]
fn test_completions_command() {
    let ctx = TestContext::new();
    let mut cmd = ctx.dpm_cmd();
    cmd.args(["completions", "bash"]);
    let (output, stdout, _) = run(cmd);
    assert!(output.status.success());
    assert!(stdout.contains("dpm"));
}

#[test]
fn test_publish_without_credentials_fails() {
    let ctx = TestContext::with_package("left-pad", "1.0.0");
    let mut cmd = ctx.dpm_cmd();
    cmd.arg("publish");
    let (output, _, stderr) = run(cmd);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Error details:"));
    assert!(stderr.contains("CF_ID"));
}

#[test]
fn test_publish_end_to_end() {
    let mut server = Server::new();
    let ns_path = "/accounts/acc/storage/kv/namespaces";
    let versions_path = format!("{ns_path}/ns-new/values/dpm-left-pad-versions");

    let list = server
        .mock("GET", ns_path)
        .match_query(Matcher::Any)
        .match_header("x-auth-key", "secret")
        .with_body(r#"{"success":true,"errors":[],"result":[],"result_info":{"page":1,"total_pages":1}}"#)
        .create();
    let create = server
        .mock("POST", ns_path)
        .match_body(Matcher::Json(serde_json::json!({ "title": "dpm" })))
        .with_body(r#"{"success":true,"errors":[],"result":{"id":"ns-new","title":"dpm"}}"#)
        .create();
    let fetch_versions = server
        .mock("GET", versions_path.as_str())
        .with_status(404)
        .with_body(r#"{"success":false,"errors":[{"code":10009,"message":"get: 'key not found'"}]}"#)
        .create();
    let init_versions = server
        .mock("PUT", versions_path.as_str())
        .match_body("[]")
        .with_body(ENVELOPE_OK)
        .create();
    let script = server
        .mock("PUT", "/accounts/acc/workers/scripts/left-pad")
        .match_body(Matcher::Regex(r#""namespace_id":"ns-new""#.to_string()))
        .with_body(ENVELOPE_OK)
        .create();
    let subdomain = server
        .mock("GET", "/accounts/acc/workers/subdomain")
        .with_body(r#"{"success":true,"errors":[],"result":{"subdomain":"acme"}}"#)
        .create();
    let enable = server
        .mock("POST", "/accounts/acc/workers/scripts/left-pad/subdomain")
        .match_body(Matcher::Json(serde_json::json!({ "enabled": true })))
        .with_body(ENVELOPE_OK)
        .create();
    let tarball = server
        .mock("PUT", format!("{ns_path}/ns-new/values/dpm-left-pad-1.0.0").as_str())
        .match_header("content-type", "application/tar+gzip")
        .with_body(ENVELOPE_OK)
        .create();
    let append = server
        .mock("PUT", versions_path.as_str())
        .match_body(r#"["1.0.0"]"#)
        .with_body(ENVELOPE_OK)
        .create();

    let ctx = TestContext::with_package("left-pad", "1.0.0");
    let mut cmd = ctx.dpm_with_credentials(&server);
    cmd.arg("publish");
    let (output, stdout, stderr) = run(cmd);

    assert!(output.status.success(), "stderr: {stderr}");
    assert!(stdout.contains(
        "✨ Published left-pad@1.0.0 [https://left-pad.acme.workers.dev/1.0.0]"
    ));
    for mock in [
        list,
        create,
        fetch_versions,
        init_versions,
        script,
        subdomain,
        enable,
        tarball,
        append,
    ] {
        mock.assert();
    }
}

#[test]
fn test_publish_duplicate_version_reads_dpmrc() {
    let mut server = Server::new();
    let ns_path = "/accounts/acc/storage/kv/namespaces";

    let _list = server
        .mock("GET", ns_path)
        .match_query(Matcher::Any)
        .with_body(r#"{"success":true,"errors":[],"result":[{"id":"ns-1","title":"dpm"}],"result_info":{"page":1,"total_pages":1}}"#)
        .create();
    let _versions = server
        .mock("GET", format!("{ns_path}/ns-1/values/dpm-left-pad-versions").as_str())
        .with_body(r#"["0.9.0","1.0.0"]"#)
        .create();
    let no_writes = server
        .mock("PUT", Matcher::Any)
        .expect(0)
        .create();

    let ctx = TestContext::with_package("left-pad", "1.0.0");
    ctx.write(
        ".dpmrc",
        &format!(
            "CF_ID=acc\nCF_EMAIL=dev@example.com\nCF_KEY=secret\nDPM_API_URL={}\n",
            server.url()
        ),
    );
    let mut cmd = ctx.dpm_cmd();
    cmd.arg("publish").arg(".");
    let (output, _, stderr) = run(cmd);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Error details:"));
    assert!(stderr.contains("Version 1.0.0 of left-pad is already published"));
    no_writes.assert();
}

#[test]
fn test_error_details_list_each_cause_once() {
    let server = Server::new();
    let ctx = TestContext::new();
    let mut cmd = ctx.dpm_with_credentials(&server);
    cmd.arg("publish");
    let (output, _, stderr) = run(cmd);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Failed to read"), "stderr: {stderr}");
    assert_eq!(stderr.matches("os error 2").count(), 1, "stderr: {stderr}");
}
