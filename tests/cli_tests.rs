//! Integration tests for the cco CLI
//!
//! These tests verify CLI commands work correctly end-to-end.

use std::process::Command;

/// Path to the cco binary built for this test run
fn cco_binary() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_cco"))
}

/// Run cco command and return output
fn run_cco(args: &[&str]) -> std::process::Output {
    Command::new(cco_binary())
        .args(args)
        .env_remove("CCO_CONFIG")
        .output()
        .expect("Failed to execute cco")
}

#[test]
fn test_cco_version() {
    let output = run_cco(&["--version"]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cco"));
}

#[test]
fn test_cco_help() {
    let output = run_cco(&["--help"]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("Commands:"));
    assert!(stdout.contains("audit"));
    assert!(stdout.contains("remediation"));
}

#[test]
fn test_cco_invalid_command() {
    let output = run_cco(&["invalid-command"]);

    assert!(!output.status.success());
}

#[test]
fn test_cco_checks_list() {
    let output = run_cco(&["checks", "list"]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dax-encryption-at-rest-check"));
    assert!(stdout.contains("dax-encryption-in-transit-check"));
    assert!(stdout.contains("vpc-flow-logging-check"));
}

#[test]
fn test_cco_checks_verify() {
    let output = run_cco(&["checks", "verify"]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("All check codes are unique"));
}

#[test]
fn test_cco_playbooks() {
    let output = run_cco(&["playbooks"]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("vpc-flow-logging-check"));
}

#[test]
fn test_cco_finding_id() {
    let output = run_cco(&[
        "finding",
        "id",
        "arn:aws:ec2:us-east-1:111111111111:vpc/vpc-0abc",
        "vpc-flow-logging-check",
    ]);

    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        "arn:aws:ec2:us-east-1:111111111111:vpc/vpc-0abc/vpc-flow-logging-check"
    );
}

#[test]
fn test_cco_finding_id_rejects_bad_arn() {
    let output = run_cco(&["finding", "id", "not-an-arn", "vpc-flow-logging-check"]);

    assert!(!output.status.success());
}

// ============================================================================
// End-to-end workflow tests with temp directories
// ============================================================================

mod workflow_tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
accounts: ["111111111111", "222222222222"]
regions: [us-east-1]
retry:
  initial_delay_ms: 0
"#;

    const FIXTURE: &str = r#"
listings:
  dax:clusters:
    - ClusterName: orders
      SSEDescription: { Status: DISABLED }
      ClusterEndpointEncryptionType: TLS
  ec2:vpcs:
    - VpcId: vpc-0abc
  ec2:flow_logs:
    - ResourceId: vpc-0abc
      FlowLogStatus: ACTIVE
"#;

    /// Helper to verify no panic occurred in command output
    fn assert_no_panic(output: &std::process::Output, context: &str) {
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            !stderr.contains("panicked") && !stderr.contains("RUST_BACKTRACE"),
            "{} panicked.\nstderr: {}",
            context,
            stderr
        );
    }

    fn write(dir: &Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, contents).expect("Failed to write file");
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_config_validate() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = write(temp_dir.path(), "cco.yaml", CONFIG);

        let output = run_cco(&["config", "validate", &config]);

        assert_no_panic(&output, "config validate");
        assert!(output.status.success());

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Configuration is valid (2 scope(s))"));
    }

    #[test]
    fn test_config_validate_rejects_invalid() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = write(
            temp_dir.path(),
            "cco.yaml",
            "accounts: ['12']\nregions: [us-east-1]\n",
        );

        let output = run_cco(&["config", "validate", &config]);

        assert_no_panic(&output, "invalid config validate");
        assert!(!output.status.success());
    }

    #[test]
    fn test_config_validate_missing_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let output = Command::new(cco_binary())
            .args(["config", "validate"])
            .env_remove("CCO_CONFIG")
            .current_dir(temp_dir.path())
            .output()
            .expect("Failed to execute cco");

        assert_no_panic(&output, "config validate without file");
        assert!(!output.status.success());
    }

    #[test]
    fn test_audit_json_findings() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = write(temp_dir.path(), "cco.yaml", CONFIG);
        let fixtures = write(temp_dir.path(), "fixtures.yaml", FIXTURE);

        let output = run_cco(&["audit", "--config", &config, "--fixtures", &fixtures, "--json"]);

        assert_no_panic(&output, "audit --json");
        assert!(output.status.success());

        let findings: serde_json::Value =
            serde_json::from_slice(&output.stdout).expect("stdout is not JSON");
        let findings = findings.as_array().expect("findings array");

        // Three checks, one resource each, two accounts
        assert_eq!(findings.len(), 6);

        let failed: Vec<_> = findings
            .iter()
            .filter(|f| f["complianceStatus"] == "FAILED")
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|f| f["id"]
            .as_str()
            .unwrap()
            .ends_with("/dax-encryption-at-rest-check")));
    }

    #[test]
    fn test_audit_summary_for_one_service() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = write(temp_dir.path(), "cco.yaml", CONFIG);
        let fixtures = write(temp_dir.path(), "fixtures.yaml", FIXTURE);

        let output = run_cco(&[
            "audit", "--config", &config, "--fixtures", &fixtures, "--service", "vpc",
        ]);

        assert_no_panic(&output, "audit --service vpc");
        assert!(output.status.success());

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("All evaluated resources are compliant"));
    }

    #[test]
    fn test_remediation_plan() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let event = write(
            temp_dir.path(),
            "event.json",
            r#"{"detail": {"findings": [{
                "Id": "arn:aws:ec2:us-east-1:222222222222:vpc/vpc-0abc/vpc-flow-logging-check",
                "AwsAccountId": "222222222222"
            }]}}"#,
        );

        let output = run_cco(&["remediation", "plan", &event]);

        assert_no_panic(&output, "remediation plan");
        assert!(output.status.success());

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("check-existing-flow-logs"));
        assert!(stdout.contains("enable-flow-logs"));
    }
}
