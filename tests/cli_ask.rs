mod common;

use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{mount_incidents, mount_token, TestEnv, INCIDENT_PLAN};

#[test]
fn help_lists_commands() {
    let env = TestEnv::new();

    env.command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("ask"));
}

#[test]
fn ask_rejects_blank_question() {
    let env = TestEnv::new();

    env.command()
        .args(["ask", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("question cannot be empty"));
}

#[test]
fn ask_rejects_invalid_instance_url() {
    let env = TestEnv::new();

    env.command()
        .args(["ask", "open incidents"])
        .env("SERVICENOW_INSTANCE_URL", "dev1234.service-now.com")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid ServiceNow configuration"))
        .stderr(predicate::str::contains("instance_url must start with"));
}

#[test]
fn ask_requires_model_endpoint() {
    let env = TestEnv::new();

    env.command()
        .args(["ask", "open incidents"])
        .env("SERVICENOW_INSTANCE_URL", "https://dev1234.service-now.com")
        .assert()
        .failure()
        .stderr(predicate::str::contains("llm.endpoint"));
}

#[test]
fn unparseable_config_file_fails() {
    let env = TestEnv::new();
    let config = env.write_file("broken.toml", "[server\nport = ");

    env.command()
        .arg("--config")
        .arg(&config)
        .args(["ask", "open incidents"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[tokio::test(flavor = "multi_thread")]
async fn ask_raw_json_against_mock_services() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_incidents(&server).await;
    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt-test/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": INCIDENT_PLAN}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let env = TestEnv::new();
    let config = env.write_file(
        "config.toml",
        &format!(
            r#"
[servicenow]
instance_url = "{uri}"
client_id = "client"
client_secret = "secret"
username = "admin"
password = "pw"

[llm]
endpoint = "{uri}"
deployment = "gpt-test"
api_key = "test-key"
"#,
            uri = server.uri()
        ),
    );

    let mut cmd = env.command();
    cmd.arg("--config")
        .arg(&config)
        .args(["--json", "ask", "--raw", "open P1 incidents"]);

    let output = tokio::task::spawn_blocking(move || cmd.output())
        .await
        .expect("command panicked")
        .expect("failed to run binary");

    output
        .assert()
        .success()
        .stdout(predicate::str::contains("\"query_type\": \"incident\""))
        .stdout(predicate::str::contains("INC100"))
        .stdout(predicate::str::contains("formatted_response").not());
}
