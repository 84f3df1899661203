#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use assert_cmd::Command;
use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ticket_query::auth::{Credential, CredentialManager};
use ticket_query::llm::TextModel;
use ticket_query::orchestrator::QueryService;
use ticket_query::servicenow::RecordClient;
use ticket_query::translator::Translator;

/// Environment variables the binary reads; cleared so the host shell cannot leak in.
pub const CONFIG_ENV_VARS: &[&str] = &[
    "TICKET_QUERY_CONFIG",
    "AZURE_OPENAI_ENGINE",
    "AZURE_OPENAI_MODEL",
    "AZURE_OPENAI_TEMPERATURE",
    "AZURE_OPENAI_ENDPOINT",
    "AZURE_OPENAI_API_KEY",
    "AZURE_OPENAI_API_VERSION",
    "API_HOST",
    "API_PORT",
    "SERVICENOW_INSTANCE_URL",
    "SERVICENOW_CLIENT_ID",
    "SERVICENOW_CLIENT_SECRET",
    "SERVICENOW_USERNAME",
    "SERVICENOW_PASSWORD",
    "SERVICENOW_GRANT_TYPE",
];

pub const INCIDENT_PLAN: &str = r#"{
    "query_type": "incident",
    "incident_query": {
        "sysparm_query": "priority=1^active=true",
        "sysparm_fields": "number,short_description,state,priority",
        "sysparm_limit": 10,
        "sysparm_display_value": "true"
    },
    "include_related_data": {"incidents": false},
    "field_display": {"show_assignment_details": true},
    "explanation": "Active priority 1 incidents"
}"#;

/// A temporary working directory for running the binary.
pub struct TestEnv {
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file relative to the temp root and return its full path.
    pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let full = self.dir.path().join(relative_path);
        std::fs::write(&full, content).expect("failed to write file");
        full
    }

    /// A command for the binary running in the temp dir with a clean environment.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(Self::bin());
        cmd.current_dir(self.path());
        for var in CONFIG_ENV_VARS {
            cmd.env_remove(var);
        }
        cmd
    }

    pub fn bin() -> PathBuf {
        PathBuf::from(env!("CARGO_BIN_EXE_ticket-query"))
    }
}

/// Text model that replays canned replies in order.
pub struct StubModel {
    replies: Mutex<VecDeque<String>>,
}

impl StubModel {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        })
    }
}

#[async_trait]
impl TextModel for StubModel {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no stub reply left"))
    }
}

pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth_token.do"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "refresh_token": "r",
            "expires_in": 1800,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

pub async fn mount_incidents(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/now/v2/table/incident"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [{
                "number": "INC100",
                "short_description": "Email outage",
                "state": "In Progress",
                "priority": "1 - Critical"
            }]
        })))
        .mount(server)
        .await;
}

/// A service pointed at `server` for both the token and Table API calls.
pub fn service(server: &MockServer, model: Arc<StubModel>) -> QueryService {
    let cred = Credential::new(
        &server.uri(),
        "client".into(),
        "secret".into(),
        "admin".into(),
        "pw".into(),
        "password".into(),
    )
    .expect("valid credential");
    let http = reqwest::Client::new();
    let auth = Arc::new(CredentialManager::new(cred, http.clone()));
    QueryService::new(Translator::new(model), RecordClient::new(auth, http))
}
