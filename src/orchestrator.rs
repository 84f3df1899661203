//! Question in, result envelope (and optional narrative) out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{Map, Value};

use crate::auth::CredentialManager;
use crate::config::Config;
use crate::error::{AuthError, ProcessError};
use crate::fields::{
    self, INCIDENT_ENDPOINT, PROBLEM_ENDPOINT, PROBLEM_PROJECTION, RELATED_INCIDENT_PROJECTION,
};
use crate::llm::{AzureChatModel, TextModel};
use crate::servicenow::RecordClient;
use crate::translator::Translator;
use crate::types::{
    ApiCall, IncidentDetails, PlanKind, ProblemDetails, QueryPlan, QueryResponse, Question,
    RecordResult, ResultEnvelope, TableQuery,
};

/// Related-incident lookups in flight per question unless configured otherwise.
pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 8;

/// Narrative returned when the question could not be turned into a plan.
pub const NOT_UNDERSTOOD_REPLY: &str = "I'm sorry, I couldn't understand your query. Could you please rephrase your question about ServiceNow incidents or problems?";

pub struct QueryService {
    translator: Translator,
    records: RecordClient,
    lookup_concurrency: usize,
}

impl QueryService {
    pub fn new(translator: Translator, records: RecordClient) -> Self {
        Self {
            translator,
            records,
            lookup_concurrency: DEFAULT_LOOKUP_CONCURRENCY,
        }
    }

    /// Cap on related-incident lookups in flight at once. Zero is treated as one.
    pub fn with_lookup_concurrency(mut self, limit: usize) -> Self {
        self.lookup_concurrency = limit.max(1);
        self
    }

    /// Wire up the token manager, record client and model from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let credential = config
            .servicenow
            .credential()
            .context("Invalid ServiceNow configuration")?;
        let auth = Arc::new(CredentialManager::new(credential, http.clone()));

        let model: Arc<dyn TextModel> = Arc::new(
            AzureChatModel::new(&config.llm, http.clone()).context("Invalid model configuration")?,
        );

        Ok(
            Self::new(Translator::new(model), RecordClient::new(auth, http))
                .with_lookup_concurrency(config.http.max_concurrent_lookups),
        )
    }

    /// Answer a question. Every failure except a failed token exchange is
    /// folded into the returned envelope.
    pub async fn process(
        &self,
        question: &Question,
        narrate: bool,
    ) -> Result<QueryResponse, AuthError> {
        let Some(plan) = self.translator.parse(question).await else {
            let envelope = ResultEnvelope::not_understood();
            return Ok(if narrate {
                QueryResponse::Narrated {
                    formatted_response: NOT_UNDERSTOOD_REPLY.to_string(),
                    raw_data: envelope,
                }
            } else {
                QueryResponse::Raw(envelope)
            });
        };

        let envelope = match self.run_plan(&plan).await {
            Ok(envelope) => envelope,
            Err(ProcessError::Auth(e)) => return Err(e),
            Err(ProcessError::Unexpected(msg)) => {
                tracing::error!("Error processing query: {}", msg);
                let envelope = ResultEnvelope::failed(msg.clone());
                return Ok(if narrate {
                    QueryResponse::Narrated {
                        formatted_response: format!(
                            "I encountered an error while processing your query: {}. Please try rephrasing your question.",
                            msg
                        ),
                        raw_data: envelope,
                    }
                } else {
                    QueryResponse::Raw(envelope)
                });
            }
        };

        tracing::info!(
            "Answered {} query with {} result(s) from {} call(s)",
            envelope.query_type,
            envelope.total_results,
            envelope.api_calls.len()
        );

        if narrate {
            let formatted_response = self.translator.narrate(question, &envelope).await;
            Ok(QueryResponse::Narrated {
                formatted_response,
                raw_data: envelope,
            })
        } else {
            Ok(QueryResponse::Raw(envelope))
        }
    }

    async fn run_plan(&self, plan: &QueryPlan) -> Result<ResultEnvelope, ProcessError> {
        let mut api_calls = Vec::new();
        let mut results = Vec::new();

        // Combined plans fetch problems with their incidents; the incident
        // sub-plan is not run on its own.
        match &plan.kind {
            PlanKind::Problem { problem } | PlanKind::Combined { problem, .. } => {
                self.fetch_problems(problem, &mut api_calls, &mut results)
                    .await?;
            }
            PlanKind::Incident { incident } => {
                self.fetch_incidents(incident, &mut api_calls, &mut results)
                    .await?;
            }
        }

        Ok(ResultEnvelope::new(
            plan.kind.query_type(),
            plan.explanation.clone(),
            api_calls,
            results,
        ))
    }

    async fn fetch_problems(
        &self,
        planned: &TableQuery,
        api_calls: &mut Vec<ApiCall>,
        results: &mut Vec<RecordResult>,
    ) -> Result<(), ProcessError> {
        let params = problem_params(planned);
        api_calls.push(ApiCall {
            endpoint: PROBLEM_ENDPOINT.to_string(),
            params: params.clone(),
        });
        let problems = self.records.execute(PROBLEM_ENDPOINT, &params).await?;

        let mut pending = Vec::with_capacity(problems.records.len());
        for record in &problems.records {
            let obj = as_record(record, "problem")?;
            let lookup = sys_id(obj).map(related_incident_params);
            if let Some(ref q) = lookup {
                api_calls.push(ApiCall {
                    endpoint: INCIDENT_ENDPOINT.to_string(),
                    params: q.clone(),
                });
            }
            pending.push((ProblemDetails::from_record(obj), lookup));
        }

        // `buffered` yields in problem order and stops at the first auth failure.
        let lookups: Vec<_> = pending
            .iter()
            .map(|(_, lookup)| async move {
                match lookup {
                    Some(q) => self
                        .records
                        .execute(INCIDENT_ENDPOINT, q)
                        .await
                        .map(|r| r.records),
                    None => Ok(Vec::new()),
                }
            })
            .collect();
        let related: Vec<Vec<Value>> = stream::iter(lookups)
        .buffered(self.lookup_concurrency)
        .try_collect()
        .await?;

        for ((problem_details, _), related_incidents) in pending.into_iter().zip(related) {
            results.push(RecordResult::Problem {
                problem_details,
                related_incidents,
            });
        }
        Ok(())
    }

    async fn fetch_incidents(
        &self,
        planned: &TableQuery,
        api_calls: &mut Vec<ApiCall>,
        results: &mut Vec<RecordResult>,
    ) -> Result<(), ProcessError> {
        let mut params = planned.clone();
        if let Some(ref requested) = planned.sysparm_fields {
            params.sysparm_fields = Some(fields::with_supplementary(requested));
        }

        api_calls.push(ApiCall {
            endpoint: INCIDENT_ENDPOINT.to_string(),
            params: params.clone(),
        });
        let incidents = self.records.execute(INCIDENT_ENDPOINT, &params).await?;

        for record in &incidents.records {
            let obj = as_record(record, "incident")?;
            results.push(RecordResult::Incident {
                incident_details: IncidentDetails::from_record(obj),
            });
        }
        Ok(())
    }
}

/// Problem query: the plan's filter, limit and display setting over the fixed projection.
fn problem_params(planned: &TableQuery) -> TableQuery {
    TableQuery {
        sysparm_query: planned.sysparm_query.clone(),
        sysparm_fields: Some(fields::join(PROBLEM_PROJECTION)),
        sysparm_limit: planned.sysparm_limit,
        sysparm_display_value: Some(
            planned
                .sysparm_display_value
                .clone()
                .unwrap_or_else(|| "true".to_string()),
        ),
        sysparm_order_by: None,
        sysparm_order_by_direction: None,
    }
}

fn related_incident_params(problem_sys_id: String) -> TableQuery {
    TableQuery {
        sysparm_query: Some(format!("problem_id={}", problem_sys_id)),
        sysparm_fields: Some(fields::join(RELATED_INCIDENT_PROJECTION)),
        sysparm_display_value: Some("true".to_string()),
        ..Default::default()
    }
}

fn as_record<'a>(record: &'a Value, kind: &str) -> Result<&'a Map<String, Value>, ProcessError> {
    record
        .as_object()
        .ok_or_else(|| ProcessError::Unexpected(format!("unexpected {} record: {}", kind, record)))
}

/// The record's sys_id, as a plain string or a `{value, display_value}` pair.
fn sys_id(record: &Map<String, Value>) -> Option<String> {
    let id = match record.get("sys_id")? {
        Value::String(s) => s.as_str(),
        Value::Object(o) => o.get("value")?.as_str()?,
        _ => return None,
    };
    (!id.is_empty()).then(|| id.to_string())
}
