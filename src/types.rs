use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{PlanError, QuestionError};

/// A trimmed, non-empty natural-language question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question(String);

impl Question {
    pub fn new(text: &str) -> Result<Self, QuestionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(QuestionError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Query parameters for one Table API call.
///
/// Doubles as the sub-plan emitted by the model, so deserialization accepts
/// the loose shapes models tend to produce (numeric strings, booleans, arrays).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableQuery {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "loose_string")]
    pub sysparm_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "loose_fields")]
    pub sysparm_fields: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "loose_limit")]
    pub sysparm_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "loose_string")]
    pub sysparm_display_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "loose_string")]
    pub sysparm_order_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "loose_string")]
    pub sysparm_order_by_direction: Option<String>,
}

impl TableQuery {
    /// Query-string pairs for the set parameters, in declaration order.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(ref q) = self.sysparm_query {
            pairs.push(("sysparm_query", q.clone()));
        }
        if let Some(ref f) = self.sysparm_fields {
            pairs.push(("sysparm_fields", f.clone()));
        }
        if let Some(limit) = self.sysparm_limit {
            pairs.push(("sysparm_limit", limit.to_string()));
        }
        if let Some(ref d) = self.sysparm_display_value {
            pairs.push(("sysparm_display_value", d.clone()));
        }
        if let Some(ref o) = self.sysparm_order_by {
            pairs.push(("sysparm_order_by", o.clone()));
        }
        if let Some(ref dir) = self.sysparm_order_by_direction {
            pairs.push(("sysparm_order_by_direction", dir.clone()));
        }
        pairs
    }
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn loose_fields<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Array(items)) => {
            let names: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if names.is_empty() {
                None
            } else {
                Some(names.join(","))
            }
        }
        _ => None,
    })
}

fn loose_limit<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Flags accept booleans, "true"/"yes"/"1" strings and numbers; anything else is false.
fn loose_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

/// A flag section that may be null or absent.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Related data the narration step should consider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedData {
    #[serde(deserialize_with = "loose_bool")]
    pub incidents: bool,
    #[serde(deserialize_with = "loose_bool")]
    pub tasks: bool,
    #[serde(deserialize_with = "loose_bool")]
    pub affected_cis: bool,
    #[serde(deserialize_with = "loose_bool")]
    pub change_requests: bool,
    #[serde(deserialize_with = "loose_bool")]
    pub work_notes: bool,
    #[serde(deserialize_with = "loose_bool")]
    pub approvals: bool,
}

/// Display sections the narration step should consider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDisplay {
    #[serde(deserialize_with = "loose_bool")]
    pub show_assignment_details: bool,
    #[serde(deserialize_with = "loose_bool")]
    pub show_timestamps: bool,
    #[serde(deserialize_with = "loose_bool")]
    pub show_notes: bool,
    #[serde(deserialize_with = "loose_bool")]
    pub show_approval_info: bool,
}

/// Plan exactly as the model emits it, before validation.
#[derive(Debug, Deserialize)]
pub struct RawPlan {
    pub query_type: String,
    #[serde(default)]
    pub incident_query: Option<TableQuery>,
    #[serde(default)]
    pub problem_query: Option<TableQuery>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub include_related_data: RelatedData,
    #[serde(default, deserialize_with = "null_as_default")]
    pub field_display: FieldDisplay,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Which tables a plan touches. The carried sub-plans always match the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanKind {
    Incident { incident: TableQuery },
    Problem { problem: TableQuery },
    /// Problems with their incidents. The incident sub-plan is carried but
    /// never executed as a standalone query.
    Combined {
        problem: TableQuery,
        incident: TableQuery,
    },
}

impl PlanKind {
    pub fn query_type(&self) -> QueryType {
        match self {
            PlanKind::Incident { .. } => QueryType::Incident,
            PlanKind::Problem { .. } => QueryType::Problem,
            PlanKind::Combined { .. } => QueryType::Combined,
        }
    }
}

/// Validated query plan derived from one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub kind: PlanKind,
    pub include_related_data: RelatedData,
    pub field_display: FieldDisplay,
    pub explanation: String,
}

impl TryFrom<RawPlan> for QueryPlan {
    type Error = PlanError;

    fn try_from(raw: RawPlan) -> Result<Self, Self::Error> {
        let kind = match raw.query_type.trim().to_lowercase().as_str() {
            "incident" => PlanKind::Incident {
                incident: raw
                    .incident_query
                    .ok_or(PlanError::MissingSubPlan("incident_query"))?,
            },
            "problem" => PlanKind::Problem {
                problem: filtered_problem_query(raw.problem_query)?,
            },
            "combined" => PlanKind::Combined {
                problem: filtered_problem_query(raw.problem_query)?,
                incident: raw.incident_query.unwrap_or_default(),
            },
            _ => return Err(PlanError::UnknownQueryType(raw.query_type)),
        };

        Ok(Self {
            kind,
            include_related_data: raw.include_related_data,
            field_display: raw.field_display,
            explanation: raw.explanation.unwrap_or_default(),
        })
    }
}

/// Problem sub-plans must carry a filter; without one the query would
/// return every problem on the instance.
fn filtered_problem_query(query: Option<TableQuery>) -> Result<TableQuery, PlanError> {
    let query = query.ok_or(PlanError::MissingSubPlan("problem_query"))?;
    if query.sysparm_query.is_none() {
        return Err(PlanError::MissingFilter("problem_query.sysparm_query"));
    }
    Ok(query)
}

/// Query kind reported in a result envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Incident,
    Problem,
    Combined,
    Unknown,
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryType::Incident => write!(f, "incident"),
            QueryType::Problem => write!(f, "problem"),
            QueryType::Combined => write!(f, "combined"),
            QueryType::Unknown => write!(f, "unknown"),
        }
    }
}

/// One remote call issued while answering a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCall {
    pub endpoint: String,
    pub params: TableQuery,
}

/// Fixed projection of a problem record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub number: Option<Value>,
    pub state: Option<Value>,
    pub description: Option<Value>,
    pub priority: Option<Value>,
    pub opened_by: Option<Value>,
    pub opened: Option<Value>,
}

impl ProblemDetails {
    pub fn from_record(record: &Map<String, Value>) -> Self {
        Self {
            number: record.get("number").cloned(),
            state: record.get("state").cloned(),
            description: record.get("short_description").cloned(),
            priority: record.get("priority").cloned(),
            opened_by: record.get("opened_by").cloned(),
            opened: record.get("opened").cloned(),
        }
    }
}

/// Fixed projection of an incident record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentDetails {
    pub number: Option<Value>,
    pub state: Option<Value>,
    pub description: Option<Value>,
    pub priority: Option<Value>,
    pub opened_by: Option<Value>,
    pub opened: Option<Value>,
    pub assigned_to: Option<Value>,
    pub assignment_group: Option<Value>,
}

impl IncidentDetails {
    pub fn from_record(record: &Map<String, Value>) -> Self {
        Self {
            number: record.get("number").cloned(),
            state: record.get("state").cloned(),
            description: record.get("short_description").cloned(),
            priority: record.get("priority").cloned(),
            opened_by: record.get("opened_by").cloned(),
            opened: record.get("opened").cloned(),
            assigned_to: record.get("assigned_to").cloned(),
            assignment_group: record.get("assignment_group").cloned(),
        }
    }
}

/// A projected record in the result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum RecordResult {
    Incident {
        incident_details: IncidentDetails,
    },
    Problem {
        problem_details: ProblemDetails,
        related_incidents: Vec<Value>,
    },
}

/// Structured output of one orchestrated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub query_type: QueryType,
    pub explanation: String,
    pub api_calls: Vec<ApiCall>,
    pub results: Vec<RecordResult>,
    pub total_results: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultEnvelope {
    pub fn new(
        query_type: QueryType,
        explanation: String,
        api_calls: Vec<ApiCall>,
        results: Vec<RecordResult>,
    ) -> Self {
        let total_results = results.len();
        Self {
            query_type,
            explanation,
            api_calls,
            results,
            total_results,
            error: None,
        }
    }

    /// Envelope returned when the question could not be turned into a plan.
    pub fn not_understood() -> Self {
        Self::new(
            QueryType::Unknown,
            "Failed to parse query".to_string(),
            Vec::new(),
            Vec::new(),
        )
    }

    /// Envelope returned when processing failed after a plan was produced.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(
                QueryType::Unknown,
                "An error occurred while processing the query".to_string(),
                Vec::new(),
                Vec::new(),
            )
        }
    }
}

/// Response body for a processed question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Narrated {
        formatted_response: String,
        raw_data: ResultEnvelope,
    },
    Raw(ResultEnvelope),
}

impl QueryResponse {
    /// The result envelope, dropping any narrative.
    pub fn into_envelope(self) -> ResultEnvelope {
        match self {
            QueryResponse::Narrated { raw_data, .. } => raw_data,
            QueryResponse::Raw(envelope) => envelope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_trims_and_rejects_blank() {
        assert_eq!(Question::new("  open incidents ").unwrap().as_str(), "open incidents");
        assert_eq!(Question::new("   \n\t").unwrap_err(), QuestionError::Empty);
        assert_eq!(Question::new("").unwrap_err(), QuestionError::Empty);
    }

    #[test]
    fn test_table_query_accepts_loose_model_output() {
        let json = r#"{
            "sysparm_query": "active=true",
            "sysparm_fields": ["number", "state"],
            "sysparm_limit": "25",
            "sysparm_display_value": true,
            "sysparm_order_by": "opened_at",
            "sysparm_order_by_direction": "DESC"
        }"#;
        let q: TableQuery = serde_json::from_str(json).unwrap();
        assert_eq!(q.sysparm_query.as_deref(), Some("active=true"));
        assert_eq!(q.sysparm_fields.as_deref(), Some("number,state"));
        assert_eq!(q.sysparm_limit, Some(25));
        assert_eq!(q.sysparm_display_value.as_deref(), Some("true"));
    }

    #[test]
    fn test_table_query_unparseable_limit_is_dropped() {
        let q: TableQuery =
            serde_json::from_str(r#"{"sysparm_query": "", "sysparm_limit": "limit"}"#).unwrap();
        assert!(q.sysparm_query.is_none());
        assert!(q.sysparm_limit.is_none());
        assert!(q.to_pairs().is_empty());
    }

    #[test]
    fn test_table_query_pairs_skip_unset() {
        let q = TableQuery {
            sysparm_query: Some("priority=1".into()),
            sysparm_limit: Some(5),
            ..Default::default()
        };
        assert_eq!(
            q.to_pairs(),
            vec![
                ("sysparm_query", "priority=1".to_string()),
                ("sysparm_limit", "5".to_string())
            ]
        );
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json, serde_json::json!({"sysparm_query": "priority=1", "sysparm_limit": 5}));
    }

    #[test]
    fn test_incident_plan_drops_problem_branch() {
        let raw: RawPlan = serde_json::from_str(
            r#"{
                "query_type": "incident",
                "incident_query": {"sysparm_query": "active=true"},
                "problem_query": {"sysparm_query": "ignored"},
                "explanation": "open incidents"
            }"#,
        )
        .unwrap();
        let plan = QueryPlan::try_from(raw).unwrap();
        assert_eq!(plan.kind.query_type(), QueryType::Incident);
        assert!(matches!(plan.kind, PlanKind::Incident { .. }));
        assert_eq!(plan.explanation, "open incidents");
    }

    #[test]
    fn test_combined_plan_defaults_missing_incident_branch() {
        let raw: RawPlan = serde_json::from_str(
            r#"{"query_type": "Combined", "problem_query": {"sysparm_query": "state=1"}}"#,
        )
        .unwrap();
        let plan = QueryPlan::try_from(raw).unwrap();
        match plan.kind {
            PlanKind::Combined { problem, incident } => {
                assert_eq!(problem.sysparm_query.as_deref(), Some("state=1"));
                assert_eq!(incident, TableQuery::default());
            }
            other => panic!("unexpected plan kind: {:?}", other),
        }
    }

    #[test]
    fn test_plan_rejects_unknown_type_and_missing_branch() {
        let raw: RawPlan = serde_json::from_str(r#"{"query_type": "change"}"#).unwrap();
        assert_eq!(
            QueryPlan::try_from(raw).unwrap_err(),
            PlanError::UnknownQueryType("change".into())
        );

        let raw: RawPlan = serde_json::from_str(r#"{"query_type": "problem"}"#).unwrap();
        assert_eq!(
            QueryPlan::try_from(raw).unwrap_err(),
            PlanError::MissingSubPlan("problem_query")
        );
    }

    #[test]
    fn test_problem_plans_require_a_filter() {
        for query_type in ["problem", "combined"] {
            let raw: RawPlan = serde_json::from_str(&format!(
                r#"{{"query_type": "{}", "problem_query": {{"sysparm_limit": 10}}}}"#,
                query_type
            ))
            .unwrap();
            assert_eq!(
                QueryPlan::try_from(raw).unwrap_err(),
                PlanError::MissingFilter("problem_query.sysparm_query")
            );
        }

        // Incident plans may run unfiltered.
        let raw: RawPlan =
            serde_json::from_str(r#"{"query_type": "incident", "incident_query": {}}"#).unwrap();
        assert!(QueryPlan::try_from(raw).is_ok());
    }

    #[test]
    fn test_plan_flags_accept_loose_values() {
        let raw: RawPlan = serde_json::from_str(
            r#"{
                "query_type": "incident",
                "incident_query": {"sysparm_query": "active=true"},
                "include_related_data": {"incidents": null, "tasks": "true", "work_notes": 1, "approvals": "no"},
                "field_display": null
            }"#,
        )
        .unwrap();
        let plan = QueryPlan::try_from(raw).unwrap();
        assert!(!plan.include_related_data.incidents);
        assert!(plan.include_related_data.tasks);
        assert!(plan.include_related_data.work_notes);
        assert!(!plan.include_related_data.approvals);
        assert_eq!(plan.field_display, FieldDisplay::default());
    }

    #[test]
    fn test_into_envelope_drops_narrative() {
        let narrated = QueryResponse::Narrated {
            formatted_response: "text".into(),
            raw_data: ResultEnvelope::failed("boom"),
        };
        assert_eq!(narrated.into_envelope(), ResultEnvelope::failed("boom"));
        let bare = QueryResponse::Raw(ResultEnvelope::not_understood());
        assert_eq!(bare.into_envelope(), ResultEnvelope::not_understood());
    }

    #[test]
    fn test_record_result_serializes_with_type_tag() {
        let record = RecordResult::Problem {
            problem_details: ProblemDetails {
                number: Some(Value::from("PRB001")),
                ..Default::default()
            },
            related_incidents: vec![],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["record_type"], "problem");
        assert_eq!(json["problem_details"]["number"], "PRB001");
        assert!(json["problem_details"]["state"].is_null());
        assert_eq!(json["related_incidents"], serde_json::json!([]));
    }

    #[test]
    fn test_failed_envelope_carries_error() {
        let envelope = ResultEnvelope::failed("boom");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["query_type"], "unknown");
        assert_eq!(json["error"], "boom");
        assert_eq!(json["total_results"], 0);

        let ok = serde_json::to_value(ResultEnvelope::not_understood()).unwrap();
        assert!(ok.get("error").is_none());
    }
}
