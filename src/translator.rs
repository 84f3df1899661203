//! Natural language to query plan, and result envelope back to prose.
//!
//! Both directions are a fixed prompt template, one model call and a
//! deterministic parse of the output. Nothing is cached.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::fields::{INCIDENT_FIELDS, PROBLEM_FIELDS};
use crate::llm::TextModel;
use crate::types::{Question, QueryPlan, RawPlan, ResultEnvelope};

pub struct Translator {
    model: Arc<dyn TextModel>,
}

impl Translator {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    /// Turn a question into a query plan. Returns `None` when the model fails
    /// or its output is not a usable plan.
    pub async fn parse(&self, question: &Question) -> Option<QueryPlan> {
        let prompt = parser_prompt(question.as_str(), INCIDENT_FIELDS, PROBLEM_FIELDS);
        match self.request_plan(&prompt).await {
            Ok(plan) => {
                tracing::debug!("Parsed {} plan: {}", plan.kind.query_type(), plan.explanation);
                Some(plan)
            }
            Err(e) => {
                tracing::warn!("Query parsing error: {:#}", e);
                None
            }
        }
    }

    /// Render an envelope as a conversational answer. Never fails: a model
    /// error is folded into the returned text.
    pub async fn narrate(&self, question: &Question, envelope: &ResultEnvelope) -> String {
        let rendered =
            serde_json::to_string_pretty(envelope).unwrap_or_else(|_| format!("{:?}", envelope));
        let prompt = formatter_prompt(question.as_str(), &rendered);

        match self.model.complete(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!("Response formatting error: {:#}", e);
                format!(
                    "I found some results for your query, but encountered an error formatting the response: {}",
                    e
                )
            }
        }
    }

    async fn request_plan(&self, prompt: &str) -> Result<QueryPlan> {
        let output = self.model.complete(prompt).await?;
        let json = extract_json(&output).context("Model output contains no JSON object")?;
        let raw: RawPlan = serde_json::from_str(json).context("Model output is not a valid plan")?;
        Ok(QueryPlan::try_from(raw)?)
    }
}

/// Slice out the outermost JSON object, dropping code fences or prose around it.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parser_prompt(question: &str, incident_fields: &[&str], problem_fields: &[&str]) -> String {
    format!(
        r#"You are an expert ServiceNow analyst. Analyze the following question and determine the appropriate query structure.

Available Tables and Fields:
INCIDENT TABLE: {incident}
PROBLEM TABLE: {problem}

Special Parameter Handling:
1. Assignment Fields:
- assigned_to: Individual user assignment
- assignment_group: Group assignment
- additional_assignee_list: Additional assignees
- reassignment_count: Number of reassignments

2. State and Phase Fields:
- state: Current state (New, In Progress, Closed, etc.)
- phase: Current phase (Requested, Planning, Implementation, etc.)
- phase_state: State within the current phase

3. Time and Duration Fields:
- opened_at: Creation timestamp
- closed_at: Closure timestamp
- work_start: Actual start time
- work_end: Actual end time
- business_duration: Duration in business hours
- expected_start: Planned start date
- start_date: Scheduled start
- end_date: Scheduled end

4. Priority and Impact Fields:
- impact: Impact level (1-High, 2-Medium, 3-Low)
- urgency: Urgency level
- priority: Calculated priority
- escalation: Escalation status

5. Configuration Items:
- cmdb_ci: Related configuration item
- business_service: Affected business service
- service_offering: Related service offering

6. Notes and Comments:
- work_notes: Technical notes
- comments_and_work_notes: Combined notes
- review_comments: Review feedback
- additional_comments: Extra notes

7. Approval and Review:
- approval_set: Approval status
- review_status: Current review state
- review_date: Date of review
- cab_recommendation: Change Advisory Board input

Question: {question}

Analysis Steps:
1. Identify query type (incident/problem/combined)
2. Determine specific parameters needed
3. Consider related records and their parameters
4. Apply appropriate conditions and filters
5. Select relevant return fields
6. Determine sorting and limiting

Respond with a JSON structure:
{{
    "query_type": "incident" or "problem" or "combined",
    "incident_query": {{
        "sysparm_query": "detailed query conditions",
        "sysparm_fields": "specific fields to return",
        "sysparm_limit": limit,
        "sysparm_display_value": "true",
        "sysparm_order_by": "field_name",
        "sysparm_order_by_direction": "DESC/ASC"
    }},
    "problem_query": {{
        "sysparm_query": "detailed query conditions",
        "sysparm_fields": "specific fields to return",
        "sysparm_limit": limit,
        "sysparm_display_value": "true",
        "sysparm_order_by": "field_name",
        "sysparm_order_by_direction": "DESC/ASC"
    }},
    "include_related_data": {{
        "incidents": boolean,
        "tasks": boolean,
        "affected_cis": boolean,
        "change_requests": boolean,
        "work_notes": boolean,
        "approvals": boolean
    }},
    "field_display": {{
        "show_assignment_details": boolean,
        "show_timestamps": boolean,
        "show_notes": boolean,
        "show_approval_info": boolean
    }},
    "explanation": "Detailed explanation of query structure and parameter handling"
}}

Only return the JSON, no other text."#,
        incident = incident_fields.join(", "),
        problem = problem_fields.join(", "),
        question = question,
    )
}

fn formatter_prompt(question: &str, results: &str) -> String {
    format!(
        r#"You are a ServiceNow expert assistant. Convert the following ServiceNow query results into a clear, human-readable response.

Original Question: {question}

Query Results: {results}

Instructions:
1. Provide a natural, conversational response that directly answers the user's question
2. Present the information in a clear, organized manner
3. Use bullet points or numbered lists when appropriate for readability
4. Include relevant details like ticket numbers, states, priorities, descriptions
5. If no results were found, explain this clearly
6. Summarize key findings at the end if there are multiple results
7. Use professional but friendly language
8. Format dates and times in a readable format
9. Explain technical terms if necessary
10. Highlight important information like high-priority incidents or critical problems

Example format:
"Based on your query, I found [number] incidents/problems. Here's what I discovered:

[Detailed information organized clearly]

Summary: [Brief overview of key findings]"

Provide only the formatted response text, no additional metadata or JSON."#
    )
}
