//! Field schemas for the incident and problem tables.
//!
//! The full lists are shown to the model so it can pick filters and return
//! fields; the projections are what the orchestrator actually requests.

/// Table API endpoint for incident records.
pub const INCIDENT_ENDPOINT: &str = "/api/now/v2/table/incident";

/// Table API endpoint for problem records.
pub const PROBLEM_ENDPOINT: &str = "/api/now/v2/table/problem";

/// Incident form fields offered to the model.
pub const INCIDENT_FIELDS: &[&str] = &[
    "number",
    "company",
    "opened_by",
    "opened",
    "affected_user",
    "site",
    "service_contract",
    "service",
    "configuration_item",
    "technology",
    "state",
    "made_sla",
    "channel",
    "impact",
    "urgency",
    "priority",
    "assignment_group",
    "assigned_to",
    "notified_users",
    "email_acknowledged",
    "short_description",
    "close_code",
    "root_cause_responsible",
    "root_cause_classification",
    "root_cause_subclassification",
    "close_notes",
    "daily_review_comments",
    "closed_by",
    "closed",
    "review_rating",
    "review_on_incident_resolution_quality",
    "create_knowledge",
];

/// Problem form fields offered to the model.
pub const PROBLEM_FIELDS: &[&str] = &[
    "number",
    "origin_table",
    "category",
    "related_incidents",
    "service",
    "service_offering",
    "configuration_item",
    "problem_statement",
    "description",
    "state",
    "impact",
    "urgency",
    "priority",
    "assignment_group",
    "assigned_to",
    "resolution_code",
    "work_notes",
    "updated",
    "updated_by",
    "opened_by",
    "opened",
];

/// Fields requested for every problem query, whatever the plan asked for.
pub const PROBLEM_PROJECTION: &[&str] = &[
    "sys_id",
    "number",
    "state",
    "short_description",
    "related_incidents",
    "priority",
    "opened_by",
    "opened",
];

/// Fields requested for the per-problem related incident lookup.
pub const RELATED_INCIDENT_PROJECTION: &[&str] = &[
    "number",
    "short_description",
    "state",
    "priority",
    "sys_id",
    "assigned_to",
    "assignment_group",
];

/// Appended to incident queries when missing from the requested field list.
pub const INCIDENT_SUPPLEMENTARY: &[&str] =
    &["opened_by", "opened", "assigned_to", "assignment_group"];

/// Join a field list into the comma-separated form the Table API expects.
pub fn join(fields: &[&str]) -> String {
    fields.join(",")
}

/// Append each supplementary incident field not already present in `fields`.
pub fn with_supplementary(fields: &str) -> String {
    let mut out = fields.trim().trim_end_matches(',').trim_end().to_string();
    let present: Vec<String> = out
        .split(',')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();

    for extra in INCIDENT_SUPPLEMENTARY {
        if present.iter().any(|f| f == extra) {
            continue;
        }
        if !out.is_empty() {
            out.push(',');
        }
        out.push_str(extra);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supplementary_fields_appended_once() {
        let fields = with_supplementary("number,state,opened_by");
        assert_eq!(fields, "number,state,opened_by,opened,assigned_to,assignment_group");

        let again = with_supplementary(&fields);
        assert_eq!(again, fields);
    }

    #[test]
    fn test_supplementary_tolerates_spacing_and_trailing_comma() {
        let fields = with_supplementary("number, assigned_to ,");
        assert_eq!(fields, "number, assigned_to,opened_by,opened,assignment_group");
    }

    #[test]
    fn test_projection_joins() {
        assert_eq!(
            join(PROBLEM_PROJECTION),
            "sys_id,number,state,short_description,related_incidents,priority,opened_by,opened"
        );
    }
}
