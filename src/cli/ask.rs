use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;

use super::OutputConfig;
use crate::orchestrator::QueryService;
use crate::types::{QueryResponse, Question, RecordResult, ResultEnvelope};

#[derive(Args)]
pub struct AskArgs {
    /// The question, e.g. "show open P1 incidents assigned to Service Desk"
    question: String,

    /// Skip narration and print the structured results only
    #[arg(long)]
    raw: bool,
}

pub async fn run(args: AskArgs, config_path: Option<PathBuf>, output: OutputConfig) -> Result<()> {
    let question = Question::new(&args.question)?;
    let config = super::load_config(config_path)?;
    let service = QueryService::from_config(&config)?;

    let response = service
        .process(&question, !args.raw)
        .await
        .context("Query failed")?;

    if output.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response {
        QueryResponse::Narrated {
            formatted_response,
            raw_data,
        } => {
            println!("{}", formatted_response);
            if !output.quiet {
                println!();
                print_calls(&raw_data);
            }
        }
        QueryResponse::Raw(envelope) => print_envelope(&envelope, output.quiet),
    }
    Ok(())
}

fn print_envelope(envelope: &ResultEnvelope, quiet: bool) {
    if envelope.results.is_empty() {
        println!(
            "{} No results ({}): {}",
            "!".yellow(),
            envelope.query_type,
            envelope.error.as_deref().unwrap_or(&envelope.explanation)
        );
        return;
    }

    if !quiet {
        println!(
            "{} {} result(s) for {} query",
            "✓".green(),
            envelope.total_results,
            envelope.query_type.to_string().cyan()
        );
        if !envelope.explanation.is_empty() {
            println!("  {}", envelope.explanation.dimmed());
        }
        println!();
    }

    for (i, result) in envelope.results.iter().enumerate() {
        match result {
            RecordResult::Incident { incident_details: d } => {
                println!(
                    "{}. {} [{}] {} ({})",
                    (i + 1).to_string().bold(),
                    show(&d.number).cyan(),
                    show(&d.state),
                    show(&d.description),
                    show(&d.priority)
                );
                if !quiet {
                    println!(
                        "   {}",
                        format!(
                            "assigned to {} / {}",
                            show(&d.assigned_to),
                            show(&d.assignment_group)
                        )
                        .dimmed()
                    );
                }
            }
            RecordResult::Problem {
                problem_details: d,
                related_incidents,
            } => {
                println!(
                    "{}. {} [{}] {} ({})",
                    (i + 1).to_string().bold(),
                    show(&d.number).cyan(),
                    show(&d.state),
                    show(&d.description),
                    show(&d.priority)
                );
                for incident in related_incidents {
                    println!(
                        "   - {} {}",
                        show(&incident.get("number").cloned()),
                        show(&incident.get("short_description").cloned()).dimmed()
                    );
                }
            }
        }
    }

    if !quiet {
        println!();
        print_calls(envelope);
    }
}

fn print_calls(envelope: &ResultEnvelope) {
    for call in &envelope.api_calls {
        let query = call.params.sysparm_query.as_deref().unwrap_or("");
        println!("{}", format!("GET {} {}", call.endpoint, query).dimmed());
    }
}

/// Render a field that may be a plain value or a `{display_value, link}` reference.
fn show(value: &Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) if s.is_empty() => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(o)) => o
            .get("display_value")
            .and_then(Value::as_str)
            .unwrap_or("-")
            .to_string(),
        Some(other) => other.to_string(),
    }
}
