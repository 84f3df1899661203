//! Natural-language queries over ServiceNow incidents and problems.
//!
//! A question is translated into a query plan by a text model, executed
//! against the Table API with an OAuth bearer token, and optionally narrated
//! back as prose.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod fields;
pub mod http;
pub mod llm;
pub mod orchestrator;
pub mod servicenow;
pub mod translator;
pub mod types;
