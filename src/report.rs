//! Report Generator boundary: assembles a prompt from the learner's
//! reflection plus ambient course context, calls a chat-completions endpoint,
//! and coerces the answer into a structured report. Callers treat any failure
//! here as non-fatal.

use std::future::Future;
use std::pin::Pin;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ReportConfig;
use crate::models::Reflection;

pub type ReportFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<ReportPayload>> + Send + 'a>>;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReportPayload {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub recommendations: Option<String>,
    #[serde(default)]
    pub insights: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReportContext {
    pub course_title: String,
    pub percentage: i64,
    pub time_spent: i64,
    pub course_notes: Option<String>,
    pub reflection: Reflection,
}

/// Single attempt, bounded by the client timeout; the core never retries.
pub trait ReportGenerator: Send + Sync {
    fn generate<'a>(&'a self, ctx: &'a ReportContext) -> ReportFuture<'a>;
}

const SYSTEM_PROMPT: &str = "You are a learning coach. Answer with a single JSON object \
containing the keys \"summary\" (string), \"key_points\" (array of strings), \
\"recommendations\" (string) and \"insights\" (string). No other text.";

pub fn build_prompt(ctx: &ReportContext) -> String {
    let mut prompt = format!(
        "A learner reached the {}% milestone of the course \"{}\" after {} minutes of study.\n\
         Their summary of what they learned: {}\n\
         Key concepts they identified: {}\n\
         Challenges they faced: {}\n\
         Their planned next steps: {}\n",
        ctx.percentage,
        ctx.course_title,
        ctx.time_spent,
        ctx.reflection.learning_summary,
        ctx.reflection.key_concepts.join(", "),
        ctx.reflection.challenges,
        ctx.reflection.next_steps,
    );
    if let Some(notes) = ctx.reflection.notes_at_milestone.as_deref() {
        prompt.push_str(&format!("Milestone notes: {notes}\n"));
    }
    if let Some(notes) = ctx.course_notes.as_deref() {
        prompt.push_str(&format!("Course-level notes: {notes}\n"));
    }
    prompt.push_str("Write a short progress report for this learner.");
    prompt
}

/// Models occasionally wrap the JSON in a markdown code fence; tolerate that,
/// but reject anything that is not the expected object.
pub fn parse_report(content: &str) -> anyhow::Result<ReportPayload> {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);
    serde_json::from_str(trimmed).context("report output is not the expected JSON object")
}

/// Talks to an OpenAI-compatible chat-completions endpoint over HTTP.
pub struct OpenAiReportGenerator {
    client: reqwest::Client,
    config: ReportConfig,
}

impl OpenAiReportGenerator {
    pub fn new(config: ReportConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(OpenAiReportGenerator { client, config })
    }

    async fn request(&self, ctx: &ReportContext) -> anyhow::Result<ReportPayload> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("report generation is not configured"))?;
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(ctx) },
            ],
            "response_format": { "type": "json_object" },
        });
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let resp: serde_json::Value = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let content = resp["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("completion response has no content"))?;
        parse_report(content)
    }
}

impl ReportGenerator for OpenAiReportGenerator {
    fn generate<'a>(&'a self, ctx: &'a ReportContext) -> ReportFuture<'a> {
        Box::pin(self.request(ctx))
    }
}

/// Canned generator for local development and tests.
pub struct StaticReportGenerator;

impl ReportGenerator for StaticReportGenerator {
    fn generate<'a>(&'a self, ctx: &'a ReportContext) -> ReportFuture<'a> {
        let payload = ReportPayload {
            summary: format!(
                "Reached {}% of {}.",
                ctx.percentage, ctx.course_title
            ),
            key_points: ctx.reflection.key_concepts.clone(),
            recommendations: Some("Keep a steady pace.".into()),
            insights: None,
        };
        Box::pin(async move { Ok(payload) })
    }
}
