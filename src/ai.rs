//! Generative-AI integration for coaching insights and study plans.
//!
//! Every response passes through one parse boundary per shape
//! ([`parse_insights`], [`parse_study_plan`]). Anything unusable, including
//! transport failures, resolves to the static fallbacks below. Nothing is
//! retried; the coach re-runs the command.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::behavior::{self, BehaviorSummary};
use crate::config::{AiSettings, FeatureFlags};
use crate::models::{RiskInfo, RiskLabel, Student, StudentRisk, StudyPlanTask};
use crate::risk;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const MAX_PLAN_DAYS: u32 = 14;

pub const FALLBACK_STUDENT_INSIGHTS: [&str; 3] = [
    "Bu hafta düzenli çalışmaya devam et, küçük hedefler büyük fark yaratır.",
    "Geciken ödevlerini önceliklendir ve her gün en az bir tanesini tamamla.",
    "Deneme sonuçlarındaki yanlışlarını konu bazında gözden geçir.",
];

pub const FALLBACK_COACH_INSIGHTS: [&str; 3] = [
    "Kritik durumdaki öğrencilerle bu hafta birebir görüşme planlayın.",
    "Geciken ödevi çok olan öğrenciler için teslim tarihlerini yeniden düzenleyin.",
    "Aktivitesi düşen öğrencilere kısa ve ulaşılabilir günlük hedefler verin.",
];

const FALLBACK_PLAN_ROTATION: [(&str, &str, &str); 4] = [
    ("Konu tekrarı", "Son hafta işlenen konuları özet çıkararak tekrar et.", "Genel"),
    (
        "Soru çözümü",
        "Zayıf olduğun konudan 40 soru çöz ve yanlışlarını işaretle.",
        "Matematik",
    ),
    ("Paragraf çalışması", "Süre tutarak 20 paragraf sorusu çöz.", "Türkçe"),
    ("Yanlış analizi", "Haftanın yanlış sorularını tekrar çöz ve not al.", "Genel"),
];

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI endpoint is not configured")]
    NotConfigured,

    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("AI endpoint returned no content")]
    EmptyResponse,

    #[error("study plans require the premium plan")]
    PremiumRequired,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AiError>;
}

/// Backend used when no API key is configured. Every call falls back.
pub struct UnconfiguredBackend;

#[async_trait]
impl CompletionBackend for UnconfiguredBackend {
    async fn complete(&self, _prompt: &str) -> Result<String, AiError> {
        Err(AiError::NotConfigured)
    }
}

pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, AiError> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|part| part.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(text)
    }
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self, AiError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            api_key,
            model,
            base_url,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl CompletionBackend for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        debug!(model = %self.model, "calling generative endpoint");

        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.7,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status { status, body });
        }

        response.json::<GenerateResponse>().await?.into_text()
    }
}

pub fn build_backend(settings: &AiSettings) -> Box<dyn CompletionBackend> {
    let Some(api_key) = settings.api_key.clone() else {
        info!("GEMINI_API_KEY not set, AI features will use static fallbacks");
        return Box::new(UnconfiguredBackend);
    };

    match GeminiClient::new(api_key, settings.model.clone(), settings.base_url.clone()) {
        Ok(client) => Box::new(client),
        Err(err) => {
            warn!(error = %err, "could not build AI client, using static fallbacks");
            Box::new(UnconfiguredBackend)
        }
    }
}

/// What the model sees about one student.
#[derive(Debug, Clone, Serialize)]
pub struct StudentContext {
    pub name: String,
    pub target_exam: String,
    pub risk: RiskInfo,
    pub behavior: BehaviorSummary,
    pub overdue_subjects: Vec<String>,
}

impl StudentContext {
    pub fn new(student: &Student, risk: &RiskInfo, today: NaiveDate) -> Self {
        let overdue_subjects: BTreeSet<String> = student
            .assignments
            .iter()
            .filter(|assignment| !assignment.is_completed && assignment.due_date < today)
            .map(|assignment| assignment.subject.clone())
            .collect();

        Self {
            name: student.full_name.clone(),
            target_exam: student.target_exam.clone(),
            risk: risk.clone(),
            behavior: behavior::summarize(student, today),
            overdue_subjects: overdue_subjects.into_iter().collect(),
        }
    }
}

/// Roster-wide numbers for coach insights.
#[derive(Debug, Clone, Serialize)]
pub struct CoachContext {
    pub total_students: usize,
    pub critical: usize,
    pub attention: usize,
    pub stable: usize,
    pub total_overdue: usize,
    pub average_completion_rate: i64,
    pub most_urgent: Vec<String>,
}

impl CoachContext {
    /// Expects `ranked` in [`risk::sort_by_risk`] order.
    pub fn from_ranked(ranked: &[StudentRisk<'_>]) -> Self {
        let count = |label: RiskLabel| {
            ranked
                .iter()
                .filter(|entry| entry.risk.label == label)
                .count()
        };
        let average_completion_rate = if ranked.is_empty() {
            0
        } else {
            let total: i64 = ranked
                .iter()
                .map(|entry| entry.risk.weekly_completion_rate)
                .sum();
            (total as f64 / ranked.len() as f64).round() as i64
        };

        Self {
            total_students: ranked.len(),
            critical: risk::critical_count(ranked),
            attention: count(RiskLabel::Dikkat),
            stable: count(RiskLabel::Stabil),
            total_overdue: risk::total_overdue(ranked),
            average_completion_rate,
            most_urgent: ranked
                .iter()
                .filter(|entry| entry.risk.label == RiskLabel::Kritik)
                .take(5)
                .map(|entry| entry.student.full_name.clone())
                .collect(),
        }
    }
}

pub fn student_insights_prompt(context: &StudentContext) -> String {
    format!(
        r#"You are an experienced exam-preparation coach. Based on the student data below,
write 3 short, encouraging and specific insights addressed to the student, in Turkish.

Student data (JSON):
{}

Respond ONLY with a JSON array of strings, for example ["...", "...", "..."]."#,
        to_json(context)
    )
}

pub fn coach_insights_prompt(context: &CoachContext) -> String {
    format!(
        r#"You are advising an exam-preparation coach about their whole roster.
Using the aggregate statistics below, write 3 short, actionable recommendations in Turkish.

Roster statistics (JSON):
{}

Respond ONLY with a JSON array of strings."#,
        to_json(context)
    )
}

pub fn study_plan_prompt(context: &StudentContext, days: u32) -> String {
    format!(
        r#"You are an exam-preparation coach. Create a {days}-day study plan for the student
below, one task per day, prioritising overdue subjects and weak areas.
Write titles and descriptions in Turkish.

Student data (JSON):
{}

Respond ONLY with a JSON array of objects with the fields
"day" (1-based integer), "title", "description" and "subject"."#,
        to_json(context)
    )
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// The outermost JSON array in `raw`, ignoring code fences or prose.
fn json_array_slice(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end > start).then(|| &raw[start..=end])
}

pub fn parse_insights(raw: &str) -> Option<Vec<String>> {
    let items: Vec<String> = serde_json::from_str(json_array_slice(raw)?).ok()?;
    let items: Vec<String> = items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    (!items.is_empty()).then_some(items)
}

#[derive(Debug, Deserialize)]
struct RawPlanTask {
    day: u32,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    subject: String,
}

/// Exactly one task per day for days `1..=days`. The first task given for a
/// day wins; days the response skipped are filled from the fallback rotation.
/// `None` when no usable task is present.
pub fn parse_study_plan(raw: &str, days: u32) -> Option<Vec<StudyPlanTask>> {
    let days = clamp_days(days);
    let tasks: Vec<RawPlanTask> = serde_json::from_str(json_array_slice(raw)?).ok()?;
    let mut by_day: BTreeMap<u32, StudyPlanTask> = BTreeMap::new();

    for task in tasks {
        if task.day < 1 || task.day > days || task.title.trim().is_empty() {
            continue;
        }
        by_day.entry(task.day).or_insert_with(|| StudyPlanTask {
            day: task.day,
            title: task.title.trim().to_string(),
            description: task.description.trim().to_string(),
            subject: task.subject.trim().to_string(),
        });
    }

    if by_day.is_empty() {
        return None;
    }

    Some(
        fallback_study_plan(days)
            .into_iter()
            .map(|filler| by_day.remove(&filler.day).unwrap_or(filler))
            .collect(),
    )
}

pub fn fallback_list(messages: &[&str]) -> Vec<String> {
    messages.iter().map(|message| message.to_string()).collect()
}

pub fn fallback_study_plan(days: u32) -> Vec<StudyPlanTask> {
    (1..=clamp_days(days))
        .zip(FALLBACK_PLAN_ROTATION.iter().cycle())
        .map(|(day, (title, description, subject))| StudyPlanTask {
            day,
            title: title.to_string(),
            description: description.to_string(),
            subject: subject.to_string(),
        })
        .collect()
}

pub fn clamp_days(days: u32) -> u32 {
    days.clamp(1, MAX_PLAN_DAYS)
}

pub struct CoachAssistant {
    backend: Box<dyn CompletionBackend>,
    features: FeatureFlags,
}

impl CoachAssistant {
    pub fn new(backend: Box<dyn CompletionBackend>, features: FeatureFlags) -> Self {
        Self { backend, features }
    }

    pub async fn student_insights(&self, context: &StudentContext) -> Vec<String> {
        let prompt = student_insights_prompt(context);
        self.generate(&prompt, "student insights", parse_insights)
            .await
            .unwrap_or_else(|| fallback_list(&FALLBACK_STUDENT_INSIGHTS))
    }

    pub async fn coach_insights(&self, context: &CoachContext) -> Vec<String> {
        let prompt = coach_insights_prompt(context);
        self.generate(&prompt, "coach insights", parse_insights)
            .await
            .unwrap_or_else(|| fallback_list(&FALLBACK_COACH_INSIGHTS))
    }

    pub async fn study_plan(
        &self,
        context: &StudentContext,
        days: u32,
    ) -> Result<Vec<StudyPlanTask>, AiError> {
        if !self.features.premium {
            return Err(AiError::PremiumRequired);
        }

        let days = clamp_days(days);
        let prompt = study_plan_prompt(context, days);
        Ok(self
            .generate(&prompt, "study plan", |raw| parse_study_plan(raw, days))
            .await
            .unwrap_or_else(|| fallback_study_plan(days)))
    }

    async fn generate<T>(
        &self,
        prompt: &str,
        kind: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        match self.backend.complete(prompt).await {
            Ok(raw) => {
                let parsed = parse(&raw);
                if parsed.is_none() {
                    warn!(kind, "AI response was not usable, using fallback");
                }
                parsed
            }
            Err(err) => {
                warn!(kind, error = %err, "AI request failed, using fallback");
                None
            }
        }
    }
}
