use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub coach_email: String,
    pub target_exam: String,
    pub last_active_at: Option<DateTime<Utc>>,
    pub assignments: Vec<Assignment>,
    pub activity_logs: Vec<ActivityLog>,
    pub check_ins: Vec<CheckIn>,
    pub study_sessions: Vec<StudySession>,
    pub exam_results: Vec<ExamResult>,
}

#[cfg(test)]
impl Student {
    pub fn new(full_name: &str, email: &str, coach_email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            email: email.to_string(),
            coach_email: coach_email.to_string(),
            target_exam: "YKS".to_string(),
            last_active_at: None,
            assignments: Vec::new(),
            activity_logs: Vec::new(),
            check_ins: Vec::new(),
            study_sessions: Vec::new(),
            exam_results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: Uuid,
    pub title: String,
    pub subject: String,
    pub due_date: NaiveDate,
    pub is_completed: bool,
}

#[derive(Debug, Clone)]
pub struct ActivityLog {
    pub log_date: NaiveDate,
    pub subject: String,
    pub questions_solved: i32,
}

#[derive(Debug, Clone)]
pub struct CheckIn {
    pub check_in_date: NaiveDate,
    /// 1 (very low) to 5 (great).
    pub mood: i16,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StudySession {
    pub session_date: NaiveDate,
    pub subject: String,
    pub minutes: i32,
}

#[derive(Debug, Clone)]
pub struct ExamResult {
    pub exam_name: String,
    pub taken_on: NaiveDate,
    pub net_score: f64,
}

/// Coaching priority, ordered from most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLabel {
    Kritik,
    Dikkat,
    Stabil,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Kritik => "Kritik",
            RiskLabel::Dikkat => "Dikkat",
            RiskLabel::Stabil => "Stabil",
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskInfo {
    pub passive_days: i64,
    pub overdue_count: usize,
    pub weekly_completion_rate: i64,
    pub weekly_activity_change: i64,
    pub study_streak: u32,
    pub label: RiskLabel,
}

#[derive(Debug, Clone)]
pub struct StudentRisk<'a> {
    pub student: &'a Student,
    pub risk: RiskInfo,
}

#[derive(Debug, Clone)]
pub struct SubjectSummary {
    pub subject: String,
    pub questions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamTrend {
    pub latest_exam: String,
    pub latest_net: f64,
    pub previous_net: Option<f64>,
    pub change: Option<f64>,
    pub average_net: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudyPlanTask {
    pub day: u32,
    pub title: String,
    pub description: String,
    pub subject: String,
}
