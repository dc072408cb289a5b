//! Per-student behavior summaries used for AI context and the dashboard
//! report. Everything here takes `today` explicitly.

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::models::{
    ActivityLog, CheckIn, ExamResult, ExamTrend, Student, StudySession, SubjectSummary,
};
use crate::risk::{current_window, in_window};

#[derive(Debug, Clone, Serialize)]
pub struct BehaviorSummary {
    pub study_streak: u32,
    pub weekly_study_minutes: i64,
    pub most_studied_subject: Option<String>,
    pub weekly_questions: i64,
    pub top_subjects: Vec<(String, i64)>,
    pub exam_trend: Option<ExamTrend>,
    pub weekly_mood: Option<f64>,
    pub latest_note: Option<String>,
}

/// Consecutive days with questions solved, ending today. A streak that
/// ended yesterday is still alive until today is over.
pub fn study_streak(logs: &[ActivityLog], today: NaiveDate) -> u32 {
    let active_days: HashSet<NaiveDate> = logs
        .iter()
        .filter(|log| log.questions_solved > 0)
        .map(|log| log.log_date)
        .collect();

    let mut cursor = if active_days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut streak = 0;
    while active_days.contains(&cursor) {
        streak += 1;
        cursor -= Duration::days(1);
    }
    streak
}

pub fn weekly_study_minutes(sessions: &[StudySession], today: NaiveDate) -> i64 {
    let window = current_window(today);
    sessions
        .iter()
        .filter(|session| in_window(session.session_date, window))
        .map(|session| i64::from(session.minutes))
        .sum()
}

/// Subject with the most session minutes this week; ties go to the
/// alphabetically first subject.
pub fn most_studied_subject(sessions: &[StudySession], today: NaiveDate) -> Option<String> {
    let window = current_window(today);
    let mut minutes: BTreeMap<&str, i64> = BTreeMap::new();

    for session in sessions.iter().filter(|session| in_window(session.session_date, window)) {
        *minutes.entry(session.subject.as_str()).or_insert(0) += i64::from(session.minutes);
    }

    minutes
        .into_iter()
        .fold(None::<(&str, i64)>, |best, (subject, total)| match best {
            Some((_, most)) if most >= total => best,
            _ => Some((subject, total)),
        })
        .map(|(subject, _)| subject.to_string())
}

pub fn subject_mix<'a, I>(logs: I, today: NaiveDate) -> Vec<SubjectSummary>
where
    I: IntoIterator<Item = &'a ActivityLog>,
{
    let window = current_window(today);
    let mut totals: BTreeMap<String, i64> = BTreeMap::new();

    for log in logs {
        if !in_window(log.log_date, window) {
            continue;
        }
        *totals.entry(log.subject.clone()).or_insert(0) += i64::from(log.questions_solved);
    }

    let mut summaries: Vec<SubjectSummary> = totals
        .into_iter()
        .map(|(subject, questions)| SubjectSummary { subject, questions })
        .collect();

    // BTreeMap order keeps equal counts sorted by subject.
    summaries.sort_by(|a, b| b.questions.cmp(&a.questions));
    summaries
}

pub fn exam_trend(results: &[ExamResult]) -> Option<ExamTrend> {
    let mut ordered: Vec<&ExamResult> = results.iter().collect();
    ordered.sort_by(|a, b| a.taken_on.cmp(&b.taken_on));

    let latest = *ordered.last()?;
    let previous = ordered.len().checked_sub(2).map(|index| ordered[index].net_score);
    let average_net =
        ordered.iter().map(|result| result.net_score).sum::<f64>() / ordered.len() as f64;

    Some(ExamTrend {
        latest_exam: latest.exam_name.clone(),
        latest_net: latest.net_score,
        previous_net: previous,
        change: previous.map(|net| latest.net_score - net),
        average_net,
    })
}

pub fn weekly_mood(check_ins: &[CheckIn], today: NaiveDate) -> Option<f64> {
    let window = current_window(today);
    let moods: Vec<f64> = check_ins
        .iter()
        .filter(|check_in| in_window(check_in.check_in_date, window))
        .map(|check_in| f64::from(check_in.mood))
        .collect();

    if moods.is_empty() {
        return None;
    }
    Some(moods.iter().sum::<f64>() / moods.len() as f64)
}

/// Most recent check-in note, if the student left one.
pub fn latest_note(check_ins: &[CheckIn]) -> Option<String> {
    check_ins
        .iter()
        .filter(|check_in| check_in.note.as_deref().is_some_and(|note| !note.trim().is_empty()))
        .max_by_key(|check_in| check_in.check_in_date)
        .and_then(|check_in| check_in.note.clone())
}

pub fn summarize(student: &Student, today: NaiveDate) -> BehaviorSummary {
    let subjects = subject_mix(&student.activity_logs, today);

    BehaviorSummary {
        study_streak: study_streak(&student.activity_logs, today),
        weekly_study_minutes: weekly_study_minutes(&student.study_sessions, today),
        most_studied_subject: most_studied_subject(&student.study_sessions, today),
        weekly_questions: subjects.iter().map(|summary| summary.questions).sum(),
        top_subjects: subjects
            .into_iter()
            .take(3)
            .map(|summary| (summary.subject, summary.questions))
            .collect(),
        exam_trend: exam_trend(&student.exam_results),
        weekly_mood: weekly_mood(&student.check_ins, today),
        latest_note: latest_note(&student.check_ins),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn log(days_ago: i64, subject: &str, questions_solved: i32) -> ActivityLog {
        ActivityLog {
            log_date: today() - Duration::days(days_ago),
            subject: subject.to_string(),
            questions_solved,
        }
    }

    fn check_in(days_ago: i64, mood: i16, note: Option<&str>) -> CheckIn {
        CheckIn {
            check_in_date: today() - Duration::days(days_ago),
            mood,
            note: note.map(str::to_string),
        }
    }

    fn session(days_ago: i64, subject: &str, minutes: i32) -> StudySession {
        StudySession {
            session_date: today() - Duration::days(days_ago),
            subject: subject.to_string(),
            minutes,
        }
    }

    fn exam(name: &str, month: u32, net_score: f64) -> ExamResult {
        ExamResult {
            exam_name: name.to_string(),
            taken_on: NaiveDate::from_ymd_opt(2026, month, 1).unwrap(),
            net_score,
        }
    }

    #[test]
    fn streak_counts_back_from_today() {
        let logs = vec![
            log(0, "Fizik", 5),
            log(1, "Fizik", 5),
            log(2, "Kimya", 3),
            log(4, "Fizik", 9),
        ];
        assert_eq!(study_streak(&logs, today()), 3);
    }

    #[test]
    fn streak_survives_until_today_is_over() {
        let logs = vec![log(1, "Fizik", 5), log(2, "Fizik", 5)];
        assert_eq!(study_streak(&logs, today()), 2);
    }

    #[test]
    fn zero_question_days_break_the_streak() {
        let logs = vec![log(0, "Fizik", 5), log(1, "Fizik", 0), log(2, "Fizik", 5)];
        assert_eq!(study_streak(&logs, today()), 1);
        assert_eq!(study_streak(&[], today()), 0);
    }

    #[test]
    fn subject_mix_sorts_by_volume_then_name() {
        let logs = vec![
            log(0, "Matematik", 30),
            log(1, "Biyoloji", 10),
            log(2, "Matematik", 5),
            log(3, "Kimya", 10),
            log(9, "Tarih", 100),
        ];
        let mix = subject_mix(&logs, today());
        let rows: Vec<(&str, i64)> = mix
            .iter()
            .map(|s| (s.subject.as_str(), s.questions))
            .collect();
        assert_eq!(rows, vec![("Matematik", 35), ("Biyoloji", 10), ("Kimya", 10)]);
    }

    #[test]
    fn exam_trend_uses_chronological_order() {
        let results = vec![
            exam("TYT Deneme 3", 3, 71.5),
            exam("TYT Deneme 1", 1, 60.0),
            exam("TYT Deneme 2", 2, 65.5),
        ];
        let trend = exam_trend(&results).unwrap();
        assert_eq!(trend.latest_exam, "TYT Deneme 3");
        assert_eq!(trend.previous_net, Some(65.5));
        assert_eq!(trend.change, Some(6.0));
        assert!((trend.average_net - 65.666).abs() < 0.01);
    }

    #[test]
    fn single_exam_has_no_change() {
        let trend = exam_trend(&[exam("AYT Deneme 1", 2, 40.0)]).unwrap();
        assert_eq!(trend.previous_net, None);
        assert_eq!(trend.change, None);
        assert!(exam_trend(&[]).is_none());
    }

    #[test]
    fn mood_and_minutes_use_current_week() {
        let check_ins = vec![
            check_in(0, 4, None),
            check_in(3, 2, Some("yorgun")),
            check_in(8, 1, None),
        ];
        assert_eq!(weekly_mood(&check_ins, today()), Some(3.0));
        assert_eq!(weekly_mood(&[], today()), None);

        let sessions = vec![
            session(0, "Fizik", 45),
            session(6, "Kimya", 30),
            session(7, "Kimya", 90),
        ];
        assert_eq!(weekly_study_minutes(&sessions, today()), 75);
        assert_eq!(most_studied_subject(&sessions, today()).as_deref(), Some("Fizik"));
        assert_eq!(latest_note(&check_ins).as_deref(), Some("yorgun"));
    }

    #[test]
    fn most_studied_subject_breaks_ties_alphabetically() {
        let sessions = vec![session(0, "Kimya", 30), session(0, "Biyoloji", 30)];
        assert_eq!(most_studied_subject(&sessions, today()).as_deref(), Some("Biyoloji"));
        assert_eq!(most_studied_subject(&[], today()), None);
    }
}
