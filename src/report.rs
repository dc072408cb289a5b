use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::behavior;
use crate::models::{Assignment, RiskInfo, Student};
use crate::risk::{self, RiskThresholds, NEVER_ACTIVE_PASSIVE_DAYS};

const OVERDUE_LIST_LIMIT: usize = 10;

pub fn describe_passive(passive_days: i64) -> String {
    match passive_days {
        NEVER_ACTIVE_PASSIVE_DAYS => "never active".to_string(),
        0 => "active today".to_string(),
        1 => "1 day passive".to_string(),
        days => format!("{days} days passive"),
    }
}

pub fn describe_risk(risk: &RiskInfo) -> String {
    format!(
        "completion {}%, activity {:+}%, {}, {} overdue, streak {}",
        risk.weekly_completion_rate,
        risk.weekly_activity_change,
        describe_passive(risk.passive_days),
        risk.overdue_count,
        risk.study_streak
    )
}

fn overdue_assignments(students: &[Student], now: DateTime<Utc>) -> Vec<(&Student, &Assignment)> {
    let today = now.date_naive();
    let mut overdue: Vec<(&Student, &Assignment)> = students
        .iter()
        .flat_map(|student| {
            student
                .assignments
                .iter()
                .map(move |assignment| (student, assignment))
        })
        .filter(|(_, assignment)| !assignment.is_completed && assignment.due_date < today)
        .collect();

    overdue.sort_by(|a, b| {
        a.1.due_date
            .cmp(&b.1.due_date)
            .then_with(|| a.0.full_name.cmp(&b.0.full_name))
    });
    overdue
}

pub fn build_report(
    scope: Option<&str>,
    now: DateTime<Utc>,
    students: &[Student],
    thresholds: &RiskThresholds,
) -> String {
    let today = now.date_naive();
    let ranked = risk::sort_by_risk(students, now, thresholds);
    let subjects = behavior::subject_mix(
        students.iter().flat_map(|student| student.activity_logs.iter()),
        today,
    );

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all students");

    let _ = writeln!(output, "# Coaching Priority Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        scope_label,
        now.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Students: {}", ranked.len());
    let _ = writeln!(output, "- Kritik: {}", risk::critical_count(&ranked));
    let _ = writeln!(output, "- Overdue assignments: {}", risk::total_overdue(&ranked));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Priority List");

    if ranked.is_empty() {
        let _ = writeln!(output, "No students in scope.");
    } else {
        for entry in ranked.iter() {
            let _ = writeln!(
                output,
                "- [{}] {} ({}, coach {}): {}",
                entry.risk.label,
                entry.student.full_name,
                entry.student.email,
                entry.student.coach_email,
                describe_risk(&entry.risk)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Mix This Week");

    if subjects.is_empty() {
        let _ = writeln!(output, "No questions logged this week.");
    } else {
        for summary in subjects.iter() {
            let _ = writeln!(output, "- {}: {} questions", summary.subject, summary.questions);
        }
    }

    let overdue = overdue_assignments(students, now);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overdue Assignments");

    if overdue.is_empty() {
        let _ = writeln!(output, "Nothing overdue.");
    } else {
        for (student, assignment) in overdue.iter().take(OVERDUE_LIST_LIMIT) {
            let _ = writeln!(
                output,
                "- {}: {} ({}) due {} [{}]",
                student.full_name,
                assignment.title,
                assignment.subject,
                assignment.due_date,
                assignment.id
            );
        }
        if overdue.len() > OVERDUE_LIST_LIMIT {
            let _ = writeln!(output, "- ... and {} more", overdue.len() - OVERDUE_LIST_LIMIT);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Latest Exam Results");

    let trends: Vec<_> = ranked
        .iter()
        .filter_map(|entry| {
            behavior::exam_trend(&entry.student.exam_results).map(|trend| (entry.student, trend))
        })
        .collect();

    if trends.is_empty() {
        let _ = writeln!(output, "No exam results recorded.");
    } else {
        for (student, trend) in trends.iter() {
            let change = trend
                .change
                .map(|change| format!(" ({change:+.2})"))
                .unwrap_or_default();
            let _ = writeln!(
                output,
                "- {}: {} net {:.2}{}",
                student.full_name, trend.latest_exam, trend.latest_net, change
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExamResult;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap()
    }

    fn roster() -> Vec<Student> {
        let mut steady = Student::new("Ece Yılmaz", "ece@example.com", "coach@example.com");
        steady.last_active_at = Some(now() - Duration::hours(2));
        steady.assignments = vec![Assignment {
            id: Uuid::new_v4(),
            title: "Türev testi".to_string(),
            subject: "Matematik".to_string(),
            due_date: now().date_naive() - Duration::days(1),
            is_completed: true,
        }];
        steady.exam_results = vec![
            ExamResult {
                exam_name: "TYT Deneme 1".to_string(),
                taken_on: now().date_naive() - Duration::days(30),
                net_score: 60.0,
            },
            ExamResult {
                exam_name: "TYT Deneme 2".to_string(),
                taken_on: now().date_naive() - Duration::days(5),
                net_score: 64.5,
            },
        ];

        let mut idle = Student::new("Zeynep Aksoy", "zeynep@example.com", "coach@example.com");
        idle.assignments = vec![Assignment {
            id: Uuid::new_v4(),
            title: "Kesirler".to_string(),
            subject: "Matematik".to_string(),
            due_date: now().date_naive() - Duration::days(3),
            is_completed: false,
        }];

        vec![steady, idle]
    }

    #[test]
    fn report_lists_critical_students_first() {
        let report = build_report(
            Some("coach@example.com"),
            now(),
            &roster(),
            &RiskThresholds::default(),
        );
        assert!(report.starts_with("# Coaching Priority Report"));
        assert!(report.contains("- Kritik: 1"));
        assert!(report.contains("- Overdue assignments: 1"));

        let idle = report.find("[Kritik] Zeynep Aksoy").unwrap();
        let steady = report.find("[Stabil] Ece Yılmaz").unwrap();
        assert!(idle < steady);
        assert!(report.contains("never active"));
    }

    #[test]
    fn report_includes_overdue_and_exams() {
        let report = build_report(None, now(), &roster(), &RiskThresholds::default());
        assert!(report.contains("Generated for all students"));
        assert!(report.contains("- Zeynep Aksoy: Kesirler (Matematik) due 2026-03-07 ["));
        assert!(report.contains("- Ece Yılmaz: TYT Deneme 2 net 64.50 (+4.50)"));
        assert!(report.contains("No questions logged this week."));
    }

    #[test]
    fn long_overdue_lists_report_the_remainder() {
        let mut behind = Student::new("Kaan Demir", "kaan@example.com", "coach@example.com");
        behind.assignments = (1..=12)
            .map(|days| Assignment {
                id: Uuid::new_v4(),
                title: format!("Test {days}"),
                subject: "Fizik".to_string(),
                due_date: now().date_naive() - Duration::days(days),
                is_completed: false,
            })
            .collect();

        let report = build_report(None, now(), &[behind], &RiskThresholds::default());
        assert_eq!(report.matches("- Kaan Demir: Test ").count(), 10);
        assert!(report.contains("- ... and 2 more"));
        // Oldest first, so the two most recent are the ones left out.
        assert!(report.contains("- Kaan Demir: Test 12 (Fizik)"));
        assert!(!report.contains("- Kaan Demir: Test 1 (Fizik)"));
        assert!(!report.contains("- Kaan Demir: Test 2 (Fizik)"));
    }

    #[test]
    fn empty_roster_renders_placeholders() {
        let report = build_report(None, now(), &[], &RiskThresholds::default());
        assert!(report.contains("No students in scope."));
        assert!(report.contains("Nothing overdue."));
        assert!(report.contains("No exam results recorded."));
    }

    #[test]
    fn passive_descriptions() {
        assert_eq!(describe_passive(0), "active today");
        assert_eq!(describe_passive(1), "1 day passive");
        assert_eq!(describe_passive(6), "6 days passive");
    }
}
