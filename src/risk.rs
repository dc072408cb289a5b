use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::behavior;
use crate::models::{ActivityLog, Assignment, RiskInfo, RiskLabel, Student, StudentRisk};

/// Passive days reported for a student with no recorded activity at all.
pub const NEVER_ACTIVE_PASSIVE_DAYS: i64 = 9999;

pub const DEFAULT_CRITICAL_PASSIVE_DAYS: i64 = 5;
pub const DEFAULT_CRITICAL_OVERDUE: usize = 3;
pub const DEFAULT_MIN_COMPLETION_RATE: i64 = 50;
pub const DEFAULT_ACTIVITY_DROP: i64 = -20;

/// Length of the trailing window, today included.
pub const WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskThresholds {
    pub critical_passive_days: i64,
    pub critical_overdue: usize,
    pub min_completion_rate: i64,
    pub activity_drop: i64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            critical_passive_days: DEFAULT_CRITICAL_PASSIVE_DAYS,
            critical_overdue: DEFAULT_CRITICAL_OVERDUE,
            min_completion_rate: DEFAULT_MIN_COMPLETION_RATE,
            activity_drop: DEFAULT_ACTIVITY_DROP,
        }
    }
}

/// Inclusive bounds of the trailing window ending on `today`.
pub fn current_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(WINDOW_DAYS - 1), today)
}

/// Inclusive bounds of the window immediately before [`current_window`].
pub fn previous_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let (start, _) = current_window(today);
    (start - Duration::days(WINDOW_DAYS), start - Duration::days(1))
}

pub fn in_window(date: NaiveDate, (start, end): (NaiveDate, NaiveDate)) -> bool {
    date >= start && date <= end
}

pub fn passive_days(last_active_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    match last_active_at {
        // Clock skew can put last activity ahead of `now`.
        Some(at) => (now - at).num_days().max(0),
        None => NEVER_ACTIVE_PASSIVE_DAYS,
    }
}

pub fn overdue_count(assignments: &[Assignment], today: NaiveDate) -> usize {
    assignments
        .iter()
        .filter(|assignment| !assignment.is_completed && assignment.due_date < today)
        .count()
}

pub fn weekly_completion_rate(assignments: &[Assignment], today: NaiveDate) -> i64 {
    let window = current_window(today);
    let (total, completed) = assignments
        .iter()
        .filter(|assignment| in_window(assignment.due_date, window))
        .fold((0usize, 0usize), |(total, completed), assignment| {
            (total + 1, completed + usize::from(assignment.is_completed))
        });

    if total == 0 {
        return 0;
    }

    (completed as f64 / total as f64 * 100.0).round() as i64
}

fn questions_in(logs: &[ActivityLog], window: (NaiveDate, NaiveDate)) -> i64 {
    logs.iter()
        .filter(|log| in_window(log.log_date, window))
        .map(|log| i64::from(log.questions_solved))
        .sum()
}

/// Percent change in questions solved between the previous and current
/// windows. A zero baseline is treated as one, so 0 -> 10 reports 1000.
pub fn weekly_activity_change(logs: &[ActivityLog], today: NaiveDate) -> i64 {
    let current = questions_in(logs, current_window(today));
    let previous = questions_in(logs, previous_window(today));

    ((current - previous) as f64 / previous.max(1) as f64 * 100.0).round() as i64
}

pub fn risk_label(
    passive_days: i64,
    overdue_count: usize,
    weekly_completion_rate: i64,
    weekly_activity_change: i64,
    thresholds: &RiskThresholds,
) -> RiskLabel {
    if passive_days >= thresholds.critical_passive_days
        || overdue_count >= thresholds.critical_overdue
    {
        RiskLabel::Kritik
    } else if weekly_completion_rate < thresholds.min_completion_rate
        || weekly_activity_change < thresholds.activity_drop
    {
        RiskLabel::Dikkat
    } else {
        RiskLabel::Stabil
    }
}

pub fn assess(student: &Student, now: DateTime<Utc>, thresholds: &RiskThresholds) -> RiskInfo {
    let today = now.date_naive();
    let passive_days = passive_days(student.last_active_at, now);
    let overdue_count = overdue_count(&student.assignments, today);
    let weekly_completion_rate = weekly_completion_rate(&student.assignments, today);
    let weekly_activity_change = weekly_activity_change(&student.activity_logs, today);

    RiskInfo {
        passive_days,
        overdue_count,
        weekly_completion_rate,
        weekly_activity_change,
        study_streak: behavior::study_streak(&student.activity_logs, today),
        label: risk_label(
            passive_days,
            overdue_count,
            weekly_completion_rate,
            weekly_activity_change,
            thresholds,
        ),
    }
}

/// Assesses every student and orders them most urgent first.
pub fn sort_by_risk<'a>(
    students: &'a [Student],
    now: DateTime<Utc>,
    thresholds: &RiskThresholds,
) -> Vec<StudentRisk<'a>> {
    let mut ranked: Vec<StudentRisk<'a>> = students
        .iter()
        .map(|student| StudentRisk {
            student,
            risk: assess(student, now, thresholds),
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.risk
            .label
            .cmp(&b.risk.label)
            .then(a.risk.weekly_completion_rate.cmp(&b.risk.weekly_completion_rate))
            .then(b.risk.overdue_count.cmp(&a.risk.overdue_count))
            .then(a.student.id.cmp(&b.student.id))
    });
    ranked
}

pub fn critical_count(ranked: &[StudentRisk<'_>]) -> usize {
    ranked
        .iter()
        .filter(|entry| entry.risk.label == RiskLabel::Kritik)
        .count()
}

pub fn total_overdue(ranked: &[StudentRisk<'_>]) -> usize {
    ranked.iter().map(|entry| entry.risk.overdue_count).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 15, 30, 0).unwrap()
    }

    fn days_ago(days: i64) -> NaiveDate {
        now().date_naive() - Duration::days(days)
    }

    fn assignment(due_days_ago: i64, is_completed: bool) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            title: "Paragraf testi".to_string(),
            subject: "Türkçe".to_string(),
            due_date: days_ago(due_days_ago),
            is_completed,
        }
    }

    fn log(days: i64, questions_solved: i32) -> ActivityLog {
        ActivityLog {
            log_date: days_ago(days),
            subject: "Matematik".to_string(),
            questions_solved,
        }
    }

    fn active_student(name: &str) -> Student {
        let mut student = Student::new(name, &format!("{name}@example.com"), "coach@example.com");
        student.last_active_at = Some(now() - Duration::hours(3));
        student
    }

    #[test]
    fn empty_assignments_yield_zero_overdue_and_rate() {
        let student = active_student("deniz");
        let risk = assess(&student, now(), &RiskThresholds::default());
        assert_eq!(risk.overdue_count, 0);
        assert_eq!(risk.weekly_completion_rate, 0);
    }

    #[test]
    fn empty_logs_yield_no_activity_change() {
        let student = active_student("deniz");
        assert_eq!(weekly_activity_change(&student.activity_logs, now().date_naive()), 0);
    }

    #[test]
    fn passive_days_never_negative() {
        for hours in [-72, -1, 0, 1, 23, 24, 200] {
            let last = now() - Duration::hours(hours);
            assert!(passive_days(Some(last), now()) >= 0, "offset {hours}h");
        }
        assert_eq!(passive_days(Some(now() + Duration::days(2)), now()), 0);
    }

    #[test]
    fn missing_last_active_is_maximally_passive() {
        assert_eq!(passive_days(None, now()), NEVER_ACTIVE_PASSIVE_DAYS);
    }

    #[test]
    fn six_passive_days_is_critical() {
        let mut student = Student::new("Ada", "ada@example.com", "coach@example.com");
        student.last_active_at = Some(now() - Duration::days(6));

        let risk = assess(&student, now(), &RiskThresholds::default());
        assert_eq!(risk.passive_days, 6);
        assert_eq!(risk.label, RiskLabel::Kritik);
    }

    #[test]
    fn critical_wins_over_other_metrics() {
        let thresholds = RiskThresholds::default();
        assert_eq!(risk_label(5, 0, 100, 300, &thresholds), RiskLabel::Kritik);
        assert_eq!(risk_label(0, 3, 100, 300, &thresholds), RiskLabel::Kritik);
        assert_eq!(risk_label(9, 7, 0, -90, &thresholds), RiskLabel::Kritik);
        assert_eq!(risk_label(4, 2, 49, 0, &thresholds), RiskLabel::Dikkat);
        assert_eq!(risk_label(4, 2, 50, -20, &thresholds), RiskLabel::Stabil);
    }

    #[test]
    fn completion_rate_counts_window_only() {
        let assignments = vec![
            assignment(0, true),
            assignment(2, false),
            assignment(4, false),
            assignment(6, false),
            assignment(7, true),
            assignment(20, true),
        ];
        assert_eq!(weekly_completion_rate(&assignments, now().date_naive()), 25);
    }

    #[test]
    fn completion_rate_rounds_to_nearest() {
        let assignments = vec![assignment(1, true), assignment(2, true), assignment(3, false)];
        assert_eq!(weekly_completion_rate(&assignments, now().date_naive()), 67);
    }

    #[test]
    fn overdue_ignores_today_and_completed() {
        let assignments = vec![
            assignment(0, false),
            assignment(1, false),
            assignment(9, false),
            assignment(3, true),
        ];
        assert_eq!(overdue_count(&assignments, now().date_naive()), 2);
    }

    #[test]
    fn zero_baseline_growth_is_finite() {
        let logs = vec![log(1, 4), log(3, 6)];
        assert_eq!(weekly_activity_change(&logs, now().date_naive()), 1000);
    }

    #[test]
    fn halved_activity_needs_attention() {
        let mut student = active_student("mert");
        student.assignments = vec![assignment(0, true), assignment(2, true)];
        student.activity_logs = vec![log(7, 25), log(13, 15), log(0, 12), log(6, 8)];

        let risk = assess(&student, now(), &RiskThresholds::default());
        assert_eq!(risk.weekly_activity_change, -50);
        assert_eq!(risk.label, RiskLabel::Dikkat);
    }

    #[test]
    fn logs_outside_both_windows_are_ignored() {
        let logs = vec![log(14, 500), log(2, 10), log(8, 10)];
        assert_eq!(weekly_activity_change(&logs, now().date_naive()), 0);
    }

    #[test]
    fn sort_orders_by_label_rate_overdue_then_id() {
        let mut critical = Student::new("Kaan", "kaan@example.com", "coach@example.com");
        critical.last_active_at = Some(now() - Duration::days(10));

        let mut weak = active_student("elif");
        weak.assignments = vec![assignment(1, false), assignment(2, true), assignment(3, false)];

        let mut weaker = active_student("zeynep");
        weaker.assignments = vec![
            assignment(0, false),
            assignment(2, true),
            assignment(4, false),
            assignment(5, false),
        ];

        let mut stable = active_student("can");
        stable.assignments = vec![assignment(1, true)];

        let students = vec![stable, weak, critical, weaker];
        let ranked = sort_by_risk(&students, now(), &RiskThresholds::default());
        let names: Vec<&str> = ranked
            .iter()
            .map(|entry| entry.student.full_name.as_str())
            .collect();
        assert_eq!(names, vec!["Kaan", "zeynep", "elif", "can"]);
    }

    #[test]
    fn equal_metrics_break_ties_by_overdue_then_id() {
        let mut first = active_student("a");
        first.assignments = vec![assignment(1, false), assignment(10, false)];
        let mut second = active_student("b");
        second.assignments = vec![assignment(1, false)];
        let mut third = active_student("c");
        third.assignments = vec![assignment(1, false)];

        let students = vec![third.clone(), second.clone(), first.clone()];
        let ranked = sort_by_risk(&students, now(), &RiskThresholds::default());
        assert_eq!(ranked[0].student.id, first.id);

        let mut expected = vec![second.id, third.id];
        expected.sort();
        assert_eq!(vec![ranked[1].student.id, ranked[2].student.id], expected);
    }

    #[test]
    fn sort_is_deterministic_for_fixed_now() {
        let students: Vec<Student> = (0..6)
            .map(|index| {
                let mut student = active_student(&format!("s{index}"));
                student.assignments = vec![assignment(index, index % 2 == 0)];
                student.activity_logs = vec![log(index, 10), log(index + 7, 12)];
                student
            })
            .collect();

        let first: Vec<Uuid> = sort_by_risk(&students, now(), &RiskThresholds::default())
            .iter()
            .map(|entry| entry.student.id)
            .collect();
        let second: Vec<Uuid> = sort_by_risk(&students, now(), &RiskThresholds::default())
            .iter()
            .map(|entry| entry.student.id)
            .collect();
        assert_eq!(first, second);

        let once = assess(&students[3], now(), &RiskThresholds::default());
        let twice = assess(&students[3], now(), &RiskThresholds::default());
        assert_eq!(once, twice);
    }

    #[test]
    fn aggregates_sum_across_students() {
        let mut late = active_student("late");
        late.assignments = vec![assignment(1, false), assignment(2, false), assignment(3, false)];
        let mut partial = active_student("partial");
        partial.assignments = vec![assignment(1, false), assignment(2, true)];
        let idle = Student::new("idle", "idle@example.com", "coach@example.com");

        let students = vec![late, partial, idle];
        let ranked = sort_by_risk(&students, now(), &RiskThresholds::default());
        assert_eq!(critical_count(&ranked), 2);
        assert_eq!(total_overdue(&ranked), 4);
    }

    #[test]
    fn custom_thresholds_shift_labels() {
        let thresholds = RiskThresholds {
            critical_passive_days: 10,
            ..RiskThresholds::default()
        };
        assert_eq!(risk_label(6, 0, 80, 0, &thresholds), RiskLabel::Stabil);
    }
}
