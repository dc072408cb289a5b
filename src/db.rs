use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{ActivityLog, Assignment, CheckIn, ExamResult, Student, StudySession};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Seeds three students with activity relative to `now`, so a fresh
/// database shows every risk label.
pub async fn seed(pool: &PgPool, now: DateTime<Utc>) -> anyhow::Result<()> {
    let today = now.date_naive();
    let coach = "coach.demir@example.com";
    let students = vec![
        ("Ece Yılmaz", "ece.yilmaz@example.com", "YKS", Some(now - Duration::hours(5))),
        ("Mert Kaya", "mert.kaya@example.com", "YKS", Some(now - Duration::days(2))),
        ("Zeynep Aksoy", "zeynep.aksoy@example.com", "LGS", Some(now - Duration::days(8))),
    ];

    for (name, email, target_exam, last_active_at) in students {
        sqlx::query(
            r#"
            INSERT INTO coaching.students
            (id, full_name, email, coach_email, target_exam, last_active_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                coach_email = EXCLUDED.coach_email,
                target_exam = EXCLUDED.target_exam,
                last_active_at = EXCLUDED.last_active_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(coach)
        .bind(target_exam)
        .bind(last_active_at)
        .execute(pool)
        .await?;
    }

    let assignments = vec![
        ("seed-asg-001", "ece.yilmaz@example.com", "Türev testi", "Matematik", 1, true),
        ("seed-asg-002", "ece.yilmaz@example.com", "Paragraf 40 soru", "Türkçe", 3, true),
        ("seed-asg-003", "ece.yilmaz@example.com", "Optik deneme", "Fizik", -2, false),
        ("seed-asg-004", "mert.kaya@example.com", "Organik kimya özeti", "Kimya", 2, false),
        ("seed-asg-005", "mert.kaya@example.com", "Limit testi", "Matematik", 4, true),
        ("seed-asg-006", "mert.kaya@example.com", "Hücre bölünmesi", "Biyoloji", 5, false),
        ("seed-asg-007", "zeynep.aksoy@example.com", "Kesirler", "Matematik", 3, false),
        ("seed-asg-008", "zeynep.aksoy@example.com", "Fiil çekimi", "Türkçe", 6, false),
        ("seed-asg-009", "zeynep.aksoy@example.com", "Basınç", "Fen", 9, false),
    ];

    for (source_key, email, title, subject, due_days_ago, is_completed) in assignments {
        let student_id = student_id_by_email(pool, email).await?;
        sqlx::query(
            r#"
            INSERT INTO coaching.assignments
            (id, student_id, title, subject, due_date, is_completed, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(title)
        .bind(subject)
        .bind(today - Duration::days(due_days_ago))
        .bind(is_completed)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let logs = vec![
        ("seed-log-001", "ece.yilmaz@example.com", 0, "Matematik", 45),
        ("seed-log-002", "ece.yilmaz@example.com", 1, "Türkçe", 30),
        ("seed-log-003", "ece.yilmaz@example.com", 2, "Fizik", 25),
        ("seed-log-004", "ece.yilmaz@example.com", 9, "Matematik", 60),
        ("seed-log-005", "mert.kaya@example.com", 2, "Kimya", 20),
        ("seed-log-006", "mert.kaya@example.com", 8, "Kimya", 50),
        ("seed-log-007", "mert.kaya@example.com", 10, "Matematik", 40),
        ("seed-log-008", "zeynep.aksoy@example.com", 8, "Matematik", 35),
    ];

    for (source_key, email, days_ago, subject, questions_solved) in logs {
        let student_id = student_id_by_email(pool, email).await?;
        insert_activity_log(
            pool,
            student_id,
            today - Duration::days(days_ago),
            subject,
            questions_solved,
            source_key,
        )
        .await?;
    }

    let exams = vec![
        ("ece.yilmaz@example.com", "TYT Deneme 1", 40, 68.5),
        ("ece.yilmaz@example.com", "TYT Deneme 2", 12, 74.25),
        ("mert.kaya@example.com", "TYT Deneme 1", 40, 55.0),
        ("mert.kaya@example.com", "TYT Deneme 2", 12, 51.75),
    ];

    for (email, exam_name, days_ago, net_score) in exams {
        let student_id = student_id_by_email(pool, email).await?;
        sqlx::query(
            r#"
            INSERT INTO coaching.exam_results (id, student_id, exam_name, taken_on, net_score)
            SELECT $1, $2, $3, $4, $5
            WHERE NOT EXISTS (
                SELECT 1 FROM coaching.exam_results WHERE student_id = $2 AND exam_name = $3
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(exam_name)
        .bind(today - Duration::days(days_ago))
        .bind(net_score)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn student_id_by_email(pool: &PgPool, email: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM coaching.students WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no student with email {email}"))?;
    Ok(row.get("id"))
}

/// Last activity only moves forward.
async fn touch_last_active(
    pool: &PgPool,
    student_id: Uuid,
    at: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE coaching.students SET last_active_at = GREATEST(last_active_at, $2) WHERE id = $1",
    )
    .bind(student_id)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(())
}

fn validate_questions(questions_solved: i32) -> anyhow::Result<()> {
    if questions_solved < 0 {
        bail!("questions_solved cannot be negative, got {questions_solved}");
    }
    Ok(())
}

async fn insert_activity_log(
    pool: &PgPool,
    student_id: Uuid,
    log_date: NaiveDate,
    subject: &str,
    questions_solved: i32,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO coaching.activity_logs
        (id, student_id, log_date, subject, questions_solved, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(log_date)
    .bind(subject)
    .bind(questions_solved)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn fetch_students(
    pool: &PgPool,
    coach: Option<&str>,
    email: Option<&str>,
) -> anyhow::Result<Vec<Student>> {
    let mut query = String::from(
        "SELECT id, full_name, email, coach_email, target_exam, last_active_at \
         FROM coaching.students",
    );

    if coach.is_some() {
        query.push_str(" WHERE coach_email = $1");
    } else if email.is_some() {
        query.push_str(" WHERE email = $1");
    }
    query.push_str(" ORDER BY full_name");

    let mut rows = sqlx::query(&query);
    if let Some(value) = coach {
        rows = rows.bind(value);
    } else if let Some(value) = email {
        rows = rows.bind(value);
    }

    let mut students: Vec<Student> = rows
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| Student {
            id: row.get("id"),
            full_name: row.get("full_name"),
            email: row.get("email"),
            coach_email: row.get("coach_email"),
            target_exam: row.get("target_exam"),
            last_active_at: row.get("last_active_at"),
            assignments: Vec::new(),
            activity_logs: Vec::new(),
            check_ins: Vec::new(),
            study_sessions: Vec::new(),
            exam_results: Vec::new(),
        })
        .collect();

    let ids: Vec<Uuid> = students.iter().map(|student| student.id).collect();
    let index: HashMap<Uuid, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let assignment_rows = sqlx::query(
        "SELECT id, student_id, title, subject, due_date, is_completed \
         FROM coaching.assignments WHERE student_id = ANY($1) ORDER BY due_date",
    )
    .bind(&ids[..])
    .fetch_all(pool)
    .await?;
    for row in assignment_rows {
        let student_id: Uuid = row.get("student_id");
        if let Some(&i) = index.get(&student_id) {
            students[i].assignments.push(Assignment {
                id: row.get("id"),
                title: row.get("title"),
                subject: row.get("subject"),
                due_date: row.get("due_date"),
                is_completed: row.get("is_completed"),
            });
        }
    }

    let log_rows = sqlx::query(
        "SELECT student_id, log_date, subject, questions_solved \
         FROM coaching.activity_logs WHERE student_id = ANY($1) ORDER BY log_date",
    )
    .bind(&ids[..])
    .fetch_all(pool)
    .await?;
    for row in log_rows {
        let student_id: Uuid = row.get("student_id");
        if let Some(&i) = index.get(&student_id) {
            students[i].activity_logs.push(ActivityLog {
                log_date: row.get("log_date"),
                subject: row.get("subject"),
                questions_solved: row.get("questions_solved"),
            });
        }
    }

    let check_in_rows = sqlx::query(
        "SELECT student_id, check_in_date, mood, note \
         FROM coaching.check_ins WHERE student_id = ANY($1) ORDER BY check_in_date",
    )
    .bind(&ids[..])
    .fetch_all(pool)
    .await?;
    for row in check_in_rows {
        let student_id: Uuid = row.get("student_id");
        if let Some(&i) = index.get(&student_id) {
            students[i].check_ins.push(CheckIn {
                check_in_date: row.get("check_in_date"),
                mood: row.get("mood"),
                note: row.get("note"),
            });
        }
    }

    let session_rows = sqlx::query(
        "SELECT student_id, session_date, subject, minutes \
         FROM coaching.study_sessions WHERE student_id = ANY($1) ORDER BY session_date",
    )
    .bind(&ids[..])
    .fetch_all(pool)
    .await?;
    for row in session_rows {
        let student_id: Uuid = row.get("student_id");
        if let Some(&i) = index.get(&student_id) {
            students[i].study_sessions.push(StudySession {
                session_date: row.get("session_date"),
                subject: row.get("subject"),
                minutes: row.get("minutes"),
            });
        }
    }

    let exam_rows = sqlx::query(
        "SELECT student_id, exam_name, taken_on, net_score \
         FROM coaching.exam_results WHERE student_id = ANY($1) ORDER BY taken_on",
    )
    .bind(&ids[..])
    .fetch_all(pool)
    .await?;
    for row in exam_rows {
        let student_id: Uuid = row.get("student_id");
        if let Some(&i) = index.get(&student_id) {
            students[i].exam_results.push(ExamResult {
                exam_name: row.get("exam_name"),
                taken_on: row.get("taken_on"),
                net_score: row.get("net_score"),
            });
        }
    }

    debug!(count = students.len(), "loaded students");
    Ok(students)
}

pub async fn add_assignment(
    pool: &PgPool,
    email: &str,
    title: &str,
    subject: &str,
    due_date: NaiveDate,
) -> anyhow::Result<Uuid> {
    let student_id = student_id_by_email(pool, email).await?;
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO coaching.assignments (id, student_id, title, subject, due_date)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(student_id)
    .bind(title)
    .bind(subject)
    .bind(due_date)
    .execute(pool)
    .await?;

    info!(%id, email, "assignment created");
    Ok(id)
}

/// Returns false when the assignment is unknown or already completed.
pub async fn complete_assignment(
    pool: &PgPool,
    assignment_id: Uuid,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let row = sqlx::query(
        r#"
        UPDATE coaching.assignments SET is_completed = TRUE
        WHERE id = $1 AND NOT is_completed
        RETURNING student_id
        "#,
    )
    .bind(assignment_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(false);
    };

    touch_last_active(pool, row.get("student_id"), now).await?;
    Ok(true)
}

/// One check-in per student per day; a later one replaces the earlier.
pub async fn record_check_in(
    pool: &PgPool,
    email: &str,
    mood: i16,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    if !(1..=5).contains(&mood) {
        bail!("mood must be between 1 and 5, got {mood}");
    }
    let student_id = student_id_by_email(pool, email).await?;

    sqlx::query(
        r#"
        INSERT INTO coaching.check_ins (student_id, check_in_date, mood, note)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (student_id, check_in_date) DO UPDATE
        SET mood = EXCLUDED.mood, note = EXCLUDED.note
        "#,
    )
    .bind(student_id)
    .bind(now.date_naive())
    .bind(mood)
    .bind(note)
    .execute(pool)
    .await?;

    touch_last_active(pool, student_id, now).await
}

/// Logs questions solved today as a single activity record.
pub async fn record_activity_log(
    pool: &PgPool,
    email: &str,
    subject: &str,
    questions_solved: i32,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    validate_questions(questions_solved)?;
    let student_id = student_id_by_email(pool, email).await?;
    let source_key = format!("manual-{}", Uuid::new_v4());

    insert_activity_log(
        pool,
        student_id,
        now.date_naive(),
        subject,
        questions_solved,
        &source_key,
    )
    .await?;
    debug!(email, subject, questions_solved, "activity logged");

    touch_last_active(pool, student_id, now).await
}

pub async fn record_study_session(
    pool: &PgPool,
    email: &str,
    subject: &str,
    minutes: i32,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    if minutes <= 0 {
        bail!("study minutes must be positive, got {minutes}");
    }
    let student_id = student_id_by_email(pool, email).await?;

    sqlx::query(
        r#"
        INSERT INTO coaching.study_sessions (id, student_id, session_date, subject, minutes)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(now.date_naive())
    .bind(subject)
    .bind(minutes)
    .execute(pool)
    .await?;

    touch_last_active(pool, student_id, now).await
}

pub async fn record_exam_result(
    pool: &PgPool,
    email: &str,
    exam_name: &str,
    taken_on: NaiveDate,
    net_score: f64,
) -> anyhow::Result<()> {
    let student_id = student_id_by_email(pool, email).await?;

    sqlx::query(
        r#"
        INSERT INTO coaching.exam_results (id, student_id, exam_name, taken_on, net_score)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(exam_name)
    .bind(taken_on)
    .bind(net_score)
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Debug, serde::Deserialize)]
pub struct ActivityCsvRow {
    pub full_name: String,
    pub email: String,
    pub coach_email: String,
    pub log_date: NaiveDate,
    pub subject: String,
    pub questions_solved: i32,
    pub source_key: Option<String>,
}

pub fn read_activity_csv(csv_path: &Path) -> anyhow::Result<Vec<ActivityCsvRow>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<ActivityCsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("invalid row on line {line}"))?;
        validate_questions(row.questions_solved).with_context(|| format!("line {line}"))?;
        rows.push(row);
    }

    Ok(rows)
}

pub async fn import_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let rows = read_activity_csv(csv_path)?;
    let mut inserted = 0usize;

    for row in rows {
        let student_id: Uuid = sqlx::query(
            r#"
            INSERT INTO coaching.students (id, full_name, email, coach_email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name, coach_email = EXCLUDED.coach_email
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(&row.coach_email)
        .fetch_one(pool)
        .await?
        .get("id");

        let source_key = row
            .source_key
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_activity_log(
            pool,
            student_id,
            row.log_date,
            &row.subject,
            row.questions_solved,
            &source_key,
        )
        .await?
        {
            inserted += 1;
            if let Some(midnight) = row.log_date.and_hms_opt(0, 0, 0) {
                touch_last_active(pool, student_id, midnight.and_utc()).await?;
            }
        }
    }

    info!(inserted, "activity import finished");
    Ok(inserted)
}
