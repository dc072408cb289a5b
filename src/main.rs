use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod ai;
mod behavior;
mod config;
mod db;
mod models;
mod report;
mod risk;

use crate::ai::{AiError, CoachAssistant, CoachContext, StudentContext};
use crate::config::Settings;

#[derive(Parser)]
#[command(name = "coaching-priority")]
#[command(about = "Coaching priority monitor for exam-preparation coaches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data relative to today
    Seed,
    /// Import daily activity logs from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rank students by coaching priority
    #[command(group(
        ArgGroup::new("scope")
            .args(["coach", "email"])
            .multiple(false)
    ))]
    Score {
        #[arg(long)]
        coach: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown dashboard report
    #[command(group(
        ArgGroup::new("scope")
            .args(["coach", "email"])
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        coach: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Give a student a new assignment
    Assign {
        #[arg(long)]
        email: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        subject: String,
        /// Due date as YYYY-MM-DD
        #[arg(long)]
        due: NaiveDate,
    },
    /// Mark an assignment as completed
    Complete {
        #[arg(long)]
        id: Uuid,
    },
    /// Record today's mood check-in for a student
    CheckIn {
        #[arg(long)]
        email: String,
        /// 1 (very low) to 5 (great)
        #[arg(long)]
        mood: i16,
        #[arg(long)]
        note: Option<String>,
    },
    /// Record questions solved today
    LogQuestions {
        #[arg(long)]
        email: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        questions: i32,
    },
    /// Record a study session for today
    LogStudy {
        #[arg(long)]
        email: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        minutes: i32,
    },
    /// Record a trial exam result
    Exam {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        net: f64,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// AI insights for one student, or for the whole roster of a coach
    #[command(group(
        ArgGroup::new("scope")
            .args(["coach", "email"])
            .multiple(false)
    ))]
    Insights {
        #[arg(long)]
        coach: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// AI study plan for a student (premium)
    Plan {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("coaching_priority=info,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid configuration")?;
    debug!(premium = settings.features.premium, "configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;

    // One clock read per command.
    let now = Utc::now();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool, now).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} activity logs from {}.", csv.display());
        }
        Commands::Score { coach, email, limit } => {
            let students = db::fetch_students(&pool, coach.as_deref(), email.as_deref()).await?;
            let ranked = risk::sort_by_risk(&students, now, &settings.thresholds);

            if ranked.is_empty() {
                println!("No students found for this scope.");
                return Ok(());
            }

            println!(
                "{} students, {} Kritik, {} overdue assignments.",
                ranked.len(),
                risk::critical_count(&ranked),
                risk::total_overdue(&ranked)
            );
            println!("Students by coaching priority:");
            for entry in ranked.iter().take(limit) {
                println!(
                    "- [{}] {} ({}): {}",
                    entry.risk.label,
                    entry.student.full_name,
                    entry.student.email,
                    report::describe_risk(&entry.risk)
                );
            }
        }
        Commands::Report { coach, email, out } => {
            let students = db::fetch_students(&pool, coach.as_deref(), email.as_deref()).await?;
            let report = report::build_report(
                coach.as_deref().or(email.as_deref()),
                now,
                &students,
                &settings.thresholds,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Assign {
            email,
            title,
            subject,
            due,
        } => {
            let id = db::add_assignment(&pool, &email, &title, &subject, due).await?;
            println!("Assignment {id} created for {email}.");
        }
        Commands::Complete { id } => {
            if db::complete_assignment(&pool, id, now).await? {
                println!("Assignment {id} marked complete.");
            } else {
                println!("Assignment {id} not found or already complete.");
            }
        }
        Commands::CheckIn { email, mood, note } => {
            db::record_check_in(&pool, &email, mood, note.as_deref(), now).await?;
            println!("Check-in recorded for {email}.");
        }
        Commands::LogQuestions {
            email,
            subject,
            questions,
        } => {
            db::record_activity_log(&pool, &email, &subject, questions, now).await?;
            println!("Logged {questions} {subject} questions for {email}.");
        }
        Commands::LogStudy {
            email,
            subject,
            minutes,
        } => {
            db::record_study_session(&pool, &email, &subject, minutes, now).await?;
            println!("Logged {minutes} minutes of {subject} for {email}.");
        }
        Commands::Exam {
            email,
            name,
            net,
            date,
        } => {
            let taken_on = date.unwrap_or_else(|| now.date_naive());
            db::record_exam_result(&pool, &email, &name, taken_on, net).await?;
            println!("Recorded {name} ({net:.2} net) for {email}.");
        }
        Commands::Insights { coach, email } => {
            let students = db::fetch_students(&pool, coach.as_deref(), email.as_deref()).await?;
            let assistant = CoachAssistant::new(ai::build_backend(&settings.ai), settings.features);

            let insights = if let Some(email) = email.as_deref() {
                let student = students
                    .first()
                    .with_context(|| format!("no student with email {email}"))?;
                let risk = risk::assess(student, now, &settings.thresholds);
                let context = StudentContext::new(student, &risk, now.date_naive());
                assistant.student_insights(&context).await
            } else {
                let ranked = risk::sort_by_risk(&students, now, &settings.thresholds);
                assistant.coach_insights(&CoachContext::from_ranked(&ranked)).await
            };

            for insight in insights {
                println!("- {insight}");
            }
        }
        Commands::Plan { email, days } => {
            let students = db::fetch_students(&pool, None, Some(&email)).await?;
            let student = students
                .first()
                .with_context(|| format!("no student with email {email}"))?;
            let risk = risk::assess(student, now, &settings.thresholds);
            let context = StudentContext::new(student, &risk, now.date_naive());
            let assistant = CoachAssistant::new(ai::build_backend(&settings.ai), settings.features);

            match assistant.study_plan(&context, days).await {
                Ok(plan) => {
                    info!(email = %email, tasks = plan.len(), "study plan ready");
                    println!("Study plan for {}:", student.full_name);
                    for task in plan {
                        println!(
                            "Day {} [{}] {}: {}",
                            task.day, task.subject, task.title, task.description
                        );
                    }
                }
                Err(AiError::PremiumRequired) => {
                    println!(
                        "AI study plans are a premium feature. \
                         Set COACH_PREMIUM=true to enable them."
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    Ok(())
}
