//! Shared fixtures for the unit suites: in-memory pools, seeded rows, and a
//! report generator that always fails.

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::query;

use crate::db::Db;
use crate::models::{CourseStatus, ProgressFields, ProgressRecord};
use crate::report::{ReportContext, ReportFuture, ReportGenerator};
use crate::{progress, store};

pub(crate) async fn pool() -> Db {
    // A single connection keeps every query on the same in-memory database.
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("migrations");
    db
}

pub(crate) async fn seed_user_course(db: &Db) -> (i64, i64) {
    let user_id = query("INSERT INTO users (name, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
        .bind("Test Learner")
        .bind("learner@example.com")
        .bind("unused")
        .bind(Utc::now())
        .execute(db)
        .await
        .expect("seed user")
        .last_insert_rowid();
    let course = store::insert_course(db, "Intro to Rust", Some("A test course"))
        .await
        .expect("seed course");
    (user_id, course.id)
}

pub(crate) async fn start_progress(db: &Db, user_id: i64, course_id: i64) -> ProgressRecord {
    progress::set_status(
        db,
        user_id,
        course_id,
        CourseStatus::InProgress,
        ProgressFields::default(),
    )
    .await
    .expect("start progress");
    // Return the persisted row so timestamp comparisons see storage precision.
    store::get_progress(db, user_id, course_id)
        .await
        .expect("reload progress")
        .expect("progress exists")
}

pub(crate) struct FailingReportGenerator;

impl ReportGenerator for FailingReportGenerator {
    fn generate<'a>(&'a self, _ctx: &'a ReportContext) -> ReportFuture<'a> {
        Box::pin(async { Err(anyhow::anyhow!("report service unavailable")) })
    }
}
