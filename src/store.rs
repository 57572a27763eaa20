//! Repository layer: all SQL for courses, progress records, milestones and
//! reports lives here. Callers hold the business rules; these functions only
//! read and write rows.

use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar};

use crate::db::Db;
use crate::models::{Course, CourseReportRow, MilestoneRow, ProgressRecord, Reflection};

// --- courses ---

pub async fn insert_course(
    db: &Db,
    title: &str,
    description: Option<&str>,
) -> sqlx::Result<Course> {
    query_as::<_, Course>(
        r#"
        INSERT INTO courses (title, description, created_at)
        VALUES (?, ?, ?)
        RETURNING id, title, description, created_at
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(Utc::now())
    .fetch_one(db)
    .await
}

pub async fn get_course(db: &Db, course_id: i64) -> sqlx::Result<Option<Course>> {
    query_as::<_, Course>("SELECT * FROM courses WHERE id = ?")
        .bind(course_id)
        .fetch_optional(db)
        .await
}

pub async fn list_courses(db: &Db) -> sqlx::Result<Vec<Course>> {
    query_as::<_, Course>("SELECT * FROM courses ORDER BY id")
        .fetch_all(db)
        .await
}

// --- progress records ---

pub async fn get_progress(
    db: &Db,
    user_id: i64,
    course_id: i64,
) -> sqlx::Result<Option<ProgressRecord>> {
    query_as::<_, ProgressRecord>(
        "SELECT * FROM progress_records WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(db)
    .await
}

/// Full-row upsert keyed on (user_id, course_id). The caller builds the
/// complete desired state; partial-update decisions happen upstream.
pub async fn save_progress(db: &Db, rec: &ProgressRecord) -> sqlx::Result<()> {
    query(
        r#"
        INSERT INTO progress_records (
            user_id, course_id, status, progress_percentage, time_spent,
            current_position, favorite, notes, rating, difficulty, review,
            started_at, completed_at, completion_date,
            last_activity_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id, course_id) DO UPDATE SET
            status = excluded.status,
            progress_percentage = excluded.progress_percentage,
            time_spent = excluded.time_spent,
            current_position = excluded.current_position,
            favorite = excluded.favorite,
            notes = excluded.notes,
            rating = excluded.rating,
            difficulty = excluded.difficulty,
            review = excluded.review,
            started_at = excluded.started_at,
            completed_at = excluded.completed_at,
            completion_date = excluded.completion_date,
            last_activity_at = excluded.last_activity_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(rec.user_id)
    .bind(rec.course_id)
    .bind(rec.status)
    .bind(rec.progress_percentage)
    .bind(rec.time_spent)
    .bind(&rec.current_position)
    .bind(rec.favorite)
    .bind(&rec.notes)
    .bind(rec.rating)
    .bind(&rec.difficulty)
    .bind(&rec.review)
    .bind(rec.started_at)
    .bind(rec.completed_at)
    .bind(rec.completion_date)
    .bind(rec.last_activity_at)
    .bind(rec.created_at)
    .bind(rec.updated_at)
    .execute(db)
    .await?;
    Ok(())
}

/// Removes the record plus its milestones and reports in one transaction.
/// Returns false when no record existed.
pub async fn delete_progress(db: &Db, user_id: i64, course_id: i64) -> sqlx::Result<bool> {
    let mut tx = db.begin().await?;
    query("DELETE FROM milestones WHERE user_id = ? AND course_id = ?")
        .bind(user_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    query("DELETE FROM course_reports WHERE user_id = ? AND course_id = ?")
        .bind(user_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    let res = query("DELETE FROM progress_records WHERE user_id = ? AND course_id = ?")
        .bind(user_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(res.rows_affected() > 0)
}

// --- milestones ---

/// Idempotent backfill: one row per required percentage. INSERT OR IGNORE
/// rides on the composite primary key, so concurrent callers cannot create
/// duplicates.
pub async fn ensure_milestone_rows(
    db: &Db,
    user_id: i64,
    course_id: i64,
    percentages: &[i64],
) -> sqlx::Result<()> {
    let now = Utc::now();
    for pct in percentages {
        query(
            r#"
            INSERT OR IGNORE INTO milestones (user_id, course_id, percentage, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(pct)
        .bind(now)
        .execute(db)
        .await?;
    }
    Ok(())
}

pub async fn list_milestones(
    db: &Db,
    user_id: i64,
    course_id: i64,
) -> sqlx::Result<Vec<MilestoneRow>> {
    query_as::<_, MilestoneRow>(
        "SELECT * FROM milestones WHERE user_id = ? AND course_id = ? ORDER BY percentage",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_all(db)
    .await
}

pub async fn get_milestone(
    db: &Db,
    user_id: i64,
    course_id: i64,
    percentage: i64,
) -> sqlx::Result<Option<MilestoneRow>> {
    query_as::<_, MilestoneRow>(
        "SELECT * FROM milestones WHERE user_id = ? AND course_id = ? AND percentage = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(percentage)
    .fetch_optional(db)
    .await
}

/// Percentages below `percentage` that are not yet validated, lowest first.
pub async fn unvalidated_below(
    db: &Db,
    user_id: i64,
    course_id: i64,
    percentage: i64,
) -> sqlx::Result<Vec<i64>> {
    query_scalar::<_, i64>(
        r#"
        SELECT percentage FROM milestones
        WHERE user_id = ? AND course_id = ? AND percentage < ? AND is_completed = 0
        ORDER BY percentage
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(percentage)
    .fetch_all(db)
    .await
}

pub async fn completed_percentages(
    db: &Db,
    user_id: i64,
    course_id: i64,
) -> sqlx::Result<Vec<i64>> {
    query_scalar::<_, i64>(
        r#"
        SELECT percentage FROM milestones
        WHERE user_id = ? AND course_id = ? AND is_completed = 1
        ORDER BY percentage
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_all(db)
    .await
}

/// Marks a milestone validated and bumps the parent record's percentage and
/// activity timestamps, atomically. The `is_completed = 0` guard means a
/// concurrent duplicate validation matches zero rows; that case returns
/// `None` so the caller can take the idempotent no-op path instead of
/// treating the winner's row as a fresh commit.
pub async fn complete_milestone(
    db: &Db,
    user_id: i64,
    course_id: i64,
    percentage: i64,
    reflection: &Reflection,
    now: DateTime<Utc>,
) -> sqlx::Result<Option<MilestoneRow>> {
    let key_concepts =
        serde_json::to_string(&reflection.key_concepts).unwrap_or_else(|_| "[]".into());

    let mut tx = db.begin().await?;
    let res = query(
        r#"
        UPDATE milestones SET
            is_completed = 1,
            completed_at = ?,
            validated_at = ?,
            time_spent_at_milestone = ?,
            position_at_milestone = ?,
            notes_at_milestone = ?,
            learning_summary = ?,
            key_concepts = ?,
            challenges = ?,
            next_steps = ?
        WHERE user_id = ? AND course_id = ? AND percentage = ? AND is_completed = 0
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(reflection.time_spent_at_milestone)
    .bind(&reflection.position_at_milestone)
    .bind(&reflection.notes_at_milestone)
    .bind(&reflection.learning_summary)
    .bind(&key_concepts)
    .bind(&reflection.challenges)
    .bind(&reflection.next_steps)
    .bind(user_id)
    .bind(course_id)
    .bind(percentage)
    .execute(&mut *tx)
    .await?;
    if res.rows_affected() == 0 {
        // Already validated by a concurrent request; leave its state alone.
        return Ok(None);
    }

    query(
        r#"
        UPDATE progress_records
        SET progress_percentage = ?, last_activity_at = ?, updated_at = ?
        WHERE user_id = ? AND course_id = ?
        "#,
    )
    .bind(percentage)
    .bind(now)
    .bind(now)
    .bind(user_id)
    .bind(course_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    query_as::<_, MilestoneRow>(
        "SELECT * FROM milestones WHERE user_id = ? AND course_id = ? AND percentage = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(percentage)
    .fetch_one(db)
    .await
    .map(Some)
}

// --- reports ---

pub struct NewReport<'a> {
    pub user_id: i64,
    pub course_id: i64,
    pub title: &'a str,
    pub report_type: &'a str,
    pub milestone_percentage: Option<i64>,
    pub summary: &'a str,
    pub key_points: &'a [String],
    pub recommendations: Option<&'a str>,
    pub insights: Option<&'a str>,
}

pub async fn insert_report(db: &Db, report: NewReport<'_>) -> sqlx::Result<CourseReportRow> {
    let key_points = serde_json::to_string(report.key_points).unwrap_or_else(|_| "[]".into());
    query_as::<_, CourseReportRow>(
        r#"
        INSERT INTO course_reports (
            user_id, course_id, title, report_type, milestone_percentage,
            summary, key_points, recommendations, insights, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(report.user_id)
    .bind(report.course_id)
    .bind(report.title)
    .bind(report.report_type)
    .bind(report.milestone_percentage)
    .bind(report.summary)
    .bind(&key_points)
    .bind(report.recommendations)
    .bind(report.insights)
    .bind(Utc::now())
    .fetch_one(db)
    .await
}

pub async fn list_reports(
    db: &Db,
    user_id: i64,
    course_id: i64,
) -> sqlx::Result<Vec<CourseReportRow>> {
    query_as::<_, CourseReportRow>(
        r#"
        SELECT * FROM course_reports
        WHERE user_id = ? AND course_id = ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_all(db)
    .await
}
