//! Milestone Validator: strict 25 → 50 → 75 → 100 ordering, lazy row
//! backfill, the completion gate used by the transition engine, and the
//! best-effort report side effect.

use chrono::Utc;

use crate::db::Db;
use crate::error::AppError;
use crate::models::{
    CourseReport, CourseStatus, Milestone, Reflection, ReflectionInput,
};
use crate::report::{ReportContext, ReportGenerator};
use crate::store;

pub const REQUIRED_MILESTONES: [i64; 4] = [25, 50, 75, 100];

#[derive(Debug)]
pub struct ValidationOutcome {
    pub milestone: Milestone,
    pub report: Option<CourseReport>,
    /// `Some("report_failed")` when the milestone committed but the report
    /// could not be produced.
    pub warning: Option<&'static str>,
    pub already_completed: bool,
}

#[derive(serde::Serialize, Debug)]
pub struct MilestoneView {
    pub status: CourseStatus,
    pub current_progress: i64,
    pub milestones: Vec<Milestone>,
    pub reports: Vec<CourseReport>,
}

/// Validates milestone `percentage` for the caller's course. The milestone
/// commit and the report are two separate phases: the first is transactional,
/// the second best-effort.
pub async fn validate(
    db: &Db,
    reporter: &dyn ReportGenerator,
    user_id: i64,
    course_id: i64,
    percentage: i64,
    input: ReflectionInput,
) -> Result<ValidationOutcome, AppError> {
    if !REQUIRED_MILESTONES.contains(&percentage) {
        return Err(AppError::InvalidPayload(
            "percentage must be one of 25, 50, 75, 100".into(),
        ));
    }
    let reflection = validate_reflection(input)?;

    let course = store::get_course(db, course_id)
        .await?
        .ok_or(AppError::CourseNotFound)?;
    let record = store::get_progress(db, user_id, course_id)
        .await?
        .ok_or(AppError::NoActiveProgress)?;

    store::ensure_milestone_rows(db, user_id, course_id, &REQUIRED_MILESTONES).await?;

    // Re-validating a committed milestone is a retry-safe no-op.
    if let Some(existing) = store::get_milestone(db, user_id, course_id, percentage).await? {
        if existing.is_completed {
            return Ok(ValidationOutcome {
                milestone: existing.into(),
                report: None,
                warning: None,
                already_completed: true,
            });
        }
    }

    let blocking = store::unvalidated_below(db, user_id, course_id, percentage).await?;
    if let Some(required) = blocking.first() {
        return Err(AppError::OutOfOrderMilestone {
            required: *required,
        });
    }

    let now = Utc::now();
    let committed =
        store::complete_milestone(db, user_id, course_id, percentage, &reflection, now).await?;
    let Some(row) = committed else {
        // A concurrent validation won the commit after our check above read
        // stale state; the loser collapses into the no-op path and must not
        // produce a second report.
        let existing = store::get_milestone(db, user_id, course_id, percentage)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        return Ok(ValidationOutcome {
            milestone: existing.into(),
            report: None,
            warning: None,
            already_completed: true,
        });
    };
    let milestone: Milestone = row.into();

    // Best-effort enrichment; learner progress is already committed.
    let ctx = ReportContext {
        course_title: course.title.clone(),
        percentage,
        time_spent: reflection.time_spent_at_milestone.max(record.time_spent),
        course_notes: record.notes.clone(),
        reflection,
    };
    let (report, warning) = match reporter.generate(&ctx).await {
        Ok(payload) => {
            let row = store::insert_report(
                db,
                store::NewReport {
                    user_id,
                    course_id,
                    title: &format!("{}% milestone report: {}", percentage, course.title),
                    report_type: "milestone_summary",
                    milestone_percentage: Some(percentage),
                    summary: &payload.summary,
                    key_points: &payload.key_points,
                    recommendations: payload.recommendations.as_deref(),
                    insights: payload.insights.as_deref(),
                },
            )
            .await?;
            (Some(row.into()), None)
        }
        Err(e) => {
            tracing::warn!(course_id, percentage, error = %e, "milestone report generation failed");
            (None, Some("report_failed"))
        }
    };

    Ok(ValidationOutcome {
        milestone,
        report,
        warning,
        already_completed: false,
    })
}

/// Required percentages not yet validated, lowest first. Milestones that
/// were never materialized count as missing.
pub async fn missing_required(db: &Db, user_id: i64, course_id: i64) -> sqlx::Result<Vec<i64>> {
    let done = store::completed_percentages(db, user_id, course_id).await?;
    Ok(REQUIRED_MILESTONES
        .iter()
        .copied()
        .filter(|p| !done.contains(p))
        .collect())
}

/// Read-only gate for the transition engine's `completed` transition.
pub async fn all_required_complete(
    db: &Db,
    user_id: i64,
    course_id: i64,
) -> sqlx::Result<bool> {
    Ok(missing_required(db, user_id, course_id).await?.is_empty())
}

/// Absence of a record is a first-class read result, not an error. For
/// started courses, missing milestone rows are backfilled before the read.
pub async fn progress_view(
    db: &Db,
    user_id: i64,
    course_id: i64,
) -> Result<MilestoneView, AppError> {
    store::get_course(db, course_id)
        .await?
        .ok_or(AppError::CourseNotFound)?;
    let Some(record) = store::get_progress(db, user_id, course_id).await? else {
        return Ok(MilestoneView {
            status: CourseStatus::NotStarted,
            current_progress: 0,
            milestones: Vec::new(),
            reports: Vec::new(),
        });
    };

    store::ensure_milestone_rows(db, user_id, course_id, &REQUIRED_MILESTONES).await?;
    let milestones = store::list_milestones(db, user_id, course_id)
        .await?
        .into_iter()
        .map(Milestone::from)
        .collect();
    let reports = store::list_reports(db, user_id, course_id)
        .await?
        .into_iter()
        .map(CourseReport::from)
        .collect();
    Ok(MilestoneView {
        status: record.status,
        current_progress: record.progress_percentage,
        milestones,
        reports,
    })
}

fn validate_reflection(input: ReflectionInput) -> Result<Reflection, AppError> {
    let mut missing = Vec::new();
    if input.time_spent_at_milestone.is_none() {
        missing.push("time_spent_at_milestone");
    }
    if input.position_at_milestone.is_none() {
        missing.push("position_at_milestone");
    }
    if input.learning_summary.is_none() {
        missing.push("learning_summary");
    }
    if input.key_concepts.is_none() {
        missing.push("key_concepts");
    }
    if input.challenges.is_none() {
        missing.push("challenges");
    }
    if input.next_steps.is_none() {
        missing.push("next_steps");
    }
    if !missing.is_empty() {
        return Err(AppError::InvalidPayload(format!(
            "missing required reflection fields: {}",
            missing.join(", ")
        )));
    }

    let time_spent = input.time_spent_at_milestone.unwrap_or_default();
    if time_spent < 0 {
        return Err(AppError::InvalidPayload(
            "time_spent_at_milestone must be non-negative".into(),
        ));
    }
    Ok(Reflection {
        time_spent_at_milestone: time_spent,
        position_at_milestone: input.position_at_milestone.unwrap_or_default(),
        notes_at_milestone: input.notes_at_milestone,
        learning_summary: input.learning_summary.unwrap_or_default(),
        key_concepts: input.key_concepts.unwrap_or_default(),
        challenges: input.challenges.unwrap_or_default(),
        next_steps: input.next_steps.unwrap_or_default(),
    })
}
