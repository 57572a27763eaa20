//! Progress Transition Engine: owns every status change of a progress record
//! and the timestamp bookkeeping that goes with it. Milestone state is only
//! consulted through the validator's completion gate.

use chrono::Utc;

use crate::db::Db;
use crate::error::AppError;
use crate::milestones;
use crate::models::{CourseStatus, ProgressFields, ProgressRecord};
use crate::store;

/// Applies a status transition, creating the record on the first transition
/// away from "not started". `completed` is gated on all required milestones
/// being validated.
pub async fn set_status(
    db: &Db,
    user_id: i64,
    course_id: i64,
    desired: CourseStatus,
    fields: ProgressFields,
) -> Result<ProgressRecord, AppError> {
    store::get_course(db, course_id)
        .await?
        .ok_or(AppError::CourseNotFound)?;

    if desired == CourseStatus::NotStarted {
        // "not started" is the absence of a record; removal is a separate
        // operation.
        return Err(AppError::InvalidTransition("not_started".into()));
    }
    validate_fields(&fields)?;

    if desired == CourseStatus::Completed {
        let missing = milestones::missing_required(db, user_id, course_id).await?;
        if !missing.is_empty() {
            return Err(AppError::IncompleteMilestones { missing });
        }
    }

    let now = Utc::now();
    let mut rec = match store::get_progress(db, user_id, course_id).await? {
        Some(existing) => existing,
        None => ProgressRecord {
            user_id,
            course_id,
            status: desired,
            progress_percentage: 0,
            time_spent: 0,
            current_position: None,
            favorite: false,
            notes: None,
            rating: None,
            difficulty: None,
            review: None,
            started_at: None,
            completed_at: None,
            completion_date: None,
            last_activity_at: now,
            created_at: now,
            updated_at: now,
        },
    };

    rec.status = desired;
    if desired == CourseStatus::InProgress && rec.started_at.is_none() {
        rec.started_at = Some(now);
    }
    if desired == CourseStatus::Completed {
        rec.completed_at = Some(now);
        rec.completion_date = Some(now);
    }
    apply_fields(&mut rec, &fields);
    rec.last_activity_at = now;
    rec.updated_at = now;

    store::save_progress(db, &rec).await?;
    Ok(rec)
}

/// Favorite toggle plus partial progress-field updates. Never touches status
/// or transition timestamps and never consults the milestone gate.
pub async fn update_partial(
    db: &Db,
    user_id: i64,
    course_id: i64,
    favorite: Option<bool>,
    fields: ProgressFields,
) -> Result<ProgressRecord, AppError> {
    validate_fields(&fields)?;
    let mut rec = store::get_progress(db, user_id, course_id)
        .await?
        .ok_or(AppError::ProgressNotFound)?;

    if let Some(fav) = favorite {
        rec.favorite = fav;
    }
    let touched_progress = fields.progress_percentage.is_some()
        || fields.current_position.is_some()
        || fields.time_spent.is_some();
    apply_fields(&mut rec, &fields);

    let now = Utc::now();
    if touched_progress {
        rec.last_activity_at = now;
    }
    rec.updated_at = now;

    store::save_progress(db, &rec).await?;
    Ok(rec)
}

/// Notes/rating/review-only update; progress and status are untouched.
pub async fn update_review(
    db: &Db,
    user_id: i64,
    course_id: i64,
    fields: ProgressFields,
) -> Result<ProgressRecord, AppError> {
    validate_fields(&fields)?;
    let mut rec = store::get_progress(db, user_id, course_id)
        .await?
        .ok_or(AppError::ProgressNotFound)?;

    if let Some(notes) = fields.notes.clone() {
        rec.notes = Some(notes);
    }
    if let Some(rating) = fields.rating {
        rec.rating = Some(rating);
    }
    if let Some(difficulty) = fields.difficulty.clone() {
        rec.difficulty = Some(difficulty);
    }
    if let Some(review) = fields.review.clone() {
        rec.review = Some(review);
    }
    rec.updated_at = Utc::now();

    store::save_progress(db, &rec).await?;
    Ok(rec)
}

/// Deletes the record and everything hanging off it (milestones, reports).
pub async fn delete(db: &Db, user_id: i64, course_id: i64) -> Result<(), AppError> {
    if store::delete_progress(db, user_id, course_id).await? {
        Ok(())
    } else {
        Err(AppError::ProgressNotFound)
    }
}

fn apply_fields(rec: &mut ProgressRecord, fields: &ProgressFields) {
    if let Some(pct) = fields.progress_percentage {
        rec.progress_percentage = pct;
    }
    if let Some(pos) = fields.current_position.clone() {
        rec.current_position = Some(pos);
    }
    if let Some(time) = fields.time_spent {
        rec.time_spent = time;
    }
    if let Some(notes) = fields.notes.clone() {
        rec.notes = Some(notes);
    }
    if let Some(rating) = fields.rating {
        rec.rating = Some(rating);
    }
    if let Some(difficulty) = fields.difficulty.clone() {
        rec.difficulty = Some(difficulty);
    }
    if let Some(review) = fields.review.clone() {
        rec.review = Some(review);
    }
}

fn validate_fields(fields: &ProgressFields) -> Result<(), AppError> {
    if let Some(pct) = fields.progress_percentage {
        if !(0..=100).contains(&pct) {
            return Err(AppError::InvalidPayload(
                "progress_percentage must be between 0 and 100".into(),
            ));
        }
    }
    if let Some(time) = fields.time_spent {
        if time < 0 {
            return Err(AppError::InvalidPayload(
                "time_spent must be non-negative".into(),
            ));
        }
    }
    if let Some(rating) = fields.rating {
        if !(1..=5).contains(&rating) {
            return Err(AppError::InvalidPayload(
                "rating must be between 1 and 5".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReflectionInput;
    use crate::report::StaticReportGenerator;
    use crate::testutil;

    fn reflection() -> ReflectionInput {
        ReflectionInput {
            time_spent_at_milestone: Some(60),
            position_at_milestone: Some("somewhere".into()),
            notes_at_milestone: None,
            learning_summary: Some("summary".into()),
            key_concepts: Some(vec!["concept".into()]),
            challenges: Some("challenge".into()),
            next_steps: Some("next".into()),
        }
    }

    async fn validate_all(db: &crate::db::Db, user: i64, course: i64, upto: &[i64]) {
        for pct in upto {
            milestones::validate(db, &StaticReportGenerator, user, course, *pct, reflection())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn not_started_is_never_a_transition_target() {
        let db = testutil::pool().await;
        let (user, course) = testutil::seed_user_course(&db).await;
        let err = set_status(
            &db,
            user,
            course,
            CourseStatus::NotStarted,
            ProgressFields::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        assert!(store::get_progress(&db, user, course).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_course_is_rejected_before_any_write() {
        let db = testutil::pool().await;
        let (user, _) = testutil::seed_user_course(&db).await;
        let err = set_status(
            &db,
            user,
            9999,
            CourseStatus::InProgress,
            ProgressFields::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::CourseNotFound));
    }

    #[tokio::test]
    async fn started_at_is_set_exactly_once() {
        let db = testutil::pool().await;
        let (user, course) = testutil::seed_user_course(&db).await;

        let first = set_status(
            &db,
            user,
            course,
            CourseStatus::InProgress,
            ProgressFields::default(),
        )
        .await
        .unwrap();
        let started_at = first.started_at.expect("set on first start");

        set_status(&db, user, course, CourseStatus::Paused, ProgressFields::default())
            .await
            .unwrap();
        let resumed = set_status(
            &db,
            user,
            course,
            CourseStatus::InProgress,
            ProgressFields::default(),
        )
        .await
        .unwrap();
        assert_eq!(resumed.started_at, Some(started_at));
    }

    #[tokio::test]
    async fn completion_is_gated_on_all_milestones() {
        let db = testutil::pool().await;
        let (user, course) = testutil::seed_user_course(&db).await;
        testutil::start_progress(&db, user, course).await;
        validate_all(&db, user, course, &[25, 50, 75]).await;

        let err = set_status(
            &db,
            user,
            course,
            CourseStatus::Completed,
            ProgressFields::default(),
        )
        .await
        .unwrap_err();
        match err {
            AppError::IncompleteMilestones { missing } => assert_eq!(missing, vec![100]),
            other => panic!("unexpected error: {other:?}"),
        }

        validate_all(&db, user, course, &[100]).await;
        let rec = set_status(
            &db,
            user,
            course,
            CourseStatus::Completed,
            ProgressFields::default(),
        )
        .await
        .unwrap();
        assert_eq!(rec.status, CourseStatus::Completed);
        assert!(rec.completed_at.is_some());
        assert!(rec.completion_date.is_some());
    }

    #[tokio::test]
    async fn omitted_fields_are_left_unchanged() {
        let db = testutil::pool().await;
        let (user, course) = testutil::seed_user_course(&db).await;

        set_status(
            &db,
            user,
            course,
            CourseStatus::InProgress,
            ProgressFields {
                notes: Some("keep at it".into()),
                time_spent: Some(30),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let rec = set_status(
            &db,
            user,
            course,
            CourseStatus::Paused,
            ProgressFields {
                current_position: Some("lesson 3".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(rec.notes.as_deref(), Some("keep at it"));
        assert_eq!(rec.time_spent, 30);
        assert_eq!(rec.current_position.as_deref(), Some("lesson 3"));
    }

    #[tokio::test]
    async fn field_bounds_are_enforced() {
        let db = testutil::pool().await;
        let (user, course) = testutil::seed_user_course(&db).await;
        let err = set_status(
            &db,
            user,
            course,
            CourseStatus::InProgress,
            ProgressFields {
                progress_percentage: Some(140),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn favorite_toggle_leaves_status_and_activity_alone() {
        let db = testutil::pool().await;
        let (user, course) = testutil::seed_user_course(&db).await;
        let before = testutil::start_progress(&db, user, course).await;

        let rec = update_partial(&db, user, course, Some(true), ProgressFields::default())
            .await
            .unwrap();
        assert!(rec.favorite);
        assert_eq!(rec.status, CourseStatus::InProgress);
        assert_eq!(rec.started_at, before.started_at);
        assert_eq!(rec.last_activity_at, before.last_activity_at);
    }

    #[tokio::test]
    async fn review_update_requires_an_existing_record() {
        let db = testutil::pool().await;
        let (user, course) = testutil::seed_user_course(&db).await;
        let err = update_review(
            &db,
            user,
            course,
            ProgressFields {
                rating: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ProgressNotFound));
    }

    #[tokio::test]
    async fn delete_cascades_to_milestones_and_reports() {
        let db = testutil::pool().await;
        let (user, course) = testutil::seed_user_course(&db).await;
        testutil::start_progress(&db, user, course).await;
        validate_all(&db, user, course, &[25]).await;

        delete(&db, user, course).await.unwrap();
        assert!(store::get_progress(&db, user, course).await.unwrap().is_none());
        assert!(store::list_milestones(&db, user, course).await.unwrap().is_empty());
        assert!(store::list_reports(&db, user, course).await.unwrap().is_empty());

        let err = delete(&db, user, course).await.unwrap_err();
        assert!(matches!(err, AppError::ProgressNotFound));
    }
}
