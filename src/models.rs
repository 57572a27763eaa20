use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    NotStarted,
    InProgress,
    Paused,
    Completed,
}

/// One row per (user, course). A course the user never started has no row;
/// `CourseStatus::NotStarted` only ever appears in read-side sentinels.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct ProgressRecord {
    pub user_id: i64,
    pub course_id: i64,
    pub status: CourseStatus,
    pub progress_percentage: i64,
    pub time_spent: i64,
    pub current_position: Option<String>,
    pub favorite: bool,
    pub notes: Option<String>,
    pub rating: Option<i64>,
    pub difficulty: Option<String>,
    pub review: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_date: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw milestone row; list fields are JSON-encoded text in storage.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct MilestoneRow {
    pub user_id: i64,
    pub course_id: i64,
    pub percentage: i64,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
    pub time_spent_at_milestone: Option<i64>,
    pub position_at_milestone: Option<String>,
    pub notes_at_milestone: Option<String>,
    pub learning_summary: Option<String>,
    pub key_concepts: Option<String>,
    pub challenges: Option<String>,
    pub next_steps: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Milestone {
    pub user_id: i64,
    pub course_id: i64,
    pub percentage: i64,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
    pub time_spent_at_milestone: Option<i64>,
    pub position_at_milestone: Option<String>,
    pub notes_at_milestone: Option<String>,
    pub learning_summary: Option<String>,
    pub key_concepts: Vec<String>,
    pub challenges: Option<String>,
    pub next_steps: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<MilestoneRow> for Milestone {
    fn from(row: MilestoneRow) -> Self {
        Milestone {
            user_id: row.user_id,
            course_id: row.course_id,
            percentage: row.percentage,
            is_completed: row.is_completed,
            completed_at: row.completed_at,
            validated_at: row.validated_at,
            time_spent_at_milestone: row.time_spent_at_milestone,
            position_at_milestone: row.position_at_milestone,
            notes_at_milestone: row.notes_at_milestone,
            learning_summary: row.learning_summary,
            key_concepts: parse_string_list(row.key_concepts.as_deref()),
            challenges: row.challenges,
            next_steps: row.next_steps,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct CourseReportRow {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub title: String,
    pub report_type: String,
    pub milestone_percentage: Option<i64>,
    pub summary: String,
    pub key_points: Option<String>,
    pub recommendations: Option<String>,
    pub insights: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CourseReport {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub title: String,
    pub report_type: String,
    pub milestone_percentage: Option<i64>,
    pub summary: String,
    pub key_points: Vec<String>,
    pub recommendations: Option<String>,
    pub insights: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CourseReportRow> for CourseReport {
    fn from(row: CourseReportRow) -> Self {
        CourseReport {
            id: row.id,
            user_id: row.user_id,
            course_id: row.course_id,
            title: row.title,
            report_type: row.report_type,
            milestone_percentage: row.milestone_percentage,
            summary: row.summary,
            key_points: parse_string_list(row.key_points.as_deref()),
            recommendations: row.recommendations,
            insights: row.insights,
            created_at: row.created_at,
        }
    }
}

/// List fields are stored as JSON text; absent or corrupt data reads back as
/// an empty list rather than an error.
pub fn parse_string_list(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

// --- request shapes ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateCourseReq {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProgressTransitionReq {
    pub course_id: i64,
    pub status: CourseStatus,
    #[serde(flatten)]
    pub fields: ProgressFields,
}

/// Optional fields applied only when present; omitted fields are left
/// unchanged, not nulled.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ProgressFields {
    pub progress_percentage: Option<i64>,
    pub current_position: Option<String>,
    pub time_spent: Option<i64>,
    pub notes: Option<String>,
    pub rating: Option<i64>,
    pub difficulty: Option<String>,
    pub review: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReviewUpdateReq {
    pub course_id: i64,
    pub notes: Option<String>,
    pub rating: Option<i64>,
    pub difficulty: Option<String>,
    pub review: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FavoriteUpdateReq {
    pub course_id: i64,
    pub favorite: Option<bool>,
    pub progress_percentage: Option<i64>,
    pub current_position: Option<String>,
    pub time_spent: Option<i64>,
}

/// Wire shape of the reflection payload; required fields are checked in the
/// validator so a missing field yields a structured 400, not a decode error.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ReflectionInput {
    pub time_spent_at_milestone: Option<i64>,
    pub position_at_milestone: Option<String>,
    pub notes_at_milestone: Option<String>,
    pub learning_summary: Option<String>,
    pub key_concepts: Option<Vec<String>>,
    pub challenges: Option<String>,
    pub next_steps: Option<String>,
}

/// A reflection payload that passed validation.
#[derive(Debug, Clone)]
pub struct Reflection {
    pub time_spent_at_milestone: i64,
    pub position_at_milestone: String,
    pub notes_at_milestone: Option<String>,
    pub learning_summary: String,
    pub key_concepts: Vec<String>,
    pub challenges: String,
    pub next_steps: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ValidateMilestoneReq {
    pub course_id: i64,
    pub percentage: i64,
    pub reflection: ReflectionInput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_list_parses_json_arrays() {
        let parsed = parse_string_list(Some(r#"["ownership","borrowing"]"#));
        assert_eq!(
            parsed,
            vec!["ownership".to_string(), "borrowing".to_string()]
        );
    }

    #[test]
    fn string_list_defaults_to_empty_on_absence_or_corruption() {
        assert!(parse_string_list(None).is_empty());
        assert!(parse_string_list(Some("not json")).is_empty());
        assert!(parse_string_list(Some(r#"{"a":1}"#)).is_empty());
    }
}
