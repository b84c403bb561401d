//! Grading reconciliation. Matches a learner's recorded attempts against the
//! authoritative exercise definition and produces a per-question and
//! aggregate score report. Matching is by exact question id; a question with
//! no matching attempt is reported with a null attempt and zero score rather
//! than fuzzy-matched. Strictly read-only.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::hierarchy::locator::NodeLocator;
use crate::pedagogy::types::{Exercise, Section};
use crate::shared::error::ApiError;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

diesel::table! {
    course_enrollments (id) {
        id -> Uuid,
        user_id -> Uuid,
        course_id -> Uuid,
        answers -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = course_enrollments)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub answers: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// ATTEMPT DOCUMENT SHAPES
// ============================================================================

/// The learner's `answers` document mirrors the pedagogy shape:
/// section → subcategory → attempt records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Answers(pub BTreeMap<Section, BTreeMap<String, Vec<AttemptRecord>>>);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    /// String form of the exercise's durable id.
    pub exercise_id: String,
    #[serde(default)]
    pub questions: Vec<QuestionAttempt>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAttempt {
    pub question_id: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub total_score: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub attempts: Option<i32>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,
}

// ============================================================================
// REPORT SHAPES
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionReport {
    pub question_id: Uuid,
    pub sequence: u32,
    pub max_score: f64,
    /// None when the learner never answered this question.
    pub user_attempt: Option<QuestionAttempt>,
    pub user_score: f64,
    pub total_score: f64,
    pub percentage: f64,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    pub exercise_id: Uuid,
    pub exercise_name: String,
    pub course_id: Uuid,
    pub user_id: Uuid,
    pub attempt_found: bool,
    pub questions: Vec<QuestionReport>,
    pub user_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub grade: char,
    pub is_passing: bool,
}

pub fn letter_grade(percentage: f64) -> char {
    match percentage {
        p if p >= 90.0 => 'A',
        p if p >= 80.0 => 'B',
        p if p >= 70.0 => 'C',
        p if p >= 60.0 => 'D',
        _ => 'F',
    }
}

/// Find the attempt record for one exercise inside the answers document.
/// Hints narrow the scan; without them every section and subcategory present
/// in the document is searched.
pub fn find_attempt<'a>(
    answers: &'a Answers,
    exercise_id: Uuid,
    section: Option<Section>,
    subcategory: Option<&str>,
) -> Option<&'a AttemptRecord> {
    let wanted = exercise_id.to_string();
    for (sec, subcats) in &answers.0 {
        if section.map(|s| s != *sec).unwrap_or(false) {
            continue;
        }
        for (name, records) in subcats {
            if subcategory.map(|s| s != name).unwrap_or(false) {
                continue;
            }
            if let Some(record) = records.iter().find(|r| r.exercise_id == wanted) {
                return Some(record);
            }
        }
    }
    None
}

/// Reconcile one exercise against one (possibly absent) attempt record.
/// Questions iterate in defined order; the attempt lookup is keyed by the
/// question's exact id string, and inactive questions are skipped the same
/// way the question listing skips them.
pub fn reconcile(
    exercise: &Exercise,
    attempt: Option<&AttemptRecord>,
    course_id: Uuid,
    user_id: Uuid,
) -> GradeReport {
    let by_question: HashMap<&str, &QuestionAttempt> = attempt
        .map(|a| {
            a.questions
                .iter()
                .map(|q| (q.question_id.as_str(), q))
                .collect()
        })
        .unwrap_or_default();

    let mut questions = Vec::new();
    let mut user_total = 0.0;
    let mut max_total = 0.0;
    let mut ordered: Vec<_> = exercise.questions.iter().filter(|q| q.is_active).collect();
    ordered.sort_by_key(|q| q.sequence);

    for question in ordered {
        let max_score = question.score;
        max_total += max_score;
        let matched = by_question.get(question.id.to_string().as_str()).copied();
        let report = match matched {
            Some(attempt) => {
                let user_score = attempt.score.unwrap_or(0.0);
                let total_score = attempt.total_score.unwrap_or(max_score);
                let percentage = if total_score > 0.0 {
                    user_score / total_score * 100.0
                } else {
                    0.0
                };
                let is_correct = attempt.is_correct.unwrap_or(false)
                    || attempt.status.as_deref() == Some("solved")
                    || percentage >= 70.0;
                user_total += user_score;
                QuestionReport {
                    question_id: question.id,
                    sequence: question.sequence,
                    max_score,
                    user_attempt: Some(attempt.clone()),
                    user_score,
                    total_score,
                    percentage,
                    is_correct,
                }
            }
            None => QuestionReport {
                question_id: question.id,
                sequence: question.sequence,
                max_score,
                user_attempt: None,
                user_score: 0.0,
                total_score: max_score,
                percentage: 0.0,
                is_correct: false,
            },
        };
        questions.push(report);
    }

    let percentage = if max_total > 0.0 {
        user_total / max_total * 100.0
    } else {
        0.0
    };
    GradeReport {
        exercise_id: exercise.id,
        exercise_name: exercise.exercise_information.name.clone(),
        course_id,
        user_id,
        attempt_found: attempt.is_some(),
        questions,
        user_score: user_total,
        max_score: max_total,
        percentage,
        grade: letter_grade(percentage),
        is_passing: percentage >= 70.0,
    }
}

// ============================================================================
// GRADING ENGINE
// ============================================================================

pub struct GradingEngine {
    db: DbPool,
}

impl GradingEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn grade_exercise(
        &self,
        course_id: Uuid,
        user_id: Uuid,
        exercise_id: Uuid,
        section: Option<Section>,
        subcategory: Option<&str>,
    ) -> Result<GradeReport, ApiError> {
        let locator = NodeLocator::new(self.db.clone());
        let (_, exercise) = locator
            .find_exercise(course_id, exercise_id)?
            .ok_or_else(|| ApiError::missing("exercise", exercise_id))?;

        let answers = self.load_answers(course_id, user_id)?;
        let attempt = find_attempt(&answers, exercise_id, section, subcategory);
        Ok(reconcile(&exercise, attempt, course_id, user_id))
    }

    fn load_answers(&self, course_id: Uuid, user_id: Uuid) -> Result<Answers, ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;
        let enrollment: Option<Enrollment> = course_enrollments::table
            .filter(course_enrollments::course_id.eq(course_id))
            .filter(course_enrollments::user_id.eq(user_id))
            .first(&mut conn)
            .optional()?;
        let enrollment = enrollment.ok_or_else(|| {
            ApiError::NotFound(format!(
                "Not found: enrollment for user {} in course {} not found",
                user_id, course_id
            ))
        })?;
        if enrollment.answers.is_null() {
            return Ok(Answers::default());
        }
        Ok(serde_json::from_value(enrollment.answers)?)
    }
}

// ============================================================================
// HTTP HANDLERS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GradeQuery {
    pub course_id: Uuid,
    /// Defaults to the calling user.
    pub user_id: Option<Uuid>,
    pub tab_type: Option<String>,
    pub subcategory: Option<String>,
}

pub async fn exercise_report(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(exercise_id): Path<Uuid>,
    Query(query): Query<GradeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let section = match &query.tab_type {
        Some(raw) => Some(
            Section::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown section '{}'", raw)))?,
        ),
        None => None,
    };
    let engine = GradingEngine::new(state.conn.clone());
    let report = engine
        .grade_exercise(
            query.course_id,
            query.user_id.unwrap_or(user.id),
            exercise_id,
            section,
            query.subcategory.as_deref(),
        )
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "data": report })))
}

pub fn configure_grading_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/analytics/exercise/:exercise_id", get(exercise_report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pedagogy::types::*;

    fn question(score: f64, sequence: u32) -> Question {
        Question {
            id: Uuid::new_v4(),
            is_active: true,
            sequence,
            score,
            body: QuestionBody::Mcq {
                question_title: format!("Q{}", sequence),
                options: vec!["a".to_string(), "b".to_string()],
                correct_answer: "a".to_string(),
            },
        }
    }

    fn exercise(questions: Vec<Question>) -> Exercise {
        let now = Utc::now();
        Exercise {
            id: Uuid::new_v4(),
            exercise_code: "EX001".to_string(),
            exercise_type: ExerciseType::Mcq,
            configuration_type: ExerciseType::Mcq.configuration_modes(),
            exercise_information: ExerciseInformation {
                name: "Quiz".to_string(),
                description: None,
                level: None,
                duration: None,
                total_questions: questions.len() as u32,
                total_points: questions.iter().map(|q| q.score).sum(),
            },
            question_configuration: QuestionConfiguration::default(),
            availability_period: None,
            notification_and_grade_settings: None,
            questions,
            version: 1,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn solved(question_id: Uuid, score: f64) -> QuestionAttempt {
        QuestionAttempt {
            question_id: question_id.to_string(),
            score: Some(score),
            total_score: None,
            status: Some("solved".to_string()),
            is_correct: Some(true),
            attempts: Some(1),
            feedback: None,
            answered_at: None,
        }
    }

    #[test]
    fn test_letter_grade_thresholds() {
        assert_eq!(letter_grade(95.0), 'A');
        assert_eq!(letter_grade(90.0), 'A');
        assert_eq!(letter_grade(80.0), 'B');
        assert_eq!(letter_grade(79.9), 'C');
        assert_eq!(letter_grade(60.0), 'D');
        assert_eq!(letter_grade(59.9), 'F');
    }

    #[test]
    fn test_partial_attempt_reports_unmatched_questions() {
        let q1 = question(10.0, 0);
        let q2 = question(10.0, 1);
        let q3 = question(20.0, 2);
        let ex = exercise(vec![q1.clone(), q2.clone(), q3.clone()]);
        let attempt = AttemptRecord {
            exercise_id: ex.id.to_string(),
            questions: vec![solved(q1.id, 10.0), solved(q3.id, 10.0)],
            started_at: None,
            submitted_at: None,
        };

        let report = reconcile(&ex, Some(&attempt), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(report.questions.len(), 3);
        let unmatched = &report.questions[1];
        assert_eq!(unmatched.question_id, q2.id);
        assert!(unmatched.user_attempt.is_none());
        assert_eq!(unmatched.user_score, 0.0);
        assert!(!unmatched.is_correct);
        // (10 + 10) / (10 + 10 + 20) = 50%
        assert!((report.percentage - 50.0).abs() < f64::EPSILON);
        assert_eq!(report.grade, 'F');
        assert!(!report.is_passing);
    }

    #[test]
    fn test_reconcile_is_deterministic_over_attempt_order() {
        let q1 = question(5.0, 0);
        let q2 = question(5.0, 1);
        let ex = exercise(vec![q1.clone(), q2.clone()]);
        let forward = AttemptRecord {
            exercise_id: ex.id.to_string(),
            questions: vec![solved(q1.id, 5.0), solved(q2.id, 3.0)],
            started_at: None,
            submitted_at: None,
        };
        let mut reversed = forward.clone();
        reversed.questions.reverse();

        let course = Uuid::new_v4();
        let user = Uuid::new_v4();
        let a = reconcile(&ex, Some(&forward), course, user);
        let b = reconcile(&ex, Some(&reversed), course, user);
        assert_eq!(a, b);
    }

    #[test]
    fn test_similar_ids_do_not_cross_match() {
        let q1 = question(10.0, 0);
        let ex = exercise(vec![q1.clone()]);
        // Attempt carries a truncated form of the question id. Exact matching
        // must not accept it.
        let mut attempt = solved(q1.id, 10.0);
        attempt.question_id.truncate(8);
        let record = AttemptRecord {
            exercise_id: ex.id.to_string(),
            questions: vec![attempt],
            started_at: None,
            submitted_at: None,
        };
        let report = reconcile(&ex, Some(&record), Uuid::new_v4(), Uuid::new_v4());
        assert!(report.questions[0].user_attempt.is_none());
        assert_eq!(report.user_score, 0.0);
    }

    #[test]
    fn test_status_solved_marks_correct_despite_low_score() {
        let q1 = question(10.0, 0);
        let ex = exercise(vec![q1.clone()]);
        let record = AttemptRecord {
            exercise_id: ex.id.to_string(),
            questions: vec![QuestionAttempt {
                question_id: q1.id.to_string(),
                score: Some(2.0),
                total_score: Some(10.0),
                status: Some("solved".to_string()),
                is_correct: None,
                attempts: None,
                feedback: None,
                answered_at: None,
            }],
            started_at: None,
            submitted_at: None,
        };
        let report = reconcile(&ex, Some(&record), Uuid::new_v4(), Uuid::new_v4());
        assert!(report.questions[0].is_correct);
        assert!((report.questions[0].percentage - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_find_attempt_honors_hints() {
        let exercise_id = Uuid::new_v4();
        let record = AttemptRecord {
            exercise_id: exercise_id.to_string(),
            questions: vec![],
            started_at: None,
            submitted_at: None,
        };
        let mut answers = Answers::default();
        answers
            .0
            .entry(Section::WeDo)
            .or_default()
            .insert("practice".to_string(), vec![record]);

        assert!(find_attempt(&answers, exercise_id, None, None).is_some());
        assert!(find_attempt(&answers, exercise_id, Some(Section::WeDo), Some("practice")).is_some());
        assert!(find_attempt(&answers, exercise_id, Some(Section::IDo), None).is_none());
        assert!(find_attempt(&answers, exercise_id, None, Some("homework")).is_none());
    }

    #[test]
    fn test_no_attempt_record_grades_everything_zero() {
        let ex = exercise(vec![question(10.0, 0), question(10.0, 1)]);
        let report = reconcile(&ex, None, Uuid::new_v4(), Uuid::new_v4());
        assert!(!report.attempt_found);
        assert_eq!(report.max_score, 20.0);
        assert_eq!(report.user_score, 0.0);
        assert_eq!(report.grade, 'F');
    }
}
