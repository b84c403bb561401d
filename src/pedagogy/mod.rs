//! Pedagogy substructure engine: exercise and question operations over the
//! `pedagogy[section][subcategory]` document embedded in every hierarchy
//! node. Every write is a read-modify-write of the whole document guarded by
//! the node's version counter.

pub mod resources;
pub mod scoring;
pub mod types;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::hierarchy::{HierarchyEngine, NodeKind};
use crate::shared::error::ApiError;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

use self::types::{
    next_exercise_code, BucketStatus, Exercise, ExerciseInformation, ExerciseType, Pedagogy,
    Question, QuestionBody, QuestionConfiguration, Section,
};

// ============================================================================
// REQUEST / RESPONSE MODELS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddExerciseRequest {
    pub tab_type: Section,
    pub subcategory: String,
    pub exercise_type: ExerciseType,
    pub exercise_information: ExerciseInformation,
    #[serde(default)]
    pub question_configuration: QuestionConfiguration,
    #[serde(default)]
    pub availability_period: Option<types::AvailabilityPeriod>,
    #[serde(default)]
    pub notification_and_grade_settings: Option<types::NotificationAndGradeSettings>,
    #[serde(default)]
    pub questions: Vec<NewQuestion>,
}

/// Full-object merge payload: any section present replaces the stored one,
/// derived totals are recomputed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExerciseRequest {
    #[serde(default)]
    pub tab_type: Option<Section>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub exercise_type: Option<ExerciseType>,
    #[serde(default)]
    pub exercise_information: Option<ExerciseInformation>,
    #[serde(default)]
    pub question_configuration: Option<QuestionConfiguration>,
    #[serde(default)]
    pub availability_period: Option<types::AvailabilityPeriod>,
    #[serde(default)]
    pub notification_and_grade_settings: Option<types::NotificationAndGradeSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub score: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(flatten)]
    pub body: QuestionBody,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddQuestionsRequest {
    pub tab_type: Option<Section>,
    pub subcategory: Option<String>,
    pub questions_data: Vec<NewQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubcategoryQuery {
    pub tab_type: Option<Section>,
    pub subcategory: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub tab_type: Section,
    pub subcategory: String,
    #[serde(default)]
    pub locked: Option<bool>,
    #[serde(default)]
    pub status: Option<BucketStatus>,
}

// ============================================================================
// PEDAGOGY ENGINE
// ============================================================================

pub struct PedagogyEngine {
    pub(crate) hierarchy: HierarchyEngine,
}

impl PedagogyEngine {
    pub fn new(db: DbPool) -> Self {
        Self {
            hierarchy: HierarchyEngine::new(db),
        }
    }

    pub async fn add_exercise(
        &self,
        kind: NodeKind,
        node_id: Uuid,
        req: AddExerciseRequest,
        user: &CurrentUser,
    ) -> Result<Exercise, ApiError> {
        if req.exercise_information.name.trim().is_empty() {
            return Err(ApiError::Validation("exercise name is required".to_string()));
        }
        let (mut pedagogy, version, _) = self.hierarchy.load_pedagogy(kind, node_id)?;
        let bucket = pedagogy.ensure_bucket(req.tab_type, &req.subcategory);
        let exercise = build_exercise(&req, bucket.exercises.len(), user);
        bucket.exercises.push(exercise.clone());
        self.hierarchy
            .save_pedagogy(kind, node_id, &pedagogy, version, user)?;
        Ok(exercise)
    }

    pub async fn get_exercise(
        &self,
        kind: NodeKind,
        node_id: Uuid,
        exercise_id: Uuid,
    ) -> Result<Exercise, ApiError> {
        let (pedagogy, _, _) = self.hierarchy.load_pedagogy(kind, node_id)?;
        pedagogy
            .find_exercise(exercise_id)
            .map(|(_, _, e)| e.clone())
            .ok_or_else(|| ApiError::missing("exercise", exercise_id))
    }

    pub async fn update_exercise(
        &self,
        kind: NodeKind,
        node_id: Uuid,
        exercise_id: Uuid,
        req: UpdateExerciseRequest,
        user: &CurrentUser,
    ) -> Result<Exercise, ApiError> {
        let (mut pedagogy, version, _) = self.hierarchy.load_pedagogy(kind, node_id)?;
        let exercise =
            find_exercise_mut(&mut pedagogy, exercise_id, req.tab_type, req.subcategory.as_deref())?;
        merge_exercise_update(exercise, &req, user);
        let updated = exercise.clone();
        self.hierarchy
            .save_pedagogy(kind, node_id, &pedagogy, version, user)?;
        Ok(updated)
    }

    pub async fn delete_exercise(
        &self,
        kind: NodeKind,
        node_id: Uuid,
        exercise_id: Uuid,
        section: Option<Section>,
        subcategory: Option<&str>,
        user: &CurrentUser,
    ) -> Result<(), ApiError> {
        let (mut pedagogy, version, _) = self.hierarchy.load_pedagogy(kind, node_id)?;
        let mut removed = false;
        for (sec, subcats) in pedagogy.0.iter_mut() {
            if section.is_some_and(|s| s != *sec) {
                continue;
            }
            for (name, bucket) in subcats.iter_mut() {
                if subcategory.is_some_and(|sc| sc != name) {
                    continue;
                }
                let before = bucket.exercises.len();
                bucket.exercises.retain(|e| e.id != exercise_id);
                if bucket.exercises.len() != before {
                    removed = true;
                }
            }
        }
        if !removed {
            return Err(ApiError::missing("exercise", exercise_id));
        }
        self.hierarchy
            .save_pedagogy(kind, node_id, &pedagogy, version, user)
    }

    pub async fn add_questions(
        &self,
        kind: NodeKind,
        node_id: Uuid,
        exercise_id: Uuid,
        req: AddQuestionsRequest,
        user: &CurrentUser,
    ) -> Result<Vec<Question>, ApiError> {
        if req.questions_data.is_empty() {
            return Err(ApiError::Validation("questionsData must not be empty".to_string()));
        }
        let (mut pedagogy, version, _) = self.hierarchy.load_pedagogy(kind, node_id)?;
        let exercise =
            find_exercise_mut(&mut pedagogy, exercise_id, req.tab_type, req.subcategory.as_deref())?;
        let added = apply_question_add(exercise, req.questions_data, user);
        self.hierarchy
            .save_pedagogy(kind, node_id, &pedagogy, version, user)?;
        Ok(added)
    }

    pub async fn get_questions(
        &self,
        kind: NodeKind,
        node_id: Uuid,
        exercise_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<Question>, ApiError> {
        let exercise = self.get_exercise(kind, node_id, exercise_id).await?;
        let mut questions: Vec<Question> = exercise
            .questions
            .into_iter()
            .filter(|q| include_inactive || q.is_active)
            .collect();
        questions.sort_by_key(|q| q.sequence);
        Ok(questions)
    }

    /// Field-level partial merge: the patch object is laid over the stored
    /// question's JSON form, then the result is re-validated through the
    /// typed model (so a patch cannot smuggle cross-variant fields in).
    pub async fn update_question(
        &self,
        kind: NodeKind,
        node_id: Uuid,
        exercise_id: Uuid,
        question_id: Uuid,
        patch: serde_json::Value,
        user: &CurrentUser,
    ) -> Result<Question, ApiError> {
        let (mut pedagogy, version, _) = self.hierarchy.load_pedagogy(kind, node_id)?;
        let exercise = find_exercise_mut(&mut pedagogy, exercise_id, None, None)?;
        let question = exercise
            .questions
            .iter_mut()
            .find(|q| q.id == question_id)
            .ok_or_else(|| ApiError::missing("question", question_id))?;
        *question = merge_question_patch(question, &patch)?;
        let updated = question.clone();
        exercise.updated_by = Some(user.id);
        exercise.updated_at = Utc::now();
        exercise.version += 1;
        scoring::recompute_totals(exercise);
        self.hierarchy
            .save_pedagogy(kind, node_id, &pedagogy, version, user)?;
        Ok(updated)
    }

    pub async fn delete_question(
        &self,
        kind: NodeKind,
        node_id: Uuid,
        exercise_id: Uuid,
        question_id: Uuid,
        user: &CurrentUser,
    ) -> Result<(), ApiError> {
        let (mut pedagogy, version, _) = self.hierarchy.load_pedagogy(kind, node_id)?;
        let exercise = find_exercise_mut(&mut pedagogy, exercise_id, None, None)?;
        let before = exercise.questions.len();
        exercise.questions.retain(|q| q.id != question_id);
        if exercise.questions.len() == before {
            return Err(ApiError::missing("question", question_id));
        }
        exercise.updated_by = Some(user.id);
        exercise.updated_at = Utc::now();
        exercise.version += 1;
        scoring::recompute_totals(exercise);
        self.hierarchy
            .save_pedagogy(kind, node_id, &pedagogy, version, user)
    }

    /// Locked/progress flags on one subcategory element.
    pub async fn update_status(
        &self,
        kind: NodeKind,
        node_id: Uuid,
        req: StatusUpdateRequest,
        user: &CurrentUser,
    ) -> Result<(), ApiError> {
        let (mut pedagogy, version, _) = self.hierarchy.load_pedagogy(kind, node_id)?;
        let bucket = pedagogy
            .bucket_mut(req.tab_type, &req.subcategory)
            .ok_or_else(|| ApiError::missing("subcategory", &req.subcategory))?;
        if let Some(locked) = req.locked {
            bucket.locked = locked;
        }
        if let Some(status) = req.status {
            bucket.status = status;
        }
        self.hierarchy
            .save_pedagogy(kind, node_id, &pedagogy, version, user)
    }
}

// ============================================================================
// PURE CORE
// ============================================================================

fn build_exercise(req: &AddExerciseRequest, existing: usize, user: &CurrentUser) -> Exercise {
    let now = Utc::now();
    let mut information = req.exercise_information.clone();
    information.total_questions = 0;
    information.total_points = 0.0;
    let mut exercise = Exercise {
        id: Uuid::new_v4(),
        exercise_code: next_exercise_code(existing),
        exercise_type: req.exercise_type,
        configuration_type: req.exercise_type.configuration_modes(),
        exercise_information: information,
        question_configuration: req.question_configuration.clone(),
        availability_period: req.availability_period.clone(),
        notification_and_grade_settings: req.notification_and_grade_settings.clone(),
        questions: Vec::new(),
        version: 1,
        created_by: Some(user.id),
        updated_by: Some(user.id),
        created_at: now,
        updated_at: now,
    };
    append_questions(&mut exercise, req.questions.clone());
    scoring::recompute_totals(&mut exercise);
    exercise
}

fn merge_exercise_update(exercise: &mut Exercise, req: &UpdateExerciseRequest, user: &CurrentUser) {
    if let Some(t) = req.exercise_type {
        exercise.exercise_type = t;
        exercise.configuration_type = t.configuration_modes();
    }
    if let Some(info) = &req.exercise_information {
        exercise.exercise_information = info.clone();
    }
    if let Some(cfg) = &req.question_configuration {
        exercise.question_configuration = cfg.clone();
    }
    if let Some(p) = &req.availability_period {
        exercise.availability_period = Some(p.clone());
    }
    if let Some(s) = &req.notification_and_grade_settings {
        exercise.notification_and_grade_settings = Some(s.clone());
    }
    exercise.version += 1;
    exercise.updated_by = Some(user.id);
    exercise.updated_at = Utc::now();
    scoring::recompute_totals(exercise);
}

/// Bulk append with server-assigned ids and continue-from-the-end sequences.
fn append_questions(exercise: &mut Exercise, inputs: Vec<NewQuestion>) -> Vec<Question> {
    let mut next_sequence = exercise.questions.iter().map(|q| q.sequence + 1).max().unwrap_or(0);
    let mut added = Vec::with_capacity(inputs.len());
    for input in inputs {
        let question = Question {
            id: Uuid::new_v4(),
            is_active: input.is_active,
            sequence: next_sequence,
            score: input.score,
            body: input.body,
        };
        next_sequence += 1;
        exercise.questions.push(question.clone());
        added.push(question);
    }
    added
}

/// Bulk question add with the write stamps and the derived-totals recompute
/// every question mutation carries.
fn apply_question_add(
    exercise: &mut Exercise,
    inputs: Vec<NewQuestion>,
    user: &CurrentUser,
) -> Vec<Question> {
    let added = append_questions(exercise, inputs);
    exercise.updated_by = Some(user.id);
    exercise.updated_at = Utc::now();
    exercise.version += 1;
    scoring::recompute_totals(exercise);
    added
}

fn merge_question_patch(question: &Question, patch: &serde_json::Value) -> Result<Question, ApiError> {
    let mut value = serde_json::to_value(question)?;
    let (Some(target), Some(fields)) = (value.as_object_mut(), patch.as_object()) else {
        return Err(ApiError::Validation("question patch must be an object".to_string()));
    };
    for (key, field) in fields {
        // Identity and discriminant are not patchable.
        if key == "id" || key == "questionType" {
            continue;
        }
        target.insert(key.clone(), field.clone());
    }
    let merged: Question = serde_json::from_value(value)
        .map_err(|e| ApiError::Validation(format!("invalid question patch: {}", e)))?;
    Ok(merged)
}

fn find_exercise_mut<'a>(
    pedagogy: &'a mut Pedagogy,
    exercise_id: Uuid,
    section: Option<Section>,
    subcategory: Option<&str>,
) -> Result<&'a mut Exercise, ApiError> {
    for (sec, subcats) in pedagogy.0.iter_mut() {
        if section.is_some_and(|s| s != *sec) {
            continue;
        }
        for (name, bucket) in subcats.iter_mut() {
            if subcategory.is_some_and(|sc| sc != name) {
                continue;
            }
            if let Some(index) = bucket.exercises.iter().position(|e| e.id == exercise_id) {
                return Ok(&mut bucket.exercises[index]);
            }
        }
    }
    Err(ApiError::missing("exercise", exercise_id))
}

// ============================================================================
// HTTP HANDLERS
// ============================================================================

pub async fn add_exercise(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
    user: CurrentUser,
    Json(req): Json<AddExerciseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    let exercise = engine.add_exercise(kind, id, req, &user).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": exercise })),
    ))
}

pub async fn get_exercise(
    State(state): State<Arc<AppState>>,
    Path((kind, id, exercise_id)): Path<(String, Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    let exercise = engine.get_exercise(kind, id, exercise_id).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": exercise })))
}

pub async fn update_exercise(
    State(state): State<Arc<AppState>>,
    Path((kind, id, exercise_id)): Path<(String, Uuid, Uuid)>,
    user: CurrentUser,
    Json(req): Json<UpdateExerciseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    let exercise = engine.update_exercise(kind, id, exercise_id, req, &user).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": exercise })))
}

pub async fn delete_exercise(
    State(state): State<Arc<AppState>>,
    Path((kind, id, exercise_id)): Path<(String, Uuid, Uuid)>,
    Query(query): Query<SubcategoryQuery>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    engine
        .delete_exercise(kind, id, exercise_id, query.tab_type, query.subcategory.as_deref(), &user)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn add_questions(
    State(state): State<Arc<AppState>>,
    Path((kind, id, exercise_id)): Path<(String, Uuid, Uuid)>,
    user: CurrentUser,
    Json(req): Json<AddQuestionsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    let added = engine.add_questions(kind, id, exercise_id, req, &user).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": added })),
    ))
}

pub async fn get_questions(
    State(state): State<Arc<AppState>>,
    Path((kind, id, exercise_id)): Path<(String, Uuid, Uuid)>,
    Query(query): Query<SubcategoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    let questions = engine
        .get_questions(kind, id, exercise_id, query.include_inactive)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "data": questions })))
}

pub async fn update_question(
    State(state): State<Arc<AppState>>,
    Path((kind, id, exercise_id, question_id)): Path<(String, Uuid, Uuid, Uuid)>,
    user: CurrentUser,
    Json(patch): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    let question = engine
        .update_question(kind, id, exercise_id, question_id, patch, &user)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "data": question })))
}

pub async fn delete_question(
    State(state): State<Arc<AppState>>,
    Path((kind, id, exercise_id, question_id)): Path<(String, Uuid, Uuid, Uuid)>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    engine
        .delete_question(kind, id, exercise_id, question_id, &user)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
    user: CurrentUser,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    engine.update_status(kind, id, req, &user).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub fn configure_pedagogy_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/pedagogy/exercise/add/:kind/:id", put(add_exercise))
        .route(
            "/api/pedagogy/exercise/update/:kind/:id/:exercise_id",
            put(update_exercise),
        )
        .route(
            "/api/pedagogy/exercise/delete/:kind/:id/:exercise_id",
            delete(delete_exercise),
        )
        .route(
            "/api/pedagogy/exercise/:kind/:id/:exercise_id",
            get(get_exercise),
        )
        .route(
            "/api/pedagogy/question-add/:kind/:id/exercise/:exercise_id",
            post(add_questions),
        )
        .route(
            "/api/pedagogy/questions/:kind/:id/exercise/:exercise_id",
            get(get_questions),
        )
        .route(
            "/api/pedagogy/question/:kind/:id/exercise/:exercise_id/:question_id",
            put(update_question).delete(delete_question),
        )
        .route("/api/pedagogy/status/:kind/:id", put(update_status))
        .merge(resources::configure_resource_routes())
}
