//! Side-index documents maintained alongside the entity store: a per-course
//! lesson-plan view (PedagogyView) and a per-course level view. Each row
//! holds an items array tagging the module/subModule/topic/subTopic ids it
//! applies to. Deleting an entity scrubs matching items; a view whose last
//! item goes away is deleted outright.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::hierarchy::NodeKind;
use crate::shared::error::ApiError;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

// ============================================================================
// DATABASE SCHEMA
// ============================================================================

diesel::table! {
    pedagogy_views (id) {
        id -> Uuid,
        course_id -> Uuid,
        items -> Jsonb,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    level_views (id) {
        id -> Uuid,
        course_id -> Uuid,
        items -> Jsonb,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(pedagogy_views, level_views);

// ============================================================================
// DATA MODELS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewType {
    Pedagogy,
    Level,
}

impl ViewType {
    pub fn from_route(segment: &str) -> Result<Self, ApiError> {
        match segment {
            "pedagogy" | "pedagogy-view" => Ok(Self::Pedagogy),
            "level" | "level-view" => Ok(Self::Level),
            other => Err(ApiError::Validation(format!("unknown view type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = pedagogy_views)]
pub struct PedagogyView {
    pub id: Uuid,
    pub course_id: Uuid,
    pub items: serde_json::Value,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = level_views)]
pub struct LevelView {
    pub id: Uuid,
    pub course_id: Uuid,
    pub items: serde_json::Value,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entity references carried by every view item, one id-array per level.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewRefs {
    #[serde(default)]
    pub module: Vec<Uuid>,
    #[serde(default)]
    pub sub_module: Vec<Uuid>,
    #[serde(default)]
    pub topic: Vec<Uuid>,
    #[serde(default)]
    pub sub_topic: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDuration {
    pub activity: String,
    pub duration: i32,
}

/// Item of the course-level lesson-plan view. `i_do`/`we_do`/`you_do` hold
/// activity-duration rows; this is distinct from the entity-embedded
/// pedagogy exercise tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PedagogyViewItem {
    pub id: Uuid,
    #[serde(flatten)]
    pub refs: ViewRefs,
    #[serde(default)]
    pub i_do: Vec<ActivityDuration>,
    #[serde(default)]
    pub we_do: Vec<ActivityDuration>,
    #[serde(default)]
    pub you_do: Vec<ActivityDuration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LevelViewItem {
    pub id: Uuid,
    #[serde(flatten)]
    pub refs: ViewRefs,
    pub level: String,
    pub index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateViewRequest {
    pub course_id: Uuid,
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewFilters {
    pub course_id: Uuid,
}

/// Remove every item whose id-array for the deleted entity's level contains
/// the deleted id. Returns the number of items removed.
pub fn scrub_items(items: &mut Vec<serde_json::Value>, kind: NodeKind, entity_id: Uuid) -> usize {
    let key = kind.level_name();
    let id_str = entity_id.to_string();
    let before = items.len();
    items.retain(|item| {
        !item
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().any(|x| x.as_str() == Some(id_str.as_str())))
            .unwrap_or(false)
    });
    before - items.len()
}

fn items_array(value: &serde_json::Value) -> Vec<serde_json::Value> {
    value.as_array().cloned().unwrap_or_default()
}

// ============================================================================
// VIEW ENGINE
// ============================================================================

pub struct ViewEngine {
    db: DbPool,
}

impl ViewEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        view_type: ViewType,
        req: CreateViewRequest,
        user: &CurrentUser,
    ) -> Result<serde_json::Value, ApiError> {
        if req.items.is_empty() {
            return Err(ApiError::Validation("items must not be empty".to_string()));
        }
        // Server-assigned item ids keep item deletion addressable.
        let items: Vec<serde_json::Value> = req
            .items
            .into_iter()
            .map(|mut item| {
                if let Some(obj) = item.as_object_mut() {
                    obj.entry("id".to_string())
                        .or_insert_with(|| serde_json::json!(Uuid::new_v4()));
                }
                item
            })
            .collect();
        let mut conn = self.db.get().map_err(ApiError::from)?;
        let now = Utc::now();
        match view_type {
            ViewType::Pedagogy => {
                let row = PedagogyView {
                    id: Uuid::new_v4(),
                    course_id: req.course_id,
                    items: serde_json::json!(items),
                    created_by: Some(user.id),
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(pedagogy_views::table)
                    .values(&row)
                    .execute(&mut conn)?;
                Ok(serde_json::to_value(row)?)
            }
            ViewType::Level => {
                let row = LevelView {
                    id: Uuid::new_v4(),
                    course_id: req.course_id,
                    items: serde_json::json!(items),
                    created_by: Some(user.id),
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(level_views::table)
                    .values(&row)
                    .execute(&mut conn)?;
                Ok(serde_json::to_value(row)?)
            }
        }
    }

    pub fn list(
        &self,
        view_type: ViewType,
        course_id: Uuid,
    ) -> Result<serde_json::Value, ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;
        match view_type {
            ViewType::Pedagogy => {
                let rows: Vec<PedagogyView> = pedagogy_views::table
                    .filter(pedagogy_views::course_id.eq(course_id))
                    .load(&mut conn)?;
                Ok(serde_json::to_value(rows)?)
            }
            ViewType::Level => {
                let rows: Vec<LevelView> = level_views::table
                    .filter(level_views::course_id.eq(course_id))
                    .load(&mut conn)?;
                Ok(serde_json::to_value(rows)?)
            }
        }
    }

    pub fn delete_view(&self, view_type: ViewType, view_id: Uuid) -> Result<(), ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;
        let affected = match view_type {
            ViewType::Pedagogy => diesel::delete(
                pedagogy_views::table.filter(pedagogy_views::id.eq(view_id)),
            )
            .execute(&mut conn)?,
            ViewType::Level => {
                diesel::delete(level_views::table.filter(level_views::id.eq(view_id)))
                    .execute(&mut conn)?
            }
        };
        if affected == 0 {
            return Err(ApiError::missing("view", view_id));
        }
        Ok(())
    }

    /// Remove one item by id. A view emptied by the removal collapses to
    /// full-document deletion.
    pub fn delete_item(
        &self,
        view_type: ViewType,
        view_id: Uuid,
        item_id: Uuid,
    ) -> Result<(), ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;
        let items_value: Option<serde_json::Value> = match view_type {
            ViewType::Pedagogy => pedagogy_views::table
                .filter(pedagogy_views::id.eq(view_id))
                .select(pedagogy_views::items)
                .first(&mut conn)
                .optional()?,
            ViewType::Level => level_views::table
                .filter(level_views::id.eq(view_id))
                .select(level_views::items)
                .first(&mut conn)
                .optional()?,
        };
        let items_value = items_value.ok_or_else(|| ApiError::missing("view", view_id))?;
        let mut items = items_array(&items_value);
        let before = items.len();
        let id_str = item_id.to_string();
        items.retain(|item| item.get("id").and_then(|v| v.as_str()) != Some(id_str.as_str()));
        if items.len() == before {
            return Err(ApiError::missing("view item", item_id));
        }
        drop(conn);
        if items.is_empty() {
            self.delete_view(view_type, view_id)
        } else {
            self.save_items(view_type, view_id, items)
        }
    }

    /// Reference cleanup after an entity deletion: course-scoped, best-effort
    /// per view row. Returns (items removed, views deleted).
    pub fn scrub_entity(
        &self,
        view_type: ViewType,
        course_id: Uuid,
        kind: NodeKind,
        entity_id: Uuid,
    ) -> Result<(usize, usize), ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;
        let rows: Vec<(Uuid, serde_json::Value)> = match view_type {
            ViewType::Pedagogy => pedagogy_views::table
                .filter(pedagogy_views::course_id.eq(course_id))
                .select((pedagogy_views::id, pedagogy_views::items))
                .load(&mut conn)?,
            ViewType::Level => level_views::table
                .filter(level_views::course_id.eq(course_id))
                .select((level_views::id, level_views::items))
                .load(&mut conn)?,
        };
        drop(conn);

        let mut removed_items = 0;
        let mut removed_views = 0;
        for (view_id, items_value) in rows {
            let mut items = items_array(&items_value);
            let removed = scrub_items(&mut items, kind, entity_id);
            if removed == 0 {
                continue;
            }
            removed_items += removed;
            if items.is_empty() {
                self.delete_view(view_type, view_id)?;
                removed_views += 1;
            } else {
                self.save_items(view_type, view_id, items)?;
            }
        }
        Ok((removed_items, removed_views))
    }

    fn save_items(
        &self,
        view_type: ViewType,
        view_id: Uuid,
        items: Vec<serde_json::Value>,
    ) -> Result<(), ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;
        let now = Utc::now();
        match view_type {
            ViewType::Pedagogy => {
                diesel::update(pedagogy_views::table.filter(pedagogy_views::id.eq(view_id)))
                    .set((
                        pedagogy_views::items.eq(serde_json::json!(items)),
                        pedagogy_views::updated_at.eq(now),
                    ))
                    .execute(&mut conn)?;
            }
            ViewType::Level => {
                diesel::update(level_views::table.filter(level_views::id.eq(view_id)))
                    .set((
                        level_views::items.eq(serde_json::json!(items)),
                        level_views::updated_at.eq(now),
                    ))
                    .execute(&mut conn)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// HTTP HANDLERS
// ============================================================================

pub async fn create_view(
    State(state): State<Arc<AppState>>,
    Path(view_type): Path<String>,
    user: CurrentUser,
    Json(req): Json<CreateViewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view_type = ViewType::from_route(&view_type)?;
    let engine = ViewEngine::new(state.conn.clone());
    let view = engine.create(view_type, req, &user)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": view })),
    ))
}

pub async fn list_views(
    State(state): State<Arc<AppState>>,
    Path(view_type): Path<String>,
    Query(filters): Query<ViewFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let view_type = ViewType::from_route(&view_type)?;
    let engine = ViewEngine::new(state.conn.clone());
    let views = engine.list(view_type, filters.course_id)?;
    Ok(Json(serde_json::json!({ "success": true, "data": views })))
}

pub async fn delete_view_item(
    State(state): State<Arc<AppState>>,
    Path((view_type, view_id, item_id)): Path<(String, Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let view_type = ViewType::from_route(&view_type)?;
    let engine = ViewEngine::new(state.conn.clone());
    engine.delete_item(view_type, view_id, item_id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub fn configure_view_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/views/:view_type", get(list_views).post(create_view))
        .route(
            "/api/views/:view_type/:view_id/items/:item_id",
            delete(delete_view_item),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_with(kind: NodeKind, ids: &[Uuid]) -> serde_json::Value {
        let mut item = serde_json::json!({ "id": Uuid::new_v4() });
        item[kind.level_name()] = serde_json::json!(ids);
        item
    }

    #[test]
    fn test_scrub_removes_only_matching_items() {
        let target = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut items = vec![
            item_with(NodeKind::Topic, &[target, other]),
            item_with(NodeKind::Topic, &[other]),
            item_with(NodeKind::Module, &[target]),
        ];
        // Scrubbing a topic id must not touch the module-tagged item even
        // though it carries the same uuid.
        let removed = scrub_items(&mut items, NodeKind::Topic, target);
        assert_eq!(removed, 1);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_scrub_ignores_items_without_the_level_key() {
        let target = Uuid::new_v4();
        let mut items = vec![serde_json::json!({ "id": Uuid::new_v4(), "level": "easy" })];
        assert_eq!(scrub_items(&mut items, NodeKind::SubTopic, target), 0);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_view_item_serde_shape() {
        let item = PedagogyViewItem {
            id: Uuid::new_v4(),
            refs: ViewRefs {
                module: vec![Uuid::new_v4()],
                ..Default::default()
            },
            i_do: vec![ActivityDuration { activity: "recap".to_string(), duration: 10 }],
            we_do: vec![],
            you_do: vec![],
        };
        let json = serde_json::to_value(&item).unwrap();
        // Refs are flattened onto the item, matching the stored layout.
        assert!(json.get("module").is_some());
        assert_eq!(json["iDo"][0]["activity"], "recap");
        let mut items = vec![json];
        assert_eq!(scrub_items(&mut items, NodeKind::Module, item.refs.module[0]), 1);
    }
}
