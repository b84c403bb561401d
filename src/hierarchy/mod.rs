//! Normalized entity store for the course-content hierarchy: Module,
//! SubModule, Topic and SubTopic are independent rows referencing their
//! course and parent(s), each carrying its own embedded pedagogy document in
//! a Jsonb column. A topic attaches to a module directly or through a
//! submodule, never both.

pub mod locator;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::pedagogy::types::Pedagogy;
use crate::shared::error::ApiError;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

// ============================================================================
// DATABASE SCHEMA
// ============================================================================

diesel::table! {
    courses (id) {
        id -> Uuid,
        title -> Text,
        description -> Nullable<Text>,
        institution_id -> Nullable<Uuid>,
        hierarchy -> Jsonb,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    course_modules (id) {
        id -> Uuid,
        course_id -> Uuid,
        title -> Text,
        description -> Nullable<Text>,
        duration -> Nullable<Int4>,
        level -> Nullable<Text>,
        position -> Int4,
        pedagogy -> Jsonb,
        version -> Int4,
        created_by -> Nullable<Uuid>,
        updated_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    course_sub_modules (id) {
        id -> Uuid,
        course_id -> Uuid,
        module_id -> Uuid,
        title -> Text,
        description -> Nullable<Text>,
        duration -> Nullable<Int4>,
        level -> Nullable<Text>,
        position -> Int4,
        pedagogy -> Jsonb,
        version -> Int4,
        created_by -> Nullable<Uuid>,
        updated_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    course_topics (id) {
        id -> Uuid,
        course_id -> Uuid,
        module_id -> Nullable<Uuid>,
        sub_module_id -> Nullable<Uuid>,
        title -> Text,
        description -> Nullable<Text>,
        duration -> Nullable<Int4>,
        level -> Nullable<Text>,
        position -> Int4,
        pedagogy -> Jsonb,
        version -> Int4,
        created_by -> Nullable<Uuid>,
        updated_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    course_sub_topics (id) {
        id -> Uuid,
        course_id -> Uuid,
        topic_id -> Uuid,
        title -> Text,
        description -> Nullable<Text>,
        duration -> Nullable<Int4>,
        level -> Nullable<Text>,
        position -> Int4,
        pedagogy -> Jsonb,
        version -> Int4,
        created_by -> Nullable<Uuid>,
        updated_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    courses,
    course_modules,
    course_sub_modules,
    course_topics,
    course_sub_topics,
);

// ============================================================================
// DATA MODELS
// ============================================================================

/// Which hierarchy level a request addresses. Wire forms: route segments
/// ("modules", …) and cascade model names ("module", …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Module,
    SubModule,
    Topic,
    SubTopic,
}

impl NodeKind {
    pub fn from_route(segment: &str) -> Result<Self, ApiError> {
        match segment {
            "modules" => Ok(Self::Module),
            "submodules" => Ok(Self::SubModule),
            "topics" => Ok(Self::Topic),
            "subtopics" => Ok(Self::SubTopic),
            other => Err(ApiError::Validation(format!(
                "unknown hierarchy type '{}'",
                other
            ))),
        }
    }

    pub fn from_model(model: &str) -> Option<Self> {
        match model {
            "module" => Some(Self::Module),
            "submodule" => Some(Self::SubModule),
            "topic" => Some(Self::Topic),
            "subtopic" => Some(Self::SubTopic),
            _ => None,
        }
    }

    pub fn level_name(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::SubModule => "subModule",
            Self::Topic => "topic",
            Self::SubTopic => "subTopic",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = courses)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub institution_id: Option<Uuid>,
    pub hierarchy: serde_json::Value,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = course_modules)]
pub struct ModuleNode {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub duration: Option<i32>,
    pub level: Option<String>,
    pub position: i32,
    pub pedagogy: serde_json::Value,
    pub version: i32,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = course_sub_modules)]
pub struct SubModuleNode {
    pub id: Uuid,
    pub course_id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub duration: Option<i32>,
    pub level: Option<String>,
    pub position: i32,
    pub pedagogy: serde_json::Value,
    pub version: i32,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = course_topics)]
pub struct TopicNode {
    pub id: Uuid,
    pub course_id: Uuid,
    pub module_id: Option<Uuid>,
    pub sub_module_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub duration: Option<i32>,
    pub level: Option<String>,
    pub position: i32,
    pub pedagogy: serde_json::Value,
    pub version: i32,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = course_sub_topics)]
pub struct SubTopicNode {
    pub id: Uuid,
    pub course_id: Uuid,
    pub topic_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub duration: Option<i32>,
    pub level: Option<String>,
    pub position: i32,
    pub pedagogy: serde_json::Value,
    pub version: i32,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNodeRequest {
    pub course_id: Uuid,
    pub module_id: Option<Uuid>,
    pub sub_module_id: Option<Uuid>,
    pub topic_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub duration: Option<i32>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNodeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<i32>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFilters {
    pub course_id: Uuid,
    pub module_id: Option<Uuid>,
    pub sub_module_id: Option<Uuid>,
    pub topic_id: Option<Uuid>,
}

/// Denormalized per-course hierarchy snapshot cached on the course row.
/// Treated strictly as a cache: the cascade engine rebuilds it after pruning
/// and a rebuild endpoint exposes explicit invalidation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HierarchySnapshot {
    #[serde(default)]
    pub modules: Vec<SnapshotModule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotModule {
    pub id: Uuid,
    pub title: String,
    pub position: i32,
    #[serde(default)]
    pub sub_modules: Vec<SnapshotSubModule>,
    #[serde(default)]
    pub topics: Vec<SnapshotTopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSubModule {
    pub id: Uuid,
    pub title: String,
    pub position: i32,
    #[serde(default)]
    pub topics: Vec<SnapshotTopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTopic {
    pub id: Uuid,
    pub title: String,
    pub position: i32,
    #[serde(default)]
    pub sub_topics: Vec<SnapshotSubTopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSubTopic {
    pub id: Uuid,
    pub title: String,
    pub position: i32,
}

// ============================================================================
// HIERARCHY ENGINE
// ============================================================================

pub struct HierarchyEngine {
    db: DbPool,
}

impl HierarchyEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    fn conn(
        &self,
    ) -> Result<
        diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>,
        ApiError,
    > {
        Ok(self.db.get()?)
    }

    // ----- Creation (sibling position = max + 1, default 1) -----

    pub async fn create_node(
        &self,
        kind: NodeKind,
        req: CreateNodeRequest,
        user: &CurrentUser,
    ) -> Result<serde_json::Value, ApiError> {
        if req.title.trim().is_empty() {
            return Err(ApiError::Validation("title is required".to_string()));
        }
        match kind {
            NodeKind::Module => {
                let node = self.create_module(req, user)?;
                Ok(serde_json::to_value(node)?)
            }
            NodeKind::SubModule => {
                let node = self.create_sub_module(req, user)?;
                Ok(serde_json::to_value(node)?)
            }
            NodeKind::Topic => {
                let node = self.create_topic(req, user)?;
                Ok(serde_json::to_value(node)?)
            }
            NodeKind::SubTopic => {
                let node = self.create_sub_topic(req, user)?;
                Ok(serde_json::to_value(node)?)
            }
        }
    }

    fn create_module(
        &self,
        req: CreateNodeRequest,
        user: &CurrentUser,
    ) -> Result<ModuleNode, ApiError> {
        let mut conn = self.conn()?;
        let position = next_module_position(&mut conn, req.course_id)?;
        let now = Utc::now();
        let node = ModuleNode {
            id: Uuid::new_v4(),
            course_id: req.course_id,
            title: req.title,
            description: req.description,
            duration: req.duration,
            level: req.level,
            position,
            pedagogy: serde_json::json!({}),
            version: 1,
            created_by: Some(user.id),
            updated_by: Some(user.id),
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(course_modules::table)
            .values(&node)
            .execute(&mut conn)?;
        Ok(node)
    }

    fn create_sub_module(
        &self,
        req: CreateNodeRequest,
        user: &CurrentUser,
    ) -> Result<SubModuleNode, ApiError> {
        let module_id = req
            .module_id
            .ok_or_else(|| ApiError::Validation("module_id is required".to_string()))?;
        let mut conn = self.conn()?;
        let parent: Option<ModuleNode> = course_modules::table
            .filter(course_modules::id.eq(module_id))
            .first(&mut conn)
            .optional()?;
        let parent = parent.ok_or_else(|| ApiError::missing("module", module_id))?;

        let position: Option<i32> = course_sub_modules::table
            .filter(course_sub_modules::module_id.eq(module_id))
            .select(diesel::dsl::max(course_sub_modules::position))
            .first(&mut conn)?;
        let now = Utc::now();
        let node = SubModuleNode {
            id: Uuid::new_v4(),
            course_id: parent.course_id,
            module_id,
            title: req.title,
            description: req.description,
            duration: req.duration,
            level: req.level,
            position: position.unwrap_or(0) + 1,
            pedagogy: serde_json::json!({}),
            version: 1,
            created_by: Some(user.id),
            updated_by: Some(user.id),
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(course_sub_modules::table)
            .values(&node)
            .execute(&mut conn)?;
        Ok(node)
    }

    fn create_topic(
        &self,
        req: CreateNodeRequest,
        user: &CurrentUser,
    ) -> Result<TopicNode, ApiError> {
        // A topic hangs off a module directly or off a submodule, exactly one.
        let (module_id, sub_module_id) = match (req.module_id, req.sub_module_id) {
            (Some(m), None) => (Some(m), None),
            (None, Some(s)) => (None, Some(s)),
            _ => {
                return Err(ApiError::Validation(
                    "a topic requires exactly one of module_id or sub_module_id".to_string(),
                ))
            }
        };
        let mut conn = self.conn()?;
        let course_id = match (module_id, sub_module_id) {
            (Some(m), _) => {
                let parent: Option<ModuleNode> = course_modules::table
                    .filter(course_modules::id.eq(m))
                    .first(&mut conn)
                    .optional()?;
                parent.ok_or_else(|| ApiError::missing("module", m))?.course_id
            }
            (_, Some(s)) => {
                let parent: Option<SubModuleNode> = course_sub_modules::table
                    .filter(course_sub_modules::id.eq(s))
                    .first(&mut conn)
                    .optional()?;
                parent.ok_or_else(|| ApiError::missing("subModule", s))?.course_id
            }
            (None, None) => {
                return Err(ApiError::Validation(
                    "a topic requires exactly one of module_id or sub_module_id".to_string(),
                ))
            }
        };

        let position: Option<i32> = match (module_id, sub_module_id) {
            (Some(m), _) => course_topics::table
                .filter(course_topics::module_id.eq(m))
                .select(diesel::dsl::max(course_topics::position))
                .first(&mut conn)?,
            (_, Some(s)) => course_topics::table
                .filter(course_topics::sub_module_id.eq(s))
                .select(diesel::dsl::max(course_topics::position))
                .first(&mut conn)?,
            _ => unreachable!(),
        };
        let now = Utc::now();
        let node = TopicNode {
            id: Uuid::new_v4(),
            course_id,
            module_id,
            sub_module_id,
            title: req.title,
            description: req.description,
            duration: req.duration,
            level: req.level,
            position: position.unwrap_or(0) + 1,
            pedagogy: serde_json::json!({}),
            version: 1,
            created_by: Some(user.id),
            updated_by: Some(user.id),
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(course_topics::table)
            .values(&node)
            .execute(&mut conn)?;
        Ok(node)
    }

    fn create_sub_topic(
        &self,
        req: CreateNodeRequest,
        user: &CurrentUser,
    ) -> Result<SubTopicNode, ApiError> {
        let topic_id = req
            .topic_id
            .ok_or_else(|| ApiError::Validation("topic_id is required".to_string()))?;
        let mut conn = self.conn()?;
        let parent: Option<TopicNode> = course_topics::table
            .filter(course_topics::id.eq(topic_id))
            .first(&mut conn)
            .optional()?;
        let parent = parent.ok_or_else(|| ApiError::missing("topic", topic_id))?;

        let position: Option<i32> = course_sub_topics::table
            .filter(course_sub_topics::topic_id.eq(topic_id))
            .select(diesel::dsl::max(course_sub_topics::position))
            .first(&mut conn)?;
        let now = Utc::now();
        let node = SubTopicNode {
            id: Uuid::new_v4(),
            course_id: parent.course_id,
            topic_id,
            title: req.title,
            description: req.description,
            duration: req.duration,
            level: req.level,
            position: position.unwrap_or(0) + 1,
            pedagogy: serde_json::json!({}),
            version: 1,
            created_by: Some(user.id),
            updated_by: Some(user.id),
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(course_sub_topics::table)
            .values(&node)
            .execute(&mut conn)?;
        Ok(node)
    }

    // ----- Reads -----

    pub async fn get_node(&self, kind: NodeKind, id: Uuid) -> Result<serde_json::Value, ApiError> {
        let mut conn = self.conn()?;
        let value = match kind {
            NodeKind::Module => course_modules::table
                .filter(course_modules::id.eq(id))
                .first::<ModuleNode>(&mut conn)
                .optional()?
                .map(serde_json::to_value),
            NodeKind::SubModule => course_sub_modules::table
                .filter(course_sub_modules::id.eq(id))
                .first::<SubModuleNode>(&mut conn)
                .optional()?
                .map(serde_json::to_value),
            NodeKind::Topic => course_topics::table
                .filter(course_topics::id.eq(id))
                .first::<TopicNode>(&mut conn)
                .optional()?
                .map(serde_json::to_value),
            NodeKind::SubTopic => course_sub_topics::table
                .filter(course_sub_topics::id.eq(id))
                .first::<SubTopicNode>(&mut conn)
                .optional()?
                .map(serde_json::to_value),
        };
        match value {
            Some(v) => Ok(v?),
            None => Err(ApiError::missing(kind.level_name(), id)),
        }
    }

    /// Ordered sibling listing; display order is always sort-by-position,
    /// never array position.
    pub async fn list_nodes(
        &self,
        kind: NodeKind,
        filters: NodeFilters,
    ) -> Result<serde_json::Value, ApiError> {
        let mut conn = self.conn()?;
        let value = match kind {
            NodeKind::Module => {
                let rows: Vec<ModuleNode> = course_modules::table
                    .filter(course_modules::course_id.eq(filters.course_id))
                    .order(course_modules::position.asc())
                    .load(&mut conn)?;
                serde_json::to_value(rows)?
            }
            NodeKind::SubModule => {
                let mut query = course_sub_modules::table
                    .filter(course_sub_modules::course_id.eq(filters.course_id))
                    .into_boxed();
                if let Some(m) = filters.module_id {
                    query = query.filter(course_sub_modules::module_id.eq(m));
                }
                let rows: Vec<SubModuleNode> =
                    query.order(course_sub_modules::position.asc()).load(&mut conn)?;
                serde_json::to_value(rows)?
            }
            NodeKind::Topic => {
                let mut query = course_topics::table
                    .filter(course_topics::course_id.eq(filters.course_id))
                    .into_boxed();
                if let Some(m) = filters.module_id {
                    query = query.filter(course_topics::module_id.eq(m));
                }
                if let Some(s) = filters.sub_module_id {
                    query = query.filter(course_topics::sub_module_id.eq(s));
                }
                let rows: Vec<TopicNode> =
                    query.order(course_topics::position.asc()).load(&mut conn)?;
                serde_json::to_value(rows)?
            }
            NodeKind::SubTopic => {
                let mut query = course_sub_topics::table
                    .filter(course_sub_topics::course_id.eq(filters.course_id))
                    .into_boxed();
                if let Some(t) = filters.topic_id {
                    query = query.filter(course_sub_topics::topic_id.eq(t));
                }
                let rows: Vec<SubTopicNode> =
                    query.order(course_sub_topics::position.asc()).load(&mut conn)?;
                serde_json::to_value(rows)?
            }
        };
        Ok(value)
    }

    // ----- Metadata update -----

    pub async fn update_node(
        &self,
        kind: NodeKind,
        id: Uuid,
        req: UpdateNodeRequest,
        user: &CurrentUser,
    ) -> Result<serde_json::Value, ApiError> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        match kind {
            NodeKind::Module => {
                let row: ModuleNode = course_modules::table
                    .filter(course_modules::id.eq(id))
                    .first(&mut conn)
                    .optional()?
                    .ok_or_else(|| ApiError::missing("module", id))?;
                diesel::update(course_modules::table.filter(course_modules::id.eq(id)))
                    .set((
                        course_modules::title.eq(req.title.unwrap_or(row.title)),
                        course_modules::description.eq(req.description.or(row.description)),
                        course_modules::duration.eq(req.duration.or(row.duration)),
                        course_modules::level.eq(req.level.or(row.level)),
                        course_modules::updated_by.eq(Some(user.id)),
                        course_modules::updated_at.eq(now),
                    ))
                    .execute(&mut conn)?;
            }
            NodeKind::SubModule => {
                let row: SubModuleNode = course_sub_modules::table
                    .filter(course_sub_modules::id.eq(id))
                    .first(&mut conn)
                    .optional()?
                    .ok_or_else(|| ApiError::missing("subModule", id))?;
                diesel::update(
                    course_sub_modules::table.filter(course_sub_modules::id.eq(id)),
                )
                .set((
                    course_sub_modules::title.eq(req.title.unwrap_or(row.title)),
                    course_sub_modules::description.eq(req.description.or(row.description)),
                    course_sub_modules::duration.eq(req.duration.or(row.duration)),
                    course_sub_modules::level.eq(req.level.or(row.level)),
                    course_sub_modules::updated_by.eq(Some(user.id)),
                    course_sub_modules::updated_at.eq(now),
                ))
                .execute(&mut conn)?;
            }
            NodeKind::Topic => {
                let row: TopicNode = course_topics::table
                    .filter(course_topics::id.eq(id))
                    .first(&mut conn)
                    .optional()?
                    .ok_or_else(|| ApiError::missing("topic", id))?;
                diesel::update(course_topics::table.filter(course_topics::id.eq(id)))
                    .set((
                        course_topics::title.eq(req.title.unwrap_or(row.title)),
                        course_topics::description.eq(req.description.or(row.description)),
                        course_topics::duration.eq(req.duration.or(row.duration)),
                        course_topics::level.eq(req.level.or(row.level)),
                        course_topics::updated_by.eq(Some(user.id)),
                        course_topics::updated_at.eq(now),
                    ))
                    .execute(&mut conn)?;
            }
            NodeKind::SubTopic => {
                let row: SubTopicNode = course_sub_topics::table
                    .filter(course_sub_topics::id.eq(id))
                    .first(&mut conn)
                    .optional()?
                    .ok_or_else(|| ApiError::missing("subTopic", id))?;
                diesel::update(
                    course_sub_topics::table.filter(course_sub_topics::id.eq(id)),
                )
                .set((
                    course_sub_topics::title.eq(req.title.unwrap_or(row.title)),
                    course_sub_topics::description.eq(req.description.or(row.description)),
                    course_sub_topics::duration.eq(req.duration.or(row.duration)),
                    course_sub_topics::level.eq(req.level.or(row.level)),
                    course_sub_topics::updated_by.eq(Some(user.id)),
                    course_sub_topics::updated_at.eq(now),
                ))
                .execute(&mut conn)?;
            }
        }
        drop(conn);
        self.get_node(kind, id).await
    }

    // ----- Pedagogy document read-modify-write -----

    /// Load a node's pedagogy document, its CAS version and owning course.
    pub fn load_pedagogy(
        &self,
        kind: NodeKind,
        id: Uuid,
    ) -> Result<(Pedagogy, i32, Uuid), ApiError> {
        let mut conn = self.conn()?;
        let row: Option<(serde_json::Value, i32, Uuid)> = match kind {
            NodeKind::Module => course_modules::table
                .filter(course_modules::id.eq(id))
                .select((
                    course_modules::pedagogy,
                    course_modules::version,
                    course_modules::course_id,
                ))
                .first(&mut conn)
                .optional()?,
            NodeKind::SubModule => course_sub_modules::table
                .filter(course_sub_modules::id.eq(id))
                .select((
                    course_sub_modules::pedagogy,
                    course_sub_modules::version,
                    course_sub_modules::course_id,
                ))
                .first(&mut conn)
                .optional()?,
            NodeKind::Topic => course_topics::table
                .filter(course_topics::id.eq(id))
                .select((
                    course_topics::pedagogy,
                    course_topics::version,
                    course_topics::course_id,
                ))
                .first(&mut conn)
                .optional()?,
            NodeKind::SubTopic => course_sub_topics::table
                .filter(course_sub_topics::id.eq(id))
                .select((
                    course_sub_topics::pedagogy,
                    course_sub_topics::version,
                    course_sub_topics::course_id,
                ))
                .first(&mut conn)
                .optional()?,
        };
        let (value, version, course_id) =
            row.ok_or_else(|| ApiError::missing(kind.level_name(), id))?;
        let pedagogy = if value.is_null() || value.as_object().map(|o| o.is_empty()).unwrap_or(false)
        {
            Pedagogy::default()
        } else {
            serde_json::from_value(value)?
        };
        Ok((pedagogy, version, course_id))
    }

    /// Check-and-set write of the whole pedagogy document. A concurrent
    /// writer bumps `version` first and this update matches zero rows, which
    /// surfaces as a Conflict instead of a silent lost update.
    pub fn save_pedagogy(
        &self,
        kind: NodeKind,
        id: Uuid,
        pedagogy: &Pedagogy,
        expected_version: i32,
        user: &CurrentUser,
    ) -> Result<(), ApiError> {
        let mut conn = self.conn()?;
        let value = serde_json::to_value(pedagogy)?;
        let now = Utc::now();
        let affected = match kind {
            NodeKind::Module => diesel::update(
                course_modules::table
                    .filter(course_modules::id.eq(id))
                    .filter(course_modules::version.eq(expected_version)),
            )
            .set((
                course_modules::pedagogy.eq(&value),
                course_modules::version.eq(expected_version + 1),
                course_modules::updated_by.eq(Some(user.id)),
                course_modules::updated_at.eq(now),
            ))
            .execute(&mut conn)?,
            NodeKind::SubModule => diesel::update(
                course_sub_modules::table
                    .filter(course_sub_modules::id.eq(id))
                    .filter(course_sub_modules::version.eq(expected_version)),
            )
            .set((
                course_sub_modules::pedagogy.eq(&value),
                course_sub_modules::version.eq(expected_version + 1),
                course_sub_modules::updated_by.eq(Some(user.id)),
                course_sub_modules::updated_at.eq(now),
            ))
            .execute(&mut conn)?,
            NodeKind::Topic => diesel::update(
                course_topics::table
                    .filter(course_topics::id.eq(id))
                    .filter(course_topics::version.eq(expected_version)),
            )
            .set((
                course_topics::pedagogy.eq(&value),
                course_topics::version.eq(expected_version + 1),
                course_topics::updated_by.eq(Some(user.id)),
                course_topics::updated_at.eq(now),
            ))
            .execute(&mut conn)?,
            NodeKind::SubTopic => diesel::update(
                course_sub_topics::table
                    .filter(course_sub_topics::id.eq(id))
                    .filter(course_sub_topics::version.eq(expected_version)),
            )
            .set((
                course_sub_topics::pedagogy.eq(&value),
                course_sub_topics::version.eq(expected_version + 1),
                course_sub_topics::updated_by.eq(Some(user.id)),
                course_sub_topics::updated_at.eq(now),
            ))
            .execute(&mut conn)?,
        };
        if affected == 0 {
            return Err(ApiError::Conflict(format!(
                "{} {} was modified concurrently",
                kind.level_name(),
                id
            )));
        }
        Ok(())
    }

    // ----- Snapshot -----

    /// Rebuild the denormalized hierarchy snapshot from the entity store and
    /// persist it on the course row.
    pub fn rebuild_snapshot(&self, course_id: Uuid) -> Result<HierarchySnapshot, ApiError> {
        let mut conn = self.conn()?;
        let course: Option<Course> = courses::table
            .filter(courses::id.eq(course_id))
            .first(&mut conn)
            .optional()?;
        let course = course.ok_or_else(|| ApiError::missing("course", course_id))?;

        let modules: Vec<ModuleNode> = course_modules::table
            .filter(course_modules::course_id.eq(course_id))
            .order(course_modules::position.asc())
            .load(&mut conn)?;
        let sub_modules: Vec<SubModuleNode> = course_sub_modules::table
            .filter(course_sub_modules::course_id.eq(course_id))
            .order(course_sub_modules::position.asc())
            .load(&mut conn)?;
        let topics: Vec<TopicNode> = course_topics::table
            .filter(course_topics::course_id.eq(course_id))
            .order(course_topics::position.asc())
            .load(&mut conn)?;
        let sub_topics: Vec<SubTopicNode> = course_sub_topics::table
            .filter(course_sub_topics::course_id.eq(course_id))
            .order(course_sub_topics::position.asc())
            .load(&mut conn)?;

        let snapshot = build_snapshot(&modules, &sub_modules, &topics, &sub_topics);
        diesel::update(courses::table.filter(courses::id.eq(course.id)))
            .set((
                courses::hierarchy.eq(serde_json::to_value(&snapshot)?),
                courses::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        Ok(snapshot)
    }

    pub fn load_snapshot(&self, course_id: Uuid) -> Result<HierarchySnapshot, ApiError> {
        let mut conn = self.conn()?;
        let course: Option<Course> = courses::table
            .filter(courses::id.eq(course_id))
            .first(&mut conn)
            .optional()?;
        let course = course.ok_or_else(|| ApiError::missing("course", course_id))?;
        if course.hierarchy.is_null() {
            return Ok(HierarchySnapshot::default());
        }
        Ok(serde_json::from_value(course.hierarchy)?)
    }

    pub fn save_snapshot(
        &self,
        course_id: Uuid,
        snapshot: &HierarchySnapshot,
    ) -> Result<(), ApiError> {
        let mut conn = self.conn()?;
        diesel::update(courses::table.filter(courses::id.eq(course_id)))
            .set((
                courses::hierarchy.eq(serde_json::to_value(snapshot)?),
                courses::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }
}

fn next_module_position(conn: &mut PgConnection, course_id: Uuid) -> Result<i32, ApiError> {
    let max: Option<i32> = course_modules::table
        .filter(course_modules::course_id.eq(course_id))
        .select(diesel::dsl::max(course_modules::position))
        .first(conn)?;
    Ok(max.unwrap_or(0) + 1)
}

/// Assemble the snapshot tree from flat per-level row sets. Topics with a
/// module FK land under the module directly; topics with a submodule FK land
/// under that submodule.
pub fn build_snapshot(
    modules: &[ModuleNode],
    sub_modules: &[SubModuleNode],
    topics: &[TopicNode],
    sub_topics: &[SubTopicNode],
) -> HierarchySnapshot {
    let topic_entry = |t: &TopicNode| SnapshotTopic {
        id: t.id,
        title: t.title.clone(),
        position: t.position,
        sub_topics: sub_topics
            .iter()
            .filter(|st| st.topic_id == t.id)
            .map(|st| SnapshotSubTopic {
                id: st.id,
                title: st.title.clone(),
                position: st.position,
            })
            .collect(),
    };

    HierarchySnapshot {
        modules: modules
            .iter()
            .map(|m| SnapshotModule {
                id: m.id,
                title: m.title.clone(),
                position: m.position,
                sub_modules: sub_modules
                    .iter()
                    .filter(|s| s.module_id == m.id)
                    .map(|s| SnapshotSubModule {
                        id: s.id,
                        title: s.title.clone(),
                        position: s.position,
                        topics: topics
                            .iter()
                            .filter(|t| t.sub_module_id == Some(s.id))
                            .map(topic_entry)
                            .collect(),
                    })
                    .collect(),
                topics: topics
                    .iter()
                    .filter(|t| t.module_id == Some(m.id))
                    .map(topic_entry)
                    .collect(),
            })
            .collect(),
    }
}

// ============================================================================
// HTTP HANDLERS
// ============================================================================

pub async fn create_node(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    user: CurrentUser,
    Json(req): Json<CreateNodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = HierarchyEngine::new(state.conn.clone());
    let node = engine.create_node(kind, req, &user).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": node })),
    ))
}

/// Parent ids passed as query parameters are validated on the way down; a
/// wrong hint is a not-found, never a silent fallthrough to the bare id.
pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
    Query(hints): Query<locator::ParentHints>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let node = locator::NodeLocator::new(state.conn.clone()).locate(kind, &hints, id)?;
    Ok(Json(serde_json::json!({ "success": true, "data": node })))
}

pub async fn list_nodes(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(filters): Query<NodeFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = HierarchyEngine::new(state.conn.clone());
    let nodes = engine.list_nodes(kind, filters).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": nodes })))
}

pub async fn update_node(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
    user: CurrentUser,
    Json(req): Json<UpdateNodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = HierarchyEngine::new(state.conn.clone());
    let node = engine.update_node(kind, id, req, &user).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": node })))
}

pub async fn rebuild_snapshot(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = HierarchyEngine::new(state.conn.clone());
    let snapshot = engine.rebuild_snapshot(course_id)?;
    Ok(Json(serde_json::json!({ "success": true, "data": snapshot })))
}

pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = HierarchyEngine::new(state.conn.clone());
    let snapshot = engine.load_snapshot(course_id)?;
    Ok(Json(serde_json::json!({ "success": true, "data": snapshot })))
}

pub fn configure_hierarchy_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/hierarchy/:kind", post(create_node).get(list_nodes))
        .route("/api/hierarchy/:kind/:id", get(get_node).put(update_node))
        .route(
            "/api/courses/:course_id/snapshot",
            get(get_snapshot),
        )
        .route(
            "/api/courses/:course_id/snapshot/rebuild",
            post(rebuild_snapshot),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(course: Uuid, position: i32, title: &str) -> ModuleNode {
        let now = Utc::now();
        ModuleNode {
            id: Uuid::new_v4(),
            course_id: course,
            title: title.to_string(),
            description: None,
            duration: None,
            level: None,
            position,
            pedagogy: serde_json::json!({}),
            version: 1,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_node_kind_route_parsing() {
        assert_eq!(NodeKind::from_route("modules").unwrap(), NodeKind::Module);
        assert_eq!(NodeKind::from_route("subtopics").unwrap(), NodeKind::SubTopic);
        assert!(NodeKind::from_route("lessons").is_err());
        assert_eq!(NodeKind::from_model("submodule"), Some(NodeKind::SubModule));
    }

    #[test]
    fn test_snapshot_groups_direct_and_nested_topics() {
        let course = Uuid::new_v4();
        let m = module(course, 1, "M");
        let now = Utc::now();
        let s = SubModuleNode {
            id: Uuid::new_v4(),
            course_id: course,
            module_id: m.id,
            title: "S".to_string(),
            description: None,
            duration: None,
            level: None,
            position: 1,
            pedagogy: serde_json::json!({}),
            version: 1,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        let direct_topic = TopicNode {
            id: Uuid::new_v4(),
            course_id: course,
            module_id: Some(m.id),
            sub_module_id: None,
            title: "T1".to_string(),
            description: None,
            duration: None,
            level: None,
            position: 1,
            pedagogy: serde_json::json!({}),
            version: 1,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        let nested_topic = TopicNode {
            id: Uuid::new_v4(),
            sub_module_id: Some(s.id),
            module_id: None,
            title: "T2".to_string(),
            ..direct_topic.clone()
        };
        let st = SubTopicNode {
            id: Uuid::new_v4(),
            course_id: course,
            topic_id: nested_topic.id,
            title: "ST".to_string(),
            description: None,
            duration: None,
            level: None,
            position: 1,
            pedagogy: serde_json::json!({}),
            version: 1,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };

        let snap = build_snapshot(&[m.clone()], &[s.clone()], &[direct_topic.clone(), nested_topic.clone()], &[st.clone()]);
        assert_eq!(snap.modules.len(), 1);
        let sm = &snap.modules[0];
        assert_eq!(sm.topics.len(), 1);
        assert_eq!(sm.topics[0].id, direct_topic.id);
        assert_eq!(sm.sub_modules.len(), 1);
        assert_eq!(sm.sub_modules[0].topics.len(), 1);
        assert_eq!(sm.sub_modules[0].topics[0].sub_topics[0].id, st.id);
    }
}
