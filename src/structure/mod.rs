//! Legacy aggregate course structure. One document per course embeds the
//! whole module → submodule → topic → subtopic tree (pedagogy included) and
//! is mutated through a single action-dispatch endpoint. This is the older
//! representation kept alongside the normalized entity store; the two are not
//! synchronized.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::pedagogy::types::Pedagogy;
use crate::shared::error::ApiError;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

diesel::table! {
    module_structures (id) {
        id -> Uuid,
        course_id -> Uuid,
        structure -> Jsonb,
        version -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable)]
#[diesel(table_name = module_structures)]
pub struct ModuleStructureRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub structure: serde_json::Value,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// EMBEDDED TREE
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructureDoc {
    #[serde(default)]
    pub modules: Vec<StructModule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructModule {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub level: Option<String>,
    pub index: i32,
    #[serde(default)]
    pub pedagogy: Pedagogy,
    #[serde(default)]
    pub sub_modules: Vec<StructSubModule>,
    #[serde(default)]
    pub topics: Vec<StructTopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructSubModule {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub level: Option<String>,
    pub index: i32,
    #[serde(default)]
    pub pedagogy: Pedagogy,
    #[serde(default)]
    pub topics: Vec<StructTopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructTopic {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub level: Option<String>,
    pub index: i32,
    #[serde(default)]
    pub pedagogy: Pedagogy,
    #[serde(default)]
    pub sub_topics: Vec<StructSubTopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructSubTopic {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub level: Option<String>,
    pub index: i32,
    #[serde(default)]
    pub pedagogy: Pedagogy,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<i32>,
    pub level: Option<String>,
}

impl NodePayload {
    fn required_title(&self) -> Result<String, ApiError> {
        match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => Ok(t.to_string()),
            _ => Err(ApiError::Validation("title is required".to_string())),
        }
    }
}

/// One mutation against the aggregate document. Parent ids double as hints:
/// when absent, the target is found by a full-tree scan.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StructureAction {
    AddModule {
        data: NodePayload,
    },
    UpdateModule {
        module_id: Uuid,
        data: NodePayload,
    },
    DeleteModule {
        module_id: Uuid,
    },
    AddSubModule {
        module_id: Uuid,
        data: NodePayload,
    },
    UpdateSubModule {
        #[serde(default)]
        module_id: Option<Uuid>,
        sub_module_id: Uuid,
        data: NodePayload,
    },
    DeleteSubModule {
        #[serde(default)]
        module_id: Option<Uuid>,
        sub_module_id: Uuid,
    },
    AddTopic {
        #[serde(default)]
        module_id: Option<Uuid>,
        #[serde(default)]
        sub_module_id: Option<Uuid>,
        data: NodePayload,
    },
    UpdateTopic {
        #[serde(default)]
        module_id: Option<Uuid>,
        #[serde(default)]
        sub_module_id: Option<Uuid>,
        topic_id: Uuid,
        data: NodePayload,
    },
    DeleteTopic {
        #[serde(default)]
        module_id: Option<Uuid>,
        #[serde(default)]
        sub_module_id: Option<Uuid>,
        topic_id: Uuid,
    },
    AddSubTopic {
        #[serde(default)]
        module_id: Option<Uuid>,
        #[serde(default)]
        sub_module_id: Option<Uuid>,
        topic_id: Uuid,
        data: NodePayload,
    },
    UpdateSubTopic {
        #[serde(default)]
        topic_id: Option<Uuid>,
        sub_topic_id: Uuid,
        data: NodePayload,
    },
    DeleteSubTopic {
        #[serde(default)]
        topic_id: Option<Uuid>,
        sub_topic_id: Uuid,
    },
}

// ============================================================================
// EMBEDDED-TREE LOCATOR
// ============================================================================

fn next_index<T>(siblings: &[T], index_of: impl Fn(&T) -> i32) -> i32 {
    siblings.iter().map(index_of).max().unwrap_or(0) + 1
}

fn find_module_mut(doc: &mut StructureDoc, id: Uuid) -> Result<&mut StructModule, ApiError> {
    doc.modules
        .iter_mut()
        .find(|m| m.id == id)
        .ok_or_else(|| ApiError::missing("module", id))
}

/// Submodule lookup; a module hint narrows the scan, otherwise every module
/// is searched.
fn find_sub_module_mut(
    doc: &mut StructureDoc,
    module_hint: Option<Uuid>,
    id: Uuid,
) -> Result<&mut StructSubModule, ApiError> {
    if let Some(m) = module_hint {
        let module = find_module_mut(doc, m)?;
        return module
            .sub_modules
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ApiError::missing("subModule", id));
    }
    for module in &mut doc.modules {
        if let Some(i) = module.sub_modules.iter().position(|s| s.id == id) {
            return Ok(&mut module.sub_modules[i]);
        }
    }
    Err(ApiError::missing("subModule", id))
}

/// Topic lookup. Within each candidate module the direct topics are checked
/// before any submodule topics; ids are globally unique so first match wins.
fn find_topic_mut(
    doc: &mut StructureDoc,
    module_hint: Option<Uuid>,
    sub_module_hint: Option<Uuid>,
    id: Uuid,
) -> Result<&mut StructTopic, ApiError> {
    if let Some(m) = module_hint {
        if !doc.modules.iter().any(|x| x.id == m) {
            return Err(ApiError::missing("module", m));
        }
    }
    for module in &mut doc.modules {
        if module_hint.map(|m| m != module.id).unwrap_or(false) {
            continue;
        }
        if let Some(i) = module.topics.iter().position(|t| t.id == id) {
            return Ok(&mut module.topics[i]);
        }
        for sub_module in &mut module.sub_modules {
            if sub_module_hint.map(|s| s != sub_module.id).unwrap_or(false) {
                continue;
            }
            if let Some(i) = sub_module.topics.iter().position(|t| t.id == id) {
                return Ok(&mut sub_module.topics[i]);
            }
        }
    }
    Err(ApiError::missing("topic", id))
}

fn find_sub_topic_mut(
    doc: &mut StructureDoc,
    topic_hint: Option<Uuid>,
    id: Uuid,
) -> Result<&mut StructSubTopic, ApiError> {
    for module in &mut doc.modules {
        for ti in 0..module.topics.len() {
            let topic = &mut module.topics[ti];
            if topic_hint.map(|t| t != topic.id).unwrap_or(false) {
                continue;
            }
            if let Some(i) = topic.sub_topics.iter().position(|st| st.id == id) {
                return Ok(&mut module.topics[ti].sub_topics[i]);
            }
        }
        for si in 0..module.sub_modules.len() {
            for ti in 0..module.sub_modules[si].topics.len() {
                let topic = &mut module.sub_modules[si].topics[ti];
                if topic_hint.map(|t| t != topic.id).unwrap_or(false) {
                    continue;
                }
                if let Some(i) = topic.sub_topics.iter().position(|st| st.id == id) {
                    return Ok(&mut module.sub_modules[si].topics[ti].sub_topics[i]);
                }
            }
        }
    }
    Err(ApiError::missing("subTopic", id))
}

fn apply_content(
    payload: &NodePayload,
    title: &mut String,
    description: &mut Option<String>,
    duration: &mut Option<i32>,
    level: &mut Option<String>,
) {
    if let Some(t) = &payload.title {
        if !t.trim().is_empty() {
            *title = t.trim().to_string();
        }
    }
    if payload.description.is_some() {
        *description = payload.description.clone();
    }
    if payload.duration.is_some() {
        *duration = payload.duration;
    }
    if payload.level.is_some() {
        *level = payload.level.clone();
    }
}

/// Apply one action to the document in place, returning the affected node
/// id. Removing a branch removes its embedded descendants with it.
pub fn apply_action(doc: &mut StructureDoc, action: &StructureAction) -> Result<Uuid, ApiError> {
    match action {
        StructureAction::AddModule { data } => {
            let module = StructModule {
                id: Uuid::new_v4(),
                title: data.required_title()?,
                description: data.description.clone(),
                duration: data.duration,
                level: data.level.clone(),
                index: next_index(&doc.modules, |m| m.index),
                pedagogy: Pedagogy::default(),
                sub_modules: Vec::new(),
                topics: Vec::new(),
            };
            let id = module.id;
            doc.modules.push(module);
            Ok(id)
        }
        StructureAction::UpdateModule { module_id, data } => {
            let module = find_module_mut(doc, *module_id)?;
            apply_content(
                data,
                &mut module.title,
                &mut module.description,
                &mut module.duration,
                &mut module.level,
            );
            Ok(*module_id)
        }
        StructureAction::DeleteModule { module_id } => {
            let before = doc.modules.len();
            doc.modules.retain(|m| m.id != *module_id);
            if doc.modules.len() == before {
                return Err(ApiError::missing("module", *module_id));
            }
            Ok(*module_id)
        }
        StructureAction::AddSubModule { module_id, data } => {
            let title = data.required_title()?;
            let module = find_module_mut(doc, *module_id)?;
            let sub_module = StructSubModule {
                id: Uuid::new_v4(),
                title,
                description: data.description.clone(),
                duration: data.duration,
                level: data.level.clone(),
                index: next_index(&module.sub_modules, |s| s.index),
                pedagogy: Pedagogy::default(),
                topics: Vec::new(),
            };
            let id = sub_module.id;
            module.sub_modules.push(sub_module);
            Ok(id)
        }
        StructureAction::UpdateSubModule {
            module_id,
            sub_module_id,
            data,
        } => {
            let sub_module = find_sub_module_mut(doc, *module_id, *sub_module_id)?;
            apply_content(
                data,
                &mut sub_module.title,
                &mut sub_module.description,
                &mut sub_module.duration,
                &mut sub_module.level,
            );
            Ok(*sub_module_id)
        }
        StructureAction::DeleteSubModule {
            module_id,
            sub_module_id,
        } => {
            for module in &mut doc.modules {
                if module_id.map(|m| m != module.id).unwrap_or(false) {
                    continue;
                }
                let before = module.sub_modules.len();
                module.sub_modules.retain(|s| s.id != *sub_module_id);
                if module.sub_modules.len() != before {
                    return Ok(*sub_module_id);
                }
            }
            Err(ApiError::missing("subModule", *sub_module_id))
        }
        StructureAction::AddTopic {
            module_id,
            sub_module_id,
            data,
        } => {
            let title = data.required_title()?;
            let siblings = match (module_id, sub_module_id) {
                (Some(m), None) => &mut find_module_mut(doc, *m)?.topics,
                (hint, Some(s)) => &mut find_sub_module_mut(doc, *hint, *s)?.topics,
                (None, None) => {
                    return Err(ApiError::Validation(
                        "a topic requires module_id or sub_module_id".to_string(),
                    ))
                }
            };
            let topic = StructTopic {
                id: Uuid::new_v4(),
                title,
                description: data.description.clone(),
                duration: data.duration,
                level: data.level.clone(),
                index: next_index(siblings, |t| t.index),
                pedagogy: Pedagogy::default(),
                sub_topics: Vec::new(),
            };
            let id = topic.id;
            siblings.push(topic);
            Ok(id)
        }
        StructureAction::UpdateTopic {
            module_id,
            sub_module_id,
            topic_id,
            data,
        } => {
            let topic = find_topic_mut(doc, *module_id, *sub_module_id, *topic_id)?;
            apply_content(
                data,
                &mut topic.title,
                &mut topic.description,
                &mut topic.duration,
                &mut topic.level,
            );
            Ok(*topic_id)
        }
        StructureAction::DeleteTopic {
            module_id,
            sub_module_id,
            topic_id,
        } => {
            for module in &mut doc.modules {
                if module_id.map(|m| m != module.id).unwrap_or(false) {
                    continue;
                }
                let before = module.topics.len();
                module.topics.retain(|t| t.id != *topic_id);
                if module.topics.len() != before {
                    return Ok(*topic_id);
                }
                for sub_module in &mut module.sub_modules {
                    if sub_module_id.map(|s| s != sub_module.id).unwrap_or(false) {
                        continue;
                    }
                    let before = sub_module.topics.len();
                    sub_module.topics.retain(|t| t.id != *topic_id);
                    if sub_module.topics.len() != before {
                        return Ok(*topic_id);
                    }
                }
            }
            Err(ApiError::missing("topic", *topic_id))
        }
        StructureAction::AddSubTopic {
            module_id,
            sub_module_id,
            topic_id,
            data,
        } => {
            let title = data.required_title()?;
            let topic = find_topic_mut(doc, *module_id, *sub_module_id, *topic_id)?;
            let sub_topic = StructSubTopic {
                id: Uuid::new_v4(),
                title,
                description: data.description.clone(),
                duration: data.duration,
                level: data.level.clone(),
                index: next_index(&topic.sub_topics, |st| st.index),
                pedagogy: Pedagogy::default(),
            };
            let id = sub_topic.id;
            topic.sub_topics.push(sub_topic);
            Ok(id)
        }
        StructureAction::UpdateSubTopic {
            topic_id,
            sub_topic_id,
            data,
        } => {
            let sub_topic = find_sub_topic_mut(doc, *topic_id, *sub_topic_id)?;
            apply_content(
                data,
                &mut sub_topic.title,
                &mut sub_topic.description,
                &mut sub_topic.duration,
                &mut sub_topic.level,
            );
            Ok(*sub_topic_id)
        }
        StructureAction::DeleteSubTopic {
            topic_id,
            sub_topic_id,
        } => {
            for module in &mut doc.modules {
                for topic in module
                    .topics
                    .iter_mut()
                    .chain(module.sub_modules.iter_mut().flat_map(|s| s.topics.iter_mut()))
                {
                    if topic_hint_mismatch(*topic_id, topic.id) {
                        continue;
                    }
                    let before = topic.sub_topics.len();
                    topic.sub_topics.retain(|st| st.id != *sub_topic_id);
                    if topic.sub_topics.len() != before {
                        return Ok(*sub_topic_id);
                    }
                }
            }
            Err(ApiError::missing("subTopic", *sub_topic_id))
        }
    }
}

fn topic_hint_mismatch(hint: Option<Uuid>, actual: Uuid) -> bool {
    hint.map(|t| t != actual).unwrap_or(false)
}

// ============================================================================
// STRUCTURE ENGINE
// ============================================================================

pub struct StructureEngine {
    db: DbPool,
}

impl StructureEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn get(&self, course_id: Uuid) -> Result<StructureDoc, ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;
        let row: Option<ModuleStructureRow> = module_structures::table
            .filter(module_structures::course_id.eq(course_id))
            .first(&mut conn)
            .optional()?;
        match row {
            Some(row) => Ok(serde_json::from_value(row.structure)?),
            None => Ok(StructureDoc::default()),
        }
    }

    /// Load, mutate, save with a version check-and-set. The first action
    /// against a course creates the document.
    pub async fn apply(
        &self,
        course_id: Uuid,
        action: StructureAction,
    ) -> Result<(Uuid, StructureDoc), ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;
        let row: Option<ModuleStructureRow> = module_structures::table
            .filter(module_structures::course_id.eq(course_id))
            .first(&mut conn)
            .optional()?;

        let (mut doc, existing) = match &row {
            Some(row) => (serde_json::from_value(row.structure.clone())?, Some(row)),
            None => (StructureDoc::default(), None),
        };
        let affected = apply_action(&mut doc, &action)?;
        let structure = serde_json::to_value(&doc)?;
        let now = Utc::now();

        match existing {
            Some(row) => {
                let updated = diesel::update(
                    module_structures::table
                        .filter(module_structures::id.eq(row.id))
                        .filter(module_structures::version.eq(row.version)),
                )
                .set((
                    module_structures::structure.eq(structure),
                    module_structures::version.eq(row.version + 1),
                    module_structures::updated_at.eq(now),
                ))
                .execute(&mut conn)?;
                if updated == 0 {
                    return Err(ApiError::Conflict(
                        "structure was modified concurrently".to_string(),
                    ));
                }
            }
            None => {
                let row = ModuleStructureRow {
                    id: Uuid::new_v4(),
                    course_id,
                    structure,
                    version: 1,
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(module_structures::table)
                    .values(&row)
                    .execute(&mut conn)?;
            }
        }
        Ok((affected, doc))
    }
}

// ============================================================================
// HTTP HANDLERS
// ============================================================================

pub async fn apply_structure_action(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Json(action): Json<StructureAction>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = StructureEngine::new(state.conn.clone());
    let (affected, doc) = engine.apply(course_id, action).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": { "affectedId": affected, "structure": doc }
    })))
}

pub async fn get_structure(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = StructureEngine::new(state.conn.clone());
    let doc = engine.get(course_id)?;
    Ok(Json(serde_json::json!({ "success": true, "data": doc })))
}

pub fn configure_structure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/structure/:course_id", get(get_structure))
        .route("/api/structure/:course_id/action", post(apply_structure_action))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(title: &str) -> NodePayload {
        NodePayload {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_scenario_submodule_delete_spares_direct_topics() {
        let mut doc = StructureDoc::default();
        let m = apply_action(&mut doc, &StructureAction::AddModule { data: payload("M") }).unwrap();
        assert_eq!(doc.modules[0].index, 1);

        let t1 = apply_action(
            &mut doc,
            &StructureAction::AddTopic {
                module_id: Some(m),
                sub_module_id: None,
                data: payload("T1"),
            },
        )
        .unwrap();
        assert_eq!(doc.modules[0].topics[0].index, 1);

        let s = apply_action(
            &mut doc,
            &StructureAction::AddSubModule { module_id: m, data: payload("S") },
        )
        .unwrap();
        assert_eq!(doc.modules[0].sub_modules[0].index, 1);

        let t2 = apply_action(
            &mut doc,
            &StructureAction::AddTopic {
                module_id: None,
                sub_module_id: Some(s),
                data: payload("T2"),
            },
        )
        .unwrap();
        apply_action(
            &mut doc,
            &StructureAction::AddSubTopic {
                module_id: None,
                sub_module_id: None,
                topic_id: t2,
                data: payload("ST"),
            },
        )
        .unwrap();

        apply_action(
            &mut doc,
            &StructureAction::DeleteSubModule { module_id: None, sub_module_id: s },
        )
        .unwrap();

        // The branch went with its embedded descendants; the direct topic is
        // untouched.
        assert!(doc.modules[0].sub_modules.is_empty());
        assert_eq!(doc.modules[0].topics.len(), 1);
        assert_eq!(doc.modules[0].topics[0].id, t1);
        assert!(find_topic_mut(&mut doc, None, None, t2).is_err());
    }

    #[test]
    fn test_sibling_indexes_increase_monotonically() {
        let mut doc = StructureDoc::default();
        for expected in 1..=3 {
            apply_action(&mut doc, &StructureAction::AddModule { data: payload("M") }).unwrap();
            assert_eq!(doc.modules[expected - 1].index, expected as i32);
        }
        // Deleting the middle module leaves a gap; the next add continues.
        let middle = doc.modules[1].id;
        apply_action(&mut doc, &StructureAction::DeleteModule { module_id: middle }).unwrap();
        apply_action(&mut doc, &StructureAction::AddModule { data: payload("M4") }).unwrap();
        assert_eq!(doc.modules.last().map(|m| m.index), Some(4));
    }

    #[test]
    fn test_unhinted_lookup_scans_full_tree() {
        let mut doc = StructureDoc::default();
        let m1 = apply_action(&mut doc, &StructureAction::AddModule { data: payload("M1") }).unwrap();
        let m2 = apply_action(&mut doc, &StructureAction::AddModule { data: payload("M2") }).unwrap();
        let s = apply_action(
            &mut doc,
            &StructureAction::AddSubModule { module_id: m2, data: payload("S") },
        )
        .unwrap();
        let t = apply_action(
            &mut doc,
            &StructureAction::AddTopic {
                module_id: None,
                sub_module_id: Some(s),
                data: payload("T"),
            },
        )
        .unwrap();

        // Found without any module hint.
        assert!(find_topic_mut(&mut doc, None, None, t).is_ok());
        // A wrong module hint must not resolve to the node.
        assert!(find_topic_mut(&mut doc, Some(m1), None, t).is_err());
    }

    #[test]
    fn test_update_merges_supplied_fields_only() {
        let mut doc = StructureDoc::default();
        let m = apply_action(
            &mut doc,
            &StructureAction::AddModule {
                data: NodePayload {
                    title: Some("M".to_string()),
                    description: Some("original".to_string()),
                    duration: Some(30),
                    level: None,
                },
            },
        )
        .unwrap();
        apply_action(
            &mut doc,
            &StructureAction::UpdateModule {
                module_id: m,
                data: NodePayload {
                    title: None,
                    description: Some("revised".to_string()),
                    duration: None,
                    level: None,
                },
            },
        )
        .unwrap();
        assert_eq!(doc.modules[0].title, "M");
        assert_eq!(doc.modules[0].description.as_deref(), Some("revised"));
        assert_eq!(doc.modules[0].duration, Some(30));
    }

    #[test]
    fn test_add_topic_requires_a_parent() {
        let mut doc = StructureDoc::default();
        let err = apply_action(
            &mut doc,
            &StructureAction::AddTopic {
                module_id: None,
                sub_module_id: None,
                data: payload("T"),
            },
        );
        assert!(matches!(err, Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_action_wire_shape() {
        let action: StructureAction = serde_json::from_value(serde_json::json!({
            "action": "addSubModule",
            "moduleId": Uuid::new_v4(),
            "data": { "title": "Week 1", "duration": 45 }
        }))
        .unwrap();
        assert!(matches!(action, StructureAction::AddSubModule { .. }));
    }
}
