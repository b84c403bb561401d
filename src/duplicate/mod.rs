//! Module duplication. Clones a source course's modules (optionally a chosen
//! subset) into a target course down to a requested depth, remapping parent
//! foreign keys through a fresh-id map and copying pedagogy documents by
//! value. Side-index views are not cloned.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::hierarchy::{
    course_modules, course_sub_modules, course_sub_topics, course_topics, courses,
    HierarchyEngine, ModuleNode, SubModuleNode, SubTopicNode, TopicNode,
};
use crate::shared::error::ApiError;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

#[derive(Debug, Deserialize)]
pub struct DuplicateRequest {
    pub source_course_id: Uuid,
    pub target_course_id: Uuid,
    /// Depth-ordered level names, e.g. ["module", "submodule", "topic"].
    pub levels: Vec<String>,
    /// Restrict the clone to these source modules. Absent means all.
    pub selected_modules: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
    pub modules: usize,
    pub sub_modules: usize,
    pub topics: usize,
    pub sub_topics: usize,
}

const LEVEL_ORDER: [&str; 4] = ["module", "submodule", "topic", "subtopic"];

/// The level set must be a non-empty prefix of module → submodule → topic →
/// subtopic; a child level cloned without its ancestors would dangle.
pub fn clone_depth(levels: &[String]) -> Result<usize, ApiError> {
    if levels.is_empty() {
        return Err(ApiError::Validation("levels is required".to_string()));
    }
    if levels.len() > LEVEL_ORDER.len() {
        return Err(ApiError::Validation("too many levels".to_string()));
    }
    for (i, level) in levels.iter().enumerate() {
        if level != LEVEL_ORDER[i] {
            return Err(ApiError::Validation(format!(
                "levels must be a prefix of {:?}, got '{}' at position {}",
                LEVEL_ORDER, level, i
            )));
        }
    }
    Ok(levels.len())
}

/// Cloned rows for every level plus the old→new id map that remapped the
/// parent keys.
#[derive(Debug, Default)]
pub struct ClonedTree {
    pub modules: Vec<ModuleNode>,
    pub sub_modules: Vec<SubModuleNode>,
    pub topics: Vec<TopicNode>,
    pub sub_topics: Vec<SubTopicNode>,
    pub id_map: HashMap<Uuid, Uuid>,
}

/// Build the clone rows in memory. `start_position` continues the target
/// course's module ordering; child positions are copied as-is since they are
/// relative to their (also cloned) parent.
pub fn clone_tree(
    source_modules: &[ModuleNode],
    source_sub_modules: &[SubModuleNode],
    source_topics: &[TopicNode],
    source_sub_topics: &[SubTopicNode],
    target_course_id: Uuid,
    start_position: i32,
    depth: usize,
    user_id: Uuid,
) -> ClonedTree {
    let now = Utc::now();
    let mut tree = ClonedTree::default();

    let mut modules: Vec<ModuleNode> = source_modules.to_vec();
    modules.sort_by_key(|m| m.position);
    for (offset, source) in modules.into_iter().enumerate() {
        let new_id = Uuid::new_v4();
        tree.id_map.insert(source.id, new_id);
        tree.modules.push(ModuleNode {
            id: new_id,
            course_id: target_course_id,
            position: start_position + offset as i32,
            version: 1,
            created_by: Some(user_id),
            updated_by: Some(user_id),
            created_at: now,
            updated_at: now,
            ..source
        });
    }
    if depth >= 2 {
        for source in source_sub_modules {
            let Some(&new_module_id) = tree.id_map.get(&source.module_id) else {
                continue;
            };
            let new_id = Uuid::new_v4();
            tree.id_map.insert(source.id, new_id);
            tree.sub_modules.push(SubModuleNode {
                id: new_id,
                course_id: target_course_id,
                module_id: new_module_id,
                version: 1,
                created_by: Some(user_id),
                updated_by: Some(user_id),
                created_at: now,
                updated_at: now,
                ..source.clone()
            });
        }
    }
    if depth >= 3 {
        for source in source_topics {
            let module_id = source.module_id.and_then(|m| tree.id_map.get(&m).copied());
            let sub_module_id = source
                .sub_module_id
                .and_then(|s| tree.id_map.get(&s).copied());
            if module_id.is_none() && sub_module_id.is_none() {
                continue;
            }
            let new_id = Uuid::new_v4();
            tree.id_map.insert(source.id, new_id);
            tree.topics.push(TopicNode {
                id: new_id,
                course_id: target_course_id,
                module_id,
                sub_module_id,
                version: 1,
                created_by: Some(user_id),
                updated_by: Some(user_id),
                created_at: now,
                updated_at: now,
                ..source.clone()
            });
        }
    }
    if depth >= 4 {
        for source in source_sub_topics {
            let Some(&new_topic_id) = tree.id_map.get(&source.topic_id) else {
                continue;
            };
            let new_id = Uuid::new_v4();
            tree.id_map.insert(source.id, new_id);
            tree.sub_topics.push(SubTopicNode {
                id: new_id,
                course_id: target_course_id,
                topic_id: new_topic_id,
                version: 1,
                created_by: Some(user_id),
                updated_by: Some(user_id),
                created_at: now,
                updated_at: now,
                ..source.clone()
            });
        }
    }
    tree
}

// ============================================================================
// DUPLICATION ENGINE
// ============================================================================

pub struct DuplicateEngine {
    db: DbPool,
}

impl DuplicateEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn duplicate(
        &self,
        req: DuplicateRequest,
        user: &CurrentUser,
    ) -> Result<DuplicateReport, ApiError> {
        let depth = clone_depth(&req.levels)?;
        let mut conn = self.db.get().map_err(ApiError::from)?;

        for course_id in [req.source_course_id, req.target_course_id] {
            let exists: Option<Uuid> = courses::table
                .filter(courses::id.eq(course_id))
                .select(courses::id)
                .first(&mut conn)
                .optional()?;
            exists.ok_or_else(|| ApiError::missing("course", course_id))?;
        }

        let mut source_modules: Vec<ModuleNode> = course_modules::table
            .filter(course_modules::course_id.eq(req.source_course_id))
            .load(&mut conn)?;
        if let Some(selected) = &req.selected_modules {
            source_modules.retain(|m| selected.contains(&m.id));
            if source_modules.len() != selected.len() {
                return Err(ApiError::Validation(
                    "selected_modules contains ids outside the source course".to_string(),
                ));
            }
        }
        let source_sub_modules: Vec<SubModuleNode> = course_sub_modules::table
            .filter(course_sub_modules::course_id.eq(req.source_course_id))
            .load(&mut conn)?;
        let source_topics: Vec<TopicNode> = course_topics::table
            .filter(course_topics::course_id.eq(req.source_course_id))
            .load(&mut conn)?;
        let source_sub_topics: Vec<SubTopicNode> = course_sub_topics::table
            .filter(course_sub_topics::course_id.eq(req.source_course_id))
            .load(&mut conn)?;

        let max_position: Option<i32> = course_modules::table
            .filter(course_modules::course_id.eq(req.target_course_id))
            .select(diesel::dsl::max(course_modules::position))
            .first(&mut conn)?;

        let tree = clone_tree(
            &source_modules,
            &source_sub_modules,
            &source_topics,
            &source_sub_topics,
            req.target_course_id,
            max_position.unwrap_or(0) + 1,
            depth,
            user.id,
        );

        // Row-at-a-time inserts without a wrapping transaction; rows committed
        // before a failure stay committed.
        for row in &tree.modules {
            diesel::insert_into(course_modules::table)
                .values(row)
                .execute(&mut conn)?;
        }
        for row in &tree.sub_modules {
            diesel::insert_into(course_sub_modules::table)
                .values(row)
                .execute(&mut conn)?;
        }
        for row in &tree.topics {
            diesel::insert_into(course_topics::table)
                .values(row)
                .execute(&mut conn)?;
        }
        for row in &tree.sub_topics {
            diesel::insert_into(course_sub_topics::table)
                .values(row)
                .execute(&mut conn)?;
        }
        drop(conn);

        let hierarchy = HierarchyEngine::new(self.db.clone());
        if let Err(e) = hierarchy.rebuild_snapshot(req.target_course_id) {
            tracing::warn!(
                "snapshot rebuild failed for {} after duplication: {}",
                req.target_course_id,
                e
            );
        }

        Ok(DuplicateReport {
            modules: tree.modules.len(),
            sub_modules: tree.sub_modules.len(),
            topics: tree.topics.len(),
            sub_topics: tree.sub_topics.len(),
        })
    }
}

// ============================================================================
// HTTP HANDLERS
// ============================================================================

pub async fn duplicate_modules(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<DuplicateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = DuplicateEngine::new(state.conn.clone());
    let report = engine.duplicate(req, &user).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": report })))
}

pub fn configure_duplicate_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/duplicate", post(duplicate_modules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn module(course: Uuid, position: i32) -> ModuleNode {
        let now = Utc::now();
        ModuleNode {
            id: Uuid::new_v4(),
            course_id: course,
            title: format!("Module {}", position),
            description: None,
            duration: None,
            level: None,
            position,
            pedagogy: serde_json::json!({"I_Do": {}}),
            version: 7,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sub_module(course: Uuid, module_id: Uuid) -> SubModuleNode {
        let now = Utc::now();
        SubModuleNode {
            id: Uuid::new_v4(),
            course_id: course,
            module_id,
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
        }
    }

    fn topic(course: Uuid, module_id: Option<Uuid>, sub_module_id: Option<Uuid>) -> TopicNode {
        let now = Utc::now();
        TopicNode {
            id: Uuid::new_v4(),
            course_id: course,
            module_id,
            sub_module_id,
            title: "T".to_string(),
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
        }
    }

    #[test]
    fn test_clone_depth_prefix_rule() {
        let levels = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(clone_depth(&levels(&["module"])).unwrap(), 1);
        assert_eq!(
            clone_depth(&levels(&["module", "submodule", "topic", "subtopic"])).unwrap(),
            4
        );
        assert!(clone_depth(&levels(&[])).is_err());
        assert!(clone_depth(&levels(&["submodule"])).is_err());
        assert!(clone_depth(&levels(&["module", "topic"])).is_err());
    }

    #[test]
    fn test_clone_remaps_parents_and_continues_positions() {
        let source = Uuid::new_v4();
        let target = Uuid::new_v4();
        let user = Uuid::new_v4();
        let m1 = module(source, 1);
        let m2 = module(source, 2);
        let s = sub_module(source, m1.id);
        let direct = topic(source, Some(m2.id), None);
        let nested = topic(source, None, Some(s.id));

        let tree = clone_tree(
            &[m1.clone(), m2.clone()],
            &[s.clone()],
            &[direct.clone(), nested.clone()],
            &[],
            target,
            // Target already holds four modules.
            5,
            4,
            user,
        );

        assert_eq!(tree.modules.len(), 2);
        assert_eq!(tree.modules[0].position, 5);
        assert_eq!(tree.modules[1].position, 6);
        assert!(tree.modules.iter().all(|m| m.course_id == target));
        // Every cloned row got a fresh id.
        assert!(tree.modules.iter().all(|m| m.id != m1.id && m.id != m2.id));

        let cloned_s = &tree.sub_modules[0];
        assert_eq!(cloned_s.module_id, tree.id_map[&m1.id]);

        let cloned_direct = tree.topics.iter().find(|t| t.module_id.is_some()).unwrap();
        assert_eq!(cloned_direct.module_id, Some(tree.id_map[&m2.id]));
        let cloned_nested = tree
            .topics
            .iter()
            .find(|t| t.sub_module_id.is_some())
            .unwrap();
        assert_eq!(cloned_nested.sub_module_id, Some(tree.id_map[&s.id]));
    }

    #[test]
    fn test_clone_depth_limits_levels() {
        let source = Uuid::new_v4();
        let m = module(source, 1);
        let s = sub_module(source, m.id);
        let t = topic(source, None, Some(s.id));
        let tree = clone_tree(
            &[m],
            &[s],
            &[t],
            &[],
            Uuid::new_v4(),
            1,
            2,
            Uuid::new_v4(),
        );
        assert_eq!(tree.modules.len(), 1);
        assert_eq!(tree.sub_modules.len(), 1);
        assert!(tree.topics.is_empty());
    }

    #[test]
    fn test_clone_copies_pedagogy_and_resets_version() {
        let source = Uuid::new_v4();
        let m = module(source, 1);
        let tree = clone_tree(&[m.clone()], &[], &[], &[], Uuid::new_v4(), 1, 1, Uuid::new_v4());
        assert_eq!(tree.modules[0].pedagogy, m.pedagogy);
        assert_eq!(tree.modules[0].version, 1);
    }

    #[test]
    fn test_selected_subset_skips_orphaned_children() {
        let source = Uuid::new_v4();
        let kept = module(source, 1);
        let skipped = module(source, 2);
        let s = sub_module(source, skipped.id);
        // Only `kept` is passed in; the submodule of `skipped` has no cloned
        // parent and is dropped.
        let tree = clone_tree(
            &[kept],
            &[s],
            &[],
            &[],
            Uuid::new_v4(),
            1,
            4,
            Uuid::new_v4(),
        );
        assert_eq!(tree.modules.len(), 1);
        assert!(tree.sub_modules.is_empty());
    }
}
