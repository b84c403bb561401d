//! Cascade deletion and reference cleanup. Deleting a hierarchy node removes
//! every descendant entity (leaves first), scrubs the deleted ids out of both
//! side-index views, and prunes the course's hierarchy snapshot. The whole
//! sequence is best-effort: committed deletions stay committed even when a
//! later cleanup step fails.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::delete,
    Json, Router,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::hierarchy::{
    course_modules, course_sub_modules, course_sub_topics, course_topics, HierarchyEngine,
    HierarchySnapshot, NodeKind,
};
use crate::shared::error::ApiError;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;
use crate::views::{ViewEngine, ViewType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub entities_removed: usize,
    pub view_items_removed: usize,
    pub views_removed: usize,
}

/// Everything a single cascade will delete, grouped per level, deepest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadePlan {
    pub sub_topics: Vec<Uuid>,
    pub topics: Vec<Uuid>,
    pub sub_modules: Vec<Uuid>,
    pub modules: Vec<Uuid>,
}

impl CascadePlan {
    pub fn total(&self) -> usize {
        self.sub_topics.len() + self.topics.len() + self.sub_modules.len() + self.modules.len()
    }

    /// Deleted ids tagged with their level, leaves first.
    pub fn tagged(&self) -> Vec<(NodeKind, Uuid)> {
        let mut out = Vec::with_capacity(self.total());
        out.extend(self.sub_topics.iter().map(|id| (NodeKind::SubTopic, *id)));
        out.extend(self.topics.iter().map(|id| (NodeKind::Topic, *id)));
        out.extend(self.sub_modules.iter().map(|id| (NodeKind::SubModule, *id)));
        out.extend(self.modules.iter().map(|id| (NodeKind::Module, *id)));
        out
    }
}

/// Compute the cascade for one root node over the course's flat edge sets:
/// `sub_modules` as (id, module_id), `topics` as (id, module_id,
/// sub_module_id), `sub_topics` as (id, topic_id).
pub fn plan_cascade(
    kind: NodeKind,
    root: Uuid,
    sub_modules: &[(Uuid, Uuid)],
    topics: &[(Uuid, Option<Uuid>, Option<Uuid>)],
    sub_topics: &[(Uuid, Uuid)],
) -> CascadePlan {
    let mut plan = CascadePlan::default();
    match kind {
        NodeKind::Module => {
            plan.modules.push(root);
            plan.sub_modules.extend(
                sub_modules
                    .iter()
                    .filter(|(_, m)| *m == root)
                    .map(|(id, _)| *id),
            );
            let owned_subs: HashSet<Uuid> = plan.sub_modules.iter().copied().collect();
            plan.topics.extend(topics.iter().filter_map(|(id, m, s)| {
                let direct = *m == Some(root);
                let nested = s.map(|s| owned_subs.contains(&s)).unwrap_or(false);
                (direct || nested).then_some(*id)
            }));
        }
        NodeKind::SubModule => {
            plan.sub_modules.push(root);
            plan.topics.extend(
                topics
                    .iter()
                    .filter(|(_, _, s)| *s == Some(root))
                    .map(|(id, _, _)| *id),
            );
        }
        NodeKind::Topic => {
            plan.topics.push(root);
        }
        NodeKind::SubTopic => {
            plan.sub_topics.push(root);
        }
    }
    let owned_topics: HashSet<Uuid> = plan.topics.iter().copied().collect();
    let new_sub_topics: Vec<Uuid> = sub_topics
        .iter()
        .filter(|(id, t)| owned_topics.contains(t) && !plan.sub_topics.contains(id))
        .map(|(id, _)| *id)
        .collect();
    plan.sub_topics.extend(new_sub_topics);
    plan
}

/// Filter deleted ids out of the snapshot at their matching depth, then
/// prune upward: a submodule left with zero topics goes, a module left with
/// zero submodules and zero direct topics goes.
pub fn prune_snapshot(snapshot: &mut HierarchySnapshot, deleted: &[(NodeKind, Uuid)]) {
    let ids_of = |kind: NodeKind| -> HashSet<Uuid> {
        deleted
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .collect()
    };
    let dead_modules = ids_of(NodeKind::Module);
    let dead_sub_modules = ids_of(NodeKind::SubModule);
    let dead_topics = ids_of(NodeKind::Topic);
    let dead_sub_topics = ids_of(NodeKind::SubTopic);

    snapshot.modules.retain(|m| !dead_modules.contains(&m.id));
    for module in &mut snapshot.modules {
        module
            .sub_modules
            .retain(|s| !dead_sub_modules.contains(&s.id));
        module.topics.retain(|t| !dead_topics.contains(&t.id));
        for topic in &mut module.topics {
            topic.sub_topics.retain(|st| !dead_sub_topics.contains(&st.id));
        }
        for sub_module in &mut module.sub_modules {
            sub_module.topics.retain(|t| !dead_topics.contains(&t.id));
            for topic in &mut sub_module.topics {
                topic.sub_topics.retain(|st| !dead_sub_topics.contains(&st.id));
            }
        }
        module.sub_modules.retain(|s| !s.topics.is_empty());
    }
    snapshot
        .modules
        .retain(|m| !m.sub_modules.is_empty() || !m.topics.is_empty());
}

// ============================================================================
// CASCADE ENGINE
// ============================================================================

pub struct CascadeEngine {
    db: DbPool,
}

impl CascadeEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Delete a batch of same-level nodes with full cascade and cleanup.
    /// A failing primary delete aborts the remainder of the batch; cleanup
    /// failures are logged and swallowed.
    pub async fn delete_entities(
        &self,
        kind: NodeKind,
        ids: &[Uuid],
    ) -> Result<DeleteReport, ApiError> {
        let mut report = DeleteReport::default();
        let mut courses: HashSet<Uuid> = HashSet::new();
        let mut all_deleted: Vec<(Uuid, Vec<(NodeKind, Uuid)>)> = Vec::new();

        for &id in ids {
            let course_id = self.entity_course(kind, id)?;
            let plan = self.load_plan(kind, id, course_id)?;
            self.execute_plan(&plan)?;
            report.entities_removed += plan.total();

            let tagged = plan.tagged();
            let views = ViewEngine::new(self.db.clone());
            for (deleted_kind, deleted_id) in &tagged {
                for view_type in [ViewType::Pedagogy, ViewType::Level] {
                    match views.scrub_entity(view_type, course_id, *deleted_kind, *deleted_id) {
                        Ok((items, docs)) => {
                            report.view_items_removed += items;
                            report.views_removed += docs;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "view cleanup failed for {} {}: {}",
                                deleted_kind.level_name(),
                                deleted_id,
                                e
                            );
                        }
                    }
                }
            }
            courses.insert(course_id);
            all_deleted.push((course_id, tagged));
        }

        // Snapshot maintenance once per touched course, after the batch.
        let hierarchy = HierarchyEngine::new(self.db.clone());
        for course_id in courses {
            let deleted: Vec<(NodeKind, Uuid)> = all_deleted
                .iter()
                .filter(|(c, _)| *c == course_id)
                .flat_map(|(_, tagged)| tagged.iter().copied())
                .collect();
            match hierarchy.load_snapshot(course_id) {
                Ok(mut snapshot) => {
                    prune_snapshot(&mut snapshot, &deleted);
                    if let Err(e) = hierarchy.save_snapshot(course_id, &snapshot) {
                        tracing::warn!("snapshot prune save failed for {}: {}", course_id, e);
                    }
                }
                Err(e) => tracing::warn!("snapshot load failed for {}: {}", course_id, e),
            }
            // The snapshot is a cache; resync it from the entity store.
            if let Err(e) = hierarchy.rebuild_snapshot(course_id) {
                tracing::warn!("snapshot rebuild failed for {}: {}", course_id, e);
            }
        }
        Ok(report)
    }

    fn entity_course(&self, kind: NodeKind, id: Uuid) -> Result<Uuid, ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;
        let course: Option<Uuid> = match kind {
            NodeKind::Module => course_modules::table
                .filter(course_modules::id.eq(id))
                .select(course_modules::course_id)
                .first(&mut conn)
                .optional()?,
            NodeKind::SubModule => course_sub_modules::table
                .filter(course_sub_modules::id.eq(id))
                .select(course_sub_modules::course_id)
                .first(&mut conn)
                .optional()?,
            NodeKind::Topic => course_topics::table
                .filter(course_topics::id.eq(id))
                .select(course_topics::course_id)
                .first(&mut conn)
                .optional()?,
            NodeKind::SubTopic => course_sub_topics::table
                .filter(course_sub_topics::id.eq(id))
                .select(course_sub_topics::course_id)
                .first(&mut conn)
                .optional()?,
        };
        course.ok_or_else(|| ApiError::missing(kind.level_name(), id))
    }

    fn load_plan(&self, kind: NodeKind, id: Uuid, course_id: Uuid) -> Result<CascadePlan, ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;
        let sub_modules: Vec<(Uuid, Uuid)> = course_sub_modules::table
            .filter(course_sub_modules::course_id.eq(course_id))
            .select((course_sub_modules::id, course_sub_modules::module_id))
            .load(&mut conn)?;
        let topics: Vec<(Uuid, Option<Uuid>, Option<Uuid>)> = course_topics::table
            .filter(course_topics::course_id.eq(course_id))
            .select((
                course_topics::id,
                course_topics::module_id,
                course_topics::sub_module_id,
            ))
            .load(&mut conn)?;
        let sub_topics: Vec<(Uuid, Uuid)> = course_sub_topics::table
            .filter(course_sub_topics::course_id.eq(course_id))
            .select((course_sub_topics::id, course_sub_topics::topic_id))
            .load(&mut conn)?;
        Ok(plan_cascade(kind, id, &sub_modules, &topics, &sub_topics))
    }

    /// Bulk delete-by-filter per level, deepest first, so no round-trip per
    /// node is paid on deep cascades.
    fn execute_plan(&self, plan: &CascadePlan) -> Result<(), ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;
        if !plan.sub_topics.is_empty() {
            diesel::delete(
                course_sub_topics::table.filter(course_sub_topics::id.eq_any(&plan.sub_topics)),
            )
            .execute(&mut conn)?;
        }
        if !plan.topics.is_empty() {
            diesel::delete(course_topics::table.filter(course_topics::id.eq_any(&plan.topics)))
                .execute(&mut conn)?;
        }
        if !plan.sub_modules.is_empty() {
            diesel::delete(
                course_sub_modules::table.filter(course_sub_modules::id.eq_any(&plan.sub_modules)),
            )
            .execute(&mut conn)?;
        }
        if !plan.modules.is_empty() {
            diesel::delete(course_modules::table.filter(course_modules::id.eq_any(&plan.modules)))
                .execute(&mut conn)?;
        }
        Ok(())
    }
}

// ============================================================================
// HTTP HANDLERS
// ============================================================================

/// `model` also accepts the two view names, which delete whole view
/// documents instead of cascading entities.
pub async fn delete_by_model(
    State(state): State<Arc<AppState>>,
    Path((model, ids)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let ids = parse_ids(&ids)?;
    if let Some(kind) = NodeKind::from_model(&model) {
        let engine = CascadeEngine::new(state.conn.clone());
        let report = engine.delete_entities(kind, &ids).await?;
        return Ok(Json(serde_json::json!({ "success": true, "data": report })));
    }
    if let Ok(view_type) = ViewType::from_route(&model) {
        let views = ViewEngine::new(state.conn.clone());
        for id in &ids {
            views.delete_view(view_type, *id)?;
        }
        return Ok(Json(serde_json::json!({
            "success": true,
            "data": DeleteReport { views_removed: ids.len(), ..Default::default() }
        })));
    }
    Err(ApiError::Validation(format!("unknown model '{}'", model)))
}

fn parse_ids(raw: &str) -> Result<Vec<Uuid>, ApiError> {
    let ids: Result<Vec<Uuid>, _> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Uuid::parse_str)
        .collect();
    let ids = ids.map_err(|_| ApiError::Validation("malformed id list".to_string()))?;
    if ids.is_empty() {
        return Err(ApiError::Validation("no ids supplied".to_string()));
    }
    Ok(ids)
}

pub fn configure_cascade_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/cascade/delete/:model/:ids", delete(delete_by_model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{SnapshotModule, SnapshotSubModule, SnapshotSubTopic, SnapshotTopic};

    /// N submodules × M topics × K subtopics under one module, plus the
    /// module itself.
    fn build_edges(
        module: Uuid,
        n: usize,
        m: usize,
        k: usize,
    ) -> (
        Vec<(Uuid, Uuid)>,
        Vec<(Uuid, Option<Uuid>, Option<Uuid>)>,
        Vec<(Uuid, Uuid)>,
    ) {
        let mut sub_modules = Vec::new();
        let mut topics = Vec::new();
        let mut sub_topics = Vec::new();
        for _ in 0..n {
            let s = Uuid::new_v4();
            sub_modules.push((s, module));
            for _ in 0..m {
                let t = Uuid::new_v4();
                topics.push((t, None, Some(s)));
                for _ in 0..k {
                    sub_topics.push((Uuid::new_v4(), t));
                }
            }
        }
        (sub_modules, topics, sub_topics)
    }

    #[test]
    fn test_cascade_count_is_exhaustive() {
        let module = Uuid::new_v4();
        let (n, m, k) = (3, 4, 2);
        let (sub_modules, topics, sub_topics) = build_edges(module, n, m, k);
        let plan = plan_cascade(NodeKind::Module, module, &sub_modules, &topics, &sub_topics);
        assert_eq!(plan.total(), 1 + n + n * m + n * m * k);
        // Leaves come first in the tagged ordering.
        let tagged = plan.tagged();
        assert_eq!(tagged.first().map(|(kind, _)| *kind), Some(NodeKind::SubTopic));
        assert_eq!(tagged.last().map(|(kind, _)| *kind), Some(NodeKind::Module));
    }

    #[test]
    fn test_submodule_cascade_leaves_direct_topics_alone() {
        let module = Uuid::new_v4();
        let s = Uuid::new_v4();
        let direct_topic = Uuid::new_v4();
        let nested_topic = Uuid::new_v4();
        let sub_modules = vec![(s, module)];
        let topics = vec![
            (direct_topic, Some(module), None),
            (nested_topic, None, Some(s)),
        ];
        let nested_sub_topic = Uuid::new_v4();
        let sub_topics = vec![(nested_sub_topic, nested_topic)];

        let plan = plan_cascade(NodeKind::SubModule, s, &sub_modules, &topics, &sub_topics);
        assert_eq!(plan.sub_modules, vec![s]);
        assert_eq!(plan.topics, vec![nested_topic]);
        assert_eq!(plan.sub_topics, vec![nested_sub_topic]);
        assert!(plan.modules.is_empty());
        assert!(!plan.topics.contains(&direct_topic));
    }

    #[test]
    fn test_module_cascade_includes_both_topic_attachments() {
        let module = Uuid::new_v4();
        let s = Uuid::new_v4();
        let direct = Uuid::new_v4();
        let nested = Uuid::new_v4();
        let plan = plan_cascade(
            NodeKind::Module,
            module,
            &[(s, module)],
            &[(direct, Some(module), None), (nested, None, Some(s))],
            &[],
        );
        assert_eq!(plan.topics.len(), 2);
    }

    fn topic_snap(id: Uuid, subs: Vec<Uuid>) -> SnapshotTopic {
        SnapshotTopic {
            id,
            title: "t".to_string(),
            position: 1,
            sub_topics: subs
                .into_iter()
                .map(|id| SnapshotSubTopic { id, title: "st".to_string(), position: 1 })
                .collect(),
        }
    }

    #[test]
    fn test_prune_removes_emptied_branches() {
        let module = Uuid::new_v4();
        let s = Uuid::new_v4();
        let nested_topic = Uuid::new_v4();
        let mut snapshot = HierarchySnapshot {
            modules: vec![SnapshotModule {
                id: module,
                title: "m".to_string(),
                position: 1,
                sub_modules: vec![SnapshotSubModule {
                    id: s,
                    title: "s".to_string(),
                    position: 1,
                    topics: vec![topic_snap(nested_topic, vec![])],
                }],
                topics: vec![],
            }],
        };
        // Deleting the only nested topic empties the submodule, which empties
        // the module.
        prune_snapshot(&mut snapshot, &[(NodeKind::Topic, nested_topic)]);
        assert!(snapshot.modules.is_empty());
    }

    #[test]
    fn test_prune_keeps_module_with_direct_topics() {
        let module = Uuid::new_v4();
        let s = Uuid::new_v4();
        let nested_topic = Uuid::new_v4();
        let direct_topic = Uuid::new_v4();
        let mut snapshot = HierarchySnapshot {
            modules: vec![SnapshotModule {
                id: module,
                title: "m".to_string(),
                position: 1,
                sub_modules: vec![SnapshotSubModule {
                    id: s,
                    title: "s".to_string(),
                    position: 1,
                    topics: vec![topic_snap(nested_topic, vec![])],
                }],
                topics: vec![topic_snap(direct_topic, vec![])],
            }],
        };
        prune_snapshot(
            &mut snapshot,
            &[(NodeKind::SubModule, s), (NodeKind::Topic, nested_topic)],
        );
        assert_eq!(snapshot.modules.len(), 1);
        assert!(snapshot.modules[0].sub_modules.is_empty());
        assert_eq!(snapshot.modules[0].topics[0].id, direct_topic);
    }

    #[test]
    fn test_parse_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let parsed = parse_ids(&format!("{}, {}", a, b)).unwrap();
        assert_eq!(parsed, vec![a, b]);
        assert!(parse_ids("not-a-uuid").is_err());
        assert!(parse_ids("").is_err());
    }
}
