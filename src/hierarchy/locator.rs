//! Level-by-level node resolution. There is no canonical global index: a
//! lookup walks down from whichever parent hints the caller supplied,
//! verifying each edge, and a missing intermediate parent fails with the
//! specific level named. A wrong parent hint never resolves to a different
//! node that happens to share the id.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    course_modules, course_sub_modules, course_sub_topics, course_topics, ModuleNode, NodeKind,
    SubModuleNode, SubTopicNode, TopicNode,
};
use crate::pedagogy::types::{Exercise, Pedagogy, Section};
use crate::shared::error::ApiError;
use crate::shared::utils::DbPool;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParentHints {
    pub module_id: Option<Uuid>,
    pub sub_module_id: Option<Uuid>,
    pub topic_id: Option<Uuid>,
}

/// Where an exercise lives inside a course's entity collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseLocation {
    pub kind: NodeKind,
    pub node_id: Uuid,
    pub section: Section,
    pub subcategory: String,
}

pub struct NodeLocator {
    db: DbPool,
}

impl NodeLocator {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Resolve a hierarchy node by id, validating every supplied parent hint
    /// on the way down.
    pub fn locate(
        &self,
        kind: NodeKind,
        hints: &ParentHints,
        target_id: Uuid,
    ) -> Result<serde_json::Value, ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;

        // Walk the supplied hints top-down before touching the target, so the
        // error names the first missing level.
        if let Some(m) = hints.module_id {
            let exists: Option<ModuleNode> = course_modules::table
                .filter(course_modules::id.eq(m))
                .first(&mut conn)
                .optional()?;
            if exists.is_none() {
                return Err(ApiError::missing("module", m));
            }
        }
        if let Some(s) = hints.sub_module_id {
            let row: Option<SubModuleNode> = course_sub_modules::table
                .filter(course_sub_modules::id.eq(s))
                .first(&mut conn)
                .optional()?;
            let row = row.ok_or_else(|| ApiError::missing("subModule", s))?;
            if let Some(m) = hints.module_id {
                if row.module_id != m {
                    return Err(ApiError::missing("subModule", s));
                }
            }
        }
        if let Some(t) = hints.topic_id {
            let row: Option<TopicNode> = course_topics::table
                .filter(course_topics::id.eq(t))
                .first(&mut conn)
                .optional()?;
            let row = row.ok_or_else(|| ApiError::missing("topic", t))?;
            if !topic_matches_hints(&row, hints.module_id, hints.sub_module_id) {
                return Err(ApiError::missing("topic", t));
            }
        }

        match kind {
            NodeKind::Module => {
                let row: Option<ModuleNode> = course_modules::table
                    .filter(course_modules::id.eq(target_id))
                    .first(&mut conn)
                    .optional()?;
                let row = row.ok_or_else(|| ApiError::missing("module", target_id))?;
                Ok(serde_json::to_value(row)?)
            }
            NodeKind::SubModule => {
                let row: Option<SubModuleNode> = course_sub_modules::table
                    .filter(course_sub_modules::id.eq(target_id))
                    .first(&mut conn)
                    .optional()?;
                let row = row.ok_or_else(|| ApiError::missing("subModule", target_id))?;
                if let Some(m) = hints.module_id {
                    if row.module_id != m {
                        return Err(ApiError::missing("subModule", target_id));
                    }
                }
                Ok(serde_json::to_value(row)?)
            }
            NodeKind::Topic => {
                let row: Option<TopicNode> = course_topics::table
                    .filter(course_topics::id.eq(target_id))
                    .first(&mut conn)
                    .optional()?;
                let row = row.ok_or_else(|| ApiError::missing("topic", target_id))?;
                if !topic_matches_hints(&row, hints.module_id, hints.sub_module_id) {
                    return Err(ApiError::missing("topic", target_id));
                }
                Ok(serde_json::to_value(row)?)
            }
            NodeKind::SubTopic => {
                let row: Option<SubTopicNode> = course_sub_topics::table
                    .filter(course_sub_topics::id.eq(target_id))
                    .first(&mut conn)
                    .optional()?;
                let row = row.ok_or_else(|| ApiError::missing("subTopic", target_id))?;
                if let Some(t) = hints.topic_id {
                    if row.topic_id != t {
                        return Err(ApiError::missing("subTopic", target_id));
                    }
                } else if hints.module_id.is_some() || hints.sub_module_id.is_some() {
                    // No topic hint but upper-level hints supplied: the parent
                    // topic must sit under them.
                    let parent: Option<TopicNode> = course_topics::table
                        .filter(course_topics::id.eq(row.topic_id))
                        .first(&mut conn)
                        .optional()?;
                    let parent =
                        parent.ok_or_else(|| ApiError::missing("topic", row.topic_id))?;
                    if !topic_matches_hints(&parent, hints.module_id, hints.sub_module_id) {
                        return Err(ApiError::missing("subTopic", target_id));
                    }
                }
                Ok(serde_json::to_value(row)?)
            }
        }
    }

    /// Locate an exercise by id alone within one course: a derived id→location
    /// index is built from the four course-scoped collections per request,
    /// replacing an unbounded cross-collection scan while keeping the same
    /// contract.
    pub fn find_exercise(
        &self,
        course_id: Uuid,
        exercise_id: Uuid,
    ) -> Result<Option<(ExerciseLocation, Exercise)>, ApiError> {
        let docs = self.course_pedagogies(course_id)?;
        let index = index_course_exercises(&docs);
        let Some(location) = index.get(&exercise_id).cloned() else {
            return Ok(None);
        };
        let exercise = docs
            .iter()
            .find(|(kind, node_id, _)| *kind == location.kind && *node_id == location.node_id)
            .and_then(|(_, _, pedagogy)| pedagogy.bucket(location.section, &location.subcategory))
            .and_then(|bucket| bucket.exercises.iter().find(|e| e.id == exercise_id))
            .cloned();
        Ok(exercise.map(|exercise| (location, exercise)))
    }

    /// Every parsed pedagogy document in the course, tagged with its node.
    pub fn course_pedagogies(
        &self,
        course_id: Uuid,
    ) -> Result<Vec<(NodeKind, Uuid, Pedagogy)>, ApiError> {
        let mut conn = self.db.get().map_err(ApiError::from)?;
        let mut out = Vec::new();

        let modules: Vec<(Uuid, serde_json::Value)> = course_modules::table
            .filter(course_modules::course_id.eq(course_id))
            .select((course_modules::id, course_modules::pedagogy))
            .load(&mut conn)?;
        let sub_modules: Vec<(Uuid, serde_json::Value)> = course_sub_modules::table
            .filter(course_sub_modules::course_id.eq(course_id))
            .select((course_sub_modules::id, course_sub_modules::pedagogy))
            .load(&mut conn)?;
        let topics: Vec<(Uuid, serde_json::Value)> = course_topics::table
            .filter(course_topics::course_id.eq(course_id))
            .select((course_topics::id, course_topics::pedagogy))
            .load(&mut conn)?;
        let sub_topics: Vec<(Uuid, serde_json::Value)> = course_sub_topics::table
            .filter(course_sub_topics::course_id.eq(course_id))
            .select((course_sub_topics::id, course_sub_topics::pedagogy))
            .load(&mut conn)?;

        for (kind, rows) in [
            (NodeKind::Module, modules),
            (NodeKind::SubModule, sub_modules),
            (NodeKind::Topic, topics),
            (NodeKind::SubTopic, sub_topics),
        ] {
            for (id, value) in rows {
                let pedagogy = if value.is_null() {
                    Pedagogy::default()
                } else {
                    serde_json::from_value(value)?
                };
                out.push((kind, id, pedagogy));
            }
        }
        Ok(out)
    }
}

/// Direct-module attachment is checked before the submodule attachment; ids
/// are globally unique, so first match is definitive.
pub fn topic_matches_hints(
    topic: &TopicNode,
    module_id: Option<Uuid>,
    sub_module_id: Option<Uuid>,
) -> bool {
    if module_id.is_none() && sub_module_id.is_none() {
        return true;
    }
    if let Some(m) = module_id {
        if topic.module_id == Some(m) {
            return true;
        }
    }
    if let Some(s) = sub_module_id {
        if topic.sub_module_id == Some(s) {
            return true;
        }
    }
    false
}

/// Derived id→location index over a course's pedagogy documents.
pub fn index_course_exercises(
    docs: &[(NodeKind, Uuid, Pedagogy)],
) -> HashMap<Uuid, ExerciseLocation> {
    let mut index = HashMap::new();
    for (kind, node_id, pedagogy) in docs {
        for (section, subcats) in &pedagogy.0 {
            for (name, bucket) in subcats {
                for exercise in &bucket.exercises {
                    index.insert(
                        exercise.id,
                        ExerciseLocation {
                            kind: *kind,
                            node_id: *node_id,
                            section: *section,
                            subcategory: name.clone(),
                        },
                    );
                }
            }
        }
    }
    index
}
