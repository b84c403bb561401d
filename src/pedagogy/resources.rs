//! Resource folder/file tree attached to a pedagogy subcategory, parallel to
//! its exercise array. Folders are addressed by ordered name segments (names
//! are unique among siblings); files are addressed by id. Bytes live in
//! object storage; only per-resolution URLs are kept here.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::hierarchy::NodeKind;
use crate::shared::error::ApiError;
use crate::shared::state::AppState;

use super::types::{FileEntry, Folder, Section};
use super::PedagogyEngine;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRequest {
    pub tab_type: Section,
    pub subcategory: String,
    /// Slash-separated parent path; empty string targets the root level.
    #[serde(default)]
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameFolderRequest {
    pub tab_type: Section,
    pub subcategory: String,
    /// Full path of the folder being renamed.
    pub path: String,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadQuery {
    pub tab_type: Section,
    pub subcategory: String,
    #[serde(default)]
    pub folder_path: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub is_video: bool,
    /// Comma-separated target resolutions for video uploads ("720p,1080p").
    #[serde(default)]
    pub resolutions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePatchRequest {
    #[serde(default)]
    pub show_to_students: Option<bool>,
    #[serde(default)]
    pub allow_download: Option<bool>,
    #[serde(default)]
    pub file_description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileScopeQuery {
    pub tab_type: Section,
    pub subcategory: String,
}

pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Object key for one stored variant of a file. Uploads write under
/// `resources/{node}/{file}/{label}`; storage cleanup must address the same
/// keys, never the public URLs derived from them.
pub fn object_key(node_id: Uuid, file_id: Uuid, label: &str) -> String {
    format!("resources/{}/{}/{}", node_id, file_id, label)
}

pub fn object_keys(node_id: Uuid, file: &FileEntry) -> Vec<String> {
    file.file_url
        .keys()
        .map(|label| object_key(node_id, file.id, label))
        .collect()
}

// ----- Pure tree operations -----

pub fn find_folder_mut<'a>(
    folders: &'a mut Vec<Folder>,
    segments: &[&str],
) -> Option<&'a mut Folder> {
    let (first, rest) = segments.split_first()?;
    let folder = folders.iter_mut().find(|f| f.name == *first)?;
    if rest.is_empty() {
        Some(folder)
    } else {
        find_folder_mut(&mut folder.subfolders, rest)
    }
}

/// Create a folder under `parent_path`, enforcing sibling-unique names.
pub fn create_folder_at(
    roots: &mut Vec<Folder>,
    parent_path: &[&str],
    name: &str,
) -> Result<Folder, ApiError> {
    if name.trim().is_empty() || name.contains('/') {
        return Err(ApiError::Validation("invalid folder name".to_string()));
    }
    let siblings = if parent_path.is_empty() {
        roots
    } else {
        let parent = find_folder_mut(roots, parent_path)
            .ok_or_else(|| ApiError::missing("folder", parent_path.join("/")))?;
        parent.updated_at = Utc::now();
        &mut parent.subfolders
    };
    if siblings.iter().any(|f| f.name == name) {
        return Err(ApiError::Conflict(format!(
            "folder '{}' already exists at this path",
            name
        )));
    }
    let folder = Folder::new(name);
    siblings.push(folder.clone());
    Ok(folder)
}

pub fn rename_folder_at(
    roots: &mut Vec<Folder>,
    path: &[&str],
    new_name: &str,
) -> Result<(), ApiError> {
    let (target_name, parent_path) = path
        .split_last()
        .ok_or_else(|| ApiError::Validation("folder path is required".to_string()))?;
    let siblings = if parent_path.is_empty() {
        roots
    } else {
        &mut find_folder_mut(roots, parent_path)
            .ok_or_else(|| ApiError::missing("folder", parent_path.join("/")))?
            .subfolders
    };
    if siblings.iter().any(|f| f.name == new_name) {
        return Err(ApiError::Conflict(format!(
            "folder '{}' already exists at this path",
            new_name
        )));
    }
    let folder = siblings
        .iter_mut()
        .find(|f| f.name == *target_name)
        .ok_or_else(|| ApiError::missing("folder", path.join("/")))?;
    folder.name = new_name.to_string();
    folder.updated_at = Utc::now();
    Ok(())
}

pub fn delete_folder_at(roots: &mut Vec<Folder>, path: &[&str]) -> Result<Folder, ApiError> {
    let (target_name, parent_path) = path
        .split_last()
        .ok_or_else(|| ApiError::Validation("folder path is required".to_string()))?;
    let siblings = if parent_path.is_empty() {
        roots
    } else {
        &mut find_folder_mut(roots, parent_path)
            .ok_or_else(|| ApiError::missing("folder", parent_path.join("/")))?
            .subfolders
    };
    let index = siblings
        .iter()
        .position(|f| f.name == *target_name)
        .ok_or_else(|| ApiError::missing("folder", path.join("/")))?;
    Ok(siblings.remove(index))
}

pub fn find_file_mut<'a>(folders: &'a mut [Folder], file_id: Uuid) -> Option<&'a mut FileEntry> {
    for folder in folders {
        if let Some(index) = folder.files.iter().position(|f| f.id == file_id) {
            return Some(&mut folder.files[index]);
        }
        if let Some(found) = find_file_mut(&mut folder.subfolders, file_id) {
            return Some(found);
        }
    }
    None
}

pub fn remove_file(folders: &mut [Folder], file_id: Uuid) -> Option<FileEntry> {
    for folder in folders {
        if let Some(index) = folder.files.iter().position(|f| f.id == file_id) {
            folder.updated_at = Utc::now();
            return Some(folder.files.remove(index));
        }
        if let Some(removed) = remove_file(&mut folder.subfolders, file_id) {
            return Some(removed);
        }
    }
    None
}

// ============================================================================
// HTTP HANDLERS
// ============================================================================

pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
    user: CurrentUser,
    Json(req): Json<FolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    let (mut pedagogy, version, _) = engine.hierarchy.load_pedagogy(kind, id)?;
    let bucket = pedagogy.ensure_bucket(req.tab_type, &req.subcategory);
    let folder = create_folder_at(&mut bucket.folders, &split_path(&req.path), &req.name)?;
    engine.hierarchy.save_pedagogy(kind, id, &pedagogy, version, &user)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": folder })),
    ))
}

pub async fn rename_folder(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
    user: CurrentUser,
    Json(req): Json<RenameFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    let (mut pedagogy, version, _) = engine.hierarchy.load_pedagogy(kind, id)?;
    let bucket = pedagogy
        .bucket_mut(req.tab_type, &req.subcategory)
        .ok_or_else(|| ApiError::missing("subcategory", &req.subcategory))?;
    rename_folder_at(&mut bucket.folders, &split_path(&req.path), &req.new_name)?;
    engine.hierarchy.save_pedagogy(kind, id, &pedagogy, version, &user)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
    user: CurrentUser,
    Json(req): Json<FolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    let (mut pedagogy, version, _) = engine.hierarchy.load_pedagogy(kind, id)?;
    let bucket = pedagogy
        .bucket_mut(req.tab_type, &req.subcategory)
        .ok_or_else(|| ApiError::missing("subcategory", &req.subcategory))?;
    let mut full_path = split_path(&req.path);
    full_path.push(&req.name);
    let removed = delete_folder_at(&mut bucket.folders, &full_path)?;
    engine.hierarchy.save_pedagogy(kind, id, &pedagogy, version, &user)?;

    // Best-effort storage cleanup for everything under the removed folder.
    if let Some(storage) = &state.storage {
        let mut stack = vec![removed];
        while let Some(folder) = stack.pop() {
            for file in &folder.files {
                for key in object_keys(id, file) {
                    if let Err(e) = storage.remove(&key).await {
                        tracing::warn!("orphaned object after folder delete: {}", e);
                    }
                }
            }
            stack.extend(folder.subfolders);
        }
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
    Query(query): Query<FileUploadQuery>,
    user: CurrentUser,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    if body.is_empty() {
        return Err(ApiError::Validation("empty file body".to_string()));
    }
    let storage = state
        .storage
        .as_ref()
        .ok_or_else(|| ApiError::Internal("object storage is not configured".to_string()))?;

    let file_id = Uuid::new_v4();
    let mut file_url = BTreeMap::new();
    let mut available_resolutions = Vec::new();

    if query.is_video {
        let targets: Vec<String> = query
            .resolutions
            .as_deref()
            .unwrap_or("720p")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        // A failed transcode falls back to the original under "base" only.
        let variants = match state.transcoder.transcode(&body, &targets).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("transcode failed, storing base only: {}", e);
                let mut base = std::collections::HashMap::new();
                base.insert("base".to_string(), body.to_vec());
                base
            }
        };
        for (label, bytes) in variants {
            let key = object_key(id, file_id, &label);
            let url = storage.upload(&key, bytes, &query.mime_type).await?;
            available_resolutions.push(label.clone());
            file_url.insert(label, url);
        }
    } else {
        let key = object_key(id, file_id, "base");
        let url = storage.upload(&key, body.to_vec(), &query.mime_type).await?;
        file_url.insert("base".to_string(), url);
    }

    let entry = FileEntry {
        id: file_id,
        name: query.name.clone(),
        mime_type: query.mime_type.clone(),
        file_url,
        size: body.len() as u64,
        is_video: query.is_video,
        available_resolutions,
        file_settings: Default::default(),
        file_description: None,
        tags: Vec::new(),
        created_at: Utc::now(),
    };

    let engine = PedagogyEngine::new(state.conn.clone());
    let (mut pedagogy, version, _) = engine.hierarchy.load_pedagogy(kind, id)?;
    let bucket = pedagogy.ensure_bucket(query.tab_type, &query.subcategory);
    let segments = split_path(&query.folder_path);
    if segments.is_empty() {
        return Err(ApiError::Validation("folderPath is required".to_string()));
    }
    let folder = find_folder_mut(&mut bucket.folders, &segments)
        .ok_or_else(|| ApiError::missing("folder", query.folder_path.clone()))?;
    folder.files.push(entry.clone());
    folder.updated_at = Utc::now();
    engine.hierarchy.save_pedagogy(kind, id, &pedagogy, version, &user)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": entry })),
    ))
}

pub async fn patch_file(
    State(state): State<Arc<AppState>>,
    Path((kind, id, file_id)): Path<(String, Uuid, Uuid)>,
    Query(scope): Query<FileScopeQuery>,
    user: CurrentUser,
    Json(req): Json<FilePatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    let (mut pedagogy, version, _) = engine.hierarchy.load_pedagogy(kind, id)?;
    let bucket = pedagogy
        .bucket_mut(scope.tab_type, &scope.subcategory)
        .ok_or_else(|| ApiError::missing("subcategory", &scope.subcategory))?;
    let file = find_file_mut(&mut bucket.folders, file_id)
        .ok_or_else(|| ApiError::missing("file", file_id))?;
    if let Some(v) = req.show_to_students {
        file.file_settings.show_to_students = v;
    }
    if let Some(v) = req.allow_download {
        file.file_settings.allow_download = v;
    }
    if let Some(v) = req.file_description {
        file.file_description = Some(v);
    }
    if let Some(v) = req.tags {
        file.tags = v;
    }
    let updated = file.clone();
    engine.hierarchy.save_pedagogy(kind, id, &pedagogy, version, &user)?;
    Ok(Json(serde_json::json!({ "success": true, "data": updated })))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path((kind, id, file_id)): Path<(String, Uuid, Uuid)>,
    Query(scope): Query<FileScopeQuery>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let kind = NodeKind::from_route(&kind)?;
    let engine = PedagogyEngine::new(state.conn.clone());
    let (mut pedagogy, version, _) = engine.hierarchy.load_pedagogy(kind, id)?;
    let bucket = pedagogy
        .bucket_mut(scope.tab_type, &scope.subcategory)
        .ok_or_else(|| ApiError::missing("subcategory", &scope.subcategory))?;
    let removed = remove_file(&mut bucket.folders, file_id)
        .ok_or_else(|| ApiError::missing("file", file_id))?;
    engine.hierarchy.save_pedagogy(kind, id, &pedagogy, version, &user)?;

    if let Some(storage) = &state.storage {
        for key in object_keys(id, &removed) {
            if let Err(e) = storage.remove(&key).await {
                tracing::warn!("orphaned object after file delete: {}", e);
            }
        }
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

pub fn configure_resource_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/pedagogy/folders/:kind/:id",
            post(create_folder).put(rename_folder).delete(delete_folder),
        )
        .route("/api/pedagogy/files/:kind/:id", post(upload_file))
        .route(
            "/api/pedagogy/files/:kind/:id/:file_id",
            put(patch_file).delete(delete_file),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_find_folder_by_path() {
        let mut roots = Vec::new();
        create_folder_at(&mut roots, &[], "unit1").unwrap();
        create_folder_at(&mut roots, &["unit1"], "videos").unwrap();
        assert!(find_folder_mut(&mut roots, &["unit1", "videos"]).is_some());
        assert!(find_folder_mut(&mut roots, &["unit1", "slides"]).is_none());
    }

    #[test]
    fn test_sibling_names_must_be_unique() {
        let mut roots = Vec::new();
        create_folder_at(&mut roots, &[], "unit1").unwrap();
        let err = create_folder_at(&mut roots, &[], "unit1").unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        // Same name at a different path is fine.
        create_folder_at(&mut roots, &["unit1"], "unit1").unwrap();
    }

    #[test]
    fn test_create_under_missing_parent_is_not_found() {
        let mut roots = Vec::new();
        let err = create_folder_at(&mut roots, &["ghost"], "child").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_rename_checks_conflicts() {
        let mut roots = Vec::new();
        create_folder_at(&mut roots, &[], "a").unwrap();
        create_folder_at(&mut roots, &[], "b").unwrap();
        let err = rename_folder_at(&mut roots, &["a"], "b").unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        rename_folder_at(&mut roots, &["a"], "c").unwrap();
        assert!(find_folder_mut(&mut roots, &["c"]).is_some());
    }

    #[test]
    fn test_delete_folder_returns_subtree() {
        let mut roots = Vec::new();
        create_folder_at(&mut roots, &[], "parent").unwrap();
        create_folder_at(&mut roots, &["parent"], "child").unwrap();
        let removed = delete_folder_at(&mut roots, &["parent"]).unwrap();
        assert_eq!(removed.subfolders.len(), 1);
        assert!(roots.is_empty());
    }

    #[test]
    fn test_file_lookup_recurses() {
        let mut roots = Vec::new();
        create_folder_at(&mut roots, &[], "a").unwrap();
        create_folder_at(&mut roots, &["a"], "b").unwrap();
        let file = FileEntry {
            id: Uuid::new_v4(),
            name: "intro.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            file_url: BTreeMap::new(),
            size: 10,
            is_video: true,
            available_resolutions: vec![],
            file_settings: Default::default(),
            file_description: None,
            tags: vec![],
            created_at: Utc::now(),
        };
        find_folder_mut(&mut roots, &["a", "b"])
            .unwrap()
            .files
            .push(file.clone());
        assert!(find_file_mut(&mut roots, file.id).is_some());
        let removed = remove_file(&mut roots, file.id).unwrap();
        assert_eq!(removed.id, file.id);
        assert!(find_file_mut(&mut roots, file.id).is_none());
    }

    #[test]
    fn test_cleanup_keys_match_upload_keys_not_urls() {
        let node_id = Uuid::new_v4();
        let file_id = Uuid::new_v4();
        let mut file_url = BTreeMap::new();
        for label in ["720p", "base"] {
            let key = object_key(node_id, file_id, label);
            file_url.insert(
                label.to_string(),
                format!("https://drive.example.edu/courseserver/{}", key),
            );
        }
        let entry = FileEntry {
            id: file_id,
            name: "intro.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            file_url,
            size: 10,
            is_video: true,
            available_resolutions: vec!["720p".to_string()],
            file_settings: Default::default(),
            file_description: None,
            tags: vec![],
            created_at: Utc::now(),
        };
        let keys = object_keys(node_id, &entry);
        assert_eq!(
            keys,
            vec![
                format!("resources/{}/{}/720p", node_id, file_id),
                format!("resources/{}/{}/base", node_id, file_id),
            ]
        );
        // Deletion must never be handed the stored public URL.
        assert!(keys.iter().all(|k| !k.starts_with("https://")));
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path(""), Vec::<&str>::new());
        assert_eq!(split_path("a/b/c"), vec!["a", "b", "c"]);
        assert_eq!(split_path("/a//b/"), vec!["a", "b"]);
    }
}
