//! courseserver: course-content hierarchy engine.
//!
//! A learning-management backend built around a variable-depth course tree
//! (module → submodule → topic → subtopic) where every node embeds a
//! pedagogy document of exercises and questions. The crate exposes the tree
//! CRUD, the pedagogy mutation engine, cascade deletion with side-index
//! cleanup, module duplication across courses, grading reconciliation, and
//! the legacy single-document aggregate representation.

pub mod auth;
pub mod cascade;
pub mod config;
pub mod duplicate;
pub mod grading;
pub mod hierarchy;
pub mod pedagogy;
pub mod shared;
pub mod storage;
pub mod structure;
pub mod views;
