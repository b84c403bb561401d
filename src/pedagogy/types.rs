//! Document model for the pedagogy substructure embedded in every hierarchy
//! node: `pedagogy[section][subcategory]` holds an ordered exercise array plus
//! a parallel resource folder tree. Sections are a closed three-value set;
//! subcategory names are user-defined strings, so the inner key stays a real
//! string-keyed map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The three pedagogy sections. Wire form matches the course-content payloads
/// ("I_Do" / "We_Do" / "You_Do").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    #[serde(rename = "I_Do")]
    IDo,
    #[serde(rename = "We_Do")]
    WeDo,
    #[serde(rename = "You_Do")]
    YouDo,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::IDo, Section::WeDo, Section::YouDo];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "I_Do" => Some(Self::IDo),
            "We_Do" => Some(Self::WeDo),
            "You_Do" => Some(Self::YouDo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IDo => "I_Do",
            Self::WeDo => "We_Do",
            Self::YouDo => "You_Do",
        }
    }
}

/// Whole pedagogy document for one hierarchy node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Pedagogy(pub BTreeMap<Section, BTreeMap<String, Bucket>>);

impl Pedagogy {
    /// Lazy section/subcategory creation: first write to a new subcategory
    /// initializes an empty bucket instead of erroring.
    pub fn ensure_bucket(&mut self, section: Section, subcategory: &str) -> &mut Bucket {
        self.0
            .entry(section)
            .or_default()
            .entry(subcategory.to_string())
            .or_default()
    }

    pub fn bucket(&self, section: Section, subcategory: &str) -> Option<&Bucket> {
        self.0.get(&section)?.get(subcategory)
    }

    pub fn bucket_mut(&mut self, section: Section, subcategory: &str) -> Option<&mut Bucket> {
        self.0.get_mut(&section)?.get_mut(subcategory)
    }

    /// Scan every section and subcategory for an exercise by its durable id.
    pub fn find_exercise(&self, exercise_id: Uuid) -> Option<(Section, &str, &Exercise)> {
        for (section, subcats) in &self.0 {
            for (name, bucket) in subcats {
                if let Some(ex) = bucket.exercises.iter().find(|e| e.id == exercise_id) {
                    return Some((*section, name.as_str(), ex));
                }
            }
        }
        None
    }
}

/// One subcategory element: the exercise array, the parallel resource folder
/// tree, and the subcategory-level status flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    #[serde(default)]
    pub exercises: Vec<Exercise>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub status: BucketStatus,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BucketStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

// ----- Exercise -----

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExerciseType {
    #[serde(rename = "MCQ")]
    Mcq,
    Programming,
    Combined,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConfigurationMode {
    McqMode,
    ProgrammingMode,
}

impl ExerciseType {
    /// Which question-configuration modes apply; derived, never stored
    /// independently of the exercise type.
    pub fn configuration_modes(&self) -> Vec<ConfigurationMode> {
        match self {
            Self::Mcq => vec![ConfigurationMode::McqMode],
            Self::Programming => vec![ConfigurationMode::ProgrammingMode],
            Self::Combined => vec![ConfigurationMode::McqMode, ConfigurationMode::ProgrammingMode],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    /// Durable identity. The short `exercise_code` below is a display label
    /// only; it is derived from array length at creation and can repeat after
    /// deletions.
    pub id: Uuid,
    pub exercise_code: String,
    pub exercise_type: ExerciseType,
    pub configuration_type: Vec<ConfigurationMode>,
    pub exercise_information: ExerciseInformation,
    pub question_configuration: QuestionConfiguration,
    #[serde(default)]
    pub availability_period: Option<AvailabilityPeriod>,
    #[serde(default)]
    pub notification_and_grade_settings: Option<NotificationAndGradeSettings>,
    #[serde(default)]
    pub questions: Vec<Question>,
    pub version: i32,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseInformation {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub duration: Option<i32>,
    /// Derived snapshots, recomputed on every write. Never authoritative on
    /// their own.
    #[serde(default)]
    pub total_questions: u32,
    #[serde(default)]
    pub total_points: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionConfiguration {
    #[serde(default)]
    pub mcq_question_configuration: Option<ModeConfiguration>,
    #[serde(default)]
    pub programming_question_configuration: Option<ModeConfiguration>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum QuestionConfigType {
    General,
    LevelBased,
    SelectionLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModeConfiguration {
    pub question_config_type: QuestionConfigType,
    #[serde(default)]
    pub question_count: Option<u32>,
    #[serde(default)]
    pub level_counts: Option<LevelCounts>,
    pub score_settings: ScoreSettings,
    /// Derived from the count and score policies; recomputed on every update.
    #[serde(default)]
    pub total_marks: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LevelCounts {
    #[serde(default)]
    pub easy: u32,
    #[serde(default)]
    pub medium: u32,
    #[serde(default)]
    pub hard: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScoreType {
    EvenMarks,
    LevelBasedMarks,
    SeparateMarks,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSettings {
    pub score_type: ScoreType,
    #[serde(default)]
    pub per_question_mark: Option<f64>,
    #[serde(default)]
    pub level_marks: Option<LevelMarks>,
    #[serde(default)]
    pub separate_marks: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LevelMarks {
    #[serde(default)]
    pub easy: f64,
    #[serde(default)]
    pub medium: f64,
    #[serde(default)]
    pub hard: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityPeriod {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub grace_period_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAndGradeSettings {
    #[serde(default)]
    pub notify_on_publish: bool,
    #[serde(default)]
    pub notify_on_due: bool,
    #[serde(default)]
    pub include_in_grade_sheet: bool,
}

// ----- Question -----

/// A question is one of two disjoint variants; the discriminant rejects
/// cross-variant fields at deserialization instead of letting MCQ and
/// programming fields coexist loosely on one shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// 0-based stable ordering position.
    pub sequence: u32,
    pub score: f64,
    #[serde(flatten)]
    pub body: QuestionBody,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "questionType")]
pub enum QuestionBody {
    #[serde(rename = "mcq", rename_all = "camelCase")]
    Mcq {
        question_title: String,
        options: Vec<String>,
        correct_answer: String,
    },
    #[serde(rename = "programming", rename_all = "camelCase")]
    Programming {
        title: String,
        #[serde(default)]
        description: Option<String>,
        difficulty: Difficulty,
        #[serde(default)]
        sample_input: Option<String>,
        #[serde(default)]
        sample_output: Option<String>,
        #[serde(default)]
        constraints: Vec<String>,
        #[serde(default)]
        hints: Vec<Hint>,
        #[serde(default)]
        test_cases: Vec<TestCase>,
        #[serde(default)]
        solutions: Option<Solutions>,
        #[serde(default)]
        time_limit: Option<u32>,
        #[serde(default)]
        memory_limit: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub hint: String,
    #[serde(default)]
    pub deduction: f64,
    #[serde(default)]
    pub is_visible: bool,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default)]
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_sample: bool,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub order: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Solutions {
    #[serde(default)]
    pub starter_code: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

// ----- Resource folder/file tree -----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub subfolders: Vec<Folder>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Folder {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            files: Vec::new(),
            subfolders: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    /// URL per resolution label; non-video files carry only "base".
    pub file_url: BTreeMap<String, String>,
    pub size: u64,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub available_resolutions: Vec<String>,
    #[serde(default)]
    pub file_settings: FileSettings,
    #[serde(default)]
    pub file_description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileSettings {
    pub show_to_students: bool,
    pub allow_download: bool,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            show_to_students: true,
            allow_download: true,
        }
    }
}

/// Display label for the n-th exercise in a subcategory: "EX001", "EX002", …
/// Derived from the array length at creation time, so not durable across
/// deletions; identity lives in `Exercise::id`.
pub fn next_exercise_code(existing: usize) -> String {
    format!("EX{:03}", existing + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_wire_names() {
        assert_eq!(serde_json::to_string(&Section::IDo).unwrap(), "\"I_Do\"");
        assert_eq!(Section::parse("We_Do"), Some(Section::WeDo));
        assert_eq!(Section::parse("we_do"), None);
    }

    #[test]
    fn test_lazy_bucket_creation() {
        let mut p = Pedagogy::default();
        assert!(p.bucket(Section::IDo, "warmup").is_none());
        p.ensure_bucket(Section::IDo, "warmup");
        assert!(p.bucket(Section::IDo, "warmup").is_some());
        // idempotent
        p.ensure_bucket(Section::IDo, "warmup");
        assert_eq!(p.0.get(&Section::IDo).unwrap().len(), 1);
    }

    #[test]
    fn test_question_variant_round_trip() {
        let q = Question {
            id: Uuid::new_v4(),
            is_active: true,
            sequence: 0,
            score: 5.0,
            body: QuestionBody::Mcq {
                question_title: "2 + 2?".to_string(),
                options: vec!["3".to_string(), "4".to_string()],
                correct_answer: "4".to_string(),
            },
        };
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["questionType"], "mcq");
        assert_eq!(json["questionTitle"], "2 + 2?");
        let back: Question = serde_json::from_value(json).unwrap();
        assert_eq!(back, q);
    }

    #[test]
    fn test_cross_variant_fields_rejected() {
        // A programming question must not deserialize from an mcq tag with
        // programming-only required fields missing.
        let bad = serde_json::json!({
            "id": Uuid::new_v4(),
            "sequence": 0,
            "score": 1.0,
            "questionType": "programming",
            "questionTitle": "mcq field on programming variant"
        });
        assert!(serde_json::from_value::<Question>(bad).is_err());
    }

    #[test]
    fn test_exercise_code_sequence() {
        assert_eq!(next_exercise_code(0), "EX001");
        assert_eq!(next_exercise_code(9), "EX010");
        assert_eq!(next_exercise_code(99), "EX100");
    }

    #[test]
    fn test_codes_can_repeat_after_delete() {
        // Two adds, one delete, one add: the display code repeats. Identity
        // must come from the UUID, never from the code.
        let mut codes = vec![next_exercise_code(0), next_exercise_code(1)];
        codes.remove(0);
        codes.push(next_exercise_code(codes.len()));
        assert_eq!(codes, vec!["EX002".to_string(), "EX002".to_string()]);
    }

    #[test]
    fn test_combined_exercise_modes() {
        assert_eq!(
            ExerciseType::Combined.configuration_modes(),
            vec![ConfigurationMode::McqMode, ConfigurationMode::ProgrammingMode]
        );
    }
}
