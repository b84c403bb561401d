//! Derived totals for exercises. `total_marks` and `total_questions` are
//! snapshots recomputed on every write; they are a pure function of the
//! question configuration, never of previously stored values.

use super::types::{
    Exercise, LevelCounts, ModeConfiguration, QuestionConfigType, ScoreType,
};

/// Question count for one mode config. `levelBased` and `selectionLevel`
/// both sum the per-difficulty sub-counts; `general` uses the flat count.
pub fn question_count(cfg: &ModeConfiguration) -> u32 {
    match cfg.question_config_type {
        QuestionConfigType::General => cfg.question_count.unwrap_or(0),
        QuestionConfigType::LevelBased | QuestionConfigType::SelectionLevel => {
            let LevelCounts { easy, medium, hard } = cfg.level_counts.unwrap_or_default();
            easy + medium + hard
        }
    }
}

/// Total marks for one mode config under its score policy.
///
/// `separateMarks` recomputes only when the explicit per-question marks array
/// is supplied; otherwise the previously derived total carries over.
pub fn total_marks(cfg: &ModeConfiguration, previous: f64) -> f64 {
    let settings = &cfg.score_settings;
    match settings.score_type {
        ScoreType::EvenMarks => {
            f64::from(question_count(cfg)) * settings.per_question_mark.unwrap_or(0.0)
        }
        ScoreType::LevelBasedMarks => {
            let counts = cfg.level_counts.unwrap_or_default();
            let marks = settings.level_marks.unwrap_or_default();
            f64::from(counts.easy) * marks.easy
                + f64::from(counts.medium) * marks.medium
                + f64::from(counts.hard) * marks.hard
        }
        ScoreType::SeparateMarks => match &settings.separate_marks {
            Some(marks) => marks.iter().sum(),
            None => previous,
        },
    }
}

/// Recompute every derived total on an exercise in place: per-mode
/// `total_marks`, then the exercise-level `total_questions` / `total_points`.
/// Falls back to the stored questions array when no mode config is present.
pub fn recompute_totals(exercise: &mut Exercise) {
    let mut questions_total = 0u32;
    let mut points_total = 0.0f64;
    let mut any_mode = false;

    for cfg in [
        exercise.question_configuration.mcq_question_configuration.as_mut(),
        exercise
            .question_configuration
            .programming_question_configuration
            .as_mut(),
    ]
    .into_iter()
    .flatten()
    {
        any_mode = true;
        cfg.total_marks = total_marks(cfg, cfg.total_marks);
        questions_total += question_count(cfg);
        points_total += cfg.total_marks;
    }

    if !any_mode {
        questions_total = exercise.questions.len() as u32;
        points_total = exercise.questions.iter().map(|q| q.score).sum();
    }

    exercise.exercise_information.total_questions = questions_total;
    exercise.exercise_information.total_points = points_total;
}
