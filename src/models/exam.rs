use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use validator::Validate;

use super::pagination::Identified;
use crate::error::{AppError, AppResult};

int_enum! {
    pub enum QuizType {
        SingleChoice = 1,
        MultiChoice = 2,
        TrueFalse = 3,
        FillIn = 4,
        ShortAnswer = 5,
    }
}

int_enum! {
    pub enum ExamStatus {
        Pending = 1,
        InProgress = 2,
        Finished = 3,
        GaveUp = 4,
    }
}

int_enum! {
    pub enum AnswerStatus {
        Ungraded = 0,
        Correct = 1,
        Incorrect = 2,
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Quiz {
    pub id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub quiz_type: QuizType,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing)]
    pub answer: String,
    pub analysis: String,
    pub creator_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Identified for Quiz {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Paper {
    pub id: i64,
    pub name: String,
    pub overview: String,
    pub tags: String,
    pub pass_score: i32,
    pub duration: i32,
    pub quiz_count: i32,
    pub creator_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identified for Paper {
    fn id(&self) -> i64 {
        self.id
    }
}

/// A live paper-quiz link joined with its quiz.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PaperQuizItem {
    pub relation_id: i64,
    pub quiz_id: i64,
    pub score: i32,
    pub sort_idx: i32,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub quiz_type: QuizType,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaperDetail {
    #[serde(flatten)]
    pub paper: Paper,
    pub quiz_list: Vec<PaperQuizItem>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Exam {
    pub id: i64,
    pub status: ExamStatus,
    pub paper_id: i64,
    pub student_id: i64,
    pub cur_quiz_id: i64,
    pub score: i32,
    pub pass: i16,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub give_up_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Identified for Exam {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Exam {
    /// Only the exam's own student may act on it, and only while it runs.
    pub fn ensure_in_progress(&self, caller: i64) -> AppResult<()> {
        if self.student_id != caller || self.status != ExamStatus::InProgress {
            return Err(AppError::invalid_state("exam is not in progress"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QuizAnswer {
    pub id: i64,
    pub status: AnswerStatus,
    pub answer: String,
    pub score: i32,
    pub quiz_id: i64,
    pub exam_id: i64,
    pub paper_id: i64,
    pub student_id: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExamDetail {
    #[serde(flatten)]
    pub exam: Exam,
    pub answers: Vec<QuizAnswer>,
}

// Grading

#[derive(Debug, Default, Deserialize)]
struct SubmittedChoices {
    #[serde(default)]
    choices: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct CorrectChoices {
    #[serde(default)]
    value: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    pub status: AnswerStatus,
    pub score: i32,
}

impl Grade {
    fn judged(correct: bool, item_score: i32) -> Self {
        if correct {
            Grade {
                status: AnswerStatus::Correct,
                score: item_score,
            }
        } else {
            Grade {
                status: AnswerStatus::Incorrect,
                score: 0,
            }
        }
    }

    fn ungraded() -> Self {
        Grade {
            status: AnswerStatus::Ungraded,
            score: 0,
        }
    }
}

fn same_multiset(mut a: Vec<i64>, mut b: Vec<i64>) -> bool {
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

/// Grades one submission against the quiz's stored answer.
///
/// Choice questions compare as multisets; true/false compares the raw
/// submitted text with the stored answer; open questions stay ungraded.
pub fn grade(quiz_type: QuizType, stored_answer: &str, submitted: &str, item_score: i32) -> AppResult<Grade> {
    match quiz_type {
        QuizType::SingleChoice | QuizType::MultiChoice => {
            let submitted: SubmittedChoices = serde_json::from_str(submitted)
                .map_err(|e| AppError::bad_request(format!("invalid answer content: {e}")))?;
            let correct: CorrectChoices = serde_json::from_str(stored_answer)
                .map_err(|e| AppError::malformed(format!("quiz answer: {e}")))?;
            Ok(Grade::judged(same_multiset(submitted.choices, correct.value), item_score))
        }
        QuizType::TrueFalse => Ok(Grade::judged(submitted == stored_answer, item_score)),
        QuizType::FillIn | QuizType::ShortAnswer => Ok(Grade::ungraded()),
    }
}

pub fn is_pass(total: i32, pass_score: i32) -> bool {
    total >= pass_score
}

// Paper composition

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperQuizInput {
    #[serde(default)]
    pub relation_id: Option<i64>,
    pub quiz_id: i64,
    #[serde(default)]
    pub score: i32,
    pub sort_idx: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationUpdate {
    pub relation_id: i64,
    pub score: i32,
    pub sort_idx: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInsert {
    pub quiz_id: i64,
    pub score: i32,
    pub sort_idx: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationDiff {
    pub updates: Vec<RelationUpdate>,
    pub inserts: Vec<RelationInsert>,
    pub deletes: Vec<i64>,
}

/// Three-way diff of a paper's links keyed by `relation_id`.
///
/// Incoming ids must belong to the paper; unreferenced existing links are
/// deleted. Missing `sort_idx` defaults to the item's position.
pub fn diff_relations(existing: &[i64], incoming: &[PaperQuizInput]) -> AppResult<RelationDiff> {
    let known: HashSet<i64> = existing.iter().copied().collect();
    let mut referenced = HashSet::new();
    let mut diff = RelationDiff::default();

    for (pos, item) in incoming.iter().enumerate() {
        let sort_idx = item.sort_idx.unwrap_or(pos as i32);
        match item.relation_id.filter(|id| *id > 0) {
            Some(relation_id) => {
                if !known.contains(&relation_id) {
                    return Err(AppError::bad_request(format!(
                        "relation {relation_id} does not belong to this paper"
                    )));
                }
                if !referenced.insert(relation_id) {
                    return Err(AppError::bad_request(format!("relation {relation_id} listed twice")));
                }
                diff.updates.push(RelationUpdate {
                    relation_id,
                    score: item.score,
                    sort_idx,
                });
            }
            None => diff.inserts.push(RelationInsert {
                quiz_id: item.quiz_id,
                score: item.score,
                sort_idx,
            }),
        }
    }

    diff.deletes = existing
        .iter()
        .copied()
        .filter(|id| !referenced.contains(id))
        .collect();
    Ok(diff)
}

// Requests

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[serde(rename = "type")]
    pub quiz_type: QuizType,
    #[validate(length(min = 1, message = "title is required"))]
    pub title: String,
    #[serde(default)]
    pub content: Value,
    pub answer: Value,
    #[serde(default)]
    pub analysis: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaperRequest {
    #[validate(length(min = 1, max = 128, message = "name is required"))]
    pub name: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub tags: String,
    #[validate(range(min = 0))]
    pub pass_score: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub duration: i32,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub quiz_list: Vec<PaperQuizInput>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePaperRequest {
    pub id: i64,
    #[validate(length(min = 1, max = 128))]
    pub name: Option<String>,
    pub overview: Option<String>,
    pub tags: Option<String>,
    #[validate(range(min = 0))]
    pub pass_score: Option<i32>,
    #[validate(range(min = 0))]
    pub duration: Option<i32>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub quiz_list: Vec<PaperQuizInput>,
}

#[derive(Debug, Deserialize)]
pub struct PaperIdRequest {
    pub paper_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ExamIdRequest {
    pub exam_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub exam_id: i64,
    pub quiz_id: i64,
    pub content: Value,
}
