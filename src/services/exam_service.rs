use std::collections::HashSet;

use chrono::Utc;
use sqlx::{PgConnection, PgPool, QueryBuilder};

use crate::error::{AppError, AppResult};
use crate::models::{
    diff_relations, grade, is_pass, raw_json, AnswerStatus, CreatePaperRequest, CreateQuizRequest, Exam, ExamDetail,
    ExamStatus, ListResult, Pagination, Paper, PaperDetail, PaperQuizInput, PaperQuizItem, Quiz, QuizAnswer,
    SubmitAnswerRequest, UpdatePaperRequest,
};
use crate::services::pagination::fetch_page;

const QUIZ_COLUMNS: &str = "id, type, title, content, answer, analysis, creator_id, created_at";
const PAPER_COLUMNS: &str =
    "id, name, overview, tags, pass_score, duration, quiz_count, creator_id, created_at, updated_at";
const EXAM_COLUMNS: &str =
    "id, status, paper_id, student_id, cur_quiz_id, score, pass, started_at, completed_at, give_up_at, created_at";
const ANSWER_COLUMNS: &str = "id, status, answer, score, quiz_id, exam_id, paper_id, student_id, updated_at";

#[derive(Clone)]
pub struct ExamService {
    db: PgPool,
}

impl ExamService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_quiz(&self, creator_id: i64, request: CreateQuizRequest) -> AppResult<Quiz> {
        let quiz: Quiz = sqlx::query_as(&format!(
            r#"
            INSERT INTO quiz (type, title, content, answer, analysis, creator_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {QUIZ_COLUMNS}
            "#
        ))
        .bind(request.quiz_type)
        .bind(request.title.trim())
        .bind(raw_json(&request.content))
        .bind(raw_json(&request.answer))
        .bind(&request.analysis)
        .bind(creator_id)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(creator_id, quiz_id = quiz.id, "Created quiz");
        Ok(quiz)
    }

    pub async fn list_quizzes(&self, creator_id: i64, page: &Pagination) -> AppResult<ListResult<Quiz>> {
        let window = page.window()?;
        let mut query = QueryBuilder::new(format!(
            "SELECT {QUIZ_COLUMNS} FROM quiz WHERE COALESCE(d, 0) = 0 AND creator_id = "
        ));
        query.push_bind(creator_id);
        fetch_page(&self.db, query, "id", &window).await
    }

    /// Creates the paper and one link per listed quiz in one transaction.
    pub async fn create_paper(&self, creator_id: i64, request: CreatePaperRequest) -> AppResult<PaperDetail> {
        if request.quiz_list.iter().any(|item| item.relation_id.is_some_and(|id| id > 0)) {
            return Err(AppError::bad_request("a new paper cannot reference existing relations"));
        }

        let mut tx = self.db.begin().await?;
        ensure_quizzes_exist(&mut tx, &request.quiz_list).await?;

        let paper: Paper = sqlx::query_as(&format!(
            r#"
            INSERT INTO paper (name, overview, tags, pass_score, duration, quiz_count, creator_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PAPER_COLUMNS}
            "#
        ))
        .bind(request.name.trim())
        .bind(&request.overview)
        .bind(&request.tags)
        .bind(request.pass_score)
        .bind(request.duration)
        .bind(request.quiz_list.len() as i32)
        .bind(creator_id)
        .fetch_one(&mut *tx)
        .await?;

        let diff = diff_relations(&[], &request.quiz_list)?;
        if !diff.inserts.is_empty() {
            let mut query = QueryBuilder::new("INSERT INTO paper_quiz (paper_id, quiz_id, score, sort_idx, visible) ");
            query.push_values(&diff.inserts, |mut row, item| {
                row.push_bind(paper.id)
                    .push_bind(item.quiz_id)
                    .push_bind(item.score)
                    .push_bind(item.sort_idx)
                    .push_bind(1_i16);
            });
            query.build().execute(&mut *tx).await?;
        }

        let quiz_list = fetch_paper_quizzes(&mut tx, paper.id).await?;
        tx.commit().await?;

        tracing::info!(creator_id, paper_id = paper.id, quizzes = quiz_list.len(), "Created paper");
        Ok(PaperDetail { paper, quiz_list })
    }

    pub async fn get_paper(&self, paper_id: i64) -> AppResult<PaperDetail> {
        let mut conn = self.db.acquire().await?;
        let paper = find_paper(&mut conn, paper_id, false).await?;
        let quiz_list = fetch_paper_quizzes(&mut conn, paper.id).await?;
        Ok(PaperDetail { paper, quiz_list })
    }

    pub async fn list_papers(&self, creator_id: i64, page: &Pagination) -> AppResult<ListResult<Paper>> {
        let window = page.window()?;
        let mut query = QueryBuilder::new(format!(
            "SELECT {PAPER_COLUMNS} FROM paper WHERE COALESCE(d, 0) = 0 AND creator_id = "
        ));
        query.push_bind(creator_id);
        fetch_page(&self.db, query, "id", &window).await
    }

    /// Updates the paper's fields and reconciles its quiz links against
    /// `quiz_list`: referenced links are updated, new items inserted and
    /// unreferenced links hard-deleted.
    pub async fn update_paper(&self, caller: i64, request: UpdatePaperRequest) -> AppResult<PaperDetail> {
        let mut tx = self.db.begin().await?;

        let existing = find_paper(&mut tx, request.id, true).await?;
        if existing.creator_id != caller {
            return Err(AppError::unauthorized("only the creator may edit this paper"));
        }

        let relation_ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM paper_quiz WHERE paper_id = $1 AND COALESCE(d, 0) = 0 ORDER BY id FOR UPDATE",
        )
        .bind(existing.id)
        .fetch_all(&mut *tx)
        .await?;
        let relation_ids: Vec<i64> = relation_ids.into_iter().map(|(id,)| id).collect();

        let diff = diff_relations(&relation_ids, &request.quiz_list)?;
        let new_items: Vec<PaperQuizInput> = request
            .quiz_list
            .iter()
            .filter(|item| item.relation_id.map_or(true, |id| id <= 0))
            .cloned()
            .collect();
        ensure_quizzes_exist(&mut tx, &new_items).await?;

        for update in &diff.updates {
            sqlx::query("UPDATE paper_quiz SET score = $2, sort_idx = $3 WHERE id = $1")
                .bind(update.relation_id)
                .bind(update.score)
                .bind(update.sort_idx)
                .execute(&mut *tx)
                .await?;
        }
        if !diff.inserts.is_empty() {
            let mut query = QueryBuilder::new("INSERT INTO paper_quiz (paper_id, quiz_id, score, sort_idx, visible) ");
            query.push_values(&diff.inserts, |mut row, item| {
                row.push_bind(existing.id)
                    .push_bind(item.quiz_id)
                    .push_bind(item.score)
                    .push_bind(item.sort_idx)
                    .push_bind(1_i16);
            });
            query.build().execute(&mut *tx).await?;
        }
        if !diff.deletes.is_empty() {
            sqlx::query("DELETE FROM paper_quiz WHERE id = ANY($1)")
                .bind(&diff.deletes)
                .execute(&mut *tx)
                .await?;
        }

        let paper: Paper = sqlx::query_as(&format!(
            r#"
            UPDATE paper SET
                name = COALESCE($2, name),
                overview = COALESCE($3, overview),
                tags = COALESCE($4, tags),
                pass_score = COALESCE($5, pass_score),
                duration = COALESCE($6, duration),
                quiz_count = (SELECT COUNT(*) FROM paper_quiz WHERE paper_id = $1 AND COALESCE(d, 0) = 0),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PAPER_COLUMNS}
            "#
        ))
        .bind(existing.id)
        .bind(request.name.map(|n| n.trim().to_string()))
        .bind(request.overview)
        .bind(request.tags)
        .bind(request.pass_score)
        .bind(request.duration)
        .fetch_one(&mut *tx)
        .await?;

        let quiz_list = fetch_paper_quizzes(&mut tx, paper.id).await?;
        tx.commit().await?;

        tracing::info!(
            caller,
            paper_id = paper.id,
            updated = diff.updates.len(),
            inserted = diff.inserts.len(),
            deleted = diff.deletes.len(),
            "Updated paper"
        );
        Ok(PaperDetail { paper, quiz_list })
    }

    /// Starts an attempt and materializes one ungraded answer per paper quiz.
    pub async fn start_exam(&self, student_id: i64, paper_id: i64) -> AppResult<ExamDetail> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let paper = find_paper(&mut tx, paper_id, false).await?;

        let exam: Exam = sqlx::query_as(&format!(
            r#"
            INSERT INTO exam (status, paper_id, student_id, started_at, created_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING {EXAM_COLUMNS}
            "#
        ))
        .bind(ExamStatus::InProgress)
        .bind(paper.id)
        .bind(student_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO quiz_answer (status, student_id, quiz_id, exam_id, paper_id, created_at, updated_at)
            SELECT $1, $2, pq.quiz_id, $3, $4, $5, $5
            FROM paper_quiz pq
            WHERE pq.paper_id = $4 AND COALESCE(pq.d, 0) = 0
            ORDER BY pq.sort_idx ASC, pq.id ASC
            "#,
        )
        .bind(AnswerStatus::Ungraded)
        .bind(student_id)
        .bind(exam.id)
        .bind(paper.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let answers = fetch_answers(&mut tx, exam.id).await?;
        tx.commit().await?;

        tracing::info!(student_id, paper_id, exam_id = exam.id, answers = answers.len(), "Exam started");
        Ok(ExamDetail { exam, answers })
    }

    /// Grades one answer immediately by quiz type.
    pub async fn submit_answer(&self, caller: i64, request: SubmitAnswerRequest) -> AppResult<QuizAnswer> {
        let submitted = raw_json(&request.content);
        let mut tx = self.db.begin().await?;

        let exam = lock_exam(&mut tx, request.exam_id).await?;
        exam.ensure_in_progress(caller)?;

        sqlx::query("UPDATE exam SET cur_quiz_id = $2 WHERE id = $1")
            .bind(exam.id)
            .bind(request.quiz_id)
            .execute(&mut *tx)
            .await?;

        let answer: QuizAnswer = sqlx::query_as(&format!(
            "SELECT {ANSWER_COLUMNS} FROM quiz_answer WHERE exam_id = $1 AND quiz_id = $2 ORDER BY id LIMIT 1 FOR UPDATE"
        ))
        .bind(exam.id)
        .bind(request.quiz_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("quiz answer"))?;

        let quiz: Quiz = sqlx::query_as(&format!("SELECT {QUIZ_COLUMNS} FROM quiz WHERE id = $1"))
            .bind(request.quiz_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("quiz"))?;

        let (item_score,): (i32,) = sqlx::query_as(
            "SELECT score FROM paper_quiz WHERE paper_id = $1 AND quiz_id = $2 AND COALESCE(d, 0) = 0 ORDER BY id LIMIT 1",
        )
        .bind(exam.paper_id)
        .bind(quiz.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("paper quiz"))?;

        let graded = grade(quiz.quiz_type, &quiz.answer, &submitted, item_score)?;

        let answer: QuizAnswer = sqlx::query_as(&format!(
            r#"
            UPDATE quiz_answer SET status = $2, answer = $3, score = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {ANSWER_COLUMNS}
            "#
        ))
        .bind(answer.id)
        .bind(graded.status)
        .bind(&submitted)
        .bind(graded.score)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(caller, exam_id = exam.id, quiz_id = quiz.id, status = ?graded.status, "Answer graded");
        Ok(answer)
    }

    pub async fn finish_exam(&self, caller: i64, exam_id: i64) -> AppResult<Exam> {
        let mut tx = self.db.begin().await?;
        let exam = lock_exam(&mut tx, exam_id).await?;
        exam.ensure_in_progress(caller)?;
        let paper = find_paper(&mut tx, exam.paper_id, false).await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COALESCE(SUM(score), 0)::BIGINT FROM quiz_answer WHERE exam_id = $1")
            .bind(exam.id)
            .fetch_one(&mut *tx)
            .await?;
        let total = i32::try_from(total).map_err(|_| anyhow::anyhow!("exam score {total} out of range"))?;
        let pass = is_pass(total, paper.pass_score);

        let exam: Exam = sqlx::query_as(&format!(
            r#"
            UPDATE exam SET status = $2, score = $3, pass = $4, completed_at = NOW()
            WHERE id = $1
            RETURNING {EXAM_COLUMNS}
            "#
        ))
        .bind(exam.id)
        .bind(ExamStatus::Finished)
        .bind(total)
        .bind(i16::from(pass))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(caller, exam_id, score = total, pass, "Exam finished");
        Ok(exam)
    }

    pub async fn give_up_exam(&self, caller: i64, exam_id: i64) -> AppResult<Exam> {
        let mut tx = self.db.begin().await?;
        let exam = lock_exam(&mut tx, exam_id).await?;
        exam.ensure_in_progress(caller)?;

        let exam: Exam = sqlx::query_as(&format!(
            "UPDATE exam SET status = $2, give_up_at = NOW() WHERE id = $1 RETURNING {EXAM_COLUMNS}"
        ))
        .bind(exam.id)
        .bind(ExamStatus::GaveUp)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(caller, exam_id, "Exam given up");
        Ok(exam)
    }

    /// Visible to the examinee and to the paper's creator.
    pub async fn get_exam(&self, viewer: i64, exam_id: i64) -> AppResult<ExamDetail> {
        let mut conn = self.db.acquire().await?;
        let exam: Exam = sqlx::query_as(&format!("SELECT {EXAM_COLUMNS} FROM exam WHERE id = $1"))
            .bind(exam_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(AppError::NotFound("exam"))?;

        if exam.student_id != viewer {
            let paper = find_paper(&mut conn, exam.paper_id, false).await?;
            if paper.creator_id != viewer {
                return Err(AppError::unauthorized("not allowed to view this exam"));
            }
        }

        let answers = fetch_answers(&mut conn, exam.id).await?;
        Ok(ExamDetail { exam, answers })
    }

    pub async fn list_exams(&self, student_id: i64, page: &Pagination) -> AppResult<ListResult<Exam>> {
        let window = page.window()?;
        let mut query = QueryBuilder::new(format!("SELECT {EXAM_COLUMNS} FROM exam WHERE student_id = "));
        query.push_bind(student_id);
        fetch_page(&self.db, query, "id", &window).await
    }
}

async fn find_paper(conn: &mut PgConnection, paper_id: i64, for_update: bool) -> AppResult<Paper> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    sqlx::query_as(&format!(
        "SELECT {PAPER_COLUMNS} FROM paper WHERE id = $1 AND COALESCE(d, 0) = 0{lock}"
    ))
    .bind(paper_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("paper"))
}

async fn lock_exam(conn: &mut PgConnection, exam_id: i64) -> AppResult<Exam> {
    sqlx::query_as(&format!("SELECT {EXAM_COLUMNS} FROM exam WHERE id = $1 FOR UPDATE"))
        .bind(exam_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound("exam"))
}

async fn ensure_quizzes_exist(conn: &mut PgConnection, items: &[PaperQuizInput]) -> AppResult<()> {
    let ids: HashSet<i64> = items.iter().map(|item| item.quiz_id).collect();
    if ids.is_empty() {
        return Ok(());
    }
    let ids: Vec<i64> = ids.into_iter().collect();

    let (found,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM quiz WHERE id = ANY($1) AND COALESCE(d, 0) = 0")
        .bind(&ids)
        .fetch_one(&mut *conn)
        .await?;

    if found != ids.len() as i64 {
        return Err(AppError::bad_request("paper references a missing quiz"));
    }
    Ok(())
}

async fn fetch_paper_quizzes(conn: &mut PgConnection, paper_id: i64) -> AppResult<Vec<PaperQuizItem>> {
    let items = sqlx::query_as(
        r#"
        SELECT pq.id AS relation_id, pq.quiz_id, pq.score, pq.sort_idx, q.type, q.title, q.content
        FROM paper_quiz pq
        JOIN quiz q ON q.id = pq.quiz_id
        WHERE pq.paper_id = $1 AND COALESCE(pq.d, 0) = 0
        ORDER BY pq.sort_idx ASC, pq.id ASC
        "#,
    )
    .bind(paper_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

async fn fetch_answers(conn: &mut PgConnection, exam_id: i64) -> AppResult<Vec<QuizAnswer>> {
    let answers = sqlx::query_as(&format!(
        "SELECT {ANSWER_COLUMNS} FROM quiz_answer WHERE exam_id = $1 ORDER BY id ASC"
    ))
    .bind(exam_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(answers)
}
