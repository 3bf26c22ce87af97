use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use commons_types::api::{Claims, CreateAnswerRequest, CreateQuestionRequest};
use commons_types::models::{Answer, Question};

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

pub async fn create_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateQuestionRequest>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let title = req.title.trim().to_string();
    if title.is_empty() || title.chars().count() > 200 {
        return Err(ApiError::BadRequest("Title must be 1-200 characters.".into()));
    }

    let question = blocking(&state, move |s| {
        Ok(s.db.create_question(&claims.username, &title, &req.content)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn create_answer(
    State(state): State<AppState>,
    Path(question_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateAnswerRequest>,
) -> ApiResult<(StatusCode, Json<Answer>)> {
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Answer cannot be empty.".into()));
    }

    let answer = blocking(&state, move |s| {
        Ok(s.db.create_answer(question_id, &claims.username, &req.content)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(answer)))
}

/// Accepted answer first, then newest first.
pub async fn list_answers(
    State(state): State<AppState>,
    Path(question_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Answer>>> {
    let answers = blocking(&state, move |s| {
        s.db.get_question(question_id)?;
        Ok(s.db.get_answers(question_id)?)
    })
    .await?;
    Ok(Json(answers))
}
