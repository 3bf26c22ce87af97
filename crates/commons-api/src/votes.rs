//! Vote tally engine: owner-checked votes and answer acceptance.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use commons_db::questions::{require_answer, require_question, update_accept_answer};
use commons_db::queries::require_user;
use commons_db::votes::{recount_votes, upsert_vote};
use commons_db::{Database, StoreError};
use commons_gateway::SharedBus;
use commons_types::api::{Claims, VoteRequest, VoteResponse};
use commons_types::events::EventKey;
use commons_types::models::{Answer, ObjectRef, Target, Votable, Verb};

use crate::error::{ApiError, ApiResult};
use crate::notify::{Notice, Recipients, notify};
use crate::state::{AppState, blocking};

/// Result of a vote attempt. A denial is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Tallied { total_votes: i64 },
    Denied { message: String },
}

impl From<VoteOutcome> for VoteResponse {
    fn from(outcome: VoteOutcome) -> Self {
        match outcome {
            VoteOutcome::Tallied { total_votes } => Self {
                votes: Some(total_votes),
                message: None,
                is_owner: false,
            },
            VoteOutcome::Denied { message } => Self {
                votes: None,
                message: Some(message),
                is_owner: true,
            },
        }
    }
}

fn load_votable(conn: &Connection, target: Target) -> Result<Box<dyn Votable>, StoreError> {
    let votable: Box<dyn Votable> = match target {
        Target::Question(id) => Box::new(require_question(conn, id)?),
        Target::Answer(id) => Box::new(require_answer(conn, id)?),
    };
    Ok(votable)
}

/// Record `username`'s vote on `target` and return the recomputed total.
///
/// Owners are turned away before anything is written. The upsert and the
/// recount share one transaction, and the recount reads the vote set afresh,
/// so concurrent voters always converge on the right total.
pub fn vote(db: &Database, target: Target, username: &str, value: bool) -> Result<VoteOutcome, StoreError> {
    db.transaction(|uow| {
        let votable = load_votable(uow, target)?;
        if votable.owner() == username {
            debug!("{} tried to vote on their own {}", username, target.kind());
            return Ok(VoteOutcome::Denied {
                message: format!("You can't vote your own {}.", target.kind()),
            });
        }

        let voter = require_user(uow, username)?;
        upsert_vote(uow, &voter, target, value)?;
        let total_votes = recount_votes(uow, target)?;
        Ok(VoteOutcome::Tallied { total_votes })
    })
}

/// Result of an accept attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted(Answer),
    Denied { message: String },
}

/// Make `answer_id` the accepted answer of its question.
///
/// Only the question's author may accept, and never an answer they wrote
/// themselves. The answer's author hears about it once the flags are
/// committed.
pub fn accept_answer(
    db: &Database,
    bus: &SharedBus,
    actor: &str,
    answer_id: Uuid,
) -> Result<AcceptOutcome, StoreError> {
    db.transaction(|uow| {
        let answer = require_answer(uow, answer_id)?;
        let question = require_question(uow, answer.question_id)?;

        if question.author != actor {
            return Ok(AcceptOutcome::Denied {
                message: "Only the author of the question can accept an answer.".into(),
            });
        }
        if answer.author == actor {
            return Ok(AcceptOutcome::Denied {
                message: "You can't accept your own answer.".into(),
            });
        }

        let accepted = update_accept_answer(uow, answer_id)?;
        let actor = require_user(uow, actor)?;
        notify(
            uow,
            bus,
            &actor,
            &Recipients::Single(accepted.author.clone()),
            &Notice::new(Verb::AcceptedAnswer, EventKey::SocialUpdate)
                .target(question.id)
                .object(ObjectRef::Answer(accepted.id)),
        )?;

        info!("{} accepted answer {} on {}", actor.username, accepted.id, question.id);
        Ok(AcceptOutcome::Accepted(accepted))
    })
}

// -- Handlers --

pub async fn vote_question(
    State(state): State<AppState>,
    Path(question_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<Json<VoteResponse>> {
    vote_handler(state, Target::Question(question_id), claims, req).await
}

pub async fn vote_answer(
    State(state): State<AppState>,
    Path(answer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<Json<VoteResponse>> {
    vote_handler(state, Target::Answer(answer_id), claims, req).await
}

async fn vote_handler(
    state: AppState,
    target: Target,
    claims: Claims,
    req: VoteRequest,
) -> ApiResult<Json<VoteResponse>> {
    let outcome = blocking(&state, move |s| {
        Ok(vote(&s.db, target, &claims.username, req.value.as_bool())?)
    })
    .await?;
    Ok(Json(outcome.into()))
}

pub async fn accept(
    State(state): State<AppState>,
    Path(answer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Answer>> {
    let outcome = blocking(&state, move |s| {
        Ok(accept_answer(&s.db, &s.bus, &claims.username, answer_id)?)
    })
    .await?;

    match outcome {
        AcceptOutcome::Accepted(answer) => Ok(Json(answer)),
        AcceptOutcome::Denied { message } => Err(ApiError::Denied(message)),
    }
}
