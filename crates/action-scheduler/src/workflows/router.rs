use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use crate::error::AppError;
use crate::store::{ActionRule, ActionStore, Case, UacQidLink};
use crate::transport::{DeadLetter, InMemoryExchange, InboundQueue};
use crate::workflows::fulfilment::{PrintInstruction, PRINTER_ROUTING_KEY};

/// Handles shared by the ingress and inspection endpoints.
pub struct ActionRouterState<S> {
    pub store: Arc<S>,
    pub case_queue: Arc<InboundQueue>,
    pub fulfilment_queue: Arc<InboundQueue>,
    pub exchange: Arc<InMemoryExchange>,
}

impl<S> Clone for ActionRouterState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            case_queue: self.case_queue.clone(),
            fulfilment_queue: self.fulfilment_queue.clone(),
            exchange: self.exchange.clone(),
        }
    }
}

/// Router publishing raw payloads onto the inbound queues and exposing store views.
pub fn action_router<S>(state: ActionRouterState<S>) -> Router
where
    S: ActionStore + 'static,
{
    Router::new()
        .route("/api/v1/events", post(publish_event_handler::<S>))
        .route("/api/v1/fulfilments", post(publish_fulfilment_handler::<S>))
        .route(
            "/api/v1/action-rules",
            get(list_action_rules_handler::<S>).post(create_action_rule_handler::<S>),
        )
        .route("/api/v1/cases/:case_ref", get(case_handler::<S>))
        .route("/api/v1/print-instructions", get(print_instructions_handler::<S>))
        .route(
            "/api/v1/dead-letters",
            get(dead_letters_handler::<S>).delete(drain_dead_letters_handler::<S>),
        )
        .with_state(state)
}

fn accepted(queue: &InboundQueue, body: Bytes) -> Result<Response, AppError> {
    let delivery_tag = queue.publish(body.to_vec())?;
    let payload = json!({
        "queue": queue.name(),
        "deliveryTag": delivery_tag,
    });
    Ok((StatusCode::ACCEPTED, Json(payload)).into_response())
}

pub(crate) async fn publish_event_handler<S>(
    State(state): State<ActionRouterState<S>>,
    body: Bytes,
) -> Result<Response, AppError>
where
    S: ActionStore + 'static,
{
    accepted(&state.case_queue, body)
}

pub(crate) async fn publish_fulfilment_handler<S>(
    State(state): State<ActionRouterState<S>>,
    body: Bytes,
) -> Result<Response, AppError>
where
    S: ActionStore + 'static,
{
    accepted(&state.fulfilment_queue, body)
}

/// Registers an action rule. A rule that has already triggered cannot be replaced.
pub(crate) async fn create_action_rule_handler<S>(
    State(state): State<ActionRouterState<S>>,
    Json(rule): Json<ActionRule>,
) -> Result<Response, AppError>
where
    S: ActionStore + 'static,
{
    state
        .store
        .transaction(|tx| tx.save_action_rule(rule.clone()))?;
    Ok((StatusCode::CREATED, Json(rule)).into_response())
}

pub(crate) async fn list_action_rules_handler<S>(
    State(state): State<ActionRouterState<S>>,
) -> Result<Response, AppError>
where
    S: ActionStore + 'static,
{
    let rules = state.store.transaction(|tx| tx.action_rules())?;
    Ok((StatusCode::OK, Json(rules)).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CaseView {
    case: Case,
    uac_qid_links: Vec<UacQidLink>,
}

pub(crate) async fn case_handler<S>(
    State(state): State<ActionRouterState<S>>,
    Path(case_ref): Path<i64>,
) -> Result<Response, AppError>
where
    S: ActionStore + 'static,
{
    let view = state.store.transaction(|tx| {
        let Some(case) = tx.case_by_ref(case_ref)? else {
            return Err(AppError::CaseNotFound(case_ref));
        };
        let uac_qid_links = tx.uac_qid_links_for_case(&case.case_id)?;
        Ok(CaseView {
            case,
            uac_qid_links,
        })
    })?;

    Ok((StatusCode::OK, Json(view)).into_response())
}

pub(crate) async fn print_instructions_handler<S>(
    State(state): State<ActionRouterState<S>>,
) -> Result<Response, AppError>
where
    S: ActionStore + 'static,
{
    let instructions = state
        .exchange
        .messages()
        .into_iter()
        .filter(|message| message.routing_key == PRINTER_ROUTING_KEY)
        .map(|message| serde_json::from_value::<PrintInstruction>(message.body))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((StatusCode::OK, Json(instructions)).into_response())
}

pub(crate) async fn dead_letters_handler<S>(
    State(state): State<ActionRouterState<S>>,
) -> Response
where
    S: ActionStore + 'static,
{
    let mut dead_letters: Vec<DeadLetter> = state.case_queue.dead_letters();
    dead_letters.extend(state.fulfilment_queue.dead_letters());
    (StatusCode::OK, Json(dead_letters)).into_response()
}

pub(crate) async fn drain_dead_letters_handler<S>(
    State(state): State<ActionRouterState<S>>,
) -> Response
where
    S: ActionStore + 'static,
{
    let mut dead_letters: Vec<DeadLetter> = state.case_queue.take_dead_letters();
    dead_letters.extend(state.fulfilment_queue.take_dead_letters());
    (StatusCode::OK, Json(dead_letters)).into_response()
}
