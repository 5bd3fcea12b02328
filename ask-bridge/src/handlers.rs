use crate::client::{QuestionClient, RemoteAnswerClient};
use crate::config::BridgeConfig;
use crate::dispatcher::QuestionDispatcher;
use crate::error::{AppError, AppResult};
use crate::hub::{
    HubSettings, InboundAction, PendingCount, PollAnswer, PollCompositeAnswer, QuestionHub,
    RemoteCancel, RemoteSurface,
};
use crate::transport::{HttpForwarder, SurfaceForwarder, TransportBridge};
use crate::websocket::{WebSocketBroadcaster, WebSocketServer};
use actix::{Actor, Addr};
use actix_web::{web, HttpResponse, Result};
use shared_types::{
    ActionMessage, ActionResponse, AskQuestionRequest, AskQuestionnaireRequest, ForwardAccepted,
    HealthResponse, OutboundMessage, QuestionnaireAnswers,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub struct AppState {
    pub hub: Addr<QuestionHub>,
    pub ws_server: Addr<WebSocketServer>,
    pub client: QuestionClient,
    pub start_time: SystemTime,
}

impl AppState {
    /// Start the WebSocket server and question hub actors for `config`.
    /// Must be called from within a running actix system.
    pub fn start(config: &BridgeConfig) -> AppResult<Self> {
        let ws_server = WebSocketServer::default();
        let clients = ws_server.client_counter();
        let ws_server = ws_server.start();
        let connections = Arc::new(WebSocketBroadcaster::new(ws_server.clone(), clients));

        let (forwarder, remote) = match config.peer.url() {
            Some(peer_url) => {
                let timeout = config.peer.forward_timeout();
                let forwarder: Arc<dyn SurfaceForwarder> =
                    Arc::new(HttpForwarder::new(peer_url, timeout)?);
                (Some(forwarder), Some(RemoteAnswerClient::new(peer_url, timeout)?))
            }
            None => (None, None),
        };

        let transport =
            TransportBridge::new(connections, forwarder, config.questions.surface_buffer);
        let hub = QuestionHub::new(
            QuestionDispatcher::new(transport),
            HubSettings::from(&config.questions),
        )
        .start();
        let client = QuestionClient::new(
            hub.clone(),
            remote,
            config.questions.default_timeout(),
            config.questions.poll_interval(),
        );

        Ok(Self {
            hub,
            ws_server,
            client,
            start_time: SystemTime::now(),
        })
    }
}

pub async fn health_check(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let uptime = data
        .start_time
        .elapsed()
        .map_err(|e| AppError::Internal(format!("Failed to calculate uptime: {e}")))?
        .as_secs();
    let pending_questions = data.hub.send(PendingCount).await?;

    let status = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime,
        pending_questions,
    };

    Ok(HttpResponse::Ok().json(status))
}

/// Ask one question and hold the request open until it resolves
pub async fn ask_question(
    data: web::Data<AppState>,
    request: web::Json<AskQuestionRequest>,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    tracing::info!(question_id = %request.question.id, "Question asked over HTTP");

    let answer = data
        .client
        .ask(request.question, request.timeout_secs.map(Duration::from_secs))
        .await?;

    Ok(HttpResponse::Ok().json(answer))
}

pub async fn ask_questionnaire(
    data: web::Data<AppState>,
    request: web::Json<AskQuestionnaireRequest>,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    tracing::info!(
        composite_id = ?request.composite_id,
        questions = request.questions.len(),
        "Questionnaire asked over HTTP"
    );

    let answers = data
        .client
        .ask_all(
            request.composite_id,
            request.questions,
            request.timeout_secs.map(Duration::from_secs),
        )
        .await?;

    Ok(HttpResponse::Ok().json(answers))
}

/// UI action delivered over HTTP instead of the WebSocket
pub async fn submit_action(
    data: web::Data<AppState>,
    action: web::Json<ActionMessage>,
) -> Result<HttpResponse, AppError> {
    let handled = data.hub.send(InboundAction(action.into_inner())).await?;
    Ok(HttpResponse::Ok().json(ActionResponse { handled }))
}

pub async fn get_answer(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let question_id = path.into_inner();

    match data
        .hub
        .send(PollAnswer {
            question_id: question_id.clone(),
        })
        .await?
    {
        Some(answer) => Ok(HttpResponse::Ok().json(answer)),
        None => Err(AppError::NotFound(format!(
            "No answer available for question {question_id}"
        ))),
    }
}

pub async fn get_composite_answer(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let composite_id = path.into_inner();

    match data
        .hub
        .send(PollCompositeAnswer {
            composite_id: composite_id.clone(),
        })
        .await?
    {
        Some(answers) => Ok(HttpResponse::Ok().json(QuestionnaireAnswers {
            composite_id,
            answers,
        })),
        None => Err(AppError::NotFound(format!(
            "No answers available for questionnaire {composite_id}"
        ))),
    }
}

/// Target for surfaces and cancel notices forwarded by a process without a UI
pub async fn receive_bridge_message(
    data: web::Data<AppState>,
    message: web::Json<OutboundMessage>,
) -> Result<HttpResponse, AppError> {
    match message.into_inner() {
        OutboundMessage::Surface(surface) => {
            let surface_id = surface.surface_id.clone();
            let registered = data.hub.send(RemoteSurface(surface)).await?;
            tracing::info!(surface_id = %surface_id, registered, "Forwarded surface received");

            Ok(HttpResponse::Accepted().json(ForwardAccepted {
                surface_id,
                rebroadcast: true,
            }))
        }
        OutboundMessage::Cancel(notice) => {
            let surface_id = notice.surface_id.clone();
            let removed = data.hub.send(RemoteCancel(notice)).await?;
            tracing::info!(surface_id = %surface_id, removed, "Forwarded cancel received");

            Ok(HttpResponse::Accepted().json(ForwardAccepted {
                surface_id,
                rebroadcast: true,
            }))
        }
        other => Err(AppError::InvalidRequest(format!(
            "Unsupported forwarded message: {other:?}"
        ))),
    }
}
