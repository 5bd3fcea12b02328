//! Route table shared by the daemon and the integration tests.

use crate::handlers;
use crate::websocket::websocket_handler;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health_check))
            .route("/questions", web::post().to(handlers::ask_question))
            .route("/questionnaires", web::post().to(handlers::ask_questionnaire))
            .route("/actions", web::post().to(handlers::submit_action))
            .route("/answers/{question_id}", web::get().to(handlers::get_answer))
            .route(
                "/composite-answers/{composite_id}",
                web::get().to(handlers::get_composite_answer),
            )
            .route(
                "/bridge/messages",
                web::post().to(handlers::receive_bridge_message),
            ),
    )
    .route("/ws", web::get().to(websocket_handler));
}
