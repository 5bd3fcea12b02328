use actix_web::{web, App, HttpServer};
use std::time::Duration;

use ask_bridge::config::BridgeConfig;
use ask_bridge::handlers::AppState;
use ask_bridge::hub::PendingCount;
use ask_bridge::routes::configure_routes;

use super::logging::init_test_logging;

/// Application state with its own hub and no peer, so nothing leaves the process
pub struct TestApp {
    pub config: BridgeConfig,
    pub app_state: web::Data<AppState>,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        Self::with_peer(None).await
    }

    /// Application state that forwards to `peer_url` while no UI is attached
    pub async fn with_peer(peer_url: Option<String>) -> Self {
        init_test_logging();

        let mut config = BridgeConfig::default();
        config.peer.url = peer_url;
        config.questions.poll_interval_ms = 20;

        let app_state = web::Data::new(AppState::start(&config).expect("Failed to start app state"));

        Self { config, app_state }
    }

    /// Serve the full API on an ephemeral local port and return its base URL
    pub fn serve(&self) -> String {
        let app_state = self.app_state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(app_state.clone())
                .configure(configure_routes)
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("Failed to bind test server");
        let addr = server.addrs()[0];
        actix_rt::spawn(server.run());

        format!("http://{addr}")
    }

    pub fn app_state(&self) -> &web::Data<AppState> {
        &self.app_state
    }

    pub async fn pending_count(&self) -> usize {
        self.app_state.hub.send(PendingCount).await.unwrap()
    }

    /// Wait until `expected` questions are pending, panicking after two seconds
    pub async fn wait_for_pending(&self, expected: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.pending_count().await != expected {
            if tokio::time::Instant::now() > deadline {
                panic!("Timed out waiting for {expected} pending questions");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
