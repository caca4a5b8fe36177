use actix_web::{HttpResponse, Result, web};
use serde::Deserialize;

use crate::router::{EventRouter, WebhookPayload};

pub struct AppState {
    pub router: EventRouter,
    pub verify_token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

pub async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Masterpass Messenger Bot"
    })))
}

pub async fn index() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Masterpass Messenger Bot API",
        "status": "running",
        "endpoints": {
            "webhook": "/webhook",
            "health": "/health"
        }
    })))
}

/// Platform subscription check: echo the challenge when the shared secret matches.
pub async fn verify_webhook(
    query: web::Query<VerifyQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if query.verify_token.as_deref() != Some(state.verify_token.as_str()) {
        log::warn!("Webhook verification failed (mode {:?})", query.mode);
        return Ok(HttpResponse::Forbidden().body("Error, wrong token"));
    }

    log::info!("Webhook verified");
    Ok(HttpResponse::Ok()
        .content_type("text/plain")
        .body(query.challenge.clone().unwrap_or_default()))
}

pub async fn handle_messenger_webhook(
    payload: web::Json<WebhookPayload>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();
    log::debug!(
        "Webhook delivery: object={:?}, entries={}",
        payload.object,
        payload.entry.len()
    );

    for event in payload.entry.iter().flat_map(|entry| entry.events()) {
        state.router.handle(&event).await;
    }

    Ok(HttpResponse::Ok().finish())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/health", web::get().to(health_check))
        .route("/webhook", web::get().to(verify_webhook))
        .route("/webhook", web::post().to(handle_messenger_webhook));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::CheckoutFlow;
    use crate::config::{CheckoutMode, Fees};
    use crate::session::{InMemorySessionStore, SessionStore};
    use crate::templates::Templates;
    use crate::testing::{Call, FakeBackend, RecordingNotifier};
    use actix_web::{App, http::StatusCode, test};
    use std::sync::Arc;

    fn state(
        sessions: Arc<InMemorySessionStore>,
        backend: Arc<FakeBackend>,
        notifier: Arc<RecordingNotifier>,
    ) -> web::Data<AppState> {
        let flow = CheckoutFlow::new(backend, notifier.clone(), Fees::default(), 5);
        let router = EventRouter::new(
            sessions,
            flow,
            notifier,
            Templates::new("http://merchant.test", Fees::default()),
            CheckoutMode::Express,
        );
        web::Data::new(AppState {
            router,
            verify_token: "secret".to_string(),
        })
    }

    fn default_state() -> web::Data<AppState> {
        state(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(FakeBackend::new()),
            Arc::new(RecordingNotifier::default()),
        )
    }

    #[actix_web::test]
    async fn test_verification_echoes_challenge() {
        let app = test::init_service(App::new().app_data(default_state()).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/webhook?hub.mode=subscribe&hub.verify_token=secret&hub.challenge=42")
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, web::Bytes::from_static(b"42"));
    }

    #[actix_web::test]
    async fn test_verification_rejects_wrong_token() {
        let app = test::init_service(App::new().app_data(default_state()).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/webhook?hub.verify_token=nope&hub.challenge=42")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_post_processes_every_event_and_returns_ok() {
        let sessions = Arc::new(InMemorySessionStore::new());
        let backend = Arc::new(FakeBackend::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let app = test::init_service(
            App::new()
                .app_data(state(sessions.clone(), backend.clone(), notifier.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/webhook")
            .set_json(serde_json::json!({
                "object": "page",
                "entry": [
                    { "messaging": [
                        { "sender": { "id": "u1" }, "message": { "text": "hi" } },
                        { "sender": { "id": "u2" }, "postback": { "payload": "product_catalog" } }
                    ]},
                    { "messaging": [
                        { "sender": { "id": "u3" }, "postback": { "payload": "checkout" } }
                    ]}
                ]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let recipients: Vec<String> = notifier.sent().into_iter().map(|(to, _)| to).collect();
        assert_eq!(recipients, vec!["u1", "u2", "u3"]);
        assert_eq!(backend.calls(), vec![Call::ListProducts { page: 0, size: 5 }]);
        assert_eq!(
            sessions.get("u2").await.lock().await.xsrf_token.as_deref(),
            Some("xsrf-1")
        );
    }

    #[actix_web::test]
    async fn test_malformed_event_does_not_reject_batch() {
        let sessions = Arc::new(InMemorySessionStore::new());
        let backend = Arc::new(FakeBackend::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let app = test::init_service(
            App::new()
                .app_data(state(sessions, backend, notifier.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/webhook")
            .set_json(serde_json::json!({
                "object": "page",
                "entry": [
                    { "messaging": [
                        { "message": { "text": "no sender" } },
                        { "sender": { "id": "u1" }, "message": { "text": "hi" } }
                    ]}
                ]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let recipients: Vec<String> = notifier.sent().into_iter().map(|(to, _)| to).collect();
        assert_eq!(recipients, vec!["u1"]);
    }

    #[actix_web::test]
    async fn test_health_check() {
        let app = test::init_service(App::new().app_data(default_state()).configure(configure)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
    }
}
