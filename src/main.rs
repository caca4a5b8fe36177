use actix_web::{App, HttpServer, middleware::Logger, web};
use std::sync::Arc;

use crate::backend::MerchantClient;
use crate::checkout::CheckoutFlow;
use crate::config::Config;
use crate::notifier::MessengerNotifier;
use crate::router::EventRouter;
use crate::server::AppState;
use crate::session::InMemorySessionStore;
use crate::templates::Templates;

mod backend;
mod checkout;
mod config;
mod error;
mod model;
mod notifier;
mod router;
mod server;
mod session;
mod templates;
#[cfg(test)]
mod testing;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(std::io::Error::other)?;

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(std::io::Error::other)?;

    let backend = Arc::new(MerchantClient::new(
        http.clone(),
        &config.merchant_url,
        &config.channel_namespace,
    ));
    let notifier = Arc::new(MessengerNotifier::new(
        http,
        &config.graph_api_url,
        &config.page_access_token,
    ));
    let flow = CheckoutFlow::new(
        backend,
        notifier.clone(),
        config.fees,
        config.catalog_page_size,
    );
    let router = EventRouter::new(
        Arc::new(InMemorySessionStore::new()),
        flow,
        notifier,
        Templates::new(&config.merchant_url, config.fees),
        config.checkout_mode,
    );

    let state = web::Data::new(AppState {
        router,
        verify_token: config.verify_token.clone(),
    });

    log::info!("🚀 Masterpass Messenger Bot starting on port {}", config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(server::configure)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await
}
