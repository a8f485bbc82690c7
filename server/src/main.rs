mod config;
mod cookies;
mod edge;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use authkit::AuthBackend;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::ServerConfig::from_env().expect("invalid configuration");

    let backend = services::gotrue::HttpAuthBackend::new(&config.backend).expect("auth backend client init failed");
    tracing::info!(
        backend = %config.backend.url,
        public_entry = config.routes.public_entry(),
        private_entry = config.routes.private_entry(),
        fail_policy = ?config.edge.fail_policy,
        "auth backend configured"
    );

    let state = state::AppState::new(
        Arc::new(backend) as Arc<dyn AuthBackend>,
        config.routes,
        config.edge,
        config.cookie_secure,
    );

    let app = routes::app(state, &config.site_dir);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, site_dir = %config.site_dir.display(), "server listening");
    axum::serve(listener, app).await.expect("server failed");
}
