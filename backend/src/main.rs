use std::sync::Arc;

use axum::http::Method;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, Level};

use activity_coordinator_backend::config::{Config, TransportKind};
use activity_coordinator_backend::db::DbConnection;
use activity_coordinator_backend::domain::activity_service::ActivityService;
use activity_coordinator_backend::domain::child_service::ChildService;
use activity_coordinator_backend::domain::session_service::SessionService;
use activity_coordinator_backend::rest::{api_router, AppState};
use activity_coordinator_backend::transport::mqtt::MqttTransportFactory;
use activity_coordinator_backend::transport::socket::SocketTransportFactory;
use activity_coordinator_backend::transport::TransportFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let config = Config::load()?;

    info!("Setting up database");
    let db = DbConnection::new(&config.database_url).await?;

    let activities = ActivityService::new(db.clone());
    activities.seed_catalog().await?;

    let transports: Arc<dyn TransportFactory> = match config.transport {
        TransportKind::Mqtt => {
            info!("Using MQTT transport via {}:{}", config.mqtt_host, config.mqtt_port);
            Arc::new(MqttTransportFactory::new(&config.mqtt_host, config.mqtt_port))
        }
        TransportKind::Socket => {
            info!("Using socket transport via {}", config.socket_addr);
            Arc::new(SocketTransportFactory::new(&config.socket_addr))
        }
    };

    let state = AppState {
        children: ChildService::new(db.clone()),
        activities,
        sessions: SessionService::new(db, transports, config.result_timeout()),
    };

    // CORS setup to allow the frontend to make requests
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new().nest("/api", api_router(state)).layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
