pub mod api;
mod config;
mod fanout;
mod models;
mod providers;
mod store;
mod tracker;

use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use fanout::FanoutHub;
use providers::osrm::OsrmClient;
use store::{Network, VehicleStateStore};
use tracker::{arrival::ArrivalDetector, resolver::ProximityResolver, Tracker};

#[derive(OpenApi)]
#[openapi(
    info(title = "Fleet Live API", version = "0.1.0"),
    paths(
        api::reports::submit_report,
        api::vehicles::list_vehicles,
        api::vehicles::get_vehicle,
        api::vehicles::find_vehicles_near,
        api::waypoints::list_waypoints,
    ),
    components(schemas(
        api::ErrorResponse,
        api::reports::ReportAck,
        api::vehicles::VehicleListResponse,
        api::vehicles::NearbyRequest,
        api::vehicles::NearbyVehicle,
        api::vehicles::NearbyResponse,
        api::waypoints::WaypointListResponse,
        models::Position,
        models::Waypoint,
        models::PositionReport,
        models::VehicleState,
        models::VehicleStatus,
    )),
    tags(
        (name = "reports", description = "Position report ingestion"),
        (name = "vehicles", description = "Live vehicle state"),
        (name = "waypoints", description = "Configured network waypoints")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    tracing::info!(
        waypoints = config.waypoints.len(),
        routes = config.routes.len(),
        "Loaded configuration"
    );

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Wire up the tracking pipeline
    let network = Arc::new(Network::from_config(&config));
    let store = Arc::new(VehicleStateStore::new(network.clone()));
    let hub = Arc::new(FanoutHub::new());

    let (routing_requests_tx, _) = broadcast::channel(1000);
    let routing = Arc::new(
        OsrmClient::new(&config.routing, routing_requests_tx.clone())
            .expect("Failed to initialize routing client"),
    );
    let resolver = Arc::new(ProximityResolver::new(network.clone(), routing));
    let detector = Arc::new(ArrivalDetector::new(
        config.arrival_threshold_meters,
        store.clone(),
        network.clone(),
    ));
    let tracker = Arc::new(Tracker::new(
        store.clone(),
        resolver,
        detector,
        hub.clone(),
    ));

    let state = api::AppState {
        tracker,
        store,
        network,
        hub,
        diagnostics: api::ws::DiagnosticsState::new(routing_requests_tx),
    };

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let bind_addr = config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", bind_addr, e));

    tracing::info!("Server running on http://{}", bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Fleet Live API"
}
