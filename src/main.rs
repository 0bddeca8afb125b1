use anyhow::Result;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use course_generator::{
    api::{create_router, AppState},
    config::Config,
    course_service::CourseService,
    log_system_event,
    logging::init_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    // Keep the guard alive so the non-blocking file writer flushes on exit
    let _guard = init_logging(&config.logging)?;
    config.validate()?;

    log_system_event!(startup, component = "server", "Starting course generator server");

    let course_service = CourseService::from_config(&config);
    let state = AppState { course_service };

    let app = Router::new()
        .merge(create_router(state))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    log_system_event!(startup, component = "server", format!("Listening on {}", addr));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    log_system_event!(shutdown, component = "server", "Server stopped");
    Ok(())
}
