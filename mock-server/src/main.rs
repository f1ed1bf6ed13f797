use crowd_mock_server::{Directory, FIXTURE_APP_NAME, FIXTURE_APP_PASSWORD};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8095".to_string());
    let app_name = std::env::var("CROWD_APP_NAME").unwrap_or_else(|_| FIXTURE_APP_NAME.to_string());
    let app_password =
        std::env::var("CROWD_APP_PASSWORD").unwrap_or_else(|_| FIXTURE_APP_PASSWORD.to_string());

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, %app_name, "mock Crowd listening");
    crowd_mock_server::run_with(listener, Directory::fixture().with_application(&app_name, &app_password)).await
}
