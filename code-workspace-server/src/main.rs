use code_workspace_server::{ServerConfig, build_workspace, create_app};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing; `LOG_FORMAT=json` switches to structured output
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "code_workspace=debug,code_workspace_server=debug,tower_http=debug".into()
    });

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let workspace = build_workspace(&config)?;
    let restored = workspace.snapshot().files.len();
    let app = create_app(workspace);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("Code workspace service starting on {}", addr);
    info!("Execution engine: {}", config.engine.execute_url());
    info!("Restored {} file(s); default language {}", restored, config.default_language);

    axum::serve(listener, app).await?;

    Ok(())
}
