//! Forecast CLI - on-demand forecast for one device
//!
//! Reads hourly history from the SQLite store, prints the forecast as JSON
//! on stdout and records it in the `forecasts` table.
//!
//! Exit codes: 0 success, 2 rejected request (short history, bad horizon),
//! 1 any other failure.

use clap::Parser;
use dotenv::dotenv;
use powerwatch::config::ServiceConfig;
use powerwatch::forecast::{DEFAULT_HORIZON_HOURS, MODEL_VERSION};
use powerwatch::service::MlService;
use powerwatch::sinks::SqliteStore;
use powerwatch::window::WindowStore;
use serde_json::json;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "forecast", about = "Forecast hourly power draw for a device")]
struct Args {
    /// Device to forecast
    #[arg(short, long)]
    device: String,

    /// Hours ahead to forecast
    #[arg(long, default_value_t = DEFAULT_HORIZON_HOURS)]
    horizon: u32,

    /// SQLite database (defaults to POWERWATCH_DB_PATH)
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();

    let db_path = match args.db {
        Some(path) => path,
        None => match ServiceConfig::from_env() {
            Ok(config) => config.db_path,
            Err(e) => {
                log::error!("❌ {}", e);
                return ExitCode::FAILURE;
            }
        },
    };

    let store = match SqliteStore::new(&db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log::error!("❌ Failed to open {}: {}", db_path, e);
            return ExitCode::FAILURE;
        }
    };

    let service = MlService::new(Arc::new(WindowStore::with_defaults()), store.clone(), store);

    match service.forecast(&args.device, args.horizon).await {
        Ok(points) => {
            let body = json!({
                "device_id": args.device,
                "model_version": MODEL_VERSION,
                "forecast": points,
            });
            println!("{}", body);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let body = json!({ "status": e.status_code(), "detail": e.to_string() });
            println!("{}", body);
            if e.status_code() == 400 {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
