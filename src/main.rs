use log::error;
use timetable_ga::config::{self, GaConfig};
use timetable_ga::server;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match GaConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server::run_server(config, &config::bind_addr()).await {
        error!("Server stopped: {}", e);
        std::process::exit(1);
    }
}
