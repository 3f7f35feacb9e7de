#![allow(clippy::upper_case_acronyms)]

use std::sync::Arc;

use pingora::services::listening::Service;
use pingora_core::server::{configuration::Opt, Server};

use statsgate::{
    config::{Config, Statsgate},
    core::Readiness,
    fetcher::HttpFetcher,
    logging::Logger,
    service::{BffHttpApp, StatusHttpApp},
    session::JwtSessionProvider,
};

fn main() {
    // Load configuration and command-line arguments
    let cli_options = Opt::parse_args();
    let config = match Config::load_yaml_with_opt_override(&cli_options) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    let logger = if let Some(log_cfg) = &config.statsgate.log {
        let logger = Logger::new(log_cfg.clone());
        logger.init_env_logger();
        Some(logger)
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .init();
        None
    };

    let readiness = Readiness::new();

    log::info!("Loading session provider...");
    let sessions = match JwtSessionProvider::from_config(&config.statsgate.session) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            eprintln!("Failed to build session provider: {e}");
            std::process::exit(1);
        }
    };

    log::info!("Loading upstream...");
    let fetcher = match HttpFetcher::try_from(config.statsgate.upstream.clone()) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => {
            eprintln!("Failed to load upstream: {e}");
            std::process::exit(1);
        }
    };

    log::info!("Loading routes...");
    let app = match BffHttpApp::new(sessions, fetcher.clone()) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to build routes: {e}");
            std::process::exit(1);
        }
    };

    log::info!("Adding listeners...");
    let http_service = match app.bff_http_service(&config.statsgate.listeners) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Failed to add listeners: {e}");
            std::process::exit(1);
        }
    };

    // Create server instance
    let mut statsgate_server = Server::new_with_opt_and_conf(Some(cli_options), config.pingora);

    if let Some(log_service) = logger {
        log::info!("Adding log sync service...");
        statsgate_server.add_service(log_service);
    }

    add_optional_services(
        &mut statsgate_server,
        &config.statsgate,
        readiness.clone(),
        fetcher,
    );

    log::info!("Bootstrapping...");
    statsgate_server.bootstrap();
    log::info!("Bootstrapped. Adding Services...");
    statsgate_server.add_service(http_service);
    readiness.mark_ready();

    log::info!("Starting Server...");
    statsgate_server.run_forever();
}

/// Add optional services (Prometheus, Status)
fn add_optional_services(
    server: &mut Server,
    cfg: &Statsgate,
    readiness: Readiness,
    fetcher: Arc<HttpFetcher>,
) {
    if let Some(prometheus_cfg) = &cfg.prometheus {
        log::info!("Adding Prometheus HTTP...");
        let mut prometheus_service_http = Service::prometheus_http_service();
        prometheus_service_http.add_tcp(&prometheus_cfg.address.to_string());
        server.add_service(prometheus_service_http);
    }

    if let Some(status_cfg) = &cfg.status {
        log::info!("Adding Status HTTP...");
        let status_service_http =
            StatusHttpApp::new(readiness, fetcher).status_http_service(status_cfg);
        server.add_service(status_service_http);
    }
}
