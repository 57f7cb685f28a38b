use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use pawscan_api::config::{InferenceConfig, ServiceConfig};
use pawscan_api::routes::configure_routes;
use pawscan_api::startup::{StartupError, load_predictor};
use pawscan_api::state::AppState;
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let service_config = ServiceConfig::from_env().map_err(StartupError::from)?;
    let inference_config = InferenceConfig::load(&service_config.inference_config_path)
        .map_err(StartupError::from)?;
    log::info!("Model path: {}", service_config.model_path.display());
    log::info!("Labels path: {}", service_config.labels_path.display());

    let predictor = match load_predictor(
        &service_config.model_path,
        &service_config.labels_path,
        &inference_config,
    ) {
        Ok(predictor) => predictor,
        Err(e) => {
            log::error!("Failed to load model at startup: {}", e);
            return Err(e.into());
        }
    };

    let state = web::Data::new(AppState::new(predictor, inference_config));
    let bind_address = service_config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(state.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
