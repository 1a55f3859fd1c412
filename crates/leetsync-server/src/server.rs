use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::io;

use crate::handlers;
use crate::state::AppState;

pub fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health::handler))
        .route("/command", web::post().to(handlers::command::handler))
        .service(
            web::scope("/page")
                .route("/snapshot", web::post().to(handlers::page::snapshot))
                .route("/editor", web::post().to(handlers::page::editor))
                .route("/signal", web::post().to(handlers::page::signal)),
        );
}

/// Serves on loopback only. One worker keeps command handling on a single
/// execution context.
pub async fn run_server(port: u16, state: web::Data<AppState>) -> io::Result<()> {
    log::info!("Listening on http://127.0.0.1:{}", port);
    let shutdown = state.shutdown.clone();

    let result = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .configure(app_config)
    })
    .workers(1)
    .bind(("127.0.0.1", port))?
    .run()
    .await;

    shutdown.cancel();
    result
}
