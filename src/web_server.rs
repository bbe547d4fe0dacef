use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};

use crate::config::ServerConfig;
use crate::queue::JobQueue;
use crate::routes::{get_languages_handler, json_error_handler, post_execute_handler};

/// Largest accepted request body; submissions carry source code and all cases
const MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

pub fn build_server(server_config: ServerConfig, job_queue: Arc<JobQueue>) -> std::io::Result<Server> {
    let job_queue = web::Data::from(job_queue);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(job_queue.clone())
            .app_data(
                web::JsonConfig::default()
                    .limit(MAX_PAYLOAD_BYTES)
                    .error_handler(json_error_handler),
            )
            .wrap(middleware::Logger::default())
            .service(post_execute_handler)
            .service(get_languages_handler)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(12345),
    ))?
    .run();

    Ok(server)
}
