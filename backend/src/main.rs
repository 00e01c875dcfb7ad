use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};

use friendship_backend::config::Config;
use friendship_backend::{build_service, routes};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            log::error!("invalid configuration: {}", err);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()));
        }
    };

    let service = match build_service(&config).await {
        Ok(service) => Arc::new(service),
        Err(err) => {
            log::error!("unable to start: {}", err);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()));
        }
    };

    let http_server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Compress::default())
            .wrap(middleware::Logger::default())
            .app_data(web::Data::from(service.clone()))
            .configure(routes::configure)
    });

    log::info!("starting HTTP server at {}", config.http_address);
    match &config.tls {
        Some(tls) => {
            let mut builder = SslAcceptor::mozilla_intermediate(SslMethod::tls())?;
            builder.set_private_key_file(&tls.key_file, SslFiletype::PEM)?;
            builder.set_certificate_chain_file(&tls.cert_file)?;
            http_server
                .bind_openssl(&config.http_address, builder)?
                .run()
                .await
        }
        None => http_server.bind(&config.http_address)?.run().await,
    }
}
