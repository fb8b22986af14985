use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{CredentialHasher, RoleGate, TokenAuthenticator};
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::{JwtMiddleware, RoleMiddleware};
use crate::principals::{PrincipalStore, Role};
use crate::routes::{get_current_user, health_check, login, logout, refresh, signup};

pub fn run(
    listener: TcpListener,
    principals: Arc<dyn PrincipalStore>,
    authenticator: TokenAuthenticator,
    hasher: CredentialHasher,
) -> Result<Server, std::io::Error> {
    let principals_data: web::Data<dyn PrincipalStore> = web::Data::from(principals.clone());
    let authenticator_data = web::Data::new(authenticator.clone());
    let hasher_data = web::Data::new(hasher);

    let server = HttpServer::new(move || {
        // Malformed JSON bodies get the same error envelope as validation failures
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            AppError::Validation(ValidationError::InvalidFormat(err.to_string())).into()
        });

        App::new()
            // Global middleware
            .wrap(Logger::default())      // Standard logging
            .wrap(LoggerMiddleware)       // Custom logging

            // Shared state
            .app_data(json_config)
            .app_data(principals_data.clone())
            .app_data(authenticator_data.clone())
            .app_data(hasher_data.clone())

            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/v1/auth")
                    // Public routes
                    .route("/signup", web::post().to(signup))
                    .route("/login", web::post().to(login))

                    // Refresh token required
                    .service(
                        web::resource("/refresh_token")
                            .route(web::get().to(refresh))
                            .wrap(JwtMiddleware::refresh(authenticator.clone())),
                    )

                    // Access token required
                    .service(
                        web::resource("/logout")
                            .route(web::get().to(logout))
                            .wrap(JwtMiddleware::access(authenticator.clone())),
                    )

                    // Access token and role required; the JWT check wraps last so it runs first
                    .service(
                        web::resource("/me")
                            .route(web::get().to(get_current_user))
                            .wrap(RoleMiddleware::new(
                                RoleGate::new([Role::User, Role::Admin]),
                                principals.clone(),
                            ))
                            .wrap(JwtMiddleware::access(authenticator.clone())),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
