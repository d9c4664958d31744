use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware,
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use secrecy::SecretString;

pub(crate) mod email;
pub mod error;
pub mod handlers;
mod openapi;

use self::email::{LogMailer, Mailer, ResendMailer};
use self::handlers::auth::{self, password::BcryptHasher, tokens::TokenService, AuthConfig, AuthState};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Connect, migrate, and serve until interrupted.
///
/// # Errors
/// Returns an error if the database is unreachable, migrations fail, or the
/// server fails to start.
pub async fn new(
    port: u16,
    dsn: String,
    config: AuthConfig,
    access_secret: SecretString,
    refresh_secret: SecretString,
    resend_api_key: Option<SecretString>,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let mailer: Arc<dyn Mailer> = match resend_api_key {
        Some(api_key) => Arc::new(ResendMailer::new(api_key, config.app_url().to_string())?),
        None => {
            info!("no mail API key configured, verification codes will be logged");
            Arc::new(LogMailer)
        }
    };

    let tokens = TokenService::new(
        access_secret,
        refresh_secret,
        config.access_ttl_minutes(),
        config.refresh_ttl_days(),
    );

    let origin = frontend_origin(config.app_url())?;
    let state = Arc::new(AuthState::new(
        config,
        tokens,
        Arc::new(BcryptHasher::new()),
        mailer,
    ));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        // credentials mode carries the refresh cookie, so the origin must be exact
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true);

    let protected = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route_layer(middleware::from_fn(auth::require_auth));

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/auth/register/initiate", post(auth::register_initiate))
        .route("/api/auth/register/complete", post(auth::register_complete))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
        .merge(protected)
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(app_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(app_url).with_context(|| format!("Invalid app URL: {app_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("App URL must include a valid host: {app_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build app origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_strips_path_and_default_port() {
        let origin = frontend_origin("http://localhost:3000/app").unwrap();
        assert_eq!(origin, "http://localhost:3000");

        let origin = frontend_origin("https://bsocial.dev:443/").unwrap();
        assert_eq!(origin, "https://bsocial.dev");
    }

    #[test]
    fn origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }

    #[test]
    fn user_agent_carries_name_and_version() {
        assert!(APP_USER_AGENT.starts_with("bsocial/"));
    }
}
