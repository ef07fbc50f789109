use actix_governor::Governor;
use actix_session::{Session, SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::{Key, SameSite};
use actix_web::http::header;
use actix_web::middleware::Condition;
use actix_web::{App, HttpMessage, HttpRequest, HttpResponse, HttpServer, Responder, web};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use uuid::Uuid;

use learngate::assets::ImageHostAllowList;
use learngate::auth::{AuthService, DefaultHooks};
use learngate::config::AppConfig;
use learngate::dispatch::SmtpDispatcher;
use learngate::error::AuthError;
use learngate::logging::{init_console_tracing, init_tracing};
use learngate::middleware::{SESSION_TOKEN_KEY, SessionAuth};
use learngate::shield::{ProtectionPolicy, governor_config, sliding_window};
use learngate::social::{GITHUB_PROVIDER, GithubProvider};
use learngate::store::{Identity, MemoryAuthStore};

// Window rule applied on top of the base shield policy: OTP and sign-in
// traffic per client fingerprint.
const AUTH_WINDOW_MAX: u32 = 10;
const AUTH_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct OtpRequestBody {
    email: String,
}

#[derive(Debug, Deserialize)]
struct OtpVerifyBody {
    email: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct AdminBody {
    identity_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: String,
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json("learngate is running")
}

/// Issues an OTP challenge and emails the code. The code itself never
/// appears in the response.
async fn request_otp(
    body: web::Json<OtpRequestBody>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    auth.request_otp(&body.email)?;
    Ok(HttpResponse::Ok().json(json!({ "status": "sent" })))
}

/// Verifies a submitted code and opens a session. The token is returned in
/// the body and mirrored into the cookie session for browser clients.
async fn verify_otp(
    body: web::Json<OtpVerifyBody>,
    auth: web::Data<AuthService>,
    session: Session,
) -> Result<HttpResponse, AuthError> {
    let token = auth.verify_otp(&body.email, &body.code)?;
    session.insert(SESSION_TOKEN_KEY, token.clone()).ok();
    Ok(HttpResponse::Ok().json(json!({ "token": token })))
}

/// GitHub OAuth callback: exchanges the authorization code upstream, then
/// links the verified identity and opens a session.
async fn github_callback(
    query: web::Query<CallbackQuery>,
    provider: web::Data<GithubProvider>,
    auth: web::Data<AuthService>,
    session: Session,
) -> Result<HttpResponse, AuthError> {
    let verified = provider.verify_code(&query.code).await?;
    let token = auth.social_sign_in(GITHUB_PROVIDER, &verified.external_id, &verified.email)?;
    session.insert(SESSION_TOKEN_KEY, token.clone()).ok();
    Ok(HttpResponse::Ok().json(json!({ "token": token })))
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

/// Destroys the stored session and purges the cookie.
async fn logout(
    req: HttpRequest,
    session: Session,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let token = bearer_token(&req)
        .or_else(|| session.get::<String>(SESSION_TOKEN_KEY).ok().flatten());
    if let Some(token) = token {
        auth.logout(&token)?;
    }
    session.purge();
    Ok(HttpResponse::NoContent().finish())
}

fn current_identity(req: &HttpRequest) -> Result<Identity, AuthError> {
    req.extensions()
        .get::<Identity>()
        .cloned()
        .ok_or(AuthError::SessionInvalid)
}

async fn grant_admin(
    req: HttpRequest,
    body: web::Json<AdminBody>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let actor = current_identity(&req)?;
    let updated = auth.grant_admin(&actor, body.identity_id)?;
    Ok(HttpResponse::Ok().json(json!({ "identity_id": updated.id, "is_admin": updated.is_admin })))
}

async fn revoke_admin(
    req: HttpRequest,
    body: web::Json<AdminBody>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AuthError> {
    let actor = current_identity(&req)?;
    let updated = auth.revoke_admin(&actor, body.identity_id)?;
    Ok(HttpResponse::Ok().json(json!({ "identity_id": updated.id, "is_admin": updated.is_admin })))
}

/// Trusted remote image hosts, consumed by the front-end asset pipeline.
async fn image_hosts(allow_list: web::Data<ImageHostAllowList>) -> impl Responder {
    HttpResponse::Ok().json(allow_list.patterns())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    match std::env::var("LEARNGATE_LOG_FORMAT").as_deref() {
        Ok("json") => init_tracing("learngate", std::io::stdout),
        _ => init_console_tracing(),
    }

    // Fail fast: no server without a complete configuration
    let config = AppConfig::from_env().map_err(|e| std::io::Error::other(e.to_string()))?;

    // Construct services explicitly, leaf-first
    let store = Arc::new(MemoryAuthStore::new());
    let dispatcher = Arc::new(SmtpDispatcher::new(&config.email));
    let auth = web::Data::new(AuthService::new(
        store,
        dispatcher,
        Arc::new(DefaultHooks),
        &config,
    ));
    let provider = web::Data::new(GithubProvider::new(&config.github));
    let allow_list = web::Data::new(ImageHostAllowList::new(&config.extra_image_hosts));

    // Base shield policy keyed by client fingerprint, plus a sliding window
    // over the auth endpoints; the governor middleware evaluates it.
    let policy = ProtectionPolicy::base(config.shield_api_key.clone(), config.shield_mode)
        .with_rule(sliding_window(AUTH_WINDOW_MAX, AUTH_WINDOW));
    policy.log_registration();
    let enforcing = policy.is_enforcing();
    if !enforcing {
        warn!("protection rules declared in DRY_RUN mode, nothing will be blocked");
    }
    let governor_conf =
        governor_config(&policy).expect("policy declares a window rule");

    let session_key = Key::derive_from(&config.session_secret);
    let bind_addr = config.bind_addr.clone();

    info!(addr = %bind_addr, "starting learngate");

    HttpServer::new(move || {
        App::new()
            .wrap(SessionAuth::new())
            .wrap(Condition::new(enforcing, Governor::new(&governor_conf)))
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
                    .cookie_secure(false) // Set to true in production with HTTPS
                    .cookie_http_only(true)
                    .cookie_same_site(SameSite::Lax)
                    .build(),
            )
            .wrap(TracingLogger::default())
            .app_data(auth.clone())
            .app_data(provider.clone())
            .app_data(allow_list.clone())
            .service(web::resource("/health").route(web::get().to(health_check)))
            .service(web::resource("/auth/otp/request").route(web::post().to(request_otp)))
            .service(web::resource("/auth/otp/verify").route(web::post().to(verify_otp)))
            .service(web::resource("/auth/github/callback").route(web::get().to(github_callback)))
            .service(web::resource("/auth/logout").route(web::post().to(logout)))
            .service(web::resource("/admin/grant").route(web::post().to(grant_admin)))
            .service(web::resource("/admin/revoke").route(web::post().to(revoke_admin)))
            .service(web::resource("/assets/image-hosts").route(web::get().to(image_hosts)))
    })
    .bind(&bind_addr)?
    .workers(4)
    .run()
    .await
}
