#![warn(clippy::pedantic)]

mod command;
mod config;
mod cookie;
mod envelope;
mod error;
mod extract;
mod mail;
mod media;
mod openapi;
mod permission;
mod ratelimit;
mod route;
mod token;
mod trace;


use std::{net::SocketAddr, sync::Arc, time::Duration};

use aide::openapi::OpenApi;
use argon2::Argon2;
use axum::{http::HeaderName, Extension};
use clap::{Parser, Subcommand};
use tower::Layer;
use tower_governor::GovernorLayer;
use tower_http::{
	catch_panic::CatchPanicLayer,
	compression::CompressionLayer,
	cors::CorsLayer,
	normalize_path::NormalizePathLayer,
	request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
	services::ServeDir,
	trace::TraceLayer,
};

use config::Config;
use mail::{SharedMailer, Templates};
use media::FileManager;
use ratelimit::RateLimits;
use route::user::model::User;
use token::{ExpiringTokenGenerator, Fernet};

pub type Database = sqlx::PgPool;
pub type AppState = State;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// The shared application state.
///
/// This should contain all shared dependencies that handlers need to access,
/// such as a database connection pool, a hash configuration (if it's expensive to create),
/// or a cache client.
#[derive(Clone, axum::extract::FromRef)]
pub struct State {
	pub database: Database,
	pub hasher: Argon2<'static>,
	pub config: Arc<Config>,
	pub tokens: ExpiringTokenGenerator,
	pub templates: Templates,
	pub mailer: SharedMailer,
	pub media: FileManager,
}

impl State {
	/// Public url of the user's profile photo, if they have one.
	pub fn photo_url(&self, user: &User) -> Option<String> {
		user.profile_photo
			.as_deref()
			.map(|path| media::url(&self.config.site_domain, &self.config.media_url, path))
	}
}

/// Builds the application with every route, the api documentation and the
/// media files mounted. Requests are only rate limited when `limits` are given.
pub fn router(state: State, limits: Option<RateLimits>) -> axum::Router {
	let mut api = OpenApi::default();
	let media_url = state.config.media_url.trim_end_matches('/').to_string();
	let media = ServeDir::new(state.media.root());

	let app = aide::axum::ApiRouter::new()
		.nest(
			"/user",
			route::user::routes(limits.as_ref().map(|limits| limits.secure.clone())),
		)
		.nest_api_service("/docs", route::docs::routes())
		.finish_api_with(&mut api, openapi::docs)
		.fallback(envelope::not_found)
		.with_state(state);

	let app = if media_url.is_empty() {
		app
	} else {
		app.nest_service(&media_url, media)
	};

	let app = match limits {
		Some(limits) => app.layer(GovernorLayer {
			config: limits.default,
		}),
		None => app,
	};

	app.layer(Extension(Arc::new(api)))
		.layer(CompressionLayer::new())
		.layer(CorsLayer::permissive())
		.layer(TraceLayer::new_for_http())
		.layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
		.layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
		.layer(CatchPanicLayer::custom(envelope::panic_response))
}

#[derive(Parser)]
#[command(version, about = "User accounts api")]
struct Cli {
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
	/// Run the http server (the default)
	Serve,
	/// Create the default admin account
	Makesuper,
	/// Print a new key for FERNET_KEY
	GenerateKey,
}

#[tokio::main]
async fn main() {
	dotenvy::dotenv().ok();

	match Cli::parse().command.unwrap_or(Command::Serve) {
		Command::GenerateKey => println!("{}", Fernet::generate_key()),
		Command::Makesuper => {
			let (state, _guard) = setup().await;

			command::makesuper(&state)
				.await
				.expect("failed to create the admin account");
		}
		Command::Serve => {
			let (state, _guard) = setup().await;

			serve(state).await;
		}
	}
}

/// Reads the configuration, starts logging and connects to (and migrates) the database.
async fn setup() -> (State, trace::OtelGuard) {
	let config = Config::from_env().expect("invalid configuration");

	let guard = trace::init_tracing_subscriber(config.log_level, config.otlp_endpoint.as_deref())
		.expect("failed to initialize tracing");

	let database = sqlx::postgres::PgPoolOptions::new()
		.acquire_timeout(Duration::from_secs(5))
		.connect(&config.database_url)
		.await
		.expect("failed to connect to database");

	sqlx::migrate!()
		.run(&database)
		.await
		.expect("failed to run migrations");

	let fernet = Fernet::new(&config.fernet_key).expect("FERNET_KEY must be a valid key");

	let state = State {
		database,
		hasher: Argon2::default(),
		tokens: ExpiringTokenGenerator::new(fernet),
		templates: Templates::from(&config),
		mailer: Arc::new(mail::LogMailer),
		media: FileManager::new(&config.media_root),
		config: Arc::new(config),
	};

	(state, guard)
}

async fn serve(state: State) {
	let address = SocketAddr::from((state.config.host, state.config.port));
	let limits = RateLimits::from_config(&state.config);

	match &limits {
		Some(limits) => ratelimit::cleanup_old_limits(&[&limits.default, &limits.secure]),
		None => tracing::warn!("rate limiting disabled"),
	}

	let app = NormalizePathLayer::trim_trailing_slash().layer(router(state, limits));

	let listener = tokio::net::TcpListener::bind(address)
		.await
		.expect("failed to bind to port");

	tracing::info!("listening on {}", address);

	axum::serve(
		listener,
		axum::ServiceExt::<axum::extract::Request>::into_make_service_with_connect_info::<SocketAddr>(app),
	)
	.await
	.expect("server error");
}
