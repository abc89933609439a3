mod auth;
mod config;
mod cron_tasks;
mod database;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod service;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;
pub use cron_tasks::{create_current_periods, prune_sessions};

use crate::db::stage_db;
use crate::middleware::RequestLogger;
use crate::routes as app_routes;
use rocket::{Build, Rocket, catchers, http::Method};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};
use rocket_okapi::{get_openapi_route, okapi::merge::marge_spec_list};
use tracing_subscriber::EnvFilter;

fn init_tracing(log_level: &str, json_format: bool) {
    // RUST_LOG overrides the configured level, e.g. RUST_LOG=info,saldo::service=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    // Test clients build several rockets in one process; only the first install wins.
    let _ = if json_format { subscriber.json().try_init() } else { subscriber.try_init() };
}

fn ensure_rocket_secret_key() {
    let profile = std::env::var("ROCKET_PROFILE").unwrap_or_else(|_| "debug".to_string());

    // Private session cookies need a stable key outside of debug builds.
    if profile != "debug" && std::env::var("ROCKET_SECRET_KEY").is_err() {
        panic!(
            "ROCKET_SECRET_KEY is required for profile '{}'. Generate one with: openssl rand -base64 32",
            profile
        );
    }
}

fn build_cors(cors_config: &config::CorsConfig) -> CorsOptions {
    let is_wildcard = cors_config.allowed_origins.len() == 1 && cors_config.allowed_origins[0] == "*";

    if is_wildcard && cors_config.allow_credentials {
        panic!(
            "Invalid CORS configuration: Cannot use wildcard origins (*) with credentials enabled. \
            Either set specific origins or disable credentials."
        );
    }

    let allowed_origins = if cors_config.allowed_origins.is_empty() {
        AllowedOrigins::some_exact::<&str>(&[])
    } else if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    CorsOptions {
        allowed_origins,
        allowed_methods: vec![
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Options,
            Method::Head,
        ]
        .into_iter()
        .map(From::from)
        .collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Accept", "X-Request-Id"]),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    }
}

fn get_swagger_config(openapi_url: &str) -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: openapi_url.to_string(),
        ..Default::default()
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return config::DEFAULT_API_BASE_PATH.to_string();
    }

    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };

    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }

    normalized
}

fn join_base_path(base_path: &str, path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    let suffix = path.trim_start_matches('/');

    if base.is_empty() {
        format!("/{}", suffix)
    } else {
        format!("{}/{}", base, suffix)
    }
}

fn collect_base_paths(api_config: &config::ApiConfig) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    let mut push_unique = |path: String| {
        if !normalized.contains(&path) {
            normalized.push(path);
        }
    };

    push_unique(normalize_base_path(&api_config.base_path));

    for extra in &api_config.additional_base_paths {
        let normalized_extra = normalize_base_path(extra);
        if !normalized_extra.is_empty() {
            push_unique(normalized_extra);
        }
    }

    normalized
}

struct RouteSpec {
    path: &'static str,
    routes: Vec<rocket::Route>,
    openapi: rocket_okapi::okapi::openapi3::OpenApi,
}

fn collect_route_specs() -> Vec<RouteSpec> {
    let (health_routes, health_openapi) = app_routes::health::routes();
    let (user_routes, user_openapi) = app_routes::user::routes();
    let (allowance_routes, allowance_openapi) = app_routes::allowance::routes();
    let (weekly_period_routes, weekly_period_openapi) = app_routes::weekly_period::routes();
    let (expense_routes, expense_openapi) = app_routes::expense::routes();
    let (dashboard_routes, dashboard_openapi) = app_routes::dashboard::routes();
    let (cron_routes, cron_openapi) = app_routes::cron::routes();

    vec![
        RouteSpec {
            path: "/health",
            routes: health_routes,
            openapi: health_openapi,
        },
        RouteSpec {
            path: "/users",
            routes: user_routes,
            openapi: user_openapi,
        },
        RouteSpec {
            path: "/allowance",
            routes: allowance_routes,
            openapi: allowance_openapi,
        },
        RouteSpec {
            path: "/weekly-periods",
            routes: weekly_period_routes,
            openapi: weekly_period_openapi,
        },
        RouteSpec {
            path: "/expenses",
            routes: expense_routes,
            openapi: expense_openapi,
        },
        RouteSpec {
            path: "/dashboard",
            routes: dashboard_routes,
            openapi: dashboard_openapi,
        },
        RouteSpec {
            path: "/cron",
            routes: cron_routes,
            openapi: cron_openapi,
        },
    ]
}

fn mount_api_routes(mut rocket: Rocket<Build>, base_path: &str, enable_swagger: bool) -> Rocket<Build> {
    let route_specs = collect_route_specs();

    if enable_swagger {
        let mut openapi_list = Vec::new();
        for spec in route_specs {
            rocket = rocket.mount(format!("{}{}", base_path, spec.path), spec.routes);
            openapi_list.push((spec.path, spec.openapi));
        }

        let openapi_docs = match marge_spec_list(&openapi_list) {
            Ok(docs) => docs,
            Err(err) => panic!("Could not merge OpenAPI spec: {}", err),
        };

        let settings = rocket_okapi::settings::OpenApiSettings::default();
        rocket = rocket.mount(base_path, vec![get_openapi_route(openapi_docs, &settings)]);

        let docs_path = join_base_path(base_path, "docs");
        let openapi_url = join_base_path(base_path, "openapi.json");
        rocket = rocket.mount(docs_path, make_swagger_ui(&get_swagger_config(&openapi_url)));
    } else {
        for spec in route_specs {
            rocket = rocket.mount(format!("{}{}", base_path, spec.path), spec.routes);
        }
    }

    rocket
}

fn register_catchers(rocket: Rocket<Build>, base_path: &str) -> Rocket<Build> {
    rocket.register(
        base_path,
        catchers![app_routes::error::unauthorized, app_routes::error::not_found, app_routes::error::unprocessable],
    )
}

pub fn build_rocket(config: Config) -> Rocket<Build> {
    init_tracing(&config.logging.level, config.logging.json_format);
    ensure_rocket_secret_key();

    let cors = build_cors(&config.cors).to_cors().expect("Failed to create CORS fairing");

    let base_paths = collect_base_paths(&config.api);

    let figment = rocket::Config::figment()
        .merge(("port", config.server.port))
        .merge(("address", config.server.address.clone()));

    let mut rocket = rocket::custom(figment)
        .attach(cors)
        .attach(RequestLogger)
        .attach(stage_db(config.database.clone()))
        .manage(config.clone());

    let enable_swagger = config.api.enable_swagger;
    for base_path in &base_paths {
        rocket = mount_api_routes(rocket, base_path, enable_swagger);
        rocket = register_catchers(rocket, base_path);
    }

    rocket
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_paths_are_normalized() {
        assert_eq!(normalize_base_path("api/"), "/api");
        assert_eq!(normalize_base_path("  "), config::DEFAULT_API_BASE_PATH);
        assert_eq!(normalize_base_path("/v1//"), "/v1");
    }

    #[test]
    fn joined_paths_have_one_separator() {
        assert_eq!(join_base_path("/api", "docs"), "/api/docs");
        assert_eq!(join_base_path("/api/", "/openapi.json"), "/api/openapi.json");
        assert_eq!(join_base_path("", "docs"), "/docs");
    }

    #[test]
    fn additional_base_paths_are_deduplicated() {
        let api = config::ApiConfig {
            base_path: "/api".to_string(),
            additional_base_paths: vec!["api".to_string(), "/api/v1".to_string()],
            enable_swagger: false,
        };
        assert_eq!(collect_base_paths(&api), vec!["/api".to_string(), "/api/v1".to_string()]);
    }

    #[test]
    #[should_panic(expected = "wildcard")]
    fn wildcard_origin_with_credentials_is_rejected() {
        let cors = config::CorsConfig {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
        };
        build_cors(&cors);
    }
}
