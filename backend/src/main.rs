mod auth;
mod config;
mod error;
mod inference;
mod routes;
mod users;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware::Logger, web};
use auth::jwt::JwtService;
use auth::middleware::AdminGate;
use clap::{Parser, Subcommand};
use config::{AppConfig, ModelsConfig};
use inference::registry::ModelRegistry;
use inference::upload::UploadSettings;
use routes::{ADMIN_PREFIX, configure_routes};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use users::manager::{UserAttributes, UserManager};
use users::repository::{PgUserRepository, UserRepository};

#[derive(Parser)]
#[command(name = "ai-doctor-backend", about = "Medical image classification service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Create a regular user
    CreateUser {
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        role: Option<i32>,
        #[arg(long)]
        report_id: Option<i32>,
        #[arg(long)]
        organization_id: Option<i32>,
    },
    /// Create an administrator
    CreateSuperuser {
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
    },
    /// Print a signed bearer token for a user id
    IssueToken {
        #[arg(long)]
        user_id: i32,
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
}

fn startup_error(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        startup_error(e)
    })?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::CreateUser {
            login,
            password,
            role,
            report_id,
            organization_id,
        } => {
            let attributes = UserAttributes {
                role,
                report_id,
                organization_id,
            };
            let user = user_manager(&config)?
                .create_user(&login, &password, attributes)
                .await
                .map_err(startup_error)?;
            println!("Created user '{}' with id {}", user.login, user.id);
            Ok(())
        }
        Command::CreateSuperuser { login, password } => {
            let user = user_manager(&config)?
                .create_superuser(&login, &password)
                .await
                .map_err(startup_error)?;
            println!("Created superuser '{}' with id {}", user.login, user.id);
            Ok(())
        }
        Command::IssueToken { user_id, ttl_hours } => {
            let token = JwtService::new(&config.jwt_secret)
                .generate_token(user_id, chrono::Duration::hours(ttl_hours))
                .map_err(startup_error)?;
            println!("{}", token);
            Ok(())
        }
    }
}

fn user_repository(config: &AppConfig) -> std::io::Result<Arc<dyn UserRepository>> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(&config.database_url)
        .map_err(startup_error)?;
    Ok(Arc::new(PgUserRepository::new(pool)))
}

fn user_manager(config: &AppConfig) -> std::io::Result<UserManager> {
    Ok(UserManager::new(user_repository(config)?))
}

async fn serve(config: AppConfig) -> std::io::Result<()> {
    if let Ok(current_dir) = std::env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let models_config = ModelsConfig::load(&config.model_config_path).map_err(|e| {
        log::error!("Failed to read model configuration: {}", e);
        startup_error(e)
    })?;
    let registry = ModelRegistry::load(&models_config).map_err(|e| {
        log::error!("Failed to preload models at startup: {}", e);
        startup_error(e)
    })?;
    if registry.is_empty() {
        log::warn!(
            "No models configured in {}; every prediction will be rejected",
            config.model_config_path.display()
        );
    }

    std::fs::create_dir_all(&config.upload_dir)?;
    log::info!("Uploads are staged in {}", config.upload_dir.display());

    let registry = web::Data::new(registry);
    let upload_settings = web::Data::new(UploadSettings {
        dir: config.upload_dir.clone(),
        max_bytes: config.max_upload_bytes,
    });
    let admin_gate = AdminGate::new(
        JwtService::new(&config.jwt_secret),
        user_repository(&config)?,
        ADMIN_PREFIX,
    );

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(admin_gate.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .app_data(registry.clone())
            .app_data(upload_settings.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
