#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod email;
mod env;
mod error;
mod models;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use api::{
    add_instrument, add_session, add_strings, analytics, change_instrument, change_password,
    change_strings, database, health, home, login, logout, profile, settings, signup,
};
use auth::unauthorized_api;
use db::clean_expired_sessions;
use email::EmailVerifier;
use rocket::{Build, Rocket, tokio};
use telemetry::TelemetryFairing;
use telemetry::init_tracing;

use sqlx::SqlitePool;
use tracing::{error, info};

#[launch]
async fn rocket() -> _ {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_default();

    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    let verifier = EmailVerifier::from_env().expect("Failed to build email verification client");

    init_rocket(pool, verifier).await
}

pub async fn init_rocket(pool: SqlitePool, verifier: EmailVerifier) -> Rocket<Build> {
    info!("Starting string squad");

    rocket::build()
        .manage(pool)
        .manage(verifier)
        .mount(
            "/",
            routes![
                signup,
                login,
                logout,
                home,
                database,
                add_instrument,
                change_instrument,
                add_strings,
                change_strings,
                add_session,
                analytics,
                settings,
                profile,
                change_password,
                health,
            ],
        )
        .register("/", catchers![unauthorized_api])
        .attach(TelemetryFairing)
}
