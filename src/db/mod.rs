use std::time::Duration;

use anyhow::Context;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::Settings;

pub mod row_parsers;

pub static MIGRATOR: Migrator = sqlx::migrate!();

pub async fn init(settings: &Settings) -> anyhow::Result<SqlitePool> {
	let pool = SqlitePoolOptions::new()
		.max_connections(settings.max_connections)
		.min_connections(1)
		.acquire_timeout(Duration::from_secs(10))
		.connect(&settings.database_url)
		.await
		.context("failed to connect to database")?;

	MIGRATOR
		.run(&pool)
		.await
		.context("failed to run migrations")?;

	Ok(pool)
}

/// Private in-memory database with the schema applied.
///
/// A single connection is kept alive for the pool's lifetime, since every
/// new in-memory connection would open an empty database.
pub async fn in_memory() -> anyhow::Result<SqlitePool> {
	let opts = SqliteConnectOptions::new().filename(":memory:");
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.min_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect_with(opts)
		.await
		.context("failed to open in-memory database")?;

	MIGRATOR
		.run(&pool)
		.await
		.context("failed to run migrations")?;

	Ok(pool)
}
