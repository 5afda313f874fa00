use anyhow::Context;
use marketplace_checkout::db::{create_orm_conn, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter("info").init();

    let url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set to run migrations")?;
    let orm = create_orm_conn(&url).await?;
    run_migrations(&orm).await?;
    println!("Migrations applied");
    Ok(())
}
