//! Database command handlers.

pub(crate) async fn run_ping(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    revpipe_db::ping(pool).await?;
    println!("database reachable");
    Ok(())
}

pub(crate) async fn run_migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let applied = revpipe_db::run_migrations(pool).await?;
    println!("migrations complete ({applied} applied)");
    Ok(())
}
