use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::time::Duration;
use tokio_postgres::{Config as PgConfig, NoTls};

use crate::error::AppError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a deadpool-postgres pool and verify one connection.
pub async fn init_pool(database_url: &str, max_connections: usize) -> Result<Pool, AppError> {
    let pg_config: PgConfig = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| AppError::Config(format!("DATABASE_URL: {e}")))?;

    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(mgr)
        .max_size(max_connections.max(1))
        .build()
        .map_err(|e| AppError::StartServer(format!("build pool: {e}")))?;

    match tokio::time::timeout(CONNECT_TIMEOUT, async {
        let client = pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok::<(), AppError>(())
    })
    .await
    {
        Ok(Ok(())) => {
            tracing::info!(max_connections, "database pool created and verified");
            Ok(pool)
        }
        Ok(Err(e)) => Err(AppError::StartServer(format!("db: {e}"))),
        Err(_) => Err(AppError::StartServer(format!(
            "db: no connection within {}s",
            CONNECT_TIMEOUT.as_secs()
        ))),
    }
}
