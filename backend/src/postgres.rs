use deadpool_postgres::{Config, CreatePoolError, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tokio_postgres_migration::Migration;

use crate::config::PostgresConfig;
use crate::storage::StorageError;

const SCRIPTS_UP: [(&str, &str); 5] = [(
    "0001_create-extension-uuid-ossp",
    include_str!("../migrations/0001_create-extension-uuid-ossp_up.sql"),
),(
    "0001_create-users",
    include_str!("../migrations/0001_create-users_up.sql"),
),(
    "0001_create-sessions",
    include_str!("../migrations/0001_create-sessions_up.sql"),
),(
    "0002_create-friendships",
    include_str!("../migrations/0002_create-friendships_up.sql"),
),(
    "0002_create-user-blocks",
    include_str!("../migrations/0002_create-user-blocks_up.sql"),
)];

const SCRIPTS_DOWN: [(&str, &str); 4] = [(
    "0002_create-user-blocks",
    include_str!("../migrations/0002_create-user-blocks_down.sql"),
),(
    "0002_create-friendships",
    include_str!("../migrations/0002_create-friendships_down.sql"),
),(
    "0001_create-sessions",
    include_str!("../migrations/0001_create-sessions_down.sql"),
),(
    "0001_create-users",
    include_str!("../migrations/0001_create-users_down.sql"),
)];

fn create_config(config: &PostgresConfig) -> Config {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.dbname.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.pool_max_size));
    cfg
}

pub fn create_pool(config: &PostgresConfig) -> Result<Pool, CreatePoolError> {
    create_config(config).create_pool(Some(Runtime::Tokio1), NoTls)
}

pub async fn migrate_up(pool: &Pool) -> Result<(), StorageError> {
    let mut client = pool.get().await?;
    let migration = Migration::new("migrations".to_string());
    migration.up(&mut **client, &SCRIPTS_UP).await?;
    log::info!("postgres migrations are up to date");
    Ok(())
}

pub async fn migrate_down(pool: &Pool) -> Result<(), StorageError> {
    let mut client = pool.get().await?;
    let migration = Migration::new("migrations".to_string());
    migration.down(&mut **client, &SCRIPTS_DOWN).await?;
    Ok(())
}
