use clap::{Parser, Subcommand};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::{MemoryLedgerStore, PostgresLedgerStore};
use crate::config::{Config, StorageBackend};
use crate::ports::LedgerStore;
use crate::services::ReportingService;

#[derive(Parser)]
#[command(name = "stockledger")]
#[command(about = "Stock Ledger - inventory balances backed by an append-only movement log", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Ledger maintenance commands
    #[command(subcommand)]
    Ledger(LedgerCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Replay a product's ledger and compare it with the stored balance
    Verify {
        /// Product UUID
        #[arg(value_name = "PRODUCT_ID")]
        product_id: Uuid,
    },
}

/// Builds the configured store. Postgres pools are migrated before use.
pub async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on shutdown");
            Ok(Arc::new(MemoryLedgerStore::new(config.lock_timeout())))
        }
        StorageBackend::Postgres => {
            let pool = crate::db::create_pool(config).await?;
            crate::db::run_migrations(&pool).await?;
            Ok(Arc::new(PostgresLedgerStore::new(pool, config.lock_timeout())))
        }
    }
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    if config.storage_backend == StorageBackend::Memory {
        anyhow::bail!("STORAGE_BACKEND=memory has no database to migrate");
    }
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub async fn handle_ledger_verify(config: &Config, product_id: Uuid) -> anyhow::Result<()> {
    if config.storage_backend == StorageBackend::Memory {
        anyhow::bail!("STORAGE_BACKEND=memory keeps no ledger between runs; nothing to verify");
    }
    let store = open_store(config).await?;
    let audit = ReportingService::new(store)
        .audit_product(product_id)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    println!("Product {}", audit.product_id);
    println!("  Entries:        {}", audit.entries);
    println!("  Replayed stock: {}", audit.replayed_stock);
    println!("  Current stock:  {}", audit.current_stock);
    for violation in &audit.violations {
        println!("  ✗ {}: {}", violation.transaction_id, violation.message);
    }

    if !audit.consistent {
        anyhow::bail!("Ledger for product {} is inconsistent", product_id);
    }
    println!("✓ Ledger is consistent");
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Storage Backend: {:?}", config.storage_backend);
    match &config.database_url {
        Some(url) => println!("  Database URL: {}", mask_password(url)),
        None => println!("  Database URL: (not set)"),
    }
    println!("  Database Max Connections: {}", config.database_max_connections);
    println!("  Mutation Max Attempts: {}", config.mutation_max_attempts);
    println!("  Lock Timeout: {}ms", config.lock_timeout_ms);
    if config.cors_allowed_origins.is_empty() {
        println!("  CORS Origins: *");
    } else {
        println!("  CORS Origins: {}", config.cors_allowed_origins.join(", "));
    }
    println!("  Log Format: {:?}", config.log_format);

    config.validate()?;
    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
