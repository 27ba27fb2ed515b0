mod from_row;
mod schema;
pub mod queries;

pub use schema::{init_db, sync_plans};

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::catalog::PlanCatalog;
use crate::discount::DiscountResolver;
use crate::payments::{PaymentOrchestrator, ProviderSelector};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Public base URL for checkout return links (e.g., https://listings.example.com)
    pub base_url: String,
    pub catalog: Arc<PlanCatalog>,
    pub providers: ProviderSelector,
    pub discounts: DiscountResolver,
    pub orchestrator: Arc<PaymentOrchestrator>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    Pool::builder().max_size(10).build(manager)
}
