pub mod alerts;
pub mod products;
pub mod reporting;
pub mod stock_engine;

pub use alerts::StockAlerts;
pub use products::ProductDirectory;
pub use reporting::ReportingService;
pub use stock_engine::{LedgerError, StockMutationEngine};
