// Order lifecycle, event dispatch and order execution
pub mod dispatcher;
pub mod executor;
pub mod order_book;
pub mod reporter;

pub use dispatcher::{DispatchStats, IngestDispatcher, EVENTS_TARGET};
pub use executor::{ExecutionCommand, ExecutionReport, ExecutorStats, OrderExecutor};
pub use order_book::{AccountSummary, BookSnapshot, Order, OrderBook};
pub use reporter::{report_lines, run_reporter};
