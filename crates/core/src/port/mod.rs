// Port Layer - Interfaces for external dependencies

pub mod log_sink;
pub mod remarketing_api;
pub mod remote_invoker;
pub mod table_store;
pub mod time_provider;

// Re-exports
pub use log_sink::{LogSink, NullLogSink};
pub use remarketing_api::{ApiError, RemarketingApi, RemarketingList, RemarketingListShares};
pub use remote_invoker::{InvokeError, RemoteInvoker};
pub use table_store::{CellRange, Row, TableStore};
pub use time_provider::{SystemTimeProvider, TimeProvider};
