// Sync constants (no magic values)

/// Default number of concurrent in-flight remote invocations.
/// The remote platform allows more; the rest is left to the caller's own traffic.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Separator splitting one rule cell into several term values
pub const DEFAULT_RULE_SEPARATOR: &str = ",";

/// Retries of a transient remote API failure (on top of the first attempt)
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base retry delay (500ms), doubled per attempt
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Retry backoff multiplier
pub const RETRY_BACKOFF_FACTOR: u32 = 2;

pub const DEFAULT_AUDIENCE_SHEET: &str = "Audiences";
pub const DEFAULT_RULE_SHEET: &str = "Rules";

/// Header rows above the data in both sheets
pub const DEFAULT_HEADER_ROWS: usize = 1;

/// Operation name for pushing audience mutations
pub const OP_PROCESS_AUDIENCES: &str = "audiences.process.v1";

/// Operation name for loading remote audiences
pub const OP_LOAD_AUDIENCES: &str = "audiences.load.v1";

/// Operation name for generic containers
pub const OP_RUN_JOBS: &str = "jobs.run.v1";

/// Term type emitted for every encoded rule
pub const DEFAULT_TERM_TYPE: crate::domain::TermType = crate::domain::TermType::CustomVariableTerm;

pub const STATUS_SUCCESS: &str = "Success";
pub const STATUS_ERROR: &str = "Error";
