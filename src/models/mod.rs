mod idempotency;
mod project;
mod transaction;
mod webhook_log;
mod withdrawal;

pub use idempotency::*;
pub use project::*;
pub use transaction::*;
pub use webhook_log::*;
pub use withdrawal::*;
