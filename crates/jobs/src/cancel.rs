//! Cooperative cancellation.
//!
//! A cloneable token shared between a caller and a running job. Cancelling
//! is idempotent and sticky; `cancelled()` resolves for every clone.

pub use tokio_util::sync::CancellationToken as CancelToken;
