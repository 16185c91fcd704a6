//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

mod threads;           // threads, thread_items
mod workflow_contexts; // workflow_contexts (active agent + booking state)
mod tool_executions;   // tool_executions, x402_payments

pub use tool_executions::X402PaymentRecord;

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, super::Database) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let db = super::Database::new(path.to_str().unwrap()).unwrap();
    (dir, db)
}
