//! Tool execution audit log and x402 payment records

use chrono::Utc;
use rusqlite::{params, Result as SqliteResult};
use serde::Serialize;

use super::super::Database;
use crate::tools::ToolExecution;
use crate::x402::X402PaymentInfo;

/// A stored x402 payment
#[derive(Debug, Clone, Serialize)]
pub struct X402PaymentRecord {
    pub id: i64,
    pub thread_id: Option<String>,
    pub resource: Option<String>,
    pub amount: String,
    pub amount_formatted: Option<String>,
    pub asset: String,
    pub network: String,
    pub pay_to: String,
    pub from_address: Option<String>,
    pub tx_hash: Option<String>,
    pub created_at: String,
}

impl Database {
    pub fn log_tool_execution(&self, execution: &ToolExecution) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tool_executions (thread_id, agent, tool_name, parameters, success, result, duration_ms, executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                execution.thread_id,
                execution.agent,
                execution.tool_name,
                execution.parameters.to_string(),
                execution.success as i32,
                execution.result,
                execution.duration_ms,
                execution.executed_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Tool executions of a thread, oldest first
    pub fn list_tool_executions(&self, thread_id: &str) -> SqliteResult<Vec<ToolExecution>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, thread_id, agent, tool_name, parameters, success, result, duration_ms, executed_at
             FROM tool_executions WHERE thread_id = ?1 ORDER BY id ASC",
        )?;

        let executions = stmt
            .query_map([thread_id], |row| {
                let parameters: String = row.get(4)?;
                Ok(ToolExecution {
                    id: Some(row.get(0)?),
                    thread_id: row.get(1)?,
                    agent: row.get(2)?,
                    tool_name: row.get(3)?,
                    parameters: serde_json::from_str(&parameters).unwrap_or_default(),
                    success: row.get::<_, i32>(5)? != 0,
                    result: row.get(6)?,
                    duration_ms: row.get(7)?,
                    executed_at: row.get(8)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(executions)
    }

    /// Record an x402 payment to the database
    pub fn record_x402_payment(&self, thread_id: Option<&str>, payment: &X402PaymentInfo) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO x402_payments (thread_id, resource, amount, amount_formatted, asset, network, pay_to, from_address, tx_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                thread_id,
                payment.resource,
                payment.amount,
                payment.amount_formatted,
                payment.asset,
                payment.network,
                payment.pay_to,
                payment.payer,
                payment.transaction,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_x402_payments(&self, thread_id: &str) -> SqliteResult<Vec<X402PaymentRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, thread_id, resource, amount, amount_formatted, asset, network, pay_to, from_address, tx_hash, created_at
             FROM x402_payments WHERE thread_id = ?1 ORDER BY id ASC",
        )?;

        let payments = stmt
            .query_map([thread_id], |row| {
                Ok(X402PaymentRecord {
                    id: row.get(0)?,
                    thread_id: row.get(1)?,
                    resource: row.get(2)?,
                    amount: row.get(3)?,
                    amount_formatted: row.get(4)?,
                    asset: row.get(5)?,
                    network: row.get(6)?,
                    pay_to: row.get(7)?,
                    from_address: row.get(8)?,
                    tx_hash: row.get(9)?,
                    created_at: row.get(10)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(payments)
    }
}
