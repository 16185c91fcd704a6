//! Workflow contexts table - booking workflow state persistence
//!
//! Stores the active agent and booking state between turns so a thread
//! resumes where it left off.

use crate::ai::multi_agent::types::{AgentKind, WorkflowContext};
use crate::db::Database;
use crate::models::BookingState;
use chrono::Utc;
use rusqlite::{params, Result as SqliteResult};

impl Database {
    /// Get the workflow context for a thread (if exists)
    pub fn get_workflow_context(&self, thread_id: &str) -> SqliteResult<Option<WorkflowContext>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT active_agent, agent_iterations, total_iterations, booking_json
             FROM workflow_contexts
             WHERE thread_id = ?",
        )?;

        let result = stmt.query_row(params![thread_id], |row| {
            let agent_str: String = row.get(0)?;
            let agent_iterations: u32 = row.get(1)?;
            let total_iterations: u32 = row.get(2)?;
            let booking_json: String = row.get(3)?;

            let active_agent: AgentKind = agent_str.parse().unwrap_or_else(|_| {
                log::warn!("[DB] Unknown agent '{}' in workflow context, using orchestrator", agent_str);
                AgentKind::Orchestrator
            });
            let state: BookingState = serde_json::from_str(&booking_json).unwrap_or_else(|e| {
                log::warn!("[DB] Unreadable booking state for thread {}: {}", thread_id, e);
                BookingState::default()
            });

            Ok(WorkflowContext {
                active_agent,
                state,
                agent_iterations,
                total_iterations,
            })
        });

        match result {
            Ok(ctx) => Ok(Some(ctx)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create or update the workflow context for a thread
    pub fn save_workflow_context(&self, thread_id: &str, context: &WorkflowContext) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        let booking_json = serde_json::to_string(&context.state).unwrap_or_else(|_| "{}".to_string());

        // Use INSERT OR REPLACE for upsert behavior
        conn.execute(
            "INSERT OR REPLACE INTO workflow_contexts (
                thread_id, active_agent, agent_iterations, total_iterations,
                booking_json, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                COALESCE((SELECT created_at FROM workflow_contexts WHERE thread_id = ?1), ?6),
                ?6
            )",
            params![
                thread_id,
                context.active_agent.to_string(),
                context.agent_iterations,
                context.total_iterations,
                booking_json,
                now,
            ],
        )?;

        Ok(())
    }

    pub fn delete_workflow_context(&self, thread_id: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM workflow_contexts WHERE thread_id = ?",
            params![thread_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ai::multi_agent::types::{AgentKind, WorkflowContext};
    use crate::db::tables::test_db;
    use crate::models::{BookingDetails, BookingState, ThreadMetadata};

    #[test]
    fn test_save_and_resume() {
        let (_dir, db) = test_db();
        let thread = ThreadMetadata::new();
        db.create_thread(&thread).unwrap();
        assert!(db.get_workflow_context(&thread.id).unwrap().is_none());

        let mut state = BookingState::new();
        state
            .apply_details(&BookingDetails {
                destination: Some("Lisbon".to_string()),
                checkin_date: Some("2026-11-02".to_string()),
                ..Default::default()
            })
            .unwrap();
        let context = WorkflowContext {
            active_agent: AgentKind::MissingInfo,
            state,
            agent_iterations: 2,
            total_iterations: 5,
        };
        db.save_workflow_context(&thread.id, &context).unwrap();
        assert_eq!(db.get_workflow_context(&thread.id).unwrap(), Some(context.clone()));

        let updated = WorkflowContext {
            active_agent: AgentKind::AvailabilityChecker,
            ..context
        };
        db.save_workflow_context(&thread.id, &updated).unwrap();
        assert_eq!(
            db.get_workflow_context(&thread.id).unwrap().unwrap().active_agent,
            AgentKind::AvailabilityChecker
        );

        db.delete_workflow_context(&thread.id).unwrap();
        assert!(db.get_workflow_context(&thread.id).unwrap().is_none());
    }
}
