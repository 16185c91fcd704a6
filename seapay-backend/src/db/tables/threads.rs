//! Thread and thread item database operations

use chrono::Utc;
use rusqlite::{params, Result as SqliteResult};

use super::super::sqlite::parse_timestamp;
use super::super::Database;
use crate::models::{ThreadItem, ThreadItemType, ThreadMetadata};

impl Database {
    // ============================================
    // Thread methods
    // ============================================

    pub fn create_thread(&self, thread: &ThreadMetadata) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO threads (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                thread.id,
                thread.title,
                thread.created_at.to_rfc3339(),
                thread.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_thread(&self, id: &str) -> SqliteResult<Option<ThreadMetadata>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, title, created_at, updated_at FROM threads WHERE id = ?1")?;

        let result = stmt.query_row([id], |row| Self::row_to_thread(row));
        match result {
            Ok(thread) => Ok(Some(thread)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Most recently active threads first
    pub fn list_threads(&self, limit: usize) -> SqliteResult<Vec<ThreadMetadata>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, updated_at FROM threads
             ORDER BY updated_at DESC LIMIT ?1",
        )?;

        let threads = stmt
            .query_map([limit as i64], |row| Self::row_to_thread(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(threads)
    }

    pub fn set_thread_title(&self, id: &str, title: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE threads SET title = ?1, updated_at = ?2 WHERE id = ?3",
            params![title, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Delete a thread with its items and workflow context. Returns false if it did not exist.
    pub fn delete_thread(&self, id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM thread_items WHERE thread_id = ?1", [id])?;
        conn.execute("DELETE FROM workflow_contexts WHERE thread_id = ?1", [id])?;
        let deleted = conn.execute("DELETE FROM threads WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    fn row_to_thread(row: &rusqlite::Row) -> rusqlite::Result<ThreadMetadata> {
        let created_at_str: String = row.get(2)?;
        let updated_at_str: String = row.get(3)?;
        Ok(ThreadMetadata {
            id: row.get(0)?,
            title: row.get(1)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    // ============================================
    // Thread item methods
    // ============================================

    /// Append an item and bump the thread's activity time
    pub fn add_thread_item(&self, item: &ThreadItem) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let created_at = item.created_at.to_rfc3339();
        conn.execute(
            "INSERT INTO thread_items (id, thread_id, item_type, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                item.id,
                item.thread_id,
                item.item_type.as_str(),
                item.content,
                created_at,
            ],
        )?;
        conn.execute(
            "UPDATE threads SET updated_at = ?1 WHERE id = ?2",
            params![created_at, item.thread_id],
        )?;
        Ok(())
    }

    /// All items of a thread, oldest first
    pub fn list_thread_items(&self, thread_id: &str) -> SqliteResult<Vec<ThreadItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, thread_id, item_type, content, created_at
             FROM thread_items WHERE thread_id = ?1 ORDER BY seq ASC",
        )?;

        let items = stmt
            .query_map([thread_id], |row| Self::row_to_thread_item(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(items)
    }

    /// The last `limit` items of a thread, oldest first
    pub fn recent_thread_items(&self, thread_id: &str, limit: usize) -> SqliteResult<Vec<ThreadItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, thread_id, item_type, content, created_at
             FROM thread_items WHERE thread_id = ?1 ORDER BY seq DESC LIMIT ?2",
        )?;

        let mut items: Vec<ThreadItem> = stmt
            .query_map(params![thread_id, limit as i64], |row| Self::row_to_thread_item(row))?
            .filter_map(|r| r.ok())
            .collect();

        // Reverse to get chronological order
        items.reverse();
        Ok(items)
    }

    pub fn count_thread_items(&self, thread_id: &str) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM thread_items WHERE thread_id = ?1",
            [thread_id],
            |row| row.get(0),
        )
    }

    fn row_to_thread_item(row: &rusqlite::Row) -> rusqlite::Result<ThreadItem> {
        let item_type_str: String = row.get(2)?;
        let created_at_str: String = row.get(4)?;
        let item_type = ThreadItemType::from_str(&item_type_str).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(2, item_type_str.clone(), rusqlite::types::Type::Text)
        })?;

        Ok(ThreadItem {
            id: row.get(0)?,
            thread_id: row.get(1)?,
            item_type,
            content: row.get(3)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::tables::test_db;
    use crate::models::{ThreadItem, ThreadItemType, ThreadMetadata, WidgetContent};
    use serde_json::json;

    #[test]
    fn test_thread_lifecycle() {
        let (_dir, db) = test_db();
        let thread = ThreadMetadata::new();
        db.create_thread(&thread).unwrap();

        assert!(db.get_thread(&thread.id).unwrap().unwrap().title.is_none());
        db.set_thread_title(&thread.id, "Lisbon in November").unwrap();
        assert_eq!(
            db.get_thread(&thread.id).unwrap().unwrap().title.as_deref(),
            Some("Lisbon in November")
        );
        assert_eq!(db.list_threads(10).unwrap().len(), 1);

        assert!(db.delete_thread(&thread.id).unwrap());
        assert!(!db.delete_thread(&thread.id).unwrap());
        assert!(db.get_thread(&thread.id).unwrap().is_none());
    }

    #[test]
    fn test_items_keep_insertion_order() {
        let (_dir, db) = test_db();
        let thread = ThreadMetadata::new();
        db.create_thread(&thread).unwrap();

        for i in 0..5 {
            let item = ThreadItem::new(&thread.id, ThreadItemType::UserMessage, format!("message {}", i));
            db.add_thread_item(&item).unwrap();
        }
        let widget = WidgetContent {
            kind: "hotel_cards".to_string(),
            summary: "Showed 1 hotel".to_string(),
            widget: json!({"type": "ListView"}),
        };
        db.add_thread_item(&ThreadItem::widget(&thread.id, &widget)).unwrap();

        let all = db.list_thread_items(&thread.id).unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].content, "message 0");
        assert_eq!(all[5].widget_content(), Some(widget));

        let recent = db.recent_thread_items(&thread.id, 3).unwrap();
        let contents: Vec<&str> = recent.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(contents[0], "message 3");
        assert_eq!(contents[1], "message 4");
        assert_eq!(recent[2].item_type, ThreadItemType::Widget);

        assert_eq!(db.count_thread_items(&thread.id).unwrap(), 6);
        db.delete_thread(&thread.id).unwrap();
        assert_eq!(db.count_thread_items(&thread.id).unwrap(), 0);
    }
}
