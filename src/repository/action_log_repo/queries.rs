use super::core::ActionLogRepository;
use crate::domain::action_log::ActionLog;
use crate::repository::error::RepositoryResult;
use chrono::NaiveDateTime;
use rusqlite::{params, Result as SqliteResult, Row};

impl ActionLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 action_id 查询单个日志
    pub fn find_by_id(&self, action_id: &str) -> RepositoryResult<Option<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, action_type, action_ts, actor, purpose,
                   part_number, payload_json, detail
            FROM action_log
            WHERE action_id = ?
            "#,
        )?;

        match stmt.query_row(params![action_id], |row| self.map_row(row)) {
            Ok(log) => Ok(Some(log)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询指定件号的日志
    pub fn find_by_part_number(&self, part_number: &str, limit: i32) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, action_type, action_ts, actor, purpose,
                   part_number, payload_json, detail
            FROM action_log
            WHERE part_number = ?
            ORDER BY action_ts DESC, rowid DESC
            LIMIT ?
            "#,
        )?;

        let logs = stmt
            .query_map(params![part_number, limit], |row| self.map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(logs)
    }

    /// 查询最近的 N 条日志
    pub fn find_recent(&self, limit: i32) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, action_type, action_ts, actor, purpose,
                   part_number, payload_json, detail
            FROM action_log
            ORDER BY action_ts DESC, rowid DESC
            LIMIT ?
            "#,
        )?;

        let logs = stmt
            .query_map(params![limit], |row| self.map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(logs)
    }

    /// 统计操作人的日志数量
    pub fn count_by_actor(&self, actor: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM action_log WHERE actor = ?",
            params![actor],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    fn map_row(&self, row: &Row) -> SqliteResult<ActionLog> {
        let action_id: String = row.get(0)?;
        let action_type: String = row.get(1)?;
        let action_ts_str: String = row.get(2)?;
        let actor: String = row.get(3)?;
        let purpose: String = row.get(4)?;
        let part_number: Option<String> = row.get(5)?;
        let payload_json_str: Option<String> = row.get(6)?;
        let detail: Option<String> = row.get(7)?;

        let action_ts = NaiveDateTime::parse_from_str(&action_ts_str, "%Y-%m-%d %H:%M:%S")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?;

        let payload_json = payload_json_str.and_then(|s| serde_json::from_str(&s).ok());

        Ok(ActionLog {
            action_id,
            action_type,
            action_ts,
            actor,
            purpose,
            part_number,
            payload_json,
            detail,
        })
    }
}
