// ==========================================
// 工序跟踪系统 - 库存扣减台账仓储
// ==========================================
// 对齐: db.rs 中的 material_deduction 表
// 红线: 扣减前先占用（claimed），扣减成功改为 deducted；只有 claimed 记录可以释放
// 说明: 以 material_id 为主键，重复占用由唯一约束拒绝，进程重启后仍然有效
// ==========================================

use crate::domain::deduction::{DeductionState, MaterialDeduction};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 占用请求
#[derive(Debug, Clone)]
pub struct DeductionClaim<'a> {
    pub material_id: i64,
    pub part_number: &'a str,
    pub subphase_id: i64,
    pub quantity: f64,
    pub actor: &'a str,
}

// ==========================================
// MaterialDeductionRepository
// ==========================================
pub struct MaterialDeductionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MaterialDeductionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 占用物料
    ///
    /// # 返回
    /// - `Ok(true)`: 占用成功，可以扣减
    /// - `Ok(false)`: 已有记录（进行中或已扣减），不得再次扣减
    pub fn claim(&self, claim: &DeductionClaim<'_>) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO material_deduction (
                material_id, part_number, subphase_id, quantity, actor, state, claimed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                claim.material_id,
                claim.part_number,
                claim.subphase_id,
                claim.quantity,
                claim.actor,
                DeductionState::Claimed.as_str(),
                Utc::now().naive_utc().format(TS_FORMAT).to_string(),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// 扣减成功，记录库存条目
    pub fn mark_deducted(&self, material_id: i64, inventory_item_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            r#"
            UPDATE material_deduction
            SET state = ?, inventory_item_id = ?, deducted_at = ?
            WHERE material_id = ?
            "#,
            params![
                DeductionState::Deducted.as_str(),
                inventory_item_id,
                Utc::now().naive_utc().format(TS_FORMAT).to_string(),
                material_id,
            ],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "MaterialDeduction".to_string(),
                id: material_id.to_string(),
            });
        }
        Ok(())
    }

    /// 扣减失败，释放占用；已扣减的记录不受影响
    pub fn release(&self, material_id: i64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM material_deduction WHERE material_id = ? AND state = ?",
            params![material_id, DeductionState::Claimed.as_str()],
        )?;
        Ok(deleted == 1)
    }

    /// 物料的扣减状态（无记录 → None）
    pub fn state(&self, material_id: i64) -> RepositoryResult<Option<DeductionState>> {
        let conn = self.get_conn()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT state FROM material_deduction WHERE material_id = ?",
                params![material_id],
                |row| row.get(0),
            )
            .optional()?;
        match value {
            None => Ok(None),
            Some(s) => DeductionState::parse(&s).map(Some).ok_or_else(|| {
                RepositoryError::FieldValueError {
                    field: "state".to_string(),
                    message: format!("未知扣减状态: {}", s),
                }
            }),
        }
    }

    /// 查询件号的全部扣减记录
    pub fn find_by_part_number(&self, part_number: &str) -> RepositoryResult<Vec<MaterialDeduction>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT material_id, part_number, subphase_id, quantity, actor, state,
                   inventory_item_id, claimed_at, deducted_at
            FROM material_deduction
            WHERE part_number = ?
            ORDER BY material_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![part_number], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}

fn parse_ts(idx: usize, value: &str) -> SqliteResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TS_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn map_row(row: &Row) -> SqliteResult<MaterialDeduction> {
    let state_str: String = row.get(5)?;
    let state = DeductionState::parse(&state_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("未知扣减状态: {}", state_str).into(),
        )
    })?;
    let claimed_at: String = row.get(7)?;
    let deducted_at: Option<String> = row.get(8)?;

    Ok(MaterialDeduction {
        material_id: row.get(0)?,
        part_number: row.get(1)?,
        subphase_id: row.get(2)?,
        quantity: row.get(3)?,
        actor: row.get(4)?,
        state,
        inventory_item_id: row.get(6)?,
        claimed_at: parse_ts(7, &claimed_at)?,
        deducted_at: deducted_at.as_deref().map(|s| parse_ts(8, s)).transpose()?,
    })
}
