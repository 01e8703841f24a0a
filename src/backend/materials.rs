// ==========================================
// 工序跟踪系统 - 物料服务接口 + 响应解析边界
// ==========================================
// 物料列表响应可能是:
//   1. 裸数组            [ {...}, ... ]
//   2. data 包装         { "data": [ ... ] }
//   3. success 信封      { "success": true, "data": [ ... ] }
// 下游只通过 decode_materials_response 取数，不再各自判断形状
// ==========================================

use crate::backend::error::{BackendError, BackendResult};
use crate::domain::item::Material;
use crate::domain::types::MaterialStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 物料行更新字段（None 表示不修改）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_out_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_out_by_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_out_by_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MaterialStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl MaterialUpdate {
    /// 应用到本地物料
    pub fn apply_to(&self, material: &mut Material) {
        if let Some(v) = &self.checked_out_by {
            material.checked_out_by = Some(v.clone());
        }
        if let Some(v) = &self.checked_out_by_uid {
            material.checked_out_by_uid = Some(v.clone());
        }
        if let Some(v) = &self.checked_out_by_name {
            material.checked_out_by_name = Some(v.clone());
        }
        if let Some(v) = self.checkout_date {
            material.checkout_date = Some(v);
        }
        if let Some(v) = self.status {
            material.status = v;
        }
        if let Some(v) = &self.notes {
            material.notes = Some(v.clone());
        }
    }
}

#[async_trait]
pub trait MaterialsService: Send + Sync {
    /// 原始响应，交由 decode_materials_response 解析
    async fn get_subphase_materials(&self, subphase_id: i64) -> BackendResult<JsonValue>;

    async fn update_material(&self, material_id: i64, update: &MaterialUpdate) -> BackendResult<()>;
}

// ==========================================
// 响应解析边界
// ==========================================

#[derive(Deserialize)]
#[serde(untagged)]
enum MaterialsShape {
    Bare(Vec<Material>),
    Envelope {
        success: bool,
        #[serde(default)]
        data: Option<Vec<Material>>,
        #[serde(default)]
        message: Option<String>,
    },
    Wrapped {
        data: Vec<Material>,
    },
}

/// 解析物料列表响应
///
/// # 返回
/// - Ok(Vec<Material>): 物料列表（信封内 data 为空视为空列表）
/// - Err(BackendError::Decode): 形状无法识别或字段错误
/// - Err(BackendError::Rejected): success=false 的信封
pub fn decode_materials_response(raw: JsonValue) -> BackendResult<Vec<Material>> {
    let shape: MaterialsShape = serde_json::from_value(raw)
        .map_err(|e| BackendError::Decode(format!("无法识别的物料列表响应: {}", e)))?;

    match shape {
        MaterialsShape::Bare(list) => Ok(list),
        MaterialsShape::Wrapped { data } => Ok(data),
        MaterialsShape::Envelope {
            success: true,
            data,
            ..
        } => Ok(data.unwrap_or_default()),
        MaterialsShape::Envelope {
            success: false,
            message,
            ..
        } => Err(BackendError::Rejected(
            message.unwrap_or_else(|| "物料列表请求失败".to_string()),
        )),
    }
}
