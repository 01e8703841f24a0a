// ==========================================
// 工序跟踪系统 - 员工身份服务接口
// ==========================================

use crate::backend::error::BackendResult;
use crate::domain::item::EmployeeAssignment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 员工档案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub uid: String,
    pub username: String,
    #[serde(default)]
    pub id_number: Option<String>,
    #[serde(default)]
    pub id_barcode: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Employee {
    /// 转为子工序上的分配信息（显示名缺失时用用户名）
    pub fn to_assignment(&self) -> EmployeeAssignment {
        EmployeeAssignment {
            uid: self.uid.clone(),
            barcode: self
                .id_barcode
                .clone()
                .or_else(|| self.id_number.clone())
                .unwrap_or_default(),
            name: self
                .display_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| self.username.clone()),
        }
    }
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn get_employee(&self, uid: &str) -> BackendResult<Employee>;
}
