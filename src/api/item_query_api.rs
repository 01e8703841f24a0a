// ==========================================
// 工序跟踪系统 - 件号查询 API（筛选/排序/分页）
// ==========================================
// 职责: 维护当前查询条件与页码，按页向后端请求并替换件号仓
// 规则: 查询条件变化 → 回到第 1 页
// ==========================================

use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::api::error::{ApiError, ApiResult};
use crate::api::reconcile::{hydrate_materials, lock_store, SharedStore};
use crate::backend::materials::MaterialsService;
use crate::backend::operations::OperationsService;
use crate::engine::query::{ItemPageRequest, ItemQuery, PageNav, PageWindow};

#[derive(Debug, Clone)]
struct QueryState {
    request: ItemPageRequest,
    window: PageWindow,
}

// ==========================================
// ItemQueryApi
// ==========================================
pub struct ItemQueryApi {
    store: SharedStore,
    operations: Arc<dyn OperationsService>,
    materials: Arc<dyn MaterialsService>,
    state: Mutex<QueryState>,
}

impl ItemQueryApi {
    pub fn new(
        store: SharedStore,
        operations: Arc<dyn OperationsService>,
        materials: Arc<dyn MaterialsService>,
        page_size: u32,
    ) -> Self {
        let page_size = page_size.max(1);
        Self {
            store,
            operations,
            materials,
            state: Mutex::new(QueryState {
                request: ItemPageRequest {
                    page: 1,
                    page_size,
                    query: ItemQuery::default(),
                },
                window: PageWindow::new(1, page_size, 0),
            }),
        }
    }

    fn state(&self) -> ApiResult<std::sync::MutexGuard<'_, QueryState>> {
        self.state
            .lock()
            .map_err(|e| ApiError::InternalError(format!("查询状态锁获取失败: {}", e)))
    }

    /// 当前分页元数据
    pub fn window(&self) -> ApiResult<PageWindow> {
        Ok(self.state()?.window)
    }

    /// 当前查询条件
    pub fn query(&self) -> ApiResult<ItemQuery> {
        Ok(self.state()?.request.query.clone())
    }

    /// 更新查询条件（回到第 1 页并加载）
    pub async fn set_query(&self, query: ItemQuery) -> ApiResult<PageWindow> {
        let request = {
            let mut state = self.state()?;
            state.request.query = query;
            state.request.page = 1;
            state.request.clone()
        };
        debug!(search = %request.query.search, sort = request.query.sort.as_str(), "查询条件已更新");
        self.load(request).await
    }

    /// 翻页；无法翻页时返回 None 且不发请求
    pub async fn navigate(&self, nav: PageNav) -> ApiResult<Option<PageWindow>> {
        let request = {
            let state = self.state()?;
            let Some(page) = state.window.target(nav) else {
                return Ok(None);
            };
            let mut request = state.request.clone();
            request.page = page;
            request
        };
        self.load(request).await.map(Some)
    }

    /// 重新加载当前页（集合级对账）
    pub async fn reload(&self) -> ApiResult<PageWindow> {
        let request = self.state()?.request.clone();
        self.load(request).await
    }

    async fn load(&self, request: ItemPageRequest) -> ApiResult<PageWindow> {
        let mut page = self.operations.get_items_paginated(&request).await?;

        // 删除后当前页越界 → 退到最后一页
        let window = PageWindow::from_page(&page);
        if page.items.is_empty() && page.total_items > 0 && request.page > window.total_pages {
            let mut last = request.clone();
            last.page = window.total_pages;
            page = self.operations.get_items_paginated(&last).await?;
        }

        for item in page.items.iter_mut() {
            hydrate_materials(self.materials.as_ref(), item).await?;
        }

        let window = PageWindow::from_page(&page);
        let count = page.items.len();
        lock_store(&self.store)?.replace_all(page.items);

        {
            let mut state = self.state()?;
            state.request = request;
            state.request.page = window.current_page;
            state.window = window;
        }

        info!(
            page = window.current_page,
            total_pages = window.total_pages,
            total_items = window.total_items,
            loaded = count,
            "件号列表已加载"
        );
        Ok(window)
    }
}
