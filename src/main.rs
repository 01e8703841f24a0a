// ==========================================
// 工序跟踪系统 - 演示入口
// ==========================================
// 用内存后端 + SQLite 审计日志组装应用，挂载清单视图并打印第一页
// ==========================================

use std::sync::Arc;

use chrono::{Duration, Utc};

use ops_checklist::api::lock_store;
use ops_checklist::app::{get_default_db_path, AppState, BackendServices, ChecklistSession};
use ops_checklist::backend::identity::Employee;
use ops_checklist::backend::in_memory::InMemoryBackend;
use ops_checklist::backend::inventory::InventoryRecord;
use ops_checklist::backend::notification::LocalNotificationHub;
use ops_checklist::config::ChecklistSettings;
use ops_checklist::domain::{Item, Material, Phase, Priority, Subphase};
use ops_checklist::engine::SystemClock;

const DEMO_TICKS: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ops_checklist::logging::init();

    tracing::info!("==================================================");
    tracing::info!("{} v{}", ops_checklist::APP_NAME, ops_checklist::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let hub = LocalNotificationHub::new();
    let room = ChecklistSettings::default().notification_room;
    let backend = Arc::new(InMemoryBackend::new().with_notifications(hub.clone(), room));
    seed_demo(&backend)?;

    let services = BackendServices::in_memory(backend.clone(), hub);
    let state = AppState::new(db_path, services, Arc::new(SystemClock))
        .await
        .map_err(anyhow::Error::msg)?;
    let (mut session, window) = ChecklistSession::mount(Arc::new(state)).await?;

    println!(
        "第 {}/{} 页，共 {} 个件号",
        window.current_page, window.total_pages, window.total_items
    );
    {
        let store = lock_store(&session.state().store)?;
        for item in store.items() {
            println!(
                "  {} {} [{}] {} 进度 {:.0}%",
                item.part_number,
                item.name,
                item.priority,
                item.status(),
                item.completion_percent()
            );
        }
    }

    // 演示一次计时操作与事件同步
    let api = session.state().checklist_api.clone();
    api.start_phase("DEMO-001", 1).await?;
    let summary = session.sync_pending().await;
    tracing::info!(applied = summary.applied, duplicates = summary.duplicates, "事件同步完成");

    // 前台计时刷新: 走几个节拍，每拍重新读取计时中工序的耗时
    let mut ticker = session.ticker();
    for _ in 0..DEMO_TICKS {
        ticker.next().await;
        for reading in api.elapsed_snapshot()? {
            println!("  计时中: {} 工序 {} 已用 {} 秒", reading.part_number, reading.phase_id, reading.elapsed_seconds);
        }
    }

    session.teardown()?;
    Ok(())
}

fn seed_demo(backend: &InMemoryBackend) -> anyhow::Result<()> {
    let now = Utc::now();
    let subphase = |id: i64, name: &str, expected_quantity: i64, materials: Vec<Material>| Subphase {
        id,
        name: name.to_string(),
        completed: false,
        completed_at: None,
        time_duration: 0,
        expected_duration: None,
        expected_quantity,
        current_completed_quantity: 0,
        employee_uid: Some("E001".to_string()),
        employee_barcode: Some("B-E001".to_string()),
        employee_name: Some("张三".to_string()),
        materials,
    };
    let phase = |id: i64, name: &str, subphases: Vec<Subphase>| Phase {
        id,
        name: name.to_string(),
        start_time: None,
        pause_time: None,
        end_time: None,
        paused_duration: 0,
        expected_hours: Some(2.0),
        subphases,
    };
    let material = |id: i64, name: &str, qty: f64| Material {
        id,
        material_name: name.to_string(),
        material_quantity: qty,
        unit_of_measure: Some("kg".to_string()),
        status: Default::default(),
        checked_out_by: None,
        checked_out_by_uid: None,
        checked_out_by_name: None,
        checkout_date: None,
        notes: None,
    };

    for (n, priority) in [(1, Priority::High), (2, Priority::Medium), (3, Priority::Low)] {
        let base = n * 10;
        backend.seed_item(Item {
            part_number: format!("DEMO-{:03}", n),
            name: format!("演示件 {}", n),
            client: Some("演示客户".to_string()),
            priority,
            quantity: 5,
            remarks: None,
            start_time: None,
            end_time: None,
            created_at: now - Duration::days(n),
            phases: vec![
                phase(
                    base - 9,
                    "下料",
                    vec![
                        subphase(base * 10 + 1, "切割", 0, vec![material(base * 100 + 1, "钢板", 4.0)]),
                        subphase(base * 10 + 2, "打磨", 5, vec![]),
                    ],
                ),
                phase(base - 8, "焊接", vec![subphase(base * 10 + 3, "组焊", 0, vec![])]),
            ],
        })?;
    }

    backend.seed_inventory(InventoryRecord {
        id: "INV-STEEL".to_string(),
        name: "钢板".to_string(),
        item_type: Some("原材料".to_string()),
        balance: 100.0,
        unit: Some("kg".to_string()),
    })?;
    backend.seed_employee(Employee {
        uid: "E001".to_string(),
        username: "zhangsan".to_string(),
        id_number: Some("E001".to_string()),
        id_barcode: Some("B-E001".to_string()),
        display_name: Some("张三".to_string()),
    })?;
    Ok(())
}
