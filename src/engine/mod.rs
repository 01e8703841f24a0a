// ==========================================
// 工序跟踪系统 - 引擎层
// ==========================================
// 职责: 工序计时状态机、子工序完成规则、内存件号仓、筛选分页规则、刷新事件
// 红线: 引擎不访问后端，只计算并就地修改内存树
// ==========================================

pub mod clock;
pub mod error;
pub mod events;
pub mod phase_timer;
pub mod query;
pub mod store;
pub mod subphase_completion;
pub mod ticker;

// 重导出
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{RuleResult, RuleViolation, ViolationKind};
pub use events::{EventDeduplicator, RefreshEvent, RefreshEventKind, RefreshScope, Topic};
pub use phase_timer::PhaseTimer;
pub use query::{ItemPage, ItemPageRequest, ItemQuery, PageNav, PageWindow};
pub use store::{ItemStore, PhaseSlot, SubphaseSlot};
pub use subphase_completion::{CompletionOutcome, QuantityUpdate, SubphaseCompletionEngine};
pub use ticker::{running_elapsed, ElapsedReading, ElapsedTicker};
