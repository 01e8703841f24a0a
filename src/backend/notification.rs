// ==========================================
// 工序跟踪系统 - 通知通道
// ==========================================
// 职责: 加入房间、按主题订阅刷新事件
// 说明: 订阅句柄 Drop 时自动注销，视图卸载后不再收到事件
// 实现: LocalNotificationHub（进程内，tokio mpsc）
// ==========================================

use crate::backend::error::{BackendError, BackendResult};
use crate::engine::events::{RefreshEvent, Topic};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// 通知通道
pub trait NotificationChannel: Send + Sync {
    /// 加入房间（只有已加入的房间的事件会被投递）
    fn join_room(&self, room: &str) -> BackendResult<()>;

    fn leave_room(&self, room: &str);

    /// 订阅主题
    fn subscribe(&self, topic: Topic) -> Subscription;
}

// ==========================================
// Subscription - 订阅句柄
// ==========================================

type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

pub struct Subscription {
    topic: Topic,
    receiver: UnboundedReceiver<RefreshEvent>,
    on_drop: Option<Unsubscribe>,
}

impl Subscription {
    pub fn new(
        topic: Topic,
        receiver: UnboundedReceiver<RefreshEvent>,
        on_drop: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            topic,
            receiver,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// 等待下一个事件；通道关闭返回 None
    pub async fn recv(&mut self) -> Option<RefreshEvent> {
        self.receiver.recv().await
    }

    /// 非阻塞读取
    pub fn try_recv(&mut self) -> Option<RefreshEvent> {
        self.receiver.try_recv().ok()
    }

    /// 显式注销
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f();
        }
        self.receiver.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("topic", &self.topic).finish()
    }
}

// ==========================================
// LocalNotificationHub - 进程内通知中心
// ==========================================

#[derive(Default)]
struct HubInner {
    next_id: u64,
    rooms: HashSet<String>,
    subscribers: HashMap<u64, (Topic, UnboundedSender<RefreshEvent>)>,
}

#[derive(Clone, Default)]
pub struct LocalNotificationHub {
    inner: Arc<Mutex<HubInner>>,
}

impl LocalNotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        // 订阅表无跨字段不变量，锁中毒时继续使用
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 向房间广播事件，返回投递数量
    pub fn publish(&self, room: &str, event: RefreshEvent) -> usize {
        let mut inner = self.lock();
        if !inner.rooms.contains(room) {
            debug!(room, kind = event.kind.as_str(), "房间未加入，事件丢弃");
            return 0;
        }

        let topic = event.kind.topic();
        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, (sub_topic, tx)) in inner.subscribers.iter() {
            if *sub_topic != topic {
                continue;
            }
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(*id);
            }
        }
        for id in closed {
            inner.subscribers.remove(&id);
        }
        delivered
    }

    /// 当前订阅数
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl NotificationChannel for LocalNotificationHub {
    fn join_room(&self, room: &str) -> BackendResult<()> {
        if room.trim().is_empty() {
            return Err(BackendError::Rejected("房间名不能为空".to_string()));
        }
        self.lock().rooms.insert(room.to_string());
        debug!(room, "已加入通知房间");
        Ok(())
    }

    fn leave_room(&self, room: &str) {
        self.lock().rooms.remove(room);
    }

    fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = unbounded_channel();
        let id = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.subscribers.insert(id, (topic, tx));
            id
        };

        let hub = Arc::downgrade(&self.inner);
        Subscription::new(topic, rx, move || {
            if let Some(inner) = hub.upgrade() {
                let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
                inner.subscribers.remove(&id);
            }
        })
    }
}
