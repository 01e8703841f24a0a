// ==========================================
// 工序跟踪系统 - 内存件号仓（规范化索引）
// ==========================================
// 结构: 件号按加载顺序存放，另建 part_number / phase_id / subphase_id → 下标 的索引
// 更新: 通过下标直接定位修改，不做整树深拷贝；下标访问全部做越界检查
// 对账: 单个件号整棵子树整体替换（幂等）
// ==========================================

use crate::domain::item::{Item, Material, Phase, Subphase};
use crate::domain::types::PhaseRunState;
use std::collections::HashMap;

/// 工序位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSlot {
    pub item_idx: usize,
    pub phase_idx: usize,
}

/// 子工序位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubphaseSlot {
    pub item_idx: usize,
    pub phase_idx: usize,
    pub subphase_idx: usize,
}

// ==========================================
// ItemStore
// ==========================================
#[derive(Debug, Default)]
pub struct ItemStore {
    items: Vec<Item>,
    by_part: HashMap<String, usize>,
    by_phase: HashMap<i64, PhaseSlot>,
    by_subphase: HashMap<i64, SubphaseSlot>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 重建全部索引
    fn reindex(&mut self) {
        self.by_part.clear();
        self.by_phase.clear();
        self.by_subphase.clear();

        for (item_idx, item) in self.items.iter().enumerate() {
            self.by_part.insert(item.part_number.clone(), item_idx);
            for (phase_idx, phase) in item.phases.iter().enumerate() {
                self.by_phase.insert(phase.id, PhaseSlot { item_idx, phase_idx });
                for (subphase_idx, sub) in phase.subphases.iter().enumerate() {
                    self.by_subphase.insert(
                        sub.id,
                        SubphaseSlot {
                            item_idx,
                            phase_idx,
                            subphase_idx,
                        },
                    );
                }
            }
        }
    }

    // ==========================================
    // 整体加载 / 替换
    // ==========================================

    /// 用新的集合整体替换（集合级刷新）
    pub fn replace_all(&mut self, items: Vec<Item>) {
        self.items = items;
        self.reindex();
    }

    /// 整体替换单个件号的子树；不存在时追加
    ///
    /// # 返回
    /// - true: 替换了已有件号
    /// - false: 新增
    pub fn upsert_item(&mut self, item: Item) -> bool {
        let replaced = match self.by_part.get(&item.part_number) {
            Some(&idx) => {
                self.items[idx] = item;
                true
            }
            None => {
                self.items.push(item);
                false
            }
        };
        self.reindex();
        replaced
    }

    pub fn remove_item(&mut self, part_number: &str) -> Option<Item> {
        let idx = self.by_part.get(part_number).copied()?;
        let removed = self.items.remove(idx);
        self.reindex();
        Some(removed)
    }

    /// 卸载时清空
    pub fn clear(&mut self) {
        self.items.clear();
        self.reindex();
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, part_number: &str) -> Option<&Item> {
        self.by_part.get(part_number).and_then(|&idx| self.items.get(idx))
    }

    /// 定位工序，并校验其归属件号
    ///
    /// 位置只在本次持锁期间有效；跨 await 后必须重新定位
    pub fn locate_phase(&self, part_number: &str, phase_id: i64) -> Option<PhaseSlot> {
        let slot = self.by_phase.get(&phase_id).copied()?;
        let item = self.items.get(slot.item_idx)?;
        (item.part_number == part_number).then_some(slot)
    }

    /// 定位子工序，并校验其归属件号与工序
    pub fn locate_subphase(
        &self,
        part_number: &str,
        phase_id: i64,
        subphase_id: i64,
    ) -> Option<SubphaseSlot> {
        let slot = self.by_subphase.get(&subphase_id).copied()?;
        let item = self.items.get(slot.item_idx)?;
        let phase = item.phases.get(slot.phase_idx)?;
        (item.part_number == part_number && phase.id == phase_id).then_some(slot)
    }

    pub fn phase(&self, slot: PhaseSlot) -> Option<&Phase> {
        self.items.get(slot.item_idx)?.phases.get(slot.phase_idx)
    }

    pub fn subphase(&self, slot: SubphaseSlot) -> Option<&Subphase> {
        self.items
            .get(slot.item_idx)?
            .phases
            .get(slot.phase_idx)?
            .subphases
            .get(slot.subphase_idx)
    }

    // ==========================================
    // 按下标修改（位置失效时返回 None / false，不会越界）
    // ==========================================

    /// 某件号的全部工序（状态机需要前后工序）
    pub fn phases_mut(&mut self, item_idx: usize) -> Option<&mut [Phase]> {
        self.items.get_mut(item_idx).map(|item| item.phases.as_mut_slice())
    }

    pub fn phase_mut(&mut self, slot: PhaseSlot) -> Option<&mut Phase> {
        self.items.get_mut(slot.item_idx)?.phases.get_mut(slot.phase_idx)
    }

    fn subphase_mut(&mut self, slot: SubphaseSlot) -> Option<&mut Subphase> {
        self.phase_mut(PhaseSlot {
            item_idx: slot.item_idx,
            phase_idx: slot.phase_idx,
        })?
        .subphases
        .get_mut(slot.subphase_idx)
    }

    pub fn item_mut(&mut self, part_number: &str) -> Option<&mut Item> {
        let idx = self.by_part.get(part_number).copied()?;
        self.items.get_mut(idx)
    }

    /// 替换某个子工序的物料列表；位置失效时返回 false
    pub fn set_subphase_materials(&mut self, slot: SubphaseSlot, materials: Vec<Material>) -> bool {
        match self.subphase_mut(slot) {
            Some(sub) => {
                sub.materials = materials;
                true
            }
            None => false,
        }
    }

    /// 修改单个物料；位置失效或物料不存在时返回 false
    pub fn update_material<F>(&mut self, slot: SubphaseSlot, material_id: i64, f: F) -> bool
    where
        F: FnOnce(&mut Material),
    {
        let Some(sub) = self.subphase_mut(slot) else {
            return false;
        };
        match sub.materials.iter_mut().find(|m| m.id == material_id) {
            Some(m) => {
                f(m);
                true
            }
            None => false,
        }
    }

    /// 全部计时中的工序（件号, 工序）
    pub fn running_phases(&self) -> impl Iterator<Item = (&str, &Phase)> {
        self.items.iter().flat_map(|item| {
            item.phases
                .iter()
                .filter(|p| p.run_state() == PhaseRunState::Running)
                .map(move |p| (item.part_number.as_str(), p))
        })
    }
}
