//! 药物卡片编辑器
//!
//! 在药物列表上提供增删改、拖拽排序，以及"剂量栏按Tab跳到下一味药名"的
//! 键盘录入流程。只读模式下所有修改操作都被忽略。

use maizhen_core::{EntryId, Medicine};
use tracing::{debug, warn};

/// 可编辑字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MedicineField {
    Name,
    Dosage,
}

/// 焦点位置：第几行的哪个输入框
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Focus {
    pub row: usize,
    pub field: MedicineField,
}

/// 剂量栏按Tab的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabOutcome {
    /// 末行：新增空白行并聚焦其药名
    Appended(Focus),
    /// 非末行：直接聚焦下一行药名
    Moved(Focus),
    /// 不拦截，交给默认的焦点顺序
    PassThrough,
}

/// 拖拽中的临时状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DragState {
    source: Option<usize>,
    over: Option<usize>,
}

/// 药物卡片编辑器
#[derive(Debug, Clone, Default)]
pub struct MedicineEditor {
    medicines: Vec<Medicine>,
    read_only: bool,
    drag: DragState,
    focus: Option<Focus>,
}

impl MedicineEditor {
    pub fn new(medicines: Vec<Medicine>) -> Self {
        Self {
            medicines,
            ..Self::default()
        }
    }

    pub fn medicines(&self) -> &[Medicine] {
        &self.medicines
    }

    pub fn into_medicines(self) -> Vec<Medicine> {
        self.medicines
    }

    /// 整体替换列表（加载病历、填入处方），清除拖拽与焦点状态
    pub fn replace(&mut self, medicines: Vec<Medicine>) {
        self.medicines = medicines;
        self.drag = DragState::default();
        self.focus = None;
    }

    pub fn len(&self) -> usize {
        self.medicines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.medicines.is_empty()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
        if read_only {
            self.drag = DragState::default();
        }
    }

    pub fn focus(&self) -> Option<Focus> {
        self.focus
    }

    pub fn set_focus(&mut self, focus: Option<Focus>) {
        self.focus = focus;
    }

    fn guard(&self, action: &str) -> bool {
        if self.read_only {
            debug!("Ignoring {} on read-only medicine editor", action);
        }
        !self.read_only
    }

    /// 追加空白药物，返回新条目ID
    pub fn add(&mut self) -> Option<EntryId> {
        if !self.guard("add") {
            return None;
        }
        let medicine = Medicine::blank();
        let id = medicine.id;
        self.medicines.push(medicine);
        Some(id)
    }

    /// 修改指定条目的字段
    pub fn update(&mut self, id: EntryId, field: MedicineField, value: impl Into<String>) -> bool {
        if !self.guard("update") {
            return false;
        }
        match self.medicines.iter_mut().find(|m| m.id == id) {
            Some(medicine) => {
                match field {
                    MedicineField::Name => medicine.name = value.into(),
                    MedicineField::Dosage => medicine.dosage = value.into(),
                }
                true
            }
            None => {
                warn!("Medicine {} not found, update ignored", id);
                false
            }
        }
    }

    /// 删除指定条目
    pub fn remove(&mut self, id: EntryId) -> bool {
        if !self.guard("remove") {
            return false;
        }
        let before = self.medicines.len();
        self.medicines.retain(|m| m.id != id);
        before != self.medicines.len()
    }

    /// 剂量栏按下Tab
    ///
    /// 末行时原子地追加新行并把焦点移到新行药名；其他行直接跳到下一行药名，
    /// 跳过拖拽手柄与删除按钮。Shift+Tab 不拦截。
    pub fn tab_from_dosage(&mut self, row: usize, shift: bool) -> TabOutcome {
        if shift || self.read_only || row >= self.medicines.len() {
            return TabOutcome::PassThrough;
        }

        let next = Focus {
            row: row + 1,
            field: MedicineField::Name,
        };

        if row + 1 == self.medicines.len() {
            self.medicines.push(Medicine::blank());
            self.focus = Some(next);
            TabOutcome::Appended(next)
        } else {
            self.focus = Some(next);
            TabOutcome::Moved(next)
        }
    }

    /// 开始拖拽
    pub fn drag_start(&mut self, index: usize) {
        if !self.guard("drag") || index >= self.medicines.len() {
            return;
        }
        self.drag.source = Some(index);
    }

    /// 拖拽经过目标位置
    pub fn drag_over(&mut self, index: usize) {
        if self.drag.source.is_some() && index < self.medicines.len() {
            self.drag.over = Some(index);
        }
    }

    /// 放下：先移除源条目，再插入到目标位置；返回是否发生了移动
    pub fn drop_on(&mut self, target: usize) -> bool {
        let source = self.drag.source;
        self.drag = DragState::default();

        let Some(source) = source else {
            return false;
        };
        if self.read_only || source == target || source >= self.medicines.len() {
            return false;
        }

        let moved = self.medicines.remove(source);
        let target = target.min(self.medicines.len());
        self.medicines.insert(target, moved);
        true
    }

    /// 拖拽结束（含未放下的取消），总是清除临时状态
    pub fn drag_end(&mut self) {
        self.drag = DragState::default();
    }

    pub fn dragging_index(&self) -> Option<usize> {
        self.drag.source
    }

    /// 当前高亮的放置目标
    pub fn drop_target(&self) -> Option<usize> {
        self.drag.over
    }
}
