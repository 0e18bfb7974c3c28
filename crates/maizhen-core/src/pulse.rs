//! 脉象九宫格数据模型
//!
//! 左右两手 × 寸关尺三部 × 浮中沉三候，共18个格子，另加一个整体脉象描述。
//! 线上格式为扁平的JSON对象，键名形如 `left-cun-fu`，整体描述键为
//! `overall_description`。缺失的键视为空字符串。

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::{is_blank, value_to_string};

/// 整体脉象描述的键名
pub const OVERALL_KEY: &str = "overall_description";

/// 手
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

/// 部位（寸、关、尺）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Cun,
    Guan,
    Chi,
}

/// 取法深度（浮、中、沉）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Depth {
    Fu,
    Zhong,
    Chen,
}

impl Hand {
    pub const ALL: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Hand::Left => "left",
            Hand::Right => "right",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Hand::Left => "左手",
            Hand::Right => "右手",
        }
    }
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::Cun, Segment::Guan, Segment::Chi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Cun => "cun",
            Segment::Guan => "guan",
            Segment::Chi => "chi",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Segment::Cun => "寸",
            Segment::Guan => "关",
            Segment::Chi => "尺",
        }
    }
}

impl Depth {
    pub const ALL: [Depth; 3] = [Depth::Fu, Depth::Zhong, Depth::Chen];

    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Fu => "fu",
            Depth::Zhong => "zhong",
            Depth::Chen => "chen",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Depth::Fu => "浮",
            Depth::Zhong => "中",
            Depth::Chen => "沉",
        }
    }
}

/// 九宫格中的一个位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PulsePosition {
    pub hand: Hand,
    pub segment: Segment,
    pub depth: Depth,
}

impl PulsePosition {
    pub const COUNT: usize = 18;

    pub const fn new(hand: Hand, segment: Segment, depth: Depth) -> Self {
        Self { hand, segment, depth }
    }

    /// 全部18个位置，按 手 → 深度 → 部位 的显示顺序排列
    pub fn all() -> impl Iterator<Item = PulsePosition> {
        Hand::ALL.into_iter().flat_map(|hand| {
            Depth::ALL.into_iter().flat_map(move |depth| {
                Segment::ALL
                    .into_iter()
                    .map(move |segment| PulsePosition::new(hand, segment, depth))
            })
        })
    }

    /// 线上键名，如 `left-cun-fu`
    pub fn key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.hand.as_str(),
            self.segment.as_str(),
            self.depth.as_str()
        )
    }

    /// 显示标签，如 `寸浮`
    pub fn label(&self) -> String {
        format!("{}{}", self.segment.label(), self.depth.label())
    }

    /// 解析线上键名
    pub fn from_key(key: &str) -> Option<Self> {
        let mut parts = key.split('-');
        let hand = match parts.next()? {
            "left" => Hand::Left,
            "right" => Hand::Right,
            _ => return None,
        };
        let segment = match parts.next()? {
            "cun" => Segment::Cun,
            "guan" => Segment::Guan,
            "chi" => Segment::Chi,
            _ => return None,
        };
        let depth = match parts.next()? {
            "fu" => Depth::Fu,
            "zhong" => Depth::Zhong,
            "chen" => Depth::Chen,
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(hand, segment, depth))
    }

    fn index(&self) -> usize {
        let hand = match self.hand {
            Hand::Left => 0,
            Hand::Right => 1,
        };
        let depth = match self.depth {
            Depth::Fu => 0,
            Depth::Zhong => 1,
            Depth::Chen => 2,
        };
        let segment = match self.segment {
            Segment::Cun => 0,
            Segment::Guan => 1,
            Segment::Chi => 2,
        };
        hand * 9 + depth * 3 + segment
    }
}

/// 脉象九宫格
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PulseGrid {
    cells: [String; PulsePosition::COUNT],
    overall_description: String,
}

impl PulseGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(&self, position: PulsePosition) -> &str {
        &self.cells[position.index()]
    }

    pub fn set_cell(&mut self, position: PulsePosition, value: impl Into<String>) {
        self.cells[position.index()] = value.into();
    }

    pub fn overall_description(&self) -> &str {
        &self.overall_description
    }

    pub fn set_overall_description(&mut self, value: impl Into<String>) {
        self.overall_description = value.into();
    }

    /// 所有格子及整体描述均为空白
    pub fn is_empty(&self) -> bool {
        is_blank(&self.overall_description) && self.cells.iter().all(|c| is_blank(c))
    }

    /// 非空格子的 (位置, 内容) 列表
    pub fn filled_cells(&self) -> Vec<(PulsePosition, &str)> {
        PulsePosition::all()
            .map(|p| (p, self.cell(p)))
            .filter(|(_, v)| !is_blank(v))
            .collect()
    }
}

impl Serialize for PulseGrid {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let filled = self.filled_cells();
        let has_overall = !self.overall_description.is_empty();
        let mut map = serializer.serialize_map(Some(filled.len() + usize::from(has_overall)))?;
        for (position, value) in filled {
            map.serialize_entry(&position.key(), value)?;
        }
        if has_overall {
            map.serialize_entry(OVERALL_KEY, &self.overall_description)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PulseGrid {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct GridVisitor;

        impl<'de> Visitor<'de> for GridVisitor {
            type Value = PulseGrid;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a pulse grid object")
            }

            fn visit_unit<E>(self) -> std::result::Result<PulseGrid, E> {
                Ok(PulseGrid::default())
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<PulseGrid, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut grid = PulseGrid::default();
                while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
                    if key == OVERALL_KEY {
                        grid.overall_description = value_to_string(&value);
                    } else if let Some(position) = PulsePosition::from_key(&key) {
                        grid.set_cell(position, value_to_string(&value));
                    }
                    // 未知键忽略
                }
                Ok(grid)
            }
        }

        deserializer.deserialize_any(GridVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_are_fixed() {
        let keys: Vec<String> = PulsePosition::all().map(|p| p.key()).collect();
        assert_eq!(keys.len(), 18);
        assert_eq!(keys[0], "left-cun-fu");
        assert_eq!(keys[1], "left-guan-fu");
        assert_eq!(keys[17], "right-chi-chen");

        let mut dedup = keys.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 18);
    }

    #[test]
    fn test_key_parsing() {
        for p in PulsePosition::all() {
            assert_eq!(PulsePosition::from_key(&p.key()), Some(p));
        }
        assert_eq!(PulsePosition::from_key("left-cun"), None);
        assert_eq!(PulsePosition::from_key("middle-cun-fu"), None);
        assert_eq!(PulsePosition::from_key("left-cun-fu-x"), None);
    }

    #[test]
    fn test_missing_keys_are_empty() {
        let grid: PulseGrid = serde_json::from_str(r#"{"left-cun-fu": "浮滑"}"#).unwrap();
        let p = PulsePosition::new(Hand::Left, Segment::Cun, Depth::Fu);
        assert_eq!(grid.cell(p), "浮滑");
        assert_eq!(
            grid.cell(PulsePosition::new(Hand::Right, Segment::Chi, Depth::Chen)),
            ""
        );
        assert_eq!(grid.overall_description(), "");
        assert!(!grid.is_empty());
    }

    #[test]
    fn test_wire_format() {
        let mut grid = PulseGrid::new();
        grid.set_cell(PulsePosition::new(Hand::Right, Segment::Guan, Depth::Zhong), "弦");
        grid.set_overall_description("脉整体偏窄");

        let value = serde_json::to_value(&grid).unwrap();
        assert_eq!(value["right-guan-zhong"], "弦");
        assert_eq!(value["overall_description"], "脉整体偏窄");
        assert_eq!(value.as_object().unwrap().len(), 2);

        let back: PulseGrid = serde_json::from_value(value).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn test_blank_grid_is_empty() {
        let grid: PulseGrid =
            serde_json::from_str(r#"{"left-cun-fu": "  ", "overall_description": "", "junk": 3}"#)
                .unwrap();
        assert!(grid.is_empty());

        let null_grid: PulseGrid = serde_json::from_str("null").unwrap();
        assert!(null_grid.is_empty());
    }
}
