//! 聊天窗口槽位分配
//!
//! 纯函数：按最近交互时间降序，时间相同按会话 ID 升序。
//! 前 `slots` 个会话依次获得 `Slot(0..)`，其余为 `Overflow`。

use crate::im::conversation::models::LayoutPosition;
use std::collections::HashMap;

pub fn assign_slots<'a, I>(windows: I, slots: usize) -> HashMap<String, LayoutPosition>
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut ordered: Vec<(&str, i64)> = windows.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ordered
        .into_iter()
        .enumerate()
        .map(|(i, (id, _))| {
            let position = if i < slots {
                LayoutPosition::Slot(i)
            } else {
                LayoutPosition::Overflow
            };
            (id.to_string(), position)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_recent_wins_slot() {
        let layout = assign_slots([("a", 10), ("b", 30), ("c", 20)], 2);
        assert_eq!(layout["b"], LayoutPosition::Slot(0));
        assert_eq!(layout["c"], LayoutPosition::Slot(1));
        assert_eq!(layout["a"], LayoutPosition::Overflow);
    }

    #[test]
    fn equal_timestamps_break_ties_by_id() {
        let first = assign_slots([("y", 5), ("x", 5)], 1);
        let second = assign_slots([("x", 5), ("y", 5)], 1);
        assert_eq!(first, second);
        assert_eq!(first["x"], LayoutPosition::Slot(0));
        assert_eq!(first["y"], LayoutPosition::Overflow);
    }

    #[test]
    fn zero_slots_overflows_everything() {
        let layout = assign_slots([("a", 1)], 0);
        assert_eq!(layout["a"], LayoutPosition::Overflow);
    }
}
