//! 状态变化判定
//!
//! 边沿触发：只有新的探测结果与上一次记录不同时才产生状态变化。

use crate::health::history::CheckRecord;
use serde::{Deserialize, Serialize};

/// 没有历史记录时的默认状态
///
/// 未检测过的站点视为正常，因此首次探测失败会产生宕机事件，
/// 首次探测成功则不产生事件。
pub const DEFAULT_PRIOR_UP: bool = true;

/// 站点状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// 由宕机恢复为正常
    Recovered,
    /// 由正常变为宕机
    WentDown,
}

impl Transition {
    /// 变化后的新状态
    pub fn up(self) -> bool {
        matches!(self, Transition::Recovered)
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Recovered => write!(f, "恢复"),
            Transition::WentDown => write!(f, "宕机"),
        }
    }
}

/// 由最近一条检测记录推导上一次状态
pub fn prior_up(last: Option<&CheckRecord>) -> bool {
    last.map_or(DEFAULT_PRIOR_UP, |record| record.up)
}

/// 判定是否发生状态变化
pub fn evaluate(prior_up: bool, new_up: bool) -> Option<Transition> {
    match (prior_up, new_up) {
        (true, false) => Some(Transition::WentDown),
        (false, true) => Some(Transition::Recovered),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_evaluate_is_edge_triggered() {
        assert_eq!(evaluate(true, true), None);
        assert_eq!(evaluate(false, false), None);
        assert_eq!(evaluate(true, false), Some(Transition::WentDown));
        assert_eq!(evaluate(false, true), Some(Transition::Recovered));
    }

    #[test]
    fn test_transition_carries_new_state() {
        assert!(Transition::Recovered.up());
        assert!(!Transition::WentDown.up());
    }

    #[test]
    fn test_prior_up_defaults_to_healthy() {
        assert!(prior_up(None));

        let record = CheckRecord {
            site_id: 1,
            up: false,
            checked_at: Utc::now(),
        };
        assert!(!prior_up(Some(&record)));
    }
}
