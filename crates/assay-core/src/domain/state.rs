//! Task lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::UnknownStatus;

/// TaskStatus はタスクの状態
///
/// 状態遷移（前進のみ）:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed
/// - Pending -> Completed / Failed（running は省略可）
///
/// Completed と Failed は終端。そこから出る遷移は無い。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// 作成済み、まだ誰も拾っていない
    Pending,

    /// 処理ルーチンが取得済み
    Running,

    /// 解析結果あり
    Completed,

    /// 処理に失敗（`last_error` を参照）
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// 終端状態か（以降の遷移なし）
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }

    /// `self` から `next` へ遷移できるか
    ///
    /// 非終端の同じ状態への遷移は許可（status を変えずに `detail` だけ更新できる）。
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use TaskStatus::*;

    #[rstest]
    #[case(Pending, Pending, true)]
    #[case(Pending, Running, true)]
    #[case(Pending, Completed, true)]
    #[case(Pending, Failed, true)]
    #[case(Running, Running, true)]
    #[case(Running, Completed, true)]
    #[case(Running, Failed, true)]
    #[case(Running, Pending, false)]
    #[case(Completed, Completed, false)]
    #[case(Completed, Failed, false)]
    #[case(Completed, Pending, false)]
    #[case(Failed, Running, false)]
    #[case(Failed, Failed, false)]
    fn transitions_only_move_forward(
        #[case] from: TaskStatus,
        #[case] to: TaskStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn string_forms_round_trip() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
    }

    #[test]
    fn unknown_strings_are_rejected() {
        let err = "done".parse::<TaskStatus>().unwrap_err();
        assert_eq!(err, UnknownStatus("done".to_string()));
    }
}
