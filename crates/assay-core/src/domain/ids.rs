//! Task identifiers.
//!
//! ID は `task-<ULID>` 形式の不透明なトークンです。
//! - 生成は `IdGenerator`（ULID ベース）に任せる
//! - ストアの検索は任意の `&str` をそのままキーとして使う（見つからなければ absent）
//! - ファイル名などに使う前は `TaskId::parse` で検証する
//!
//! ULID は時刻でソート可能なので、`list_tasks` の結果を並べると作成順になります。

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use ulid::Ulid;

use super::errors::StoreError;

const PREFIX: &str = "task-";

/// TaskId はタスクの識別子。作成時に 1 度だけ割り当て、再利用しない
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// `parse` が受け付ける最大長
    pub const MAX_LEN: usize = 128;

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(format!("{PREFIX}{ulid}"))
    }

    /// ファイル名などに使う前に id を検証する
    ///
    /// `MAX_LEN` バイト以下の印字可能 ASCII なら受け付ける。`task-` prefix は必須ではない
    /// （別バックエンドが発行した id もそのまま扱える）。
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        if raw.is_empty() {
            return Err(StoreError::InvalidArgument(
                "task id must not be empty".to_string(),
            ));
        }
        if raw.len() > Self::MAX_LEN {
            return Err(StoreError::InvalidArgument(format!(
                "task id exceeds {} bytes",
                Self::MAX_LEN
            )));
        }
        if !raw.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(StoreError::InvalidArgument(
                "task id must be printable ASCII without whitespace".to_string(),
            ));
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `from_ulid` で作った id なら、埋め込まれた ULID
    pub fn ulid(&self) -> Option<Ulid> {
        self.0
            .strip_prefix(PREFIX)
            .and_then(|raw| Ulid::from_string(raw).ok())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

// String と同じ Hash/Eq なので HashMap<TaskId, _> を &str で引ける
impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
