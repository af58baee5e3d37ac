use serde_json::Value;

use crate::domain::{AnalyzeError, ArtifactRef};

/// Analyzer は staged artifact の重い解析
///
/// 同期・CPU バウンド。呼び出しは `LimitedAnalyzer` 経由で、blocking pool に載せて
/// 同時実行数を制限する。
pub trait Analyzer: Send + Sync + 'static {
    fn analyze(&self, artifact: &ArtifactRef) -> Result<Value, AnalyzeError>;
}
