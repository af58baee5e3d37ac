//! Impls - ports の実装（プロセス内）
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: HashMap + 単一の Mutex による正本
//! - **InMemoryDeliveryQueue**: FIFO + 完了トラッカー
//! - **LocalArtifactStore**: ローカルディレクトリ（既定は一時ディレクトリ）
//!
//! 永続化や分散キューはこのクレートの範囲外です。

pub mod inmem_delivery;
pub mod inmem_store;
pub mod local_artifacts;

pub use self::inmem_delivery::InMemoryDeliveryQueue;
pub use self::inmem_store::InMemoryTaskStore;
pub use self::local_artifacts::LocalArtifactStore;
