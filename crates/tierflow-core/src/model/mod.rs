//! モデル定義
//!
//! リソース宣言とスタック設定のデータモデルを定義します。

mod cidr;
mod resource;
mod stack;
mod value;

// Re-exports
pub use cidr::*;
pub use resource::*;
pub use stack::*;
pub use value::*;
