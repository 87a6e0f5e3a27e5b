//! tierflow コア
//!
//! スタック設定のモデル、KDL パーサー、ブロックビルダー、
//! リソース依存グラフ、検証、エンジン形式への合成を提供します。

pub mod blocks;
pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod parser;
pub mod stack;
pub mod synth;
pub mod validate;

pub use error::{Result, StackError};
pub use graph::{Dependency, ResourceGraph};
pub use loader::{load_stack, load_stack_config};
pub use model::*;
pub use parser::{parse_stack_file, parse_stack_string};
pub use stack::{Provider, Stack, StackHandles, SynthesizedStack};
pub use synth::to_terraform_json;
pub use validate::{Rule, Violation, validate};
