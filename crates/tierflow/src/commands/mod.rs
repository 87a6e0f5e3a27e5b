pub mod apply;
pub mod destroy;
pub mod graph;
pub mod output;
pub mod plan;
pub mod synth;
pub mod validate;
