//! Tick core: the compile-and-execute pipeline for the Tick language.
//!
//! Tick is a small DSL for discrete, event-driven, parallel
//! computation: programs declare events, signals (typed blocking
//! queues) and processes (bodies attached to events), plus ordinary
//! functions and classes. This crate holds the whole pipeline —
//! lexer, parser, semantic analyzer with import splicing, bytecode
//! compiler, stack VM — together with the concurrency substrate
//! (signal queues, worker pool, event scheduler) and the on-disk
//! bytecode cache that memoizes the front end.
//!
//! No terminal or process concerns live here; `tick-cli` owns those.

pub mod cache;
pub mod compiler;
pub mod pipeline;
pub mod runtime;
pub mod vfs;

pub use compiler::modules::ModuleLoader;
pub use pipeline::{compile_source, run_compiled, PipelineError};
pub use runtime::codegen::CompiledProgram;
pub use runtime::runtime::Runtime;
pub use runtime::value::Value;
