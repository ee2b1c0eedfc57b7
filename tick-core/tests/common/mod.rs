//! End-to-end test helpers: compile a source string through the full
//! pipeline and execute `main`.

use std::path::Path;
use tick_core::compiler::modules::ModuleLoader;
use tick_core::pipeline::{compile_source, run_compiled, PipelineError};
use tick_core::vfs::MemoryFs;
use tick_core::{CompiledProgram, Value};

/// Compile `src` with an empty module tree.
pub fn compile(src: &str) -> Result<CompiledProgram, PipelineError> {
    let mut loader = ModuleLoader::new(Box::new(MemoryFs::new()));
    compile_source(src, Path::new("/test/main.tick"), &mut loader)
}

/// Compile and run `main`, returning its value.
pub fn run_source(src: &str) -> Result<Value, PipelineError> {
    run_compiled(&compile(src)?)
}

/// Compile against an in-memory module tree rooted at `/test/`.
pub fn run_with_modules(src: &str, files: &[(&str, &str)]) -> Result<Value, PipelineError> {
    let fs = MemoryFs::with_files(files.iter().map(|(p, s)| (*p, *s)));
    let mut loader = ModuleLoader::new(Box::new(fs));
    let program = compile_source(src, Path::new("/test/main.tick"), &mut loader)?;
    run_compiled(&program)
}

pub fn get_int(value: &Value) -> Option<i32> {
    value.as_int()
}

#[allow(dead_code)]
pub fn get_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}
