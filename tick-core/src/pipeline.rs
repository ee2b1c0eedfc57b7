//! Compile-and-execute façade.
//!
//! Source text → tokens → AST → import-resolved AST → compiled
//! streams, and a convenience runner that boots a runtime and executes
//! `main`. The cache interposes in front of this in the CLI.

use crate::compiler::error::{ParseError, SemanticError};
use crate::compiler::lexer::Lexer;
use crate::compiler::modules::ModuleLoader;
use crate::compiler::parser::Parser;
use crate::compiler::sema::SemanticAnalyzer;
use crate::runtime::codegen::{CodeGenerator, CompileError, CompiledProgram};
use crate::runtime::error::RuntimeError;
use crate::runtime::interp::Interpreter;
use crate::runtime::runtime::Runtime;
use crate::runtime::value::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("semantic analysis failed:\n{}", format_semantic_errors(.0))]
    Semantic(Vec<SemanticError>),
    #[error("{0}")]
    Compile(#[from] CompileError),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
    #[error("No main function found")]
    NoMain,
}

fn format_semantic_errors(errors: &[SemanticError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run the whole front end over `source`. `source_path` anchors module
/// resolution and diagnostics.
pub fn compile_source(
    source: &str,
    source_path: &Path,
    loader: &mut ModuleLoader,
) -> Result<CompiledProgram, PipelineError> {
    let tokens = Lexer::new(source).tokenize();
    let mut program = Parser::new(tokens).parse()?;

    SemanticAnalyzer::new(loader)
        .analyze(&mut program, source_path)
        .map_err(PipelineError::Semantic)?;

    Ok(CodeGenerator::new().generate(&program)?)
}

/// Boot a runtime from compiled output and execute `main` to its
/// return value.
pub fn run_compiled(program: &CompiledProgram) -> Result<Value, PipelineError> {
    let main = program.main.as_ref().ok_or(PipelineError::NoMain)?;
    let runtime = Runtime::boot(program);
    let mut interp = Interpreter::new(runtime);
    Ok(interp.execute(main)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryFs;

    fn run(src: &str) -> Result<Value, PipelineError> {
        let mut loader = ModuleLoader::new(Box::new(MemoryFs::new()));
        let program = compile_source(src, Path::new("/test/main.tick"), &mut loader)?;
        run_compiled(&program)
    }

    #[test]
    fn test_compile_and_run() {
        let result = run("func main(): int { return 41 + 1; }").unwrap();
        assert_eq!(result.as_int(), Some(42));
    }

    #[test]
    fn test_no_main_is_an_error() {
        let result = run("func helper(): int { return 1; }");
        assert!(matches!(result.unwrap_err(), PipelineError::NoMain));
    }

    #[test]
    fn test_parse_error_propagates() {
        assert!(matches!(
            run("func main(): int {").unwrap_err(),
            PipelineError::Parse(_)
        ));
    }

    #[test]
    fn test_semantic_error_propagates() {
        assert!(matches!(
            run("event e; event e; func main(): int { return 0; }").unwrap_err(),
            PipelineError::Semantic(_)
        ));
    }
}
