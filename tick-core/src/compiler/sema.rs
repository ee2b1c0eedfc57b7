//! Semantic analysis: import splicing and symbol checks.
//!
//! Walks the program in fixed order — imports, globals, events,
//! signals, classes, functions, processes — building one flat symbol
//! table keyed by name. Errors are cumulative; the pass reports them
//! all together. Type consistency beyond shape is left to the runtime.

use super::ast::{ClassDecl, FunctionDecl, Program};
use super::error::SemanticError;
use super::modules::ModuleLoader;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
    Event,
    Signal,
    Process,
    Class,
}

pub struct SemanticAnalyzer<'a> {
    loader: &'a mut ModuleLoader,
    symbols: HashMap<String, SymbolKind>,
    errors: Vec<SemanticError>,
}

impl<'a> SemanticAnalyzer<'a> {
    pub fn new(loader: &'a mut ModuleLoader) -> Self {
        Self {
            loader,
            symbols: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Resolve imports into `program` and check declarations.
    /// `source_path` locates the program for sibling-module resolution.
    pub fn analyze(
        mut self,
        program: &mut Program,
        source_path: &Path,
    ) -> Result<(), Vec<SemanticError>> {
        self.splice_imports(program, source_path);

        for global in &program.globals {
            self.declare(&global.name, SymbolKind::Variable);
        }
        for event in &program.events {
            self.declare(&event.name, SymbolKind::Event);
        }
        for signal in &program.signals {
            self.declare(&signal.name, SymbolKind::Signal);
        }
        for class in &program.classes {
            self.declare(&class.name, SymbolKind::Class);
            self.check_class(class);
        }
        for func in &program.functions {
            self.declare(&func.name, SymbolKind::Function);
        }
        for process in &program.processes {
            self.declare(&process.name, SymbolKind::Process);
        }

        if self.errors.is_empty() {
            debug!(target: "tick::compiler", symbols = self.symbols.len(), "semantic pass clean");
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    /// Pull the requested declarations out of each imported module and
    /// splice them into `program`. Declarations are moved, never
    /// copied, so nothing is visited twice.
    fn splice_imports(&mut self, program: &mut Program, source_path: &Path) {
        let imports = std::mem::take(&mut program.imports);

        for import in &imports {
            let module = match self.loader.load(&import.module, source_path) {
                Ok(module) => module,
                Err(err) => {
                    self.errors.push(SemanticError::Resolve(err));
                    continue;
                }
            };

            if import.import_all {
                program.functions.append(&mut module.functions);
                program.classes.append(&mut module.classes);
                program.events.append(&mut module.events);
                program.signals.append(&mut module.signals);
                continue;
            }

            for name in &import.names {
                let function = take_named(&mut module.functions, |f: &FunctionDecl| {
                    f.name == *name
                });
                if let Some(function) = function {
                    program.functions.push(function);
                    continue;
                }
                let class = take_named(&mut module.classes, |c: &ClassDecl| c.name == *name);
                if let Some(class) = class {
                    program.classes.push(class);
                    continue;
                }
                self.errors.push(SemanticError::UnknownImport {
                    module: import.module.clone(),
                    name: name.clone(),
                });
            }
        }
    }

    fn declare(&mut self, name: &str, kind: SymbolKind) {
        if self.symbols.insert(name.to_string(), kind).is_some() {
            self.errors
                .push(SemanticError::DuplicateDeclaration(name.to_string()));
        }
    }

    fn check_class(&mut self, class: &ClassDecl) {
        let mut seen = HashMap::new();
        for method in &class.methods {
            if seen.insert(method.name.clone(), ()).is_some() {
                self.errors.push(SemanticError::DuplicateMethod {
                    class: class.name.clone(),
                    method: method.name.clone(),
                });
            }
        }
    }
}

fn take_named<T>(items: &mut Vec<T>, matches: impl Fn(&T) -> bool) -> Option<T> {
    let at = items.iter().position(matches)?;
    Some(items.remove(at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;
    use crate::compiler::parser::Parser;
    use crate::vfs::MemoryFs;

    fn parse(src: &str) -> Program {
        Parser::new(Lexer::new(src).tokenize()).parse().unwrap()
    }

    fn analyze_with(
        src: &str,
        files: &[(&str, &str)],
    ) -> (Program, Result<(), Vec<SemanticError>>) {
        let fs = MemoryFs::with_files(files.iter().map(|(p, s)| (*p, *s)));
        let mut loader = ModuleLoader::new(Box::new(fs));
        let mut program = parse(src);
        let result = SemanticAnalyzer::new(&mut loader)
            .analyze(&mut program, Path::new("/proj/main.tick"));
        (program, result)
    }

    #[test]
    fn test_clean_program() {
        let (_, result) = analyze_with(
            "event e; signal s: int; func main(): int { return 0; }",
            &[],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_duplicate_declaration() {
        let (_, result) = analyze_with("event e; signal e: int;", &[]);
        let errors = result.unwrap_err();
        assert!(matches!(
            errors[0],
            SemanticError::DuplicateDeclaration(ref n) if n == "e"
        ));
    }

    #[test]
    fn test_duplicate_method_in_class() {
        let (_, result) = analyze_with(
            "class C { func m(): int { return 1; } func m(): int { return 2; } }",
            &[],
        );
        let errors = result.unwrap_err();
        assert!(matches!(errors[0], SemanticError::DuplicateMethod { .. }));
    }

    #[test]
    fn test_selective_import_splices_function() {
        let (program, result) = analyze_with(
            "from util import helper; func main(): int { return helper(); }",
            &[("/proj/util.tick", "func helper(): int { return 7; } func hidden(): int { return 0; }")],
        );
        assert!(result.is_ok());
        assert!(program.functions.iter().any(|f| f.name == "helper"));
        assert!(!program.functions.iter().any(|f| f.name == "hidden"));
    }

    #[test]
    fn test_wildcard_import_splices_everything() {
        let (program, result) = analyze_with(
            "import util; func main(): int { return 0; }",
            &[(
                "/proj/util.tick",
                "event e; signal s: int; class C { } func f(): int { return 1; }",
            )],
        );
        assert!(result.is_ok());
        assert!(program.events.iter().any(|e| e.name == "e"));
        assert!(program.signals.iter().any(|s| s.name == "s"));
        assert!(program.classes.iter().any(|c| c.name == "C"));
        assert!(program.functions.iter().any(|f| f.name == "f"));
    }

    #[test]
    fn test_unknown_import_name() {
        let (_, result) = analyze_with(
            "from util import missing;",
            &[("/proj/util.tick", "func helper(): int { return 7; }")],
        );
        let errors = result.unwrap_err();
        assert!(matches!(errors[0], SemanticError::UnknownImport { .. }));
    }

    #[test]
    fn test_module_not_found() {
        let (_, result) = analyze_with("import ghost;", &[]);
        let errors = result.unwrap_err();
        assert!(matches!(errors[0], SemanticError::Resolve(_)));
    }

    #[test]
    fn test_errors_are_cumulative() {
        let (_, result) = analyze_with("event e; event e; signal e: int;", &[]);
        assert_eq!(result.unwrap_err().len(), 2);
    }

    #[test]
    fn test_import_is_moved_not_copied() {
        let fs = MemoryFs::with_files([(
            "/proj/util.tick",
            "func helper(): int { return 7; }",
        )]);
        let mut loader = ModuleLoader::new(Box::new(fs));

        let mut first = parse("from util import helper;");
        SemanticAnalyzer::new(&mut loader)
            .analyze(&mut first, Path::new("/proj/main.tick"))
            .unwrap();
        assert_eq!(first.functions.len(), 1);

        // A second program importing the same name sees the module with
        // the declaration already moved out.
        let mut second = parse("from util import helper;");
        let result = SemanticAnalyzer::new(&mut loader)
            .analyze(&mut second, Path::new("/proj/main.tick"));
        assert!(result.is_err());
    }
}
