//! Module loader.
//!
//! Resolves an import name to a `.tick` file, parses it and caches the
//! AST by module name; re-imports return the cached tree without
//! re-reading. Resolution order: sibling of the importing file, the
//! current working directory, then every directory on `TICK_PATH`.

use super::ast::Program;
use super::error::ResolveError;
use super::lexer::Lexer;
use super::parser::Parser;
use crate::vfs::FileSource;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ModuleLoader {
    fs: Box<dyn FileSource>,
    /// Extra search directories consulted after the importer's own
    /// directory and the working directory (`TICK_PATH`).
    search_path: Vec<PathBuf>,
    loaded: HashMap<String, Program>,
}

impl ModuleLoader {
    pub fn new(fs: Box<dyn FileSource>) -> Self {
        Self {
            fs,
            search_path: Vec::new(),
            loaded: HashMap::new(),
        }
    }

    /// Loader over the real filesystem with `TICK_PATH` applied.
    pub fn native() -> Self {
        let mut loader = Self::new(Box::new(crate::vfs::NativeFs));
        if let Some(raw) = std::env::var_os("TICK_PATH") {
            loader.search_path = std::env::split_paths(&raw).collect();
        }
        loader
    }

    pub fn with_search_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_path = dirs;
        self
    }

    /// Load `module`, reusing the cached AST when it was already
    /// loaded. `importer` is the path of the file containing the
    /// import; its directory is searched first.
    pub fn load(
        &mut self,
        module: &str,
        importer: &Path,
    ) -> Result<&mut Program, ResolveError> {
        if !self.loaded.contains_key(module) {
            let program = self.load_uncached(module, importer)?;
            self.loaded.insert(module.to_string(), program);
        }
        Ok(self.loaded.get_mut(module).expect("inserted above"))
    }

    fn load_uncached(&self, module: &str, importer: &Path) -> Result<Program, ResolveError> {
        let filename = format!("{module}.tick");
        let mut candidates = Vec::new();

        if let Some(dir) = importer.parent() {
            candidates.push(dir.join(&filename));
        }
        candidates.push(PathBuf::from(".").join(&filename));
        for dir in &self.search_path {
            candidates.push(dir.join(&filename));
        }

        for candidate in &candidates {
            if !self.fs.exists(candidate) {
                continue;
            }
            let source = self.fs.read(candidate).map_err(|e| ResolveError::Read {
                path: candidate.clone(),
                message: e.to_string(),
            })?;
            let tokens = Lexer::new(&source).tokenize();
            let program = Parser::new(tokens)
                .parse()
                .map_err(|source| ResolveError::Parse {
                    path: candidate.clone(),
                    source,
                })?;
            debug!(target: "tick::parser", module, path = %candidate.display(), "loaded module");
            return Ok(program);
        }

        Err(ResolveError::NotFound {
            module: module.to_string(),
            tried: candidates,
        })
    }

    pub fn is_loaded(&self, module: &str) -> bool {
        self.loaded.contains_key(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryFs;

    fn loader_with(files: &[(&str, &str)]) -> ModuleLoader {
        let fs = MemoryFs::with_files(files.iter().map(|(p, s)| (*p, *s)));
        ModuleLoader::new(Box::new(fs))
    }

    #[test]
    fn test_load_sibling_module() {
        let mut loader = loader_with(&[("/proj/util.tick", "func helper(): int { return 1; }")]);
        let program = loader.load("util", Path::new("/proj/main.tick")).unwrap();
        assert_eq!(program.functions.len(), 1);
    }

    #[test]
    fn test_cached_on_second_load() {
        let mut loader = loader_with(&[("/proj/util.tick", "func helper(): int { return 1; }")]);
        loader.load("util", Path::new("/proj/main.tick")).unwrap();
        assert!(loader.is_loaded("util"));
        // Mutations stick: the second load returns the same cached AST.
        loader
            .load("util", Path::new("/proj/main.tick"))
            .unwrap()
            .functions
            .clear();
        let again = loader.load("util", Path::new("/proj/main.tick")).unwrap();
        assert!(again.functions.is_empty());
    }

    #[test]
    fn test_not_found_lists_candidates() {
        let mut loader = loader_with(&[]);
        let err = loader
            .load("ghost", Path::new("/proj/main.tick"))
            .unwrap_err();
        let ResolveError::NotFound { tried, .. } = err else {
            panic!("expected NotFound");
        };
        assert!(tried.iter().any(|p| p.ends_with("ghost.tick")));
    }

    #[test]
    fn test_search_path_fallback() {
        let fs = MemoryFs::with_files([("/lib/shared.tick", "event pulse;")]);
        let mut loader = ModuleLoader::new(Box::new(fs))
            .with_search_path(vec![PathBuf::from("/lib")]);
        let program = loader.load("shared", Path::new("/proj/main.tick")).unwrap();
        assert_eq!(program.events.len(), 1);
    }

    #[test]
    fn test_parse_error_carries_path() {
        let mut loader = loader_with(&[("/proj/bad.tick", "func {")]);
        let err = loader
            .load("bad", Path::new("/proj/main.tick"))
            .unwrap_err();
        assert!(matches!(err, ResolveError::Parse { .. }));
    }
}
