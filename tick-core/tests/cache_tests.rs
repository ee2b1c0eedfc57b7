//! Cache transparency: a run served from a valid cache entry behaves
//! exactly like a run through the full front end.

mod common;
use common::get_int;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tick_core::cache;
use tick_core::compiler::modules::ModuleLoader;
use tick_core::pipeline::{compile_source, run_compiled};
use tick_core::vfs::NativeFs;

fn temp_project(tag: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    let dir = std::env::temp_dir().join(format!(
        "tick-e2e-{}-{}-{}",
        tag,
        std::process::id(),
        nonce
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn compile_file(path: &Path) -> tick_core::CompiledProgram {
    let source = fs::read_to_string(path).unwrap();
    let mut loader = ModuleLoader::new(Box::new(NativeFs));
    compile_source(&source, path, &mut loader).unwrap()
}

#[test]
fn test_first_run_writes_cache_entry() {
    let dir = temp_project("writes");
    let source = dir.join("prog.tick");
    fs::write(&source, "func main(): int { return 20; }").unwrap();

    let program = compile_file(&source);
    cache::store(&source, &program).unwrap();

    let entry = cache::cache_path(&source);
    assert!(entry.exists());
    assert!(entry.ends_with(".tickcache/prog.tickc"));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_cached_run_matches_fresh_run() {
    let dir = temp_project("transparent");
    let source = dir.join("prog.tick");
    fs::write(
        &source,
        r#"
        signal s: int;
        func helper(n: int): int { return n * 2; }
        func main(): int {
            s.emit(helper(10));
            return s.recv() + 1;
        }
        "#,
    )
    .unwrap();

    let fresh = compile_file(&source);
    let fresh_result = run_compiled(&fresh).unwrap();

    cache::store(&source, &fresh).unwrap();
    let cached = cache::load(&source).unwrap();
    assert_eq!(cached, fresh);

    let cached_result = run_compiled(&cached).unwrap();
    assert_eq!(get_int(&cached_result), get_int(&fresh_result));
    assert_eq!(get_int(&cached_result), Some(21));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_cached_run_preserves_process_bindings() {
    let dir = temp_project("processes");
    let source = dir.join("prog.tick");
    fs::write(
        &source,
        r#"
        event e;
        event quiet;
        signal r: int;
        @e process p1 { r.emit(30); }
        @e process p2 { r.emit(12); }
        func main(): int {
            quiet.execute();
            e.execute();
            return r.recv() + r.recv();
        }
        "#,
    )
    .unwrap();

    let fresh = compile_file(&source);
    cache::store(&source, &fresh).unwrap();

    let cached = cache::load(&source).unwrap();
    // Both processes still attach to `e`, none leaked onto `quiet`.
    assert!(cached.processes.iter().all(|p| p.event == "e"));

    let result = run_compiled(&cached).unwrap();
    assert_eq!(get_int(&result), Some(42));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_source_change_invalidates_entry() {
    let dir = temp_project("stale");
    let source = dir.join("prog.tick");
    fs::write(&source, "func main(): int { return 1; }").unwrap();

    let program = compile_file(&source);
    cache::store(&source, &program).unwrap();
    assert!(cache::load(&source).is_ok());

    // Different byte length guarantees a stamp mismatch even when the
    // mtime granularity is a full second.
    fs::write(&source, "func main(): int { return 100; }").unwrap();
    assert!(cache::load(&source).is_err());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_load_or_else_round_trip() {
    let dir = temp_project("loadorelse");
    let source = dir.join("prog.tick");
    fs::write(&source, "func main(): int { return 5; }").unwrap();

    let mut compiles = 0;
    let program = cache::load_or_else(&source, || {
        compiles += 1;
        Ok::<_, std::convert::Infallible>(compile_file(&source))
    })
    .unwrap();
    assert_eq!(compiles, 1);
    assert_eq!(get_int(&run_compiled(&program).unwrap()), Some(5));

    // Second time around the front end is skipped entirely.
    let mut recompiles = 0;
    let program = cache::load_or_else(&source, || {
        recompiles += 1;
        Ok::<_, std::convert::Infallible>(compile_file(&source))
    })
    .unwrap();
    assert_eq!(recompiles, 0);
    assert_eq!(get_int(&run_compiled(&program).unwrap()), Some(5));

    fs::remove_dir_all(&dir).unwrap();
}
