//! Native builtin functions.
//!
//! Signature per the runtime registry: a value sequence in, one value
//! out. `print` writes space-separated renderings without a trailing
//! newline (programs emit `"\n"` themselves); `format` substitutes `{}`
//! placeholders left to right.

use super::error::RuntimeError;
use super::runtime::{NativeFn, Runtime};
use super::value::Value;
use std::io::{self, BufRead, Write};

pub fn register_all(runtime: &mut Runtime) {
    let table: [(&str, NativeFn); 6] = [
        ("print", builtin_print),
        ("input", builtin_input),
        ("format", builtin_format),
        ("str_to_int", builtin_str_to_int),
        ("str_to_float", builtin_str_to_float),
        ("str_to_double", builtin_str_to_double),
    ];
    for (name, func) in table {
        runtime.register_builtin(name, func);
    }
}

fn builtin_print(runtime: &Runtime, args: &[Value]) -> Result<Value, RuntimeError> {
    let pool = runtime.strings();
    let rendered: Vec<String> = args.iter().map(|v| v.display(pool)).collect();
    let mut stdout = io::stdout().lock();
    let _ = stdout.write_all(rendered.join(" ").as_bytes());
    let _ = stdout.flush();
    Ok(Value::Int(0))
}

fn builtin_input(runtime: &Runtime, args: &[Value]) -> Result<Value, RuntimeError> {
    let pool = runtime.strings();
    if let Some(Value::Str(prompt)) = args.first() {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(pool.resolve(*prompt).as_bytes());
        let _ = stdout.flush();
    }

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_ok() {
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
    }
    Ok(Value::Str(pool.intern(&line)))
}

fn builtin_format(runtime: &Runtime, args: &[Value]) -> Result<Value, RuntimeError> {
    let pool = runtime.strings();
    let Some(Value::Str(template)) = args.first() else {
        return Ok(Value::Str(pool.intern("")));
    };

    let template = pool.resolve(*template);
    let mut out = String::with_capacity(template.len());
    let mut next_arg = 1;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'}') && next_arg < args.len() {
            chars.next();
            out.push_str(&args[next_arg].display(pool));
            next_arg += 1;
        } else {
            out.push(c);
        }
    }

    Ok(Value::Str(pool.intern(&out)))
}

fn builtin_str_to_int(runtime: &Runtime, args: &[Value]) -> Result<Value, RuntimeError> {
    let parsed = string_arg(runtime, args)
        .and_then(|s| s.trim().parse::<i32>().ok())
        .unwrap_or(0);
    Ok(Value::Int(parsed))
}

fn builtin_str_to_float(runtime: &Runtime, args: &[Value]) -> Result<Value, RuntimeError> {
    let parsed = string_arg(runtime, args)
        .and_then(|s| s.trim().parse::<f32>().ok())
        .unwrap_or(0.0);
    Ok(Value::Float(parsed))
}

fn builtin_str_to_double(runtime: &Runtime, args: &[Value]) -> Result<Value, RuntimeError> {
    let parsed = string_arg(runtime, args)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    Ok(Value::Double(parsed))
}

fn string_arg(runtime: &Runtime, args: &[Value]) -> Option<String> {
    match args.first() {
        Some(Value::Str(id)) => Some(runtime.strings().resolve(*id).to_string()),
        _ => None,
    }
}
