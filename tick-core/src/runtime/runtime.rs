//! The runtime object: registries, globals and the scheduler.
//!
//! Registration happens on `&mut Runtime` while the program is being
//! loaded; execution starts only after the runtime is frozen behind an
//! `Arc`, so the signal/function/event registries need no locking. The
//! global map is the one mutable-during-execution table and sits behind
//! a `RwLock`; concurrent mutation of the same global from parallel
//! processes is documented user responsibility.

use super::builtins;
use super::bytecode::Instruction;
use super::codegen::CompiledProgram;
use super::error::RuntimeError;
use super::interp::Interpreter;
use super::scheduler::{EventScheduler, ProcessContext};
use super::signal::SignalQueue;
use super::strings::{StrId, StringPool};
use super::value::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Native builtin signature: a value sequence in, one value out.
pub type NativeFn = fn(&Runtime, &[Value]) -> Result<Value, RuntimeError>;

pub struct Runtime {
    strings: Arc<StringPool>,
    constants: Arc<Vec<Value>>,
    globals: RwLock<HashMap<StrId, Value>>,
    builtins: HashMap<String, NativeFn>,
    user_functions: HashMap<String, Arc<Vec<Instruction>>>,
    signals: HashMap<String, Arc<SignalQueue>>,
    scheduler: EventScheduler,
}

impl Runtime {
    pub fn new(strings: Arc<StringPool>, constants: Arc<Vec<Value>>) -> Self {
        let mut runtime = Self {
            strings,
            constants,
            globals: RwLock::new(HashMap::new()),
            builtins: HashMap::new(),
            user_functions: HashMap::new(),
            signals: HashMap::new(),
            scheduler: EventScheduler::new(),
        };
        builtins::register_all(&mut runtime);
        runtime
    }

    /// Build a fully registered runtime from compiled output (fresh
    /// compile and cache load look identical from here on).
    pub fn boot(program: &CompiledProgram) -> Arc<Self> {
        let strings = Arc::new(StringPool::from_strings(program.strings.iter().cloned()));
        let constants = Arc::new(program.constants.clone());
        let mut runtime = Self::new(strings, constants);

        for event in &program.events {
            runtime.register_event(event);
        }
        for signal in &program.signals {
            runtime.register_signal(signal);
        }
        for (name, code) in &program.functions {
            runtime.register_user_function(name, code.clone());
        }
        for process in &program.processes {
            runtime.register_process(
                &process.event,
                Arc::new(ProcessContext {
                    name: process.name.clone(),
                    code: Arc::new(process.code.clone()),
                }),
            );
        }

        debug!(
            target: "tick::runtime",
            events = program.events.len(),
            signals = program.signals.len(),
            functions = program.functions.len(),
            processes = program.processes.len(),
            "runtime booted"
        );
        Arc::new(runtime)
    }

    // ==================== registration ====================

    pub fn register_signal(&mut self, name: &str) {
        self.signals
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SignalQueue::new()));
    }

    pub fn register_event(&mut self, name: &str) {
        self.scheduler.register_event(name);
    }

    pub fn register_process(&mut self, event: &str, process: Arc<ProcessContext>) {
        self.scheduler.register_process(event, process);
    }

    pub fn register_builtin(&mut self, name: &str, func: NativeFn) {
        self.builtins.insert(name.to_string(), func);
    }

    pub fn register_user_function(&mut self, name: &str, code: Vec<Instruction>) {
        self.user_functions.insert(name.to_string(), Arc::new(code));
    }

    // ==================== execution ====================

    pub fn signal(&self, name: &str) -> Option<&Arc<SignalQueue>> {
        self.signals.get(name)
    }

    /// Fan out every process of `event` and wait for all of them; a
    /// synchronous barrier from the caller's standpoint.
    pub fn execute_event(self: Arc<Self>, name: &str) -> Result<(), RuntimeError> {
        self.scheduler.execute(name, &self)?;
        self.scheduler.wait_completion();
        Ok(())
    }

    pub fn wait_event_completion(&self) {
        self.scheduler.wait_completion();
    }

    /// Dispatch a call by interned name: builtin, then user function,
    /// then method lookup through the receiver's class.
    pub fn call_function(
        self: Arc<Self>,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        if let Some(builtin) = self.builtins.get(name) {
            return builtin(&self, &args);
        }

        if let Some(code) = self.user_functions.get(name) {
            let code = code.clone();
            let mut interp = Interpreter::new(self.clone());
            return interp.execute_function(&code, args);
        }

        // Method call: the receiver rides in slot 0.
        if let Some(Value::Object(obj)) = args.first() {
            let class = { obj.lock().unwrap().class };
            let key = format!("{}.{}", self.strings.resolve(class), name);
            if let Some(code) = self.user_functions.get(&key) {
                let code = code.clone();
                let mut interp = Interpreter::new(self.clone());
                return interp.execute_function(&code, args);
            }
        }

        Err(RuntimeError::UnknownCallable(name.to_string()))
    }

    // ==================== shared state ====================

    pub fn set_global(&self, name: StrId, value: Value) {
        self.globals.write().unwrap().insert(name, value);
    }

    /// Missing globals read as `None`.
    pub fn get_global(&self, name: StrId) -> Value {
        self.globals
            .read()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or(Value::None)
    }

    pub fn strings(&self) -> &Arc<StringPool> {
        &self.strings
    }

    pub fn constants(&self) -> &Arc<Vec<Value>> {
        &self.constants
    }
}
