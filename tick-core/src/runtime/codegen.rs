//! AST → bytecode translation.
//!
//! One linear instruction stream per function, method (`Class.method`)
//! and process. Locals get dense slots in declaration order; `this` is
//! slot 0 inside methods. Control flow is emitted with placeholder
//! operands and forward-patched with absolute targets.

use super::bytecode::{Instruction, OpCode};
use super::strings::StringPool;
use super::value::Value;
use crate::compiler::ast::*;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Locals are pre-sized to this many slots by the interpreter; the
/// compiler refuses functions that need more.
pub const MAX_LOCALS: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("Function '{0}' uses too many locals (limit {limit})", limit = MAX_LOCALS)]
    TooManyLocals(String),
    #[error("'break' outside of a loop")]
    BreakOutsideLoop,
    #[error("'this' outside of a method")]
    ThisOutsideMethod,
    #[error("Expression is not callable")]
    InvalidCallee,
    #[error("'{0}' is not an assignable expression")]
    NotAssignable(String),
}

/// One compiled process body, still bound to its declaring event.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessCode {
    pub event: String,
    pub name: String,
    pub code: Vec<Instruction>,
}

/// Everything the runtime (or the cache writer) needs to execute a
/// program: per-name instruction streams plus the shared pools.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledProgram {
    pub main: Option<Vec<Instruction>>,
    /// Named functions excluding `main`; methods keyed `Class.method`.
    pub functions: Vec<(String, Vec<Instruction>)>,
    /// In declaration order; registration order is fan-out order.
    pub processes: Vec<ProcessCode>,
    pub events: Vec<String>,
    pub signals: Vec<String>,
    pub classes: Vec<String>,
    pub strings: Vec<String>,
    pub constants: Vec<Value>,
}

pub struct CodeGenerator {
    strings: StringPool,
    constants: Vec<Value>,
    classes: HashMap<String, ClassDecl>,

    // Per-stream state
    code: Vec<Instruction>,
    scopes: Vec<Vec<(String, usize)>>,
    next_slot: usize,
    current_function: String,
    in_method: bool,
    /// Field names of the enclosing class; bare identifiers that match
    /// resolve as implicit `this.field` accesses inside methods.
    current_fields: Vec<String>,
    loop_breaks: Vec<Vec<usize>>,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            strings: StringPool::new(),
            constants: Vec::new(),
            classes: HashMap::new(),
            code: Vec::new(),
            scopes: Vec::new(),
            next_slot: 0,
            current_function: String::new(),
            in_method: false,
            current_fields: Vec::new(),
            loop_breaks: Vec::new(),
        }
    }

    pub fn generate(mut self, program: &Program) -> Result<CompiledProgram, CompileError> {
        for class in &program.classes {
            self.classes.insert(class.name.clone(), class.clone());
        }

        let mut out = CompiledProgram {
            events: program.events.iter().map(|e| e.name.clone()).collect(),
            signals: program.signals.iter().map(|s| s.name.clone()).collect(),
            classes: program.classes.iter().map(|c| c.name.clone()).collect(),
            ..CompiledProgram::default()
        };

        for class in &program.classes {
            self.current_fields = class.fields.iter().map(|f| f.name.clone()).collect();
            for method in &class.methods {
                let key = format!("{}.{}", class.name, method.name);
                let code = self.compile_function(method, true, &[])?;
                out.functions.push((key, code));
            }
            self.current_fields.clear();
        }

        for func in &program.functions {
            if func.name == "main" {
                out.main = Some(self.compile_function(func, false, &program.globals)?);
            } else {
                let code = self.compile_function(func, false, &[])?;
                out.functions.push((func.name.clone(), code));
            }
        }

        for proc in &program.processes {
            let code = self.compile_process(proc)?;
            out.processes.push(ProcessCode {
                event: proc.event_name.clone(),
                name: proc.name.clone(),
                code,
            });
        }

        out.strings = self.strings.snapshot();
        out.constants = self.constants;
        debug!(
            target: "tick::compiler",
            functions = out.functions.len(),
            processes = out.processes.len(),
            constants = out.constants.len(),
            strings = out.strings.len(),
            "codegen complete"
        );
        Ok(out)
    }

    /// Compile a function or method body. `globals` is non-empty only
    /// for `main`, whose stream starts with the global-initializer
    /// prelude so it round-trips through the bytecode cache.
    fn compile_function(
        &mut self,
        func: &FunctionDecl,
        is_method: bool,
        globals: &[VarDecl],
    ) -> Result<Vec<Instruction>, CompileError> {
        self.begin_stream(&func.name, is_method);

        if is_method {
            self.declare_local("this")?;
        }
        for param in &func.parameters {
            self.declare_local(&param.name)?;
        }

        for global in globals {
            match &global.initializer {
                Some(init) => self.compile_expr(init)?,
                None => self.emit_zero(),
            }
            let handle = self.intern(&global.name);
            self.emit(OpCode::StoreGlobal, handle);
        }

        for stmt in &func.body {
            self.compile_stmt(stmt)?;
        }

        // Implicit trailing return of integer zero.
        self.emit_zero();
        self.emit_simple(OpCode::Return);

        Ok(std::mem::take(&mut self.code))
    }

    fn compile_process(&mut self, proc: &ProcessDecl) -> Result<Vec<Instruction>, CompileError> {
        self.begin_stream(&proc.name, false);
        for stmt in &proc.body {
            self.compile_stmt(stmt)?;
        }
        self.emit_simple(OpCode::Halt);
        Ok(std::mem::take(&mut self.code))
    }

    fn begin_stream(&mut self, name: &str, is_method: bool) {
        self.code = Vec::new();
        self.scopes = vec![Vec::new()];
        self.next_slot = 0;
        self.current_function = name.to_string();
        self.in_method = is_method;
        self.loop_breaks = Vec::new();
    }

    // ==================== statements ====================

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt.as_ref() {
            StmtKind::VarDecl(decl) => {
                let slot = self.declare_local(&decl.name)?;
                match &decl.initializer {
                    Some(init) => self.compile_expr(init)?,
                    None => self.emit_zero(),
                }
                self.emit(OpCode::StoreLocal, slot as i32);
                Ok(())
            }
            StmtKind::Expr(expr) => {
                self.compile_expr(expr)?;
                self.emit_simple(OpCode::Pop);
                Ok(())
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(condition)?;
                let to_else = self.emit_jump(OpCode::JumpIfFalse);
                self.compile_scoped(then_branch)?;
                let to_end = self.emit_jump(OpCode::Jump);
                self.patch_jump(to_else);
                if let Some(else_branch) = else_branch {
                    self.compile_scoped(else_branch)?;
                }
                self.patch_jump(to_end);
                Ok(())
            }
            StmtKind::While { condition, body } => {
                let loop_start = self.code.len();
                self.compile_expr(condition)?;
                let to_end = self.emit_jump(OpCode::JumpIfFalse);
                self.loop_breaks.push(Vec::new());
                self.compile_scoped(body)?;
                self.emit(OpCode::Jump, loop_start as i32);
                self.patch_jump(to_end);
                let breaks = self.loop_breaks.pop().unwrap();
                for offset in breaks {
                    self.patch_jump(offset);
                }
                Ok(())
            }
            StmtKind::For {
                initializer,
                condition,
                step,
                body,
            } => {
                // The initializer's binding is scoped to the loop.
                self.begin_scope();
                if let Some(init) = initializer {
                    self.compile_stmt(init)?;
                }
                let loop_start = self.code.len();
                let to_end = match condition {
                    Some(cond) => {
                        self.compile_expr(cond)?;
                        Some(self.emit_jump(OpCode::JumpIfFalse))
                    }
                    None => None,
                };
                self.loop_breaks.push(Vec::new());
                self.compile_scoped(body)?;
                if let Some(step) = step {
                    self.compile_expr(step)?;
                    self.emit_simple(OpCode::Pop);
                }
                self.emit(OpCode::Jump, loop_start as i32);
                if let Some(to_end) = to_end {
                    self.patch_jump(to_end);
                }
                let breaks = self.loop_breaks.pop().unwrap();
                for offset in breaks {
                    self.patch_jump(offset);
                }
                self.end_scope();
                Ok(())
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => self.emit_zero(),
                }
                self.emit_simple(OpCode::Return);
                Ok(())
            }
            StmtKind::Break => {
                let offset = self.emit_jump(OpCode::Jump);
                self.loop_breaks
                    .last_mut()
                    .ok_or(CompileError::BreakOutsideLoop)?
                    .push(offset);
                Ok(())
            }
            StmtKind::Block(body) => self.compile_scoped(body),
        }
    }

    fn compile_scoped(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        self.begin_scope();
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        self.end_scope();
        Ok(())
    }

    // ==================== expressions ====================

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr.as_ref() {
            ExprKind::IntLiteral(n) => {
                let idx = self.add_constant(Value::Int(*n));
                self.emit(OpCode::LoadConst, idx);
                Ok(())
            }
            ExprKind::FloatLiteral(f) => {
                let idx = self.add_constant(Value::Float(*f));
                self.emit(OpCode::LoadConst, idx);
                Ok(())
            }
            ExprKind::DoubleLiteral(d) => {
                let idx = self.add_constant(Value::Double(*d));
                self.emit(OpCode::LoadConst, idx);
                Ok(())
            }
            ExprKind::BoolLiteral(b) => {
                let idx = self.add_constant(Value::Bool(*b));
                self.emit(OpCode::LoadConst, idx);
                Ok(())
            }
            ExprKind::StringLiteral(s) => {
                let id = self.strings.intern(s);
                let idx = self.add_constant(Value::Str(id));
                self.emit(OpCode::LoadConst, idx);
                Ok(())
            }
            ExprKind::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit(OpCode::BuildArray, elements.len() as i32);
                Ok(())
            }
            ExprKind::Identifier(name) => {
                match self.resolve_local(name) {
                    Some(slot) => self.emit(OpCode::LoadLocal, slot as i32),
                    None if self.is_implicit_field(name) => {
                        let this_slot = self
                            .resolve_local("this")
                            .expect("method scope declares 'this'");
                        self.emit(OpCode::LoadLocal, this_slot as i32);
                        let handle = self.intern(name);
                        self.emit(OpCode::GetField, handle);
                    }
                    None => {
                        let handle = self.intern(name);
                        self.emit(OpCode::LoadGlobal, handle);
                    }
                }
                Ok(())
            }
            ExprKind::This => {
                if !self.in_method {
                    return Err(CompileError::ThisOutsideMethod);
                }
                let slot = self
                    .resolve_local("this")
                    .expect("method scope declares 'this'");
                self.emit(OpCode::LoadLocal, slot as i32);
                Ok(())
            }
            ExprKind::New {
                class_name,
                arguments,
            } => self.compile_new(class_name, arguments),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Neg => {
                    self.compile_expr(operand)?;
                    self.emit_simple(OpCode::Neg);
                    Ok(())
                }
                UnaryOp::Not => {
                    self.compile_expr(operand)?;
                    self.emit_simple(OpCode::Not);
                    Ok(())
                }
                UnaryOp::Increment => {
                    let one: Expr = Box::new(ExprKind::IntLiteral(1));
                    self.compile_compound_assign(operand, BinaryOp::Add, &one)
                }
                UnaryOp::Decrement => {
                    let one: Expr = Box::new(ExprKind::IntLiteral(1));
                    self.compile_compound_assign(operand, BinaryOp::Sub, &one)
                }
            },
            ExprKind::Binary { left, op, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit_simple(Self::binary_opcode(*op));
                Ok(())
            }
            ExprKind::Assign { target, value } => self.compile_assign(target, value),
            ExprKind::CompoundAssign { target, op, value } => {
                self.compile_compound_assign(target, *op, value)
            }
            ExprKind::Call { callee, arguments } => self.compile_call(callee, arguments),
            ExprKind::Member { object, member } => {
                self.compile_expr(object)?;
                let handle = self.intern(member);
                self.emit(OpCode::GetField, handle);
                Ok(())
            }
            ExprKind::Index { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit_simple(OpCode::ArrayIndex);
                Ok(())
            }
        }
    }

    fn binary_opcode(op: BinaryOp) -> OpCode {
        match op {
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Sub => OpCode::Sub,
            BinaryOp::Mul => OpCode::Mul,
            BinaryOp::Div => OpCode::Div,
            BinaryOp::Mod => OpCode::Mod,
            BinaryOp::Eq => OpCode::Eq,
            BinaryOp::Ne => OpCode::Ne,
            BinaryOp::Lt => OpCode::Lt,
            BinaryOp::Gt => OpCode::Gt,
            BinaryOp::Le => OpCode::Le,
            BinaryOp::Ge => OpCode::Ge,
            BinaryOp::And => OpCode::And,
            BinaryOp::Or => OpCode::Or,
        }
    }

    /// Calls have three shapes: magic receivers (`sig.emit(x)`,
    /// `sig.recv()`, `evt.execute()`), method calls (receiver pushed
    /// first, count includes it), and plain function calls.
    fn compile_call(&mut self, callee: &Expr, arguments: &[Expr]) -> Result<(), CompileError> {
        if let ExprKind::Member { object, member } = callee.as_ref() {
            if let ExprKind::Identifier(receiver) = object.as_ref() {
                match member.as_str() {
                    "emit" => {
                        for arg in arguments {
                            self.compile_expr(arg)?;
                        }
                        let handle = self.intern(receiver);
                        self.emit(OpCode::SignalEmit, handle);
                        return Ok(());
                    }
                    "recv" => {
                        let handle = self.intern(receiver);
                        self.emit(OpCode::SignalRecv, handle);
                        return Ok(());
                    }
                    "execute" => {
                        let handle = self.intern(receiver);
                        self.emit(OpCode::EventExecute, handle);
                        return Ok(());
                    }
                    _ => {}
                }
            }

            // General method call: receiver, arguments, count, CALL.
            self.compile_expr(object)?;
            for arg in arguments {
                self.compile_expr(arg)?;
            }
            let count = self.add_constant(Value::Int(arguments.len() as i32 + 1));
            self.emit(OpCode::LoadConst, count);
            let handle = self.intern(member);
            self.emit(OpCode::Call, handle);
            return Ok(());
        }

        if let ExprKind::Identifier(name) = callee.as_ref() {
            for arg in arguments {
                self.compile_expr(arg)?;
            }
            let count = self.add_constant(Value::Int(arguments.len() as i32));
            self.emit(OpCode::LoadConst, count);
            let handle = self.intern(name);
            self.emit(OpCode::Call, handle);
            return Ok(());
        }

        Err(CompileError::InvalidCallee)
    }

    /// `new C(args)`: arguments, NEW_OBJECT, field initializers, then —
    /// when `C` declares a method named `C` — the constructor call with
    /// the object as receiver. Arguments are parked in scratch slots so
    /// the receiver-first call convention holds.
    fn compile_new(
        &mut self,
        class_name: &str,
        arguments: &[Expr],
    ) -> Result<(), CompileError> {
        let class = self.classes.get(class_name).cloned();
        if class.is_none() {
            warn!(target: "tick::compiler", class = class_name, "unknown class in 'new'");
        }

        let has_ctor = class
            .as_ref()
            .map(|c| c.methods.iter().any(|m| m.name == class_name))
            .unwrap_or(false);

        let mut arg_slots = Vec::with_capacity(arguments.len());
        for arg in arguments {
            self.compile_expr(arg)?;
            if has_ctor {
                let slot = self.declare_scratch()?;
                self.emit(OpCode::StoreLocal, slot as i32);
                arg_slots.push(slot);
            } else {
                // No constructor to receive them; evaluated for effect.
                self.emit_simple(OpCode::Pop);
            }
        }

        let handle = self.intern(class_name);
        self.emit(OpCode::NewObject, handle);

        if let Some(class) = &class {
            for field in &class.fields {
                if let Some(init) = &field.initializer {
                    self.emit_simple(OpCode::Dup);
                    self.compile_expr(init)?;
                    let field_handle = self.intern(&field.name);
                    self.emit(OpCode::SetField, field_handle);
                }
            }
        }

        if has_ctor {
            self.emit_simple(OpCode::Dup);
            for slot in &arg_slots {
                self.emit(OpCode::LoadLocal, *slot as i32);
            }
            let count = self.add_constant(Value::Int(arg_slots.len() as i32 + 1));
            self.emit(OpCode::LoadConst, count);
            let ctor_key = format!("{}.{}", class_name, class_name);
            let handle = self.intern(&ctor_key);
            self.emit(OpCode::Call, handle);
            // The expression's value is the object, not the
            // constructor's return value.
            self.emit_simple(OpCode::Pop);
        }

        Ok(())
    }

    /// Assignment evaluates to the assigned value. Member and index
    /// targets park the value in a scratch slot so it can be re-pushed
    /// after the store.
    fn compile_assign(&mut self, target: &Expr, value: &Expr) -> Result<(), CompileError> {
        match target.as_ref() {
            ExprKind::Identifier(name) => {
                if self.resolve_local(name).is_none() && self.is_implicit_field(name) {
                    let this_slot = self
                        .resolve_local("this")
                        .expect("method scope declares 'this'");
                    self.compile_expr(value)?;
                    let tmp = self.declare_scratch()?;
                    self.emit(OpCode::StoreLocal, tmp as i32);
                    self.emit(OpCode::LoadLocal, this_slot as i32);
                    self.emit(OpCode::LoadLocal, tmp as i32);
                    let handle = self.intern(name);
                    self.emit(OpCode::SetField, handle);
                    self.emit(OpCode::LoadLocal, tmp as i32);
                    return Ok(());
                }
                self.compile_expr(value)?;
                self.emit_simple(OpCode::Dup);
                match self.resolve_local(name) {
                    Some(slot) => self.emit(OpCode::StoreLocal, slot as i32),
                    None => {
                        let handle = self.intern(name);
                        self.emit(OpCode::StoreGlobal, handle);
                    }
                }
                Ok(())
            }
            ExprKind::Member { object, member } => {
                self.compile_expr(value)?;
                let tmp = self.declare_scratch()?;
                self.emit(OpCode::StoreLocal, tmp as i32);
                self.compile_expr(object)?;
                self.emit(OpCode::LoadLocal, tmp as i32);
                let handle = self.intern(member);
                self.emit(OpCode::SetField, handle);
                self.emit(OpCode::LoadLocal, tmp as i32);
                Ok(())
            }
            ExprKind::Index { object, index } => {
                self.compile_expr(value)?;
                let tmp = self.declare_scratch()?;
                self.emit(OpCode::StoreLocal, tmp as i32);
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit(OpCode::LoadLocal, tmp as i32);
                self.emit_simple(OpCode::ArrayStore);
                self.emit(OpCode::LoadLocal, tmp as i32);
                Ok(())
            }
            other => Err(CompileError::NotAssignable(format!("{:?}", other))),
        }
    }

    /// `a op= b` desugars to `a = a op b` with a single evaluation of
    /// `a`'s subexpressions, via scratch slots for member/index targets.
    fn compile_compound_assign(
        &mut self,
        target: &Expr,
        op: BinaryOp,
        value: &Expr,
    ) -> Result<(), CompileError> {
        let opcode = Self::binary_opcode(op);
        match target.as_ref() {
            ExprKind::Identifier(name) => {
                match self.resolve_local(name) {
                    Some(slot) => {
                        self.emit(OpCode::LoadLocal, slot as i32);
                        self.compile_expr(value)?;
                        self.emit_simple(opcode);
                        self.emit_simple(OpCode::Dup);
                        self.emit(OpCode::StoreLocal, slot as i32);
                    }
                    None if self.is_implicit_field(name) => {
                        let this_slot = self
                            .resolve_local("this")
                            .expect("method scope declares 'this'");
                        let t_val = self.declare_scratch()?;
                        let handle = self.intern(name);
                        self.emit(OpCode::LoadLocal, this_slot as i32);
                        self.emit(OpCode::GetField, handle);
                        self.compile_expr(value)?;
                        self.emit_simple(opcode);
                        self.emit(OpCode::StoreLocal, t_val as i32);
                        self.emit(OpCode::LoadLocal, this_slot as i32);
                        self.emit(OpCode::LoadLocal, t_val as i32);
                        self.emit(OpCode::SetField, handle);
                        self.emit(OpCode::LoadLocal, t_val as i32);
                    }
                    None => {
                        let handle = self.intern(name);
                        self.emit(OpCode::LoadGlobal, handle);
                        self.compile_expr(value)?;
                        self.emit_simple(opcode);
                        self.emit_simple(OpCode::Dup);
                        self.emit(OpCode::StoreGlobal, handle);
                    }
                }
                Ok(())
            }
            ExprKind::Member { object, member } => {
                let t_obj = self.declare_scratch()?;
                let t_val = self.declare_scratch()?;
                self.compile_expr(object)?;
                self.emit(OpCode::StoreLocal, t_obj as i32);
                self.emit(OpCode::LoadLocal, t_obj as i32);
                let handle = self.intern(member);
                self.emit(OpCode::GetField, handle);
                self.compile_expr(value)?;
                self.emit_simple(opcode);
                self.emit(OpCode::StoreLocal, t_val as i32);
                self.emit(OpCode::LoadLocal, t_obj as i32);
                self.emit(OpCode::LoadLocal, t_val as i32);
                self.emit(OpCode::SetField, handle);
                self.emit(OpCode::LoadLocal, t_val as i32);
                Ok(())
            }
            ExprKind::Index { object, index } => {
                let t_arr = self.declare_scratch()?;
                let t_idx = self.declare_scratch()?;
                let t_val = self.declare_scratch()?;
                self.compile_expr(object)?;
                self.emit(OpCode::StoreLocal, t_arr as i32);
                self.compile_expr(index)?;
                self.emit(OpCode::StoreLocal, t_idx as i32);
                self.emit(OpCode::LoadLocal, t_arr as i32);
                self.emit(OpCode::LoadLocal, t_idx as i32);
                self.emit_simple(OpCode::ArrayIndex);
                self.compile_expr(value)?;
                self.emit_simple(opcode);
                self.emit(OpCode::StoreLocal, t_val as i32);
                self.emit(OpCode::LoadLocal, t_arr as i32);
                self.emit(OpCode::LoadLocal, t_idx as i32);
                self.emit(OpCode::LoadLocal, t_val as i32);
                self.emit_simple(OpCode::ArrayStore);
                self.emit(OpCode::LoadLocal, t_val as i32);
                Ok(())
            }
            other => Err(CompileError::NotAssignable(format!("{:?}", other))),
        }
    }

    // ==================== emit helpers ====================

    fn emit(&mut self, op: OpCode, operand: i32) {
        self.code.push(Instruction::new(op, operand));
    }

    fn emit_simple(&mut self, op: OpCode) {
        self.code.push(Instruction::simple(op));
    }

    fn emit_zero(&mut self) {
        let idx = self.add_constant(Value::Int(0));
        self.emit(OpCode::LoadConst, idx);
    }

    /// Emit a jump with a placeholder operand, returning its position
    /// for later patching.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        let at = self.code.len();
        self.emit(op, -1);
        at
    }

    /// Write the current position as the absolute target of the jump
    /// emitted at `at`.
    fn patch_jump(&mut self, at: usize) {
        let target = self.code.len() as i32;
        self.code[at].operand = target;
    }

    fn add_constant(&mut self, value: Value) -> i32 {
        self.constants.push(value);
        (self.constants.len() - 1) as i32
    }

    fn intern(&mut self, s: &str) -> i32 {
        self.strings.intern(s) as i32
    }

    // ==================== locals ====================

    fn begin_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_local(&mut self, name: &str) -> Result<usize, CompileError> {
        let slot = self.alloc_slot()?;
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .push((name.to_string(), slot));
        Ok(slot)
    }

    /// Anonymous slot used by assignment/constructor lowering.
    fn declare_scratch(&mut self) -> Result<usize, CompileError> {
        self.alloc_slot()
    }

    fn alloc_slot(&mut self) -> Result<usize, CompileError> {
        if self.next_slot >= MAX_LOCALS {
            return Err(CompileError::TooManyLocals(self.current_function.clone()));
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        Ok(slot)
    }

    fn is_implicit_field(&self, name: &str) -> bool {
        self.in_method && self.current_fields.iter().any(|f| f == name)
    }

    fn resolve_local(&self, name: &str) -> Option<usize> {
        for scope in self.scopes.iter().rev() {
            for (n, slot) in scope.iter().rev() {
                if n == name {
                    return Some(*slot);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;
    use crate::compiler::parser::Parser;

    fn compile(src: &str) -> CompiledProgram {
        let program = Parser::new(Lexer::new(src).tokenize()).parse().unwrap();
        CodeGenerator::new().generate(&program).unwrap()
    }

    fn find<'a>(out: &'a CompiledProgram, name: &str) -> &'a [Instruction] {
        out.functions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, code)| code.as_slice())
            .unwrap()
    }

    #[test]
    fn test_main_stream_is_separate() {
        let out = compile("func main(): int { return 1; } func f(): int { return 2; }");
        assert!(out.main.is_some());
        assert_eq!(out.functions.len(), 1);
        assert_eq!(out.functions[0].0, "f");
    }

    #[test]
    fn test_implicit_trailing_return() {
        let out = compile("func f(): int { }");
        let code = find(&out, "f");
        assert_eq!(code[code.len() - 1].op, OpCode::Return);
        assert_eq!(code[code.len() - 2].op, OpCode::LoadConst);
    }

    #[test]
    fn test_process_ends_with_halt() {
        let out = compile("event e; @e process p { }");
        assert_eq!(out.processes.len(), 1);
        assert_eq!(out.processes[0].event, "e");
        let code = &out.processes[0].code;
        assert_eq!(code[code.len() - 1].op, OpCode::Halt);
    }

    #[test]
    fn test_methods_keyed_class_dot_method() {
        let out = compile("class C { func get(): int { return 1; } }");
        assert!(out.functions.iter().any(|(n, _)| n == "C.get"));
    }

    #[test]
    fn test_signal_magic_receivers() {
        let out = compile("signal s: int; func main(): int { s.emit(9); return s.recv(); }");
        let main = out.main.as_ref().unwrap();
        assert!(main.iter().any(|i| i.op == OpCode::SignalEmit));
        assert!(main.iter().any(|i| i.op == OpCode::SignalRecv));
        // No general CALL was produced for either.
        assert!(!main.iter().any(|i| i.op == OpCode::Call));
    }

    #[test]
    fn test_event_execute_magic() {
        let out = compile("event e; func main(): int { e.execute(); return 0; }");
        let main = out.main.as_ref().unwrap();
        assert!(main.iter().any(|i| i.op == OpCode::EventExecute));
    }

    #[test]
    fn test_jump_targets_are_absolute_and_patched() {
        let out = compile("func main(): int { if (true) { return 1; } return 2; }");
        let main = out.main.as_ref().unwrap();
        for inst in main {
            if matches!(inst.op, OpCode::Jump | OpCode::JumpIfFalse) {
                assert!(inst.operand >= 0, "unpatched jump: {:?}", inst);
                assert!((inst.operand as usize) <= main.len());
            }
        }
    }

    #[test]
    fn test_while_jumps_back() {
        let out = compile("func main(): int { var i: int = 0; while (i < 3) { i = i + 1; } return i; }");
        let main = out.main.as_ref().unwrap();
        let has_backward = main
            .iter()
            .enumerate()
            .any(|(at, i)| i.op == OpCode::Jump && (i.operand as usize) < at);
        assert!(has_backward);
    }

    #[test]
    fn test_globals_prelude_in_main() {
        let out = compile("var g: int = 41; func main(): int { return g; }");
        let main = out.main.as_ref().unwrap();
        assert_eq!(main[0].op, OpCode::LoadConst);
        assert_eq!(main[1].op, OpCode::StoreGlobal);
    }

    #[test]
    fn test_new_with_field_initializers() {
        let out = compile(
            "class P { var x: int = 5; } func main(): int { var p: P = new P(); return 0; }",
        );
        let main = out.main.as_ref().unwrap();
        let new_at = main.iter().position(|i| i.op == OpCode::NewObject).unwrap();
        assert_eq!(main[new_at + 1].op, OpCode::Dup);
        assert!(main[new_at..].iter().any(|i| i.op == OpCode::SetField));
    }

    #[test]
    fn test_new_with_constructor_calls_composite_key() {
        let out = compile(
            "class P { var x: int; func P(v: int): int { x = v; return 0; } } \
             func main(): int { var p: P = new P(7); return 0; }",
        );
        let main = out.main.as_ref().unwrap();
        assert!(main.iter().any(|i| i.op == OpCode::Call));
        // The composite constructor key is interned.
        assert!(out.strings.iter().any(|s| s.as_str() == "P.P"));
    }

    #[test]
    fn test_array_literal_builds_in_source_order() {
        let out = compile("func main(): int { var a: int[] = [1, 2]; return 0; }");
        let main = out.main.as_ref().unwrap();
        let build = main.iter().find(|i| i.op == OpCode::BuildArray).unwrap();
        assert_eq!(build.operand, 2);
    }

    #[test]
    fn test_break_outside_loop_is_error() {
        let program = Parser::new(Lexer::new("func f(): int { break; }").tokenize())
            .parse()
            .unwrap();
        let err = CodeGenerator::new().generate(&program).unwrap_err();
        assert_eq!(err, CompileError::BreakOutsideLoop);
    }

    #[test]
    fn test_this_outside_method_is_error() {
        let program = Parser::new(Lexer::new("func f(): int { return this.x; }").tokenize())
            .parse()
            .unwrap();
        let err = CodeGenerator::new().generate(&program).unwrap_err();
        assert_eq!(err, CompileError::ThisOutsideMethod);
    }

    #[test]
    fn test_locals_get_dense_slots() {
        let out = compile("func main(): int { var a: int = 1; var b: int = 2; return b; }");
        let main = out.main.as_ref().unwrap();
        let stores: Vec<i32> = main
            .iter()
            .filter(|i| i.op == OpCode::StoreLocal)
            .map(|i| i.operand)
            .collect();
        assert_eq!(stores, vec![0, 1]);
    }

    #[test]
    fn test_method_call_includes_receiver_in_count() {
        let out = compile(
            "class C { func m(v: int): int { return v; } } \
             func main(): int { var c: C = new C(); return c.m(4); }",
        );
        let main = out.main.as_ref().unwrap();
        // Find the LoadConst just before the final Call: count must be 2.
        let call_at = main.iter().rposition(|i| i.op == OpCode::Call).unwrap();
        assert_eq!(main[call_at - 1].op, OpCode::LoadConst);
        let count_idx = main[call_at - 1].operand as usize;
        assert_eq!(out.constants[count_idx].as_int(), Some(2));
    }
}
