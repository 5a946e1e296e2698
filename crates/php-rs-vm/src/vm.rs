//! PHP Virtual Machine - executes parsed scripts.
//!
//! A tree-walking executor over the php-rs-parser AST. Each `Vm` is one
//! request: it owns the global symbol table, the function table, the INI
//! settings and the error state, and talks to its host only through the
//! [`SapiModule`] it was created with.
//!
//! Equivalent to php-src/Zend/zend_execute.c and zend_execute_API.c.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;
use php_rs_parser::{
    parse_program, parse_script, BinaryOperator, CastType, Expression, Parameter, Program,
    Span, Statement, StringPart, UnaryOperator,
};
use php_rs_runtime::{ErrorHandler, ErrorLevel, IniSystem, PhpError};
use thiserror::Error;

use crate::json::{JsonError, JSON_CONSTANTS};
use crate::sapi::{ContextId, ExistsCheck, SapiModule};
use crate::value::{
    ArrayKey, ObjectData, ObjectRef, OperatorError, PhpArray, PhpObject, Value,
    DEFAULT_PRECISION,
};

/// File name reported for code run through [`Vm::eval`].
pub const EVAL_FILE: &str = "php-rs-engine";

/// Deepest user-function recursion before an Error is thrown.
const MAX_CALL_DEPTH: usize = 256;

/// Why a script stopped early.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// The source did not parse; nothing was executed.
    #[error("PHP Parse error: {message} in {file} on line {line}")]
    Parse {
        message: String,
        file: String,
        line: usize,
    },
    /// An exception reached the top of the script.
    #[error("Uncaught {class}: {message}")]
    Uncaught { class: String, message: String },
    /// A fatal error (E_ERROR, E_USER_ERROR) ended the script.
    #[error("PHP Fatal error: {0}")]
    Fatal(String),
    /// exit()/die() with a status code.
    #[error("script exited with status {0}")]
    Exit(i64),
}

pub type VmResult<T> = Result<T, VmError>;

/// Non-local exits that unwind expression evaluation.
#[derive(Debug)]
pub(crate) enum Interrupt {
    Throw(ObjectRef),
    Exit(i64),
    /// Already reported; carries the message.
    Fatal(String),
}

pub(crate) type ExecResult<T> = Result<T, Interrupt>;

/// Statement completion.
enum Flow {
    Normal,
    Break(usize),
    Continue(usize),
    Return(Value),
}

/// What a loop does after running its body once.
enum LoopStep {
    Next,
    Exit,
    Propagate(Flow),
}

fn loop_step(flow: Flow) -> LoopStep {
    match flow {
        Flow::Normal | Flow::Continue(0 | 1) => LoopStep::Next,
        Flow::Break(0 | 1) => LoopStep::Exit,
        Flow::Break(n) => LoopStep::Propagate(Flow::Break(n - 1)),
        Flow::Continue(n) => LoopStep::Propagate(Flow::Continue(n - 1)),
        Flow::Return(value) => LoopStep::Propagate(Flow::Return(value)),
    }
}

/// An anonymous function value (the payload of a `Closure` object).
#[derive(Debug)]
pub struct Closure {
    pub(crate) params: Vec<Parameter>,
    pub(crate) body: ClosureBody,
    /// Variables captured by value at creation (`use`, or the whole scope
    /// for arrow functions).
    pub(crate) bound: Vec<(String, Value)>,
}

#[derive(Debug)]
pub(crate) enum ClosureBody {
    Block(Vec<Statement>),
    Expr(Expression),
}

#[derive(Clone, Copy)]
enum Body<'a> {
    Block(&'a [Statement]),
    Expr(&'a Expression),
}

/// A declared user function.
#[derive(Debug)]
struct UserFunction {
    name: String,
    params: Vec<Parameter>,
    body: Vec<Statement>,
    /// Program run that declared it, with the declaration's span.
    origin: (u64, Span),
}

/// One activation: the global scope, an eval wrapper, or a function call.
#[derive(Debug, Default)]
struct Frame {
    locals: IndexMap<String, Value>,
    /// Names bound to the global scope by `global $x`.
    globals: HashSet<String>,
}

/// Where a write through `$a[..][..]` starts.
enum PathRoot {
    Var(String),
    Property(ObjectRef, String),
}

/// The PHP Virtual Machine.
pub struct Vm {
    pub(crate) context: ContextId,
    pub(crate) sapi: Rc<dyn SapiModule>,
    pub(crate) ini: IniSystem,
    pub(crate) errors: ErrorHandler,
    /// Call stack; `frames[0]` is the global scope.
    frames: Vec<Frame>,
    /// Function table, keyed by lowercase name.
    functions: HashMap<String, Rc<UserFunction>>,
    /// File being executed, for diagnostics.
    file: String,
    line: usize,
    /// Counter of programs run, to tell hoisted declarations apart.
    runs: u64,
    /// Outcome of the last json_encode() call.
    pub(crate) json_error: Option<JsonError>,
}

impl Vm {
    /// Create a VM for one context. Error routing is configured from `ini`.
    pub fn new(context: ContextId, sapi: Rc<dyn SapiModule>, ini: IniSystem) -> Self {
        let errors = ErrorHandler::from_ini(&ini);
        Self {
            context,
            sapi,
            ini,
            errors,
            frames: vec![Frame::default()],
            functions: HashMap::new(),
            file: String::new(),
            line: 0,
            runs: 0,
            json_error: None,
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn ini(&self) -> &IniSystem {
        &self.ini
    }

    /// Set a directive with host authority (no permission check); the new
    /// value also becomes what ini_restore() returns to.
    pub fn ini_set(&mut self, name: &str, value: &str) {
        self.ini.set_system(name, value);
        self.errors.apply_ini(name, value);
    }

    /// Define a variable in the global scope.
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.frames[0].locals.insert(name.to_string(), value);
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.frames[0].locals.get(name)
    }

    pub fn globals(&self) -> &IndexMap<String, Value> {
        &self.frames[0].locals
    }

    /// Run a script file in the global scope.
    pub fn execute_file(&mut self, path: &str, source: &str) -> VmResult<()> {
        let saved = std::mem::replace(&mut self.file, path.to_string());
        let result = match self.parse(source, false) {
            Ok(program) => self.run_program(&program).map(|_| ()),
            Err(err) => Err(err),
        };
        self.file = saved;
        result
    }

    /// Run inline code (no `<?php` tag) as the body of an immediately
    /// invoked function whose scope starts as a copy of the globals.
    /// Returns the value of `return`, or null.
    pub fn eval(&mut self, code: &str) -> VmResult<Value> {
        let saved = std::mem::replace(&mut self.file, EVAL_FILE.to_string());
        let result = match self.parse(code, true) {
            Ok(program) => {
                let scope = Frame {
                    locals: self.frames[0].locals.clone(),
                    globals: HashSet::new(),
                };
                self.frames.push(scope);
                let result = self.run_program(&program);
                self.frames.truncate(1);
                result.map(Option::unwrap_or_default)
            }
            Err(err) => Err(err),
        };
        self.file = saved;
        result
    }

    fn parse(&mut self, source: &str, scripting: bool) -> VmResult<Program> {
        let parsed = if scripting {
            parse_script(source)
        } else {
            parse_program(source)
        };
        parsed.map_err(|err| {
            self.line = err.line();
            let message = err.to_string();
            self.report(ErrorLevel::Parse, message.clone());
            VmError::Parse {
                message,
                file: self.file.clone(),
                line: err.line(),
            }
        })
    }

    fn run_program(&mut self, program: &Program) -> VmResult<Option<Value>> {
        self.runs += 1;
        let outcome = match self.hoist_functions(&program.statements) {
            Ok(()) => self.exec_block(&program.statements),
            Err(interrupt) => Err(interrupt),
        };
        match outcome {
            Ok(Flow::Return(value)) => Ok(Some(value)),
            Ok(Flow::Normal) => Ok(None),
            Ok(Flow::Break(_) | Flow::Continue(_)) => {
                let message = "'break' not in the 'loop' or 'switch' context".to_string();
                self.report(ErrorLevel::CompileError, message.clone());
                Err(VmError::Fatal(message))
            }
            Err(interrupt) => Err(self.finish(interrupt)),
        }
    }

    fn finish(&mut self, interrupt: Interrupt) -> VmError {
        match interrupt {
            Interrupt::Throw(exception) => {
                let (class, message, file, line) = {
                    let object = exception.borrow();
                    let prop = |name: &str| object.get_property(name).cloned().unwrap_or_default();
                    (
                        object.class_name.clone(),
                        prop("message").to_php_string(),
                        prop("file").to_php_string(),
                        prop("line").to_long(),
                    )
                };
                self.file = file.clone();
                self.line = line as usize;
                self.report(
                    ErrorLevel::Error,
                    format!(
                        "Uncaught {}: {} in {}:{}\nStack trace:\n#0 {{main}}\n  thrown",
                        class, message, file, line
                    ),
                );
                VmError::Uncaught { class, message }
            }
            Interrupt::Exit(code) => VmError::Exit(code),
            Interrupt::Fatal(message) => VmError::Fatal(message),
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub(crate) fn echo(&mut self, text: &str) {
        if !text.is_empty() {
            self.sapi.write(self.context, text.as_bytes());
        }
    }

    /// Report a diagnostic at the current location (php_error_docref).
    pub(crate) fn report(&mut self, level: ErrorLevel, message: impl Into<String>) {
        let mut error = PhpError::new(level, message);
        if !self.file.is_empty() {
            error = error.with_file(self.file.clone()).with_line(self.line as u32);
        }
        let report = self.errors.handle_error(error);
        if let Some(text) = report.log {
            self.sapi.log(self.context, &text);
        }
        if let Some(text) = report.display {
            self.echo(&text);
        }
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>) {
        self.report(ErrorLevel::Warning, message);
    }

    /// Report a fatal error and stop the script.
    pub(crate) fn fatal<T>(&mut self, level: ErrorLevel, message: impl Into<String>) -> ExecResult<T> {
        let message = message.into();
        self.report(level, message.clone());
        Err(Interrupt::Fatal(message))
    }

    /// Check a script-sized allocation against `memory_limit` before making
    /// it. `None` is a size that overflowed while being computed.
    pub(crate) fn reserve(&mut self, bytes: Option<usize>) -> ExecResult<usize> {
        let limit = self.ini.get_long("memory_limit");
        match bytes {
            Some(bytes) if limit < 0 || bytes as u64 <= limit as u64 => Ok(bytes),
            Some(bytes) => self.fatal(
                ErrorLevel::Error,
                format!(
                    "Allowed memory size of {} bytes exhausted (tried to allocate {} bytes)",
                    limit, bytes
                ),
            ),
            None => self.fatal(ErrorLevel::Error, "Possible integer overflow in memory allocation"),
        }
    }

    /// Build an instance of a built-in Throwable class.
    pub(crate) fn create_exception(&self, class: &str, message: impl Into<String>, code: i64) -> ObjectRef {
        let mut object = PhpObject::new(class);
        object.set_property("message", Value::String(message.into()));
        object.set_property("code", Value::Long(code));
        object.set_property("file", Value::String(self.file.clone()));
        object.set_property("line", Value::Long(self.line as i64));
        object.set_property("previous", Value::Null);
        ObjectRef::new(object)
    }

    pub(crate) fn throw_error<T>(&self, class: &str, message: impl Into<String>) -> ExecResult<T> {
        Err(Interrupt::Throw(self.create_exception(class, message, 0)))
    }

    fn operator_result(&self, result: Result<Value, OperatorError>) -> ExecResult<Value> {
        match result {
            Ok(value) => Ok(value),
            Err(err @ (OperatorError::DivisionByZero | OperatorError::ModuloByZero)) => {
                self.throw_error("DivisionByZeroError", err.to_string())
            }
            Err(err) => self.throw_error("TypeError", err.to_string()),
        }
    }

    pub(crate) fn precision(&self) -> i64 {
        self.ini.get("precision").trim().parse().unwrap_or(DEFAULT_PRECISION)
    }

    pub(crate) fn serialize_precision(&self) -> i64 {
        self.ini.get("serialize_precision").trim().parse().unwrap_or(-1)
    }

    /// String conversion with PHP's diagnostics.
    pub(crate) fn stringify(&mut self, value: &Value) -> ExecResult<String> {
        match value {
            Value::Object(obj) => {
                let class = obj.class_name();
                if instance_of(&class, "Throwable") {
                    return Ok(throwable_string(obj));
                }
                self.throw_error(
                    "Error",
                    format!("Object of class {} could not be converted to string", class),
                )
            }
            Value::Array(_) => {
                self.warning("Array to string conversion");
                Ok("Array".to_string())
            }
            other => Ok(other.to_php_string_with(self.precision())),
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Declare the unconditional functions of a block before running it.
    fn hoist_functions(&mut self, statements: &[Statement]) -> ExecResult<()> {
        for statement in statements {
            if let Statement::Function {
                name,
                params,
                body,
                span,
            } = statement
            {
                self.declare_function(name, params, body, *span)?;
            }
        }
        Ok(())
    }

    fn declare_function(
        &mut self,
        name: &str,
        params: &[Parameter],
        body: &[Statement],
        span: Span,
    ) -> ExecResult<()> {
        let key = name.to_ascii_lowercase();
        if let Some(existing) = self.functions.get(&key) {
            // Already hoisted from this very declaration
            if existing.origin == (self.runs, span) {
                return Ok(());
            }
            let existing = existing.name.clone();
            self.line = span.line;
            return self.fatal(
                ErrorLevel::CompileError,
                format!("Cannot redeclare {}()", existing),
            );
        }
        if self.builtin_exists(&key) {
            self.line = span.line;
            return self.fatal(
                ErrorLevel::CompileError,
                format!("Cannot redeclare {}()", name),
            );
        }
        let function = UserFunction {
            name: name.to_string(),
            params: params.to_vec(),
            body: body.to_vec(),
            origin: (self.runs, span),
        };
        self.functions.insert(key, Rc::new(function));
        Ok(())
    }

    fn exec_block(&mut self, statements: &[Statement]) -> ExecResult<Flow> {
        for statement in statements {
            match self.exec_statement(statement)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_statement(&mut self, statement: &Statement) -> ExecResult<Flow> {
        match statement {
            Statement::Expression { expr, .. } => {
                self.eval_expr(expr)?;
            }
            Statement::Echo { exprs, .. } => {
                for expr in exprs {
                    let value = self.eval_expr(expr)?;
                    let text = self.stringify(&value)?;
                    self.echo(&text);
                }
            }
            Statement::InlineHtml { content, .. } => self.echo(content),
            Statement::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            Statement::If {
                condition,
                then_branch,
                elseif_branches,
                else_branch,
                ..
            } => {
                if self.eval_expr(condition)?.to_bool() {
                    return self.exec_statement(then_branch);
                }
                for (condition, branch) in elseif_branches {
                    if self.eval_expr(condition)?.to_bool() {
                        return self.exec_statement(branch);
                    }
                }
                if let Some(branch) = else_branch {
                    return self.exec_statement(branch);
                }
            }
            Statement::While {
                condition, body, ..
            } => {
                while self.eval_expr(condition)?.to_bool() {
                    match loop_step(self.exec_statement(body)?) {
                        LoopStep::Next => {}
                        LoopStep::Exit => break,
                        LoopStep::Propagate(flow) => return Ok(flow),
                    }
                }
            }
            Statement::For {
                init,
                condition,
                increment,
                body,
                ..
            } => {
                for expr in init {
                    self.eval_expr(expr)?;
                }
                loop {
                    // All conditions are evaluated; the last one decides
                    let mut proceed = true;
                    for expr in condition {
                        proceed = self.eval_expr(expr)?.to_bool();
                    }
                    if !proceed {
                        break;
                    }
                    match loop_step(self.exec_statement(body)?) {
                        LoopStep::Next => {}
                        LoopStep::Exit => break,
                        LoopStep::Propagate(flow) => return Ok(flow),
                    }
                    for expr in increment {
                        self.eval_expr(expr)?;
                    }
                }
            }
            Statement::Foreach {
                iterable,
                key,
                value,
                body,
                ..
            } => {
                let subject = self.eval_expr(iterable)?;
                let entries: Vec<(Value, Value)> = match &subject {
                    Value::Array(arr) => arr
                        .iter()
                        .map(|(k, v)| (k.to_value(), v.clone()))
                        .collect(),
                    Value::Object(obj) => obj
                        .borrow()
                        .properties
                        .iter()
                        .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                        .collect(),
                    other => {
                        self.warning(format!(
                            "foreach() argument must be of type array|object, {} given",
                            other.type_name()
                        ));
                        Vec::new()
                    }
                };
                for (k, v) in entries {
                    if let Some(key) = key {
                        self.assign_to(key, k)?;
                    }
                    self.assign_to(value, v)?;
                    match loop_step(self.exec_statement(body)?) {
                        LoopStep::Next => {}
                        LoopStep::Exit => break,
                        LoopStep::Propagate(flow) => return Ok(flow),
                    }
                }
            }
            Statement::Break { depth, .. } => return Ok(Flow::Break(*depth)),
            Statement::Continue { depth, .. } => return Ok(Flow::Continue(*depth)),
            Statement::Try {
                body,
                catches,
                finally,
                ..
            } => {
                let mut outcome = self.exec_block(body);
                let thrown = match &outcome {
                    Err(Interrupt::Throw(exception)) => Some(exception.clone()),
                    _ => None,
                };
                if let Some(exception) = thrown {
                    let class = exception.class_name();
                    let clause = catches
                        .iter()
                        .find(|clause| clause.types.iter().any(|t| instance_of(&class, t)));
                    if let Some(clause) = clause {
                        if let Some(var) = &clause.var {
                            self.set_var(var, Value::Object(exception));
                        }
                        outcome = self.exec_block(&clause.body);
                    }
                }
                // exit() and fatal errors skip finally blocks
                if matches!(outcome, Err(Interrupt::Exit(_) | Interrupt::Fatal(_))) {
                    return outcome;
                }
                if let Some(finally) = finally {
                    match self.exec_block(finally)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                return outcome;
            }
            Statement::Throw { exception, .. } => {
                let value = self.eval_expr(exception)?;
                return Err(self.throwable(value));
            }
            Statement::Global { vars, .. } => {
                if self.frames.len() > 1 {
                    if let Some(frame) = self.frames.last_mut() {
                        for name in vars {
                            frame.locals.shift_remove(name);
                            frame.globals.insert(name.clone());
                        }
                    }
                }
            }
            Statement::Unset { vars, .. } => {
                for var in vars {
                    self.unset(var)?;
                }
            }
            Statement::Function {
                name,
                params,
                body,
                span,
            } => self.declare_function(name, params, body, *span)?,
            Statement::Block { statements, .. } => return self.exec_block(statements),
        }
        Ok(Flow::Normal)
    }

    /// The interrupt for `throw $value`.
    fn throwable(&self, value: Value) -> Interrupt {
        match value {
            Value::Object(obj) if instance_of(&obj.class_name(), "Throwable") => {
                Interrupt::Throw(obj)
            }
            _ => Interrupt::Throw(self.create_exception("Error", "Can only throw objects", 0)),
        }
    }

    // =========================================================================
    // Variables
    // =========================================================================

    /// Frame that holds `name` in the current scope.
    fn scope_of(&self, name: &str) -> usize {
        let top = self.frames.len() - 1;
        if top > 0 && self.frames[top].globals.contains(name) {
            0
        } else {
            top
        }
    }

    fn lookup_var(&self, name: &str) -> Option<&Value> {
        self.frames[self.scope_of(name)].locals.get(name)
    }

    pub(crate) fn set_var(&mut self, name: &str, value: Value) {
        let scope = self.scope_of(name);
        self.frames[scope].locals.insert(name.to_string(), value);
    }

    fn read_var(&mut self, name: &str) -> Value {
        match self.lookup_var(name) {
            Some(value) => value.clone(),
            None => {
                self.warning(format!("Undefined variable ${}", name));
                Value::Null
            }
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub(crate) fn eval_expr(&mut self, expr: &Expression) -> ExecResult<Value> {
        self.line = expr.span().line;
        match expr {
            Expression::IntLiteral { value, .. } => Ok(Value::Long(*value)),
            Expression::FloatLiteral { value, .. } => Ok(Value::Double(*value)),
            Expression::StringLiteral { value, .. } => Ok(Value::String(value.clone())),
            Expression::BoolLiteral { value, .. } => Ok(Value::Bool(*value)),
            Expression::Null { .. } => Ok(Value::Null),
            Expression::Interpolated { parts, .. } => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        StringPart::Literal(text) => out.push_str(text),
                        StringPart::Expr(expr) => {
                            let value = self.eval_expr(expr)?;
                            out.push_str(&self.stringify(&value)?);
                        }
                    }
                }
                Ok(Value::String(out))
            }
            Expression::Variable { name, .. } => Ok(self.read_var(name)),
            Expression::Name { name, .. } => self.constant(name),

            Expression::Assign { lhs, rhs, .. } => {
                let value = self.eval_expr(rhs)?;
                self.assign_to(lhs, value.clone())?;
                Ok(value)
            }
            Expression::AssignOp {
                op: BinaryOperator::Coalesce,
                lhs,
                rhs,
                ..
            } => {
                if let Some(current) = self.eval_quiet(lhs)? {
                    if !current.is_null() {
                        return Ok(current);
                    }
                }
                let value = self.eval_expr(rhs)?;
                self.assign_to(lhs, value.clone())?;
                Ok(value)
            }
            Expression::AssignOp { op, lhs, rhs, .. } => {
                let current = self.eval_expr(lhs)?;
                let operand = self.eval_expr(rhs)?;
                let value = self.binary(*op, &current, &operand)?;
                self.assign_to(lhs, value.clone())?;
                Ok(value)
            }

            Expression::BinaryOp { op, lhs, rhs, .. } => match op {
                BinaryOperator::And | BinaryOperator::LogicalAnd => Ok(Value::Bool(
                    self.eval_expr(lhs)?.to_bool() && self.eval_expr(rhs)?.to_bool(),
                )),
                BinaryOperator::Or | BinaryOperator::LogicalOr => Ok(Value::Bool(
                    self.eval_expr(lhs)?.to_bool() || self.eval_expr(rhs)?.to_bool(),
                )),
                _ => {
                    let left = self.eval_expr(lhs)?;
                    let right = self.eval_expr(rhs)?;
                    self.binary(*op, &left, &right)
                }
            },
            Expression::UnaryOp {
                op: UnaryOperator::ErrorSuppress,
                operand,
                ..
            } => {
                self.errors.begin_silence();
                let result = self.eval_expr(operand);
                self.errors.end_silence();
                result
            }
            Expression::UnaryOp { op, operand, .. } => {
                let value = self.eval_expr(operand)?;
                match op {
                    UnaryOperator::Plus => self.operator_result(value.to_number()),
                    UnaryOperator::Minus => self.operator_result(value.negate()),
                    UnaryOperator::BitwiseNot => self.operator_result(value.bw_not()),
                    UnaryOperator::Not | UnaryOperator::ErrorSuppress => {
                        Ok(Value::Bool(!value.to_bool()))
                    }
                }
            }
            Expression::Ternary {
                condition,
                then_expr,
                else_expr,
                ..
            } => {
                let condition = self.eval_expr(condition)?;
                if condition.to_bool() {
                    match then_expr {
                        Some(expr) => self.eval_expr(expr),
                        None => Ok(condition),
                    }
                } else {
                    self.eval_expr(else_expr)
                }
            }
            Expression::Coalesce { lhs, rhs, .. } => match self.eval_quiet(lhs)? {
                Some(value) if !value.is_null() => Ok(value),
                _ => self.eval_expr(rhs),
            },

            Expression::FunctionCall { name, args, .. } => {
                let args = self.eval_args(args)?;
                match &**name {
                    Expression::Name { name, .. } => self.call_function(name, args),
                    callee => {
                        let target = self.eval_expr(callee)?;
                        self.call_value(&target, args)
                    }
                }
            }
            Expression::MethodCall {
                object,
                method,
                args,
                nullsafe,
                ..
            } => {
                let target = self.eval_expr(object)?;
                if *nullsafe && target.is_null() {
                    return Ok(Value::Null);
                }
                let args = self.eval_args(args)?;
                self.call_method(&target, method, args)
            }
            Expression::PropertyAccess {
                object,
                property,
                nullsafe,
                ..
            } => {
                let target = self.eval_expr(object)?;
                if *nullsafe && target.is_null() {
                    return Ok(Value::Null);
                }
                self.read_property(&target, property)
            }
            Expression::ArrayAccess { index: None, .. } => {
                self.fatal(ErrorLevel::CompileError, "Cannot use [] for reading")
            }
            Expression::ArrayAccess {
                array,
                index: Some(index),
                ..
            } => {
                let container = self.eval_expr(array)?;
                let index = self.eval_expr(index)?;
                self.read_index(&container, &index)
            }
            Expression::ArrayLiteral { elements, .. } => {
                let mut arr = PhpArray::new();
                for element in elements {
                    let value = self.eval_expr(&element.value)?;
                    match &element.key {
                        Some(key) => {
                            let key = self.eval_expr(key)?;
                            let key = self.array_key(&key)?;
                            arr.insert(key, value);
                        }
                        None => arr.push(value),
                    }
                }
                Ok(Value::Array(arr))
            }
            Expression::New { class, args, .. } => {
                let args = self.eval_args(args)?;
                self.instantiate(class, args)
            }
            Expression::Instanceof { expr, class, .. } => {
                let value = self.eval_expr(expr)?;
                Ok(Value::Bool(match value {
                    Value::Object(obj) => instance_of(&obj.class_name(), class),
                    _ => false,
                }))
            }
            Expression::Cast {
                cast_type, expr, ..
            } => {
                let value = self.eval_expr(expr)?;
                Ok(match cast_type {
                    CastType::Int => Value::Long(value.to_long()),
                    CastType::Float => Value::Double(value.to_double()),
                    CastType::String => Value::String(self.stringify(&value)?),
                    CastType::Bool => Value::Bool(value.to_bool()),
                    CastType::Array => Value::Array(value.to_array()),
                })
            }
            Expression::Closure {
                params, uses, body, ..
            } => {
                let bound = uses
                    .iter()
                    .map(|name| (name.clone(), self.read_var(name)))
                    .collect();
                Ok(closure_value(Closure {
                    params: params.clone(),
                    body: ClosureBody::Block(body.clone()),
                    bound,
                }))
            }
            Expression::ArrowFunction { params, body, .. } => {
                let scope = self.frames.len() - 1;
                let bound = self.frames[scope]
                    .locals
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                Ok(closure_value(Closure {
                    params: params.clone(),
                    body: ClosureBody::Expr((**body).clone()),
                    bound,
                }))
            }
            Expression::Isset { vars, .. } => {
                for var in vars {
                    if !self.isset(var)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expression::Empty { var, .. } => Ok(Value::Bool(self.is_empty(var)?)),
            Expression::PreIncrement { var, .. } => self.update(var, Value::increment, true),
            Expression::PostIncrement { var, .. } => self.update(var, Value::increment, false),
            Expression::PreDecrement { var, .. } => self.update(var, Value::decrement, true),
            Expression::PostDecrement { var, .. } => self.update(var, Value::decrement, false),
            Expression::Print { expr, .. } => {
                let value = self.eval_expr(expr)?;
                let text = self.stringify(&value)?;
                self.echo(&text);
                Ok(Value::Long(1))
            }
            Expression::Exit { expr, .. } => {
                let code = match expr {
                    None => 0,
                    Some(expr) => match self.eval_expr(expr)? {
                        Value::Long(code) => code,
                        other => {
                            let text = self.stringify(&other)?;
                            self.echo(&text);
                            0
                        }
                    },
                };
                Err(Interrupt::Exit(code))
            }
        }
    }

    fn eval_args(&mut self, args: &[Expression]) -> ExecResult<Vec<Value>> {
        args.iter().map(|arg| self.eval_expr(arg)).collect()
    }

    fn binary(&mut self, op: BinaryOperator, left: &Value, right: &Value) -> ExecResult<Value> {
        use BinaryOperator::*;
        Ok(match op {
            Add => self.operator_result(left.add(right))?,
            Sub => self.operator_result(left.sub(right))?,
            Mul => self.operator_result(left.mul(right))?,
            Div => self.operator_result(left.div(right))?,
            Mod => self.operator_result(left.modulo(right))?,
            Pow => self.operator_result(left.pow(right))?,
            Concat => {
                let mut text = self.stringify(left)?;
                text.push_str(&self.stringify(right)?);
                Value::String(text)
            }
            Equal => Value::Bool(left.loose_eq(right)),
            NotEqual => Value::Bool(!left.loose_eq(right)),
            Identical => Value::Bool(left.strict_eq(right)),
            NotIdentical => Value::Bool(!left.strict_eq(right)),
            Less => Value::Bool(left.is_smaller(right)),
            LessEqual => Value::Bool(left.is_smaller_or_equal(right)),
            Greater => Value::Bool(right.is_smaller(left)),
            GreaterEqual => Value::Bool(right.is_smaller_or_equal(left)),
            Spaceship => Value::Long(left.spaceship(right)),
            And | LogicalAnd => Value::Bool(left.to_bool() && right.to_bool()),
            Or | LogicalOr => Value::Bool(left.to_bool() || right.to_bool()),
            LogicalXor => Value::Bool(left.to_bool() ^ right.to_bool()),
            BitwiseAnd => self.operator_result(left.bw_and(right))?,
            BitwiseOr => self.operator_result(left.bw_or(right))?,
            BitwiseXor => self.operator_result(left.bw_xor(right))?,
            Coalesce => {
                if left.is_null() {
                    right.clone()
                } else {
                    left.clone()
                }
            }
        })
    }

    /// ++/-- on an assignable expression.
    fn update(&mut self, target: &Expression, op: fn(&Value) -> Value, prefix: bool) -> ExecResult<Value> {
        let old = self.eval_expr(target)?;
        let new = op(&old);
        self.assign_to(target, new.clone())?;
        Ok(if prefix { new } else { old })
    }

    fn constant(&mut self, name: &str) -> ExecResult<Value> {
        match constant_value(name) {
            Some(value) => Ok(value),
            None => self.throw_error("Error", format!("Undefined constant \"{}\"", name)),
        }
    }

    // =========================================================================
    // isset / empty / ?? - reads without diagnostics
    // =========================================================================

    /// Evaluate without "undefined" diagnostics; None when any step of the
    /// path does not exist.
    fn eval_quiet(&mut self, expr: &Expression) -> ExecResult<Option<Value>> {
        match expr {
            Expression::Variable { name, .. } => Ok(self.lookup_var(name).cloned()),
            Expression::ArrayAccess {
                array,
                index: Some(index),
                ..
            } => {
                let Some(container) = self.eval_quiet(array)? else {
                    return Ok(None);
                };
                let index = self.eval_expr(index)?;
                Ok(match &container {
                    Value::Array(arr) => {
                        ArrayKey::from_value(&index).and_then(|key| arr.get(&key).cloned())
                    }
                    Value::String(s) => string_offset(s, index.to_long()).map(Value::String),
                    _ => None,
                })
            }
            Expression::PropertyAccess {
                object, property, ..
            } => {
                let Some(target) = self.eval_quiet(object)? else {
                    return Ok(None);
                };
                let Value::Object(obj) = target else {
                    return Ok(None);
                };
                if let Some(id) = obj.receiver() {
                    return Ok(self.sapi.receiver_get(id, property));
                }
                let value = obj.borrow().get_property(property).cloned();
                Ok(value)
            }
            _ => self.eval_expr(expr).map(Some),
        }
    }

    fn isset(&mut self, expr: &Expression) -> ExecResult<bool> {
        if let Expression::PropertyAccess {
            object, property, ..
        } = expr
        {
            let Some(Value::Object(obj)) = self.eval_quiet(object)? else {
                return Ok(false);
            };
            if let Some(id) = obj.receiver() {
                return Ok(self.sapi.receiver_exists(id, property, ExistsCheck::NotNull));
            }
            let set = obj
                .borrow()
                .get_property(property)
                .is_some_and(|value| !value.is_null());
            return Ok(set);
        }
        Ok(self.eval_quiet(expr)?.is_some_and(|value| !value.is_null()))
    }

    fn is_empty(&mut self, expr: &Expression) -> ExecResult<bool> {
        if let Expression::PropertyAccess {
            object, property, ..
        } = expr
        {
            let Some(Value::Object(obj)) = self.eval_quiet(object)? else {
                return Ok(true);
            };
            if let Some(id) = obj.receiver() {
                return Ok(!self.sapi.receiver_exists(id, property, ExistsCheck::Truthy));
            }
            let filled = obj
                .borrow()
                .get_property(property)
                .is_some_and(Value::to_bool);
            return Ok(!filled);
        }
        Ok(!self.eval_quiet(expr)?.is_some_and(|value| value.to_bool()))
    }

    // =========================================================================
    // Arrays and properties
    // =========================================================================

    fn array_key(&self, index: &Value) -> ExecResult<ArrayKey> {
        match ArrayKey::from_value(index) {
            Some(key) => Ok(key),
            None => self.throw_error("TypeError", "Illegal offset type"),
        }
    }

    fn read_index(&mut self, container: &Value, index: &Value) -> ExecResult<Value> {
        match container {
            Value::Array(arr) => {
                let key = self.array_key(index)?;
                match arr.get(&key) {
                    Some(value) => Ok(value.clone()),
                    None => {
                        self.warning(match key {
                            ArrayKey::Int(n) => format!("Undefined array key {}", n),
                            ArrayKey::String(s) => format!("Undefined array key \"{}\"", s),
                        });
                        Ok(Value::Null)
                    }
                }
            }
            Value::String(s) => {
                let offset = index.to_long();
                match string_offset(s, offset) {
                    Some(ch) => Ok(Value::String(ch)),
                    None => {
                        self.warning(format!("Uninitialized string offset {}", offset));
                        Ok(Value::String(String::new()))
                    }
                }
            }
            Value::Object(obj) => self.throw_error(
                "Error",
                format!("Cannot use object of type {} as array", obj.class_name()),
            ),
            other => {
                self.warning(format!(
                    "Trying to access array offset on value of type {}",
                    other.type_name()
                ));
                Ok(Value::Null)
            }
        }
    }

    fn read_property(&mut self, target: &Value, name: &str) -> ExecResult<Value> {
        let Value::Object(obj) = target else {
            self.warning(format!(
                "Attempt to read property \"{}\" on {}",
                name,
                target.type_name()
            ));
            return Ok(Value::Null);
        };
        if let Some(id) = obj.receiver() {
            return Ok(self.sapi.receiver_get(id, name).unwrap_or_default());
        }
        let found = obj.borrow().get_property(name).cloned();
        match found {
            Some(value) => Ok(value),
            None => {
                self.warning(format!("Undefined property: {}::${}", obj.class_name(), name));
                Ok(Value::Null)
            }
        }
    }

    fn write_property(&mut self, target: &Value, name: &str, value: Value) -> ExecResult<()> {
        let Value::Object(obj) = target else {
            return self.throw_error(
                "Error",
                format!(
                    "Attempt to assign property \"{}\" on {}",
                    name,
                    target.type_name()
                ),
            );
        };
        if let Some(id) = obj.receiver() {
            self.sapi.receiver_set(id, name, &value);
        } else if obj.closure().is_some() {
            return self.throw_error("Error", "Closure object cannot have properties");
        } else {
            obj.borrow_mut().set_property(name, value);
        }
        Ok(())
    }

    /// Store `value` into an assignable expression.
    fn assign_to(&mut self, target: &Expression, value: Value) -> ExecResult<()> {
        match target {
            Expression::Variable { name, .. } => {
                self.set_var(name, value);
                Ok(())
            }
            Expression::PropertyAccess {
                object, property, ..
            } => {
                let base = self.eval_expr(object)?;
                self.write_property(&base, property, value)
            }
            Expression::ArrayAccess { .. } => {
                let (root, keys) = self.resolve_path(target)?;
                self.with_root(root, true, |vm, slot| vm.assign_in(slot, &keys, value))
            }
            _ => self.fatal(ErrorLevel::CompileError, "Cannot assign to this expression"),
        }
    }

    /// Split `$a[k1][k2]` / `$o->p[k1]` into its root and evaluated keys
    /// (`None` for `[]`).
    fn resolve_path(&mut self, target: &Expression) -> ExecResult<(PathRoot, Vec<Option<Value>>)> {
        let mut keys = Vec::new();
        let mut current = target;
        let root = loop {
            match current {
                Expression::ArrayAccess { array, index, .. } => {
                    keys.push(match index {
                        Some(index) => Some(self.eval_expr(index)?),
                        None => None,
                    });
                    current = array;
                }
                Expression::Variable { name, .. } => break PathRoot::Var(name.clone()),
                Expression::PropertyAccess {
                    object, property, ..
                } => match self.eval_expr(object)? {
                    Value::Object(obj) => break PathRoot::Property(obj, property.clone()),
                    other => {
                        return self.throw_error(
                            "Error",
                            format!(
                                "Attempt to modify property \"{}\" on {}",
                                property,
                                other.type_name()
                            ),
                        )
                    }
                },
                _ => {
                    return self.fatal(
                        ErrorLevel::CompileError,
                        "Cannot use temporary expression in write context",
                    )
                }
            }
        };
        keys.reverse();
        Ok((root, keys))
    }

    /// Run `f` on the value stored at `root`. The value is moved out for the
    /// duration, so `f` may use the VM freely. With `create == false` a
    /// missing root is left alone.
    fn with_root<R: Default>(
        &mut self,
        root: PathRoot,
        create: bool,
        f: impl FnOnce(&mut Self, &mut Value) -> ExecResult<R>,
    ) -> ExecResult<R> {
        match root {
            PathRoot::Var(name) => {
                let scope = self.scope_of(&name);
                let existing = self.frames[scope].locals.get_mut(&name).map(std::mem::take);
                if existing.is_none() && !create {
                    return Ok(R::default());
                }
                let mut value = existing.unwrap_or_default();
                let result = f(self, &mut value);
                self.frames[scope].locals.insert(name, value);
                result
            }
            PathRoot::Property(obj, name) => {
                if let Some(id) = obj.receiver() {
                    let mut value = self.sapi.receiver_get(id, &name).unwrap_or_default();
                    let result = f(self, &mut value)?;
                    self.sapi.receiver_set(id, &name, &value);
                    return Ok(result);
                }
                let existing = obj
                    .borrow_mut()
                    .properties
                    .get_mut(&name)
                    .map(std::mem::take);
                if existing.is_none() && !create {
                    return Ok(R::default());
                }
                let mut value = existing.unwrap_or_default();
                let result = f(self, &mut value);
                obj.borrow_mut().properties.insert(name, value);
                result
            }
        }
    }

    fn assign_in(&mut self, slot: &mut Value, keys: &[Option<Value>], value: Value) -> ExecResult<()> {
        let Some((key, rest)) = keys.split_first() else {
            *slot = value;
            return Ok(());
        };
        match slot {
            Value::Null => *slot = Value::Array(PhpArray::new()),
            Value::Bool(false) => {
                self.report(
                    ErrorLevel::Deprecated,
                    "Automatic conversion of false to array is deprecated",
                );
                *slot = Value::Array(PhpArray::new());
            }
            _ => {}
        }
        match slot {
            Value::Array(arr) => {
                let child = match key {
                    None => arr.push_slot(),
                    Some(key) => {
                        let key = self.array_key(key)?;
                        arr.entry_mut(key)
                    }
                };
                self.assign_in(child, rest, value)
            }
            Value::String(s) if rest.is_empty() => {
                let Some(key) = key else {
                    return self.throw_error("Error", "[] operator not supported for strings");
                };
                let offset = key.to_long();
                let position = if offset < 0 { s.len() as i64 + offset } else { offset };
                if position < 0 {
                    self.warning(format!("Illegal string offset {}", offset));
                    return Ok(());
                }
                let position = position as usize;
                if s.len() <= position {
                    self.reserve(position.checked_add(1))?;
                }
                let replacement = self.stringify(&value)?;
                let mut bytes = std::mem::take(s).into_bytes();
                if bytes.len() <= position {
                    bytes.resize(position + 1, b' ');
                }
                bytes[position] = replacement.bytes().next().unwrap_or(b' ');
                *s = String::from_utf8_lossy(&bytes).into_owned();
                Ok(())
            }
            Value::String(_) => self.throw_error("Error", "Cannot use string offset as an array"),
            Value::Object(obj) => {
                let class = obj.class_name();
                self.throw_error("Error", format!("Cannot use object of type {} as array", class))
            }
            _ => self.throw_error("Error", "Cannot use a scalar value as an array"),
        }
    }

    fn unset(&mut self, target: &Expression) -> ExecResult<()> {
        match target {
            Expression::Variable { name, .. } => {
                let scope = self.frames.len() - 1;
                let frame = &mut self.frames[scope];
                if !frame.globals.remove(name) {
                    frame.locals.shift_remove(name);
                }
                Ok(())
            }
            Expression::PropertyAccess {
                object, property, ..
            } => {
                if let Value::Object(obj) = self.eval_expr(object)? {
                    if obj.receiver().is_none() {
                        obj.borrow_mut().properties.shift_remove(property);
                    }
                }
                Ok(())
            }
            Expression::ArrayAccess { .. } => {
                let (root, keys) = self.resolve_path(target)?;
                let mut path = Vec::with_capacity(keys.len());
                for key in keys {
                    match key {
                        Some(key) => path.push(self.array_key(&key)?),
                        None => {
                            return self.fatal(ErrorLevel::CompileError, "Cannot use [] for unsetting")
                        }
                    }
                }
                self.with_root(root, false, |_, slot| {
                    remove_in(slot, &path);
                    Ok(())
                })
            }
            _ => self.fatal(ErrorLevel::CompileError, "Cannot unset this expression"),
        }
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Call a function by name: user functions first, then built-ins.
    pub(crate) fn call_function(&mut self, name: &str, args: Vec<Value>) -> ExecResult<Value> {
        let key = name.trim_start_matches('\\').to_ascii_lowercase();
        if let Some(function) = self.functions.get(&key).cloned() {
            return self.call_user(&function.name, &function.params, Body::Block(&function.body), &[], args);
        }
        match self.call_builtin(&key, &args) {
            Some(result) => result,
            None => self.throw_error("Error", format!("Call to undefined function {}()", name)),
        }
    }

    pub(crate) fn function_exists(&self, name: &str) -> bool {
        let key = name.trim_start_matches('\\').to_ascii_lowercase();
        self.functions.contains_key(&key) || self.builtin_exists(&key)
    }

    /// Call a callable value: a Closure object or a function name.
    pub(crate) fn call_value(&mut self, target: &Value, args: Vec<Value>) -> ExecResult<Value> {
        match target {
            Value::String(name) => self.call_function(name, args),
            Value::Object(obj) => match obj.closure() {
                Some(closure) => self.call_closure(&closure, args),
                None => self.throw_error(
                    "Error",
                    format!("Object of type {} is not callable", obj.class_name()),
                ),
            },
            _ => self.throw_error("Error", "Value not callable"),
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> ExecResult<Value> {
        let body = match &closure.body {
            ClosureBody::Block(statements) => Body::Block(statements),
            ClosureBody::Expr(expr) => Body::Expr(expr),
        };
        self.call_user("{closure}", &closure.params, body, &closure.bound, args)
    }

    fn call_user(
        &mut self,
        name: &str,
        params: &[Parameter],
        body: Body<'_>,
        bound: &[(String, Value)],
        args: Vec<Value>,
    ) -> ExecResult<Value> {
        if self.frames.len() > MAX_CALL_DEPTH {
            return self.throw_error(
                "Error",
                format!("Maximum function nesting level of '{}' reached", MAX_CALL_DEPTH),
            );
        }
        let required = params
            .iter()
            .rposition(|param| param.default.is_none())
            .map_or(0, |i| i + 1);
        if args.len() < required {
            let bound = if required == params.len() { "exactly" } else { "at least" };
            return self.throw_error(
                "ArgumentCountError",
                format!(
                    "Too few arguments to function {}(), {} passed in {} on line {} and {} {} expected",
                    name,
                    args.len(),
                    self.file,
                    self.line,
                    bound,
                    required
                ),
            );
        }

        let mut frame = Frame::default();
        for (name, value) in bound {
            frame.locals.insert(name.clone(), value.clone());
        }
        self.frames.push(frame);
        let result = self.run_function(params, body, args);
        self.frames.pop();
        result
    }

    fn run_function(&mut self, params: &[Parameter], body: Body<'_>, args: Vec<Value>) -> ExecResult<Value> {
        let mut args = args.into_iter();
        for param in params {
            let value = match (args.next(), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.eval_expr(default)?,
                (None, None) => Value::Null,
            };
            self.set_var(&param.name, value);
        }
        match body {
            Body::Expr(expr) => self.eval_expr(expr),
            Body::Block(statements) => {
                self.hoist_functions(statements)?;
                match self.exec_block(statements)? {
                    Flow::Return(value) => Ok(value),
                    Flow::Normal => Ok(Value::Null),
                    Flow::Break(_) | Flow::Continue(_) => self.fatal(
                        ErrorLevel::CompileError,
                        "'break' not in the 'loop' or 'switch' context",
                    ),
                }
            }
        }
    }

    fn call_method(&mut self, target: &Value, method: &str, args: Vec<Value>) -> ExecResult<Value> {
        let Value::Object(obj) = target else {
            return self.throw_error(
                "Error",
                format!("Call to a member function {}() on {}", method, target.type_name()),
            );
        };
        if let Some(id) = obj.receiver() {
            return Ok(self.sapi.receiver_call(id, method, &args).unwrap_or_default());
        }
        if let Some(closure) = obj.closure() {
            if method.eq_ignore_ascii_case("__invoke") || method.eq_ignore_ascii_case("call") {
                return self.call_closure(&closure, args);
            }
        }
        let class = obj.class_name();
        if instance_of(&class, "Throwable") {
            if let Some(value) = throwable_method(obj, method) {
                return Ok(value);
            }
        }
        self.throw_error(
            "Error",
            format!("Call to undefined method {}::{}()", class, method),
        )
    }

    fn instantiate(&mut self, class: &str, args: Vec<Value>) -> ExecResult<Value> {
        if let Some((canonical, _)) = builtin_class(class) {
            return match canonical {
                "stdClass" => Ok(Value::Object(ObjectRef::new(PhpObject::new("stdClass")))),
                "Throwable" => self.throw_error("Error", "Cannot instantiate interface Throwable"),
                "Closure" => {
                    self.throw_error("Error", "Instantiation of class Closure is not allowed")
                }
                _ => {
                    let message = match args.first() {
                        Some(value) => self.stringify(value)?,
                        None => String::new(),
                    };
                    let code = args.get(1).map_or(0, Value::to_long);
                    let exception = self.create_exception(canonical, message, code);
                    if let Some(previous @ Value::Object(_)) = args.get(2) {
                        exception
                            .borrow_mut()
                            .set_property("previous", previous.clone());
                    }
                    Ok(Value::Object(exception))
                }
            };
        }
        if let Some((class_id, name)) = self.sapi.class_lookup(class) {
            return match self.sapi.receiver_new(class_id, self.context, &args) {
                Some(object_id) => Ok(Value::Object(ObjectRef::new(PhpObject::with_data(
                    name,
                    ObjectData::Receiver(object_id),
                )))),
                None => self.throw_error("Exception", "Failed to instantiate method receiver"),
            };
        }
        self.throw_error("Error", format!("Class \"{}\" not found", class))
    }
}

// =============================================================================
// Free helpers
// =============================================================================

fn closure_value(closure: Closure) -> Value {
    Value::Object(ObjectRef::new(PhpObject::with_data(
        "Closure",
        ObjectData::Closure(Rc::new(closure)),
    )))
}

/// Remove the element at `path` without creating anything along the way.
fn remove_in(slot: &mut Value, path: &[ArrayKey]) {
    let Value::Array(arr) = slot else {
        return;
    };
    match path {
        [] => {}
        [key] => {
            arr.remove(key);
        }
        [key, rest @ ..] => {
            if arr.contains_key(key) {
                remove_in(arr.entry_mut(key.clone()), rest);
            }
        }
    }
}

/// One-byte string offset (negative counts from the end).
fn string_offset(s: &str, offset: i64) -> Option<String> {
    let len = s.len() as i64;
    let position = if offset < 0 { len + offset } else { offset };
    if position < 0 || position >= len {
        return None;
    }
    let byte = s.as_bytes()[position as usize];
    Some(String::from_utf8_lossy(&[byte]).into_owned())
}

/// Built-in classes as (name, parent).
const BUILTIN_CLASSES: [(&str, Option<&str>); 13] = [
    ("stdClass", None),
    ("Closure", None),
    ("Throwable", None),
    ("Exception", Some("Throwable")),
    ("ErrorException", Some("Exception")),
    ("JsonException", Some("Exception")),
    ("Error", Some("Throwable")),
    ("TypeError", Some("Error")),
    ("ArgumentCountError", Some("TypeError")),
    ("ValueError", Some("Error")),
    ("ArithmeticError", Some("Error")),
    ("DivisionByZeroError", Some("ArithmeticError")),
    ("UnhandledMatchError", Some("Error")),
];

fn builtin_class(name: &str) -> Option<(&'static str, Option<&'static str>)> {
    let name = name.trim_start_matches('\\');
    BUILTIN_CLASSES
        .iter()
        .copied()
        .find(|(class, _)| class.eq_ignore_ascii_case(name))
}

/// Whether `name` is one of the classes the VM defines itself.
pub fn is_builtin_class(name: &str) -> bool {
    builtin_class(name).is_some()
}

/// `instanceof` over the built-in hierarchy; host classes only match
/// themselves.
pub fn instance_of(class: &str, target: &str) -> bool {
    let target = target.trim_start_matches('\\');
    let mut current = Some(class);
    while let Some(name) = current {
        if name.eq_ignore_ascii_case(target) {
            return true;
        }
        current = builtin_class(name).and_then(|(_, parent)| parent);
    }
    false
}

fn throwable_method(obj: &ObjectRef, method: &str) -> Option<Value> {
    let value = {
        let object = obj.borrow();
        let prop = |name: &str| object.get_property(name).cloned().unwrap_or_default();
        match method.to_ascii_lowercase().as_str() {
            "getmessage" => prop("message"),
            "getcode" => prop("code"),
            "getfile" => prop("file"),
            "getline" => prop("line"),
            "getprevious" => prop("previous"),
            "gettrace" => Value::Array(PhpArray::new()),
            "gettraceasstring" => Value::string("#0 {main}"),
            "__tostring" => return Some(Value::String(throwable_string(obj))),
            _ => return None,
        }
    };
    Some(value)
}

/// Exception::__toString()
fn throwable_string(obj: &ObjectRef) -> String {
    let object = obj.borrow();
    let prop = |name: &str| {
        object
            .get_property(name)
            .map(Value::to_php_string)
            .unwrap_or_default()
    };
    let text = format!(
        "{}: {} in {}:{}\nStack trace:\n#0 {{main}}",
        object.class_name,
        prop("message"),
        prop("file"),
        prop("line")
    );
    text
}

/// Predefined constants.
fn constant_value(name: &str) -> Option<Value> {
    let value = match name {
        "PHP_EOL" => Value::string("\n"),
        "PHP_INT_MAX" => Value::Long(i64::MAX),
        "PHP_INT_MIN" => Value::Long(i64::MIN),
        "PHP_INT_SIZE" => Value::Long(8),
        "PHP_FLOAT_EPSILON" => Value::Double(f64::EPSILON),
        "PHP_FLOAT_MAX" => Value::Double(f64::MAX),
        "PHP_FLOAT_MIN" => Value::Double(f64::MIN_POSITIVE),
        "PHP_FLOAT_DIG" => Value::Long(15),
        "PHP_VERSION" => Value::string("8.3.0"),
        "PHP_MAJOR_VERSION" => Value::Long(8),
        "PHP_MINOR_VERSION" => Value::Long(3),
        "NAN" => Value::Double(f64::NAN),
        "INF" => Value::Double(f64::INFINITY),
        "M_PI" => Value::Double(std::f64::consts::PI),
        "E_ALL" => Value::Long(ErrorLevel::ALL as i64),
        "COUNT_NORMAL" => Value::Long(0),
        "COUNT_RECURSIVE" => Value::Long(1),
        _ => {
            if let Some(level) = ErrorLevel::from_name(name) {
                return Some(Value::Long(level.mask() as i64));
            }
            return JSON_CONSTANTS
                .iter()
                .find(|(constant, _)| *constant == name)
                .map(|(_, flag)| Value::Long(*flag as i64));
        }
    };
    Some(value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sapi::{ClassId, HeaderOp, ObjectId};
    use std::cell::RefCell;

    /// SAPI that records everything, with one host class `Counter` whose
    /// instances have a `count` property and an `inc()` method.
    #[derive(Default)]
    pub(crate) struct RecordingSapi {
        pub output: RefCell<Vec<u8>>,
        pub log: RefCell<String>,
        pub headers: RefCell<Vec<(HeaderOp, String)>>,
        pub counters: RefCell<Vec<i64>>,
    }

    impl RecordingSapi {
        pub fn output(&self) -> String {
            String::from_utf8_lossy(&self.output.borrow()).into_owned()
        }
    }

    impl SapiModule for RecordingSapi {
        fn write(&self, _context: ContextId, bytes: &[u8]) -> isize {
            self.output.borrow_mut().extend_from_slice(bytes);
            bytes.len() as isize
        }

        fn log(&self, _context: ContextId, message: &str) -> isize {
            self.log.borrow_mut().push_str(message);
            message.len() as isize
        }

        fn set_header(&self, _context: ContextId, op: HeaderOp, line: &str) {
            self.headers.borrow_mut().push((op, line.to_string()));
        }

        fn class_lookup(&self, name: &str) -> Option<(ClassId, String)> {
            name.eq_ignore_ascii_case("Counter")
                .then(|| (ClassId(1), "Counter".to_string()))
        }

        fn receiver_new(&self, _class: ClassId, _context: ContextId, args: &[Value]) -> Option<ObjectId> {
            let start = args.first().map_or(0, Value::to_long);
            if start < 0 {
                return None;
            }
            let mut counters = self.counters.borrow_mut();
            counters.push(start);
            Some(ObjectId(counters.len() as u64 - 1))
        }

        fn receiver_get(&self, object: ObjectId, name: &str) -> Option<Value> {
            (name == "count")
                .then(|| self.counters.borrow().get(object.0 as usize).copied())
                .flatten()
                .map(Value::Long)
        }

        fn receiver_set(&self, object: ObjectId, name: &str, value: &Value) {
            if name == "count" {
                if let Some(slot) = self.counters.borrow_mut().get_mut(object.0 as usize) {
                    *slot = value.to_long();
                }
            }
        }

        fn receiver_exists(&self, object: ObjectId, name: &str, check: ExistsCheck) -> bool {
            match self.receiver_get(object, name) {
                None => false,
                Some(value) => match check {
                    ExistsCheck::Exists | ExistsCheck::NotNull => true,
                    ExistsCheck::Truthy => value.to_bool(),
                },
            }
        }

        fn receiver_call(&self, object: ObjectId, name: &str, _args: &[Value]) -> Option<Value> {
            if name != "inc" {
                return None;
            }
            let mut counters = self.counters.borrow_mut();
            let slot = counters.get_mut(object.0 as usize)?;
            *slot += 1;
            Some(Value::Long(*slot))
        }
    }

    pub(crate) fn new_vm() -> (Vm, Rc<RecordingSapi>) {
        let sapi = Rc::new(RecordingSapi::default());
        let mut ini = IniSystem::new();
        ini.set_system("display_errors", "0");
        ini.set_system("log_errors", "1");
        let vm = Vm::new(ContextId(1), sapi.clone(), ini);
        (vm, sapi)
    }

    /// Run a full script and return its output.
    fn run_php(source: &str) -> String {
        let (mut vm, sapi) = new_vm();
        vm.execute_file("test.php", source)
            .unwrap_or_else(|e| panic!("Execution failed for:\n{}\nError: {:?}\nLog: {}", source, e, sapi.log.borrow()));
        sapi.output()
    }

    fn eval(code: &str) -> Value {
        let (mut vm, _) = new_vm();
        vm.eval(code).unwrap_or_else(|e| panic!("eval failed: {:?}", e))
    }

    // =========================================================================
    // Basic execution
    // =========================================================================

    #[test]
    fn test_vm_empty_script() {
        assert_eq!(run_php("<?php ?>"), "");
    }

    #[test]
    fn test_vm_inline_html_and_echo() {
        assert_eq!(run_php("a<?php echo 'b'; ?>c"), "abc");
        assert_eq!(run_php("<?= 1 + 2 ?>"), "3");
    }

    #[test]
    fn test_vm_variables_and_arithmetic() {
        assert_eq!(run_php("<?php $a = 5; $b = 3; echo $a * $b - 1;"), "14");
        assert_eq!(run_php("<?php echo 10 / 4, ' ', 7 % 3, ' ', 2 ** 3;"), "2.5 1 8");
        assert_eq!(run_php("<?php echo 0.1 + 0.2;"), "0.3");
    }

    #[test]
    fn test_vm_concat_and_interpolation() {
        assert_eq!(
            run_php("<?php $name = 'World'; $a = ['k' => 'v']; echo \"Hello $name {$a['k']}\" . '!';"),
            "Hello World v!"
        );
    }

    #[test]
    fn test_vm_compound_assignment() {
        assert_eq!(
            run_php("<?php $s = 'a'; $s .= 'b'; $n = 1; $n += 2; $n *= 3; $x ??= 'd'; echo $s, $n, $x;"),
            "ab9d"
        );
    }

    #[test]
    fn test_vm_increment_decrement() {
        assert_eq!(run_php("<?php $i = 1; echo $i++, $i, ++$i, $i--, --$i;"), "12331");
    }

    #[test]
    fn test_vm_comparisons() {
        assert_eq!(
            run_php("<?php var_dump(1 == '1', 1 === '1', 0 == 'a', 'abc' < 'abd', 2 <=> 1);"),
            "bool(true)\nbool(false)\nbool(false)\nbool(true)\nint(1)\n"
        );
    }

    #[test]
    fn test_vm_control_flow() {
        let source = "<?php
            for ($i = 0; $i < 10; $i++) {
                if ($i == 2) { continue; }
                if ($i == 5) { break; }
                echo $i;
            }
            $j = 0;
            while (true) { if (++$j > 3) break; }
            echo $j;
            foreach ([1, 2] as $x) { foreach ([1, 2] as $y) { if ($y == 2) continue 2; echo $x, $y; } }
        ";
        assert_eq!(run_php(source), "013441121");
    }

    #[test]
    fn test_vm_foreach_with_keys() {
        assert_eq!(
            run_php("<?php foreach (['a' => 1, 'b' => 2] as $k => $v) { echo $k, '=', $v, ';'; }"),
            "a=1;b=2;"
        );
    }

    #[test]
    fn test_vm_arrays() {
        let source = "<?php
            $a = [];
            $a[] = 'x';
            $a['k']['n'] = 1;
            $a['k']['n'] += 1;
            unset($a[0]);
            echo count($a), ' ', $a['k']['n'], ' ', isset($a[0]) ? 'y' : 'n';
        ";
        assert_eq!(run_php(source), "1 2 n");
    }

    #[test]
    fn test_vm_functions() {
        let source = "<?php
            echo add(2, 3);
            function add($a, $b = 10) { return $a + $b; }
            echo ' ', add(1);
            function fact($n) { return $n <= 1 ? 1 : $n * fact($n - 1); }
            echo ' ', fact(5);
        ";
        assert_eq!(run_php(source), "5 11 120");
    }

    #[test]
    fn test_vm_global_statement() {
        let source = "<?php
            $counter = 1;
            function bump() { global $counter; $counter++; }
            bump(); bump();
            echo $counter;
        ";
        assert_eq!(run_php(source), "3");
    }

    #[test]
    fn test_vm_closures() {
        let source = "<?php
            $greeting = 'Hi';
            $f = function ($name) use ($greeting) { return \"$greeting $name\"; };
            $double = fn($x) => $x * 2;
            echo $f('Bob'), ' ', $double(21), ' ', (function () { return 'iife'; })();
        ";
        assert_eq!(run_php(source), "Hi Bob 42 iife");
    }

    #[test]
    fn test_vm_objects_are_handles() {
        let source = "<?php
            $o = new stdClass;
            $o->a = 1;
            $p = $o;
            $p->a = 2;
            $o->list[] = 'x';
            echo $o->a, count($o->list), get_class($o);
        ";
        assert_eq!(run_php(source), "21stdClass");
    }

    #[test]
    fn test_vm_try_catch_finally() {
        let source = "<?php
            try {
                throw new Exception('boom', 7);
            } catch (TypeError $e) {
                echo 'wrong';
            } catch (Exception $e) {
                echo $e->getMessage(), $e->getCode();
            } finally {
                echo '!';
            }
            try { intdiv_missing(); } catch (Error $e) { echo ' ', $e->getMessage(); }
            try { echo 1 % 0; } catch (DivisionByZeroError $e) { echo ' ', $e->getMessage(); }
        ";
        assert_eq!(
            run_php(source),
            "boom7! Call to undefined function intdiv_missing() Modulo by zero"
        );
    }

    #[test]
    fn test_vm_argument_count_error() {
        let source = "<?php
            function two($a, $b) {}
            try { two(1); } catch (ArgumentCountError $e) { echo get_class($e), ': ', $e->getMessage(); }
        ";
        assert_eq!(
            run_php(source),
            "ArgumentCountError: Too few arguments to function two(), 1 passed in test.php on line 3 and exactly 2 expected"
        );
    }

    #[test]
    fn test_vm_uncaught_exception_is_logged() {
        let (mut vm, sapi) = new_vm();
        let err = vm
            .execute_file("test.php", "<?php\nthrow new Exception('nope');")
            .unwrap_err();
        assert_eq!(
            err,
            VmError::Uncaught {
                class: "Exception".to_string(),
                message: "nope".to_string()
            }
        );
        assert_eq!(
            sapi.log.borrow().as_str(),
            "PHP Fatal error:  Uncaught Exception: nope in test.php:2\nStack trace:\n#0 {main}\n  thrown in test.php on line 2\n"
        );
    }

    #[test]
    fn test_vm_parse_error_is_logged() {
        let (mut vm, sapi) = new_vm();
        let err = vm.execute_file("bad.php", "<?php\necho 'x'\necho 'y';").unwrap_err();
        assert!(matches!(err, VmError::Parse { line: 3, .. }));
        assert!(sapi.log.borrow().starts_with("PHP Parse error:  syntax error"));
        assert_eq!(sapi.output(), "");
    }

    #[test]
    fn test_vm_exit() {
        let (mut vm, sapi) = new_vm();
        assert_eq!(vm.eval("echo 'a'; exit(3); echo 'b';"), Err(VmError::Exit(3)));
        assert_eq!(sapi.output(), "a");
        assert_eq!(vm.eval("exit('bye');"), Err(VmError::Exit(0)));
        assert_eq!(sapi.output(), "abye");
    }

    #[test]
    fn test_vm_undefined_variable_warning() {
        let (mut vm, sapi) = new_vm();
        assert_eq!(vm.eval("$a = 10; return $a + $b;"), Ok(Value::Long(10)));
        assert_eq!(
            sapi.log.borrow().as_str(),
            "PHP Warning:  Undefined variable $b in php-rs-engine on line 1\n"
        );
    }

    #[test]
    fn test_vm_string_offset_write_respects_memory_limit() {
        let (mut vm, sapi) = new_vm();
        assert_eq!(
            vm.eval("$s = 'a'; $s[3] = 'x'; return $s;"),
            Ok(Value::string("a  x"))
        );

        let message = "Allowed memory size of 134217728 bytes exhausted \
                       (tried to allocate 9223372036854775808 bytes)";
        assert_eq!(
            vm.eval("$s = 'a'; $s[PHP_INT_MAX] = 'x'; echo 'after';"),
            Err(VmError::Fatal(message.to_string()))
        );
        assert_eq!(sapi.output(), "");
        assert!(sapi.log.borrow().starts_with("PHP Fatal error:  Allowed memory size"));
    }

    #[test]
    fn test_vm_error_suppression() {
        let (mut vm, sapi) = new_vm();
        vm.eval("$x = @$missing;").unwrap();
        assert_eq!(sapi.log.borrow().as_str(), "");
    }

    #[test]
    fn test_vm_display_errors_writes_to_output() {
        let (mut vm, sapi) = new_vm();
        vm.ini_set("display_errors", "1");
        vm.ini_set("log_errors", "0");
        vm.eval("echo $nope;").unwrap();
        assert_eq!(
            sapi.output(),
            "\nWarning: Undefined variable $nope in php-rs-engine on line 1\n"
        );
    }

    // =========================================================================
    // eval()
    // =========================================================================

    #[test]
    fn test_eval_returns_value() {
        assert_eq!(eval("$i = 10; $d = 20; return $i + $d;"), Value::Long(30));
        assert_eq!(eval("echo 'nothing';"), Value::Null);
    }

    #[test]
    fn test_eval_sees_globals_but_keeps_assignments_local() {
        let (mut vm, _) = new_vm();
        vm.set_global("x", Value::Long(41));
        assert_eq!(vm.eval("$x++; return $x;"), Ok(Value::Long(42)));
        assert_eq!(vm.global("x"), Some(&Value::Long(41)));
        assert_eq!(vm.eval("global $x; $x = 1; return $x;"), Ok(Value::Long(1)));
        assert_eq!(vm.global("x"), Some(&Value::Long(1)));
    }

    #[test]
    fn test_eval_functions_persist() {
        let (mut vm, sapi) = new_vm();
        vm.eval("function hello($n) { return 'Hello ' . $n; }").unwrap();
        assert_eq!(vm.eval("return hello('you');"), Ok(Value::string("Hello you")));
        assert!(matches!(
            vm.eval("function hello() {}"),
            Err(VmError::Fatal(ref m)) if m == "Cannot redeclare hello()"
        ));
        assert!(sapi.log.borrow().contains("Cannot redeclare hello()"));
    }

    // =========================================================================
    // Host receivers through the SAPI
    // =========================================================================

    #[test]
    fn test_receiver_property_and_method() {
        let source = "<?php
            $c = new Counter(5);
            echo $c->count, ' ', $c->inc(), ' ';
            $c->count = 10;
            $c->count += 1;
            echo $c->count, ' ', isset($c->count) ? 'set' : 'unset', ' ', isset($c->nope) ? 'set' : 'unset';
            echo ' ', empty($c->count) ? 'empty' : 'full', ' ', var_export($c->missing(), true);
            echo ' ', $c instanceof Counter ? 'yes' : 'no';
        ";
        assert_eq!(run_php(source), "5 6 11 set unset full NULL yes");
    }

    #[test]
    fn test_receiver_construction_failure_is_catchable() {
        let source = "<?php
            try { new Counter(-1); } catch (Exception $e) { echo $e->getMessage(); }
        ";
        assert_eq!(run_php(source), "Failed to instantiate method receiver");
    }

    #[test]
    fn test_unknown_class() {
        let source = "<?php try { new Nope(); } catch (Error $e) { echo $e->getMessage(); }";
        assert_eq!(run_php(source), "Class \"Nope\" not found");
    }

    #[test]
    fn test_instance_of_hierarchy() {
        assert!(instance_of("ArgumentCountError", "Throwable"));
        assert!(instance_of("DivisionByZeroError", "error"));
        assert!(!instance_of("Exception", "Error"));
        assert!(instance_of("Counter", "\\Counter"));
        assert!(is_builtin_class("\\exception"));
        assert!(!is_builtin_class("Counter"));
    }
}
