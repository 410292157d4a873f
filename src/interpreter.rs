//! Tree-walking evaluator.
//!
//! Walks the statement list produced by the parser, evaluating expressions
//! to [`Value`]s against a chain of lexical environments rooted at a
//! persistent global frame.  Variable references resolved by the resolver
//! are read at their exact scope distance; everything else goes straight to
//! the globals.
//!
//! Control flow is explicit data: every statement execution returns
//! `Result<(), Interrupt>`, where [`Interrupt`] distinguishes a `return`
//! unwinding to its call site from a runtime error unwinding to the host.
//! Both paths restore the previous environment on the way out.
//!
//! The interpreter never prints diagnostics; `print` output goes through a
//! host-provided sink and runtime errors are returned as structured values.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

use log::{debug, info};
use thiserror::Error;

use crate::ast::{Expr, ExprId, FunctionDecl, LiteralValue, Stmt};
use crate::environment::{EnvRef, Environment};
use crate::error::LoxError;
use crate::resolver::Locals;
use crate::token::{Token, TokenType};
use crate::value::{LoxClass, LoxFunction, LoxInstance, NativeFunction, Value};

/// A runtime failure, pinned to the token that triggered it.
#[derive(Debug)]
pub struct RuntimeError {
    pub token: Token,
    pub message: String,
}

impl RuntimeError {
    fn new<S: Into<String>>(token: &Token, message: S) -> Self {
        Self {
            token: token.clone(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n[line {}] at '{}'",
            self.message, self.token.line, self.token.lexeme
        )
    }
}

impl std::error::Error for RuntimeError {}

impl From<RuntimeError> for LoxError {
    fn from(e: RuntimeError) -> Self {
        LoxError::Runtime {
            message: e.message,
            lexeme: e.token.lexeme,
            line: e.token.line,
        }
    }
}

/// Non-local control transfer propagated outward by statement execution.
///
/// `Return` unwinds to the nearest function-call boundary; `Runtime` unwinds
/// all the way to the host.  Modeling both as the error arm of a `Result`
/// makes `?` do the propagation while keeping the two signals distinct and
/// testable.
#[derive(Debug, Error)]
pub enum Interrupt {
    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    #[error("return")]
    Return(Value),
}

type ExecResult = Result<(), Interrupt>;
type EvalResult = Result<Value, Interrupt>;

fn clock_native(_args: &[Value]) -> Result<Value, String> {
    let micros: i64 = chrono::Utc::now().timestamp_micros();
    Ok(Value::Number(micros as f64 / 1_000_000.0))
}

pub struct Interpreter {
    globals: EnvRef,
    environment: EnvRef,
    locals: Locals,
    output: Box<dyn Write>,
}

impl Interpreter {
    /// Create an interpreter printing to stdout, with the native functions
    /// (`clock`) pre-installed in the global environment.
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Same, but `print` statements write to the given sink.  Tests use an
    /// in-memory buffer here.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        info!("Initializing Interpreter");

        let globals: EnvRef = Environment::new();

        let mut interpreter = Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            output,
        };

        interpreter.define_native("clock", 0, clock_native);

        interpreter
    }

    /// Install a host-side native function into the global environment.
    pub fn define_native(
        &mut self,
        name: &str,
        arity: usize,
        func: fn(&[Value]) -> Result<Value, String>,
    ) {
        debug!("Defining native function '{}'", name);

        self.globals.borrow_mut().define(
            name,
            Value::Native(Rc::new(NativeFunction {
                name: name.to_string(),
                arity,
                func,
            })),
        );
    }

    /// The persistent global environment (lives as long as the interpreter).
    pub fn globals(&self) -> EnvRef {
        Rc::clone(&self.globals)
    }

    /// Interpret a program against the given scope-distance table.
    ///
    /// The table is merged into any distances from earlier calls, so a REPL
    /// can feed one resolved line at a time while keeping its globals.
    /// A runtime error halts the remaining statements and is returned to
    /// the host.
    pub fn interpret(&mut self, statements: &[Stmt], locals: Locals) -> Result<(), LoxError> {
        debug!("Interpreting {} statements", statements.len());

        self.locals.extend(locals);

        for stmt in statements {
            match self.execute(stmt) {
                Ok(()) => {}
                Err(Interrupt::Runtime(e)) => return Err(e.into()),
                Err(Interrupt::Return(_)) => {
                    // The resolver rejects top-level `return`; reaching this
                    // arm means it was skipped.
                    panic!("return signal escaped to top level");
                }
            }
        }

        info!("Interpretation completed successfully");
        Ok(())
    }

    /// Evaluate a single expression (the `evaluate` subcommand and the
    /// REPL's expression mode).  No resolver table is needed: a bare
    /// expression has no local scopes.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, LoxError> {
        match self.eval(expr) {
            Ok(value) => Ok(value),
            Err(Interrupt::Runtime(e)) => Err(e.into()),
            Err(Interrupt::Return(_)) => panic!("return signal escaped expression evaluation"),
        }
    }

    // ───────────────────────── statement execution ──────────────────────────

    fn execute(&mut self, stmt: &Stmt) -> ExecResult {
        match stmt {
            Stmt::Expression(expr) => {
                self.eval(expr)?;
                Ok(())
            }

            Stmt::Print(expr) => {
                let value: Value = self.eval(expr)?;
                writeln!(self.output, "{}", value).expect("failed to write print output");
                Ok(())
            }

            Stmt::Var { name, initializer } => {
                let value: Value = match initializer {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Nil,
                };

                debug!("Variable '{}' defined with value: {}", name.lexeme, value);
                self.environment.borrow_mut().define(&name.lexeme, value);
                Ok(())
            }

            Stmt::Function(decl) => {
                let function = LoxFunction::new(Rc::clone(decl), Rc::clone(&self.environment), false);

                // Named by construction: anonymous functions are expressions.
                let name: &str = decl.name_str();
                self.environment
                    .borrow_mut()
                    .define(name, Value::Function(Rc::new(function)));
                Ok(())
            }

            Stmt::Block(statements) => {
                let environment: EnvRef = Environment::with_enclosing(Rc::clone(&self.environment));
                self.execute_block(statements, environment)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond_value: Value = self.eval(condition)?;
                if is_truthy(&cond_value) {
                    self.execute(then_branch)?;
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt)?;
                }
                Ok(())
            }

            Stmt::While { condition, body } => {
                loop {
                    let cond_value: Value = self.eval(condition)?;
                    if !is_truthy(&cond_value) {
                        break;
                    }
                    self.execute(body)?;
                }
                Ok(())
            }

            Stmt::Return { value, .. } => {
                let value: Value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Nil,
                };

                debug!("Returning value: {}", value);
                Err(Interrupt::Return(value))
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods),
        }
    }

    /// Run `statements` inside `environment`, restoring the previous
    /// environment on *every* exit path — normal completion, `return`
    /// unwind, or runtime error.
    pub fn execute_block(&mut self, statements: &[Stmt], environment: EnvRef) -> ExecResult {
        let previous: EnvRef = std::mem::replace(&mut self.environment, environment);

        let mut result: ExecResult = Ok(());
        for stmt in statements {
            result = self.execute(stmt);
            if result.is_err() {
                break;
            }
        }

        self.environment = previous;
        result
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) -> ExecResult {
        // The superclass expression, when present, is a Variable node; it
        // must evaluate to a class value.
        let superclass_value: Option<Rc<LoxClass>> = match superclass {
            Some(expr) => {
                let value: Value = self.eval(expr)?;
                match value {
                    Value::Class(class) => Some(class),
                    _ => {
                        let token: &Token = match expr {
                            Expr::Variable { name, .. } => name,
                            _ => name,
                        };
                        return Err(
                            RuntimeError::new(token, "Superclass must be a class.").into()
                        );
                    }
                }
            }
            None => None,
        };

        // Define first, assign after construction: the class body may refer
        // to the class's own name.
        self.environment.borrow_mut().define(&name.lexeme, Value::Nil);

        // Methods of a subclass close over an interposed frame binding
        // `super` to the statically known superclass.
        let previous: Option<EnvRef> = match &superclass_value {
            Some(superclass) => {
                let frame: EnvRef = Environment::with_enclosing(Rc::clone(&self.environment));
                frame
                    .borrow_mut()
                    .define("super", Value::Class(Rc::clone(superclass)));
                Some(std::mem::replace(&mut self.environment, frame))
            }
            None => None,
        };

        let mut method_table: HashMap<String, Rc<LoxFunction>> = HashMap::new();
        for method in methods {
            let is_initializer: bool = method.name_str() == "init";
            let function = LoxFunction::new(
                Rc::clone(method),
                Rc::clone(&self.environment),
                is_initializer,
            );
            method_table.insert(method.name_str().to_string(), Rc::new(function));
        }

        if let Some(enclosing) = previous {
            self.environment = enclosing;
        }

        let class = Rc::new(LoxClass {
            name: name.lexeme.clone(),
            superclass: superclass_value,
            methods: method_table,
        });

        self.environment
            .borrow_mut()
            .assign(&name.lexeme, Value::Class(class));

        Ok(())
    }

    // ───────────────────────── expression evaluation ────────────────────────

    fn eval(&mut self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::Str(s.clone()),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Grouping(inner) => self.eval(inner),

            Expr::Unary { operator, right } => self.eval_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.eval_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left_value: Value = self.eval(left)?;

                // Short-circuit: the left operand itself is the result when
                // it decides the outcome.
                match operator.token_type {
                    TokenType::OR if is_truthy(&left_value) => Ok(left_value),
                    TokenType::AND if !is_truthy(&left_value) => Ok(left_value),
                    _ => self.eval(right),
                }
            }

            Expr::Variable { id, name } => self.look_up_variable(*id, name),

            Expr::Assign { id, name, value } => {
                let value: Value = self.eval(value)?;

                match self.locals.get(id) {
                    Some(&distance) => {
                        Environment::assign_at(
                            &self.environment,
                            distance,
                            &name.lexeme,
                            value.clone(),
                        );
                    }
                    None => {
                        let assigned: bool = self
                            .globals
                            .borrow_mut()
                            .assign(&name.lexeme, value.clone());
                        if !assigned {
                            return Err(RuntimeError::new(
                                name,
                                format!("Undefined variable '{}'.", name.lexeme),
                            )
                            .into());
                        }
                    }
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee_value: Value = self.eval(callee)?;

                let mut arg_values: Vec<Value> = Vec::with_capacity(arguments.len());
                for arg in arguments {
                    arg_values.push(self.eval(arg)?);
                }

                self.call_value(callee_value, paren, arg_values)
            }

            Expr::Get { object, name } => {
                let object_value: Value = self.eval(object)?;

                match object_value {
                    Value::Instance(instance) => LoxInstance::get(&instance, name).ok_or_else(
                        || {
                            RuntimeError::new(
                                name,
                                format!("Undefined property '{}'.", name.lexeme),
                            )
                            .into()
                        },
                    ),
                    _ => {
                        Err(RuntimeError::new(name, "Only instances have properties.").into())
                    }
                }
            }

            Expr::Set {
                object,
                name,
                value,
            } => {
                let object_value: Value = self.eval(object)?;

                let Value::Instance(instance) = object_value else {
                    return Err(RuntimeError::new(name, "Only instances have fields.").into());
                };

                let value: Value = self.eval(value)?;
                instance.borrow_mut().set(name, value.clone());
                Ok(value)
            }

            Expr::This { id, keyword } => self.look_up_variable(*id, keyword),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.eval_super(*id, keyword, method),

            Expr::Function(decl) => {
                let function =
                    LoxFunction::new(Rc::clone(decl), Rc::clone(&self.environment), false);
                Ok(Value::Function(Rc::new(function)))
            }
        }
    }

    fn eval_unary(&mut self, operator: &Token, right: &Expr) -> EvalResult {
        let right_value: Value = self.eval(right)?;

        match operator.token_type {
            TokenType::MINUS => match right_value {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(RuntimeError::new(operator, "Operand must be a number.").into()),
            },
            TokenType::BANG => Ok(Value::Bool(!is_truthy(&right_value))),
            _ => panic!("parser produced invalid unary operator: {}", operator),
        }
    }

    fn eval_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> EvalResult {
        let left_value: Value = self.eval(left)?;
        let right_value: Value = self.eval(right)?;

        match operator.token_type {
            TokenType::PLUS => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
                _ => Err(RuntimeError::new(
                    operator,
                    "Operands must be two numbers or two strings.",
                )
                .into()),
            },

            TokenType::MINUS => {
                let (a, b) = self.number_operands(operator, left_value, right_value)?;
                Ok(Value::Number(a - b))
            }

            TokenType::STAR => {
                let (a, b) = self.number_operands(operator, left_value, right_value)?;
                Ok(Value::Number(a * b))
            }

            // IEEE-754 division: `1 / 0` is `inf`, not an error.
            TokenType::SLASH => {
                let (a, b) = self.number_operands(operator, left_value, right_value)?;
                Ok(Value::Number(a / b))
            }

            TokenType::GREATER => {
                let (a, b) = self.number_operands(operator, left_value, right_value)?;
                Ok(Value::Bool(a > b))
            }

            TokenType::GREATER_EQUAL => {
                let (a, b) = self.number_operands(operator, left_value, right_value)?;
                Ok(Value::Bool(a >= b))
            }

            TokenType::LESS => {
                let (a, b) = self.number_operands(operator, left_value, right_value)?;
                Ok(Value::Bool(a < b))
            }

            TokenType::LESS_EQUAL => {
                let (a, b) = self.number_operands(operator, left_value, right_value)?;
                Ok(Value::Bool(a <= b))
            }

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left_value == right_value)),
            TokenType::BANG_EQUAL => Ok(Value::Bool(left_value != right_value)),

            _ => panic!("parser produced invalid binary operator: {}", operator),
        }
    }

    fn number_operands(
        &self,
        operator: &Token,
        left: Value,
        right: Value,
    ) -> Result<(f64, f64), Interrupt> {
        match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok((a, b)),
            _ => Err(RuntimeError::new(operator, "Operands must be numbers.").into()),
        }
    }

    fn look_up_variable(&self, id: ExprId, name: &Token) -> EvalResult {
        match self.locals.get(&id) {
            Some(&distance) => Ok(Environment::get_at(&self.environment, distance, &name.lexeme)),
            None => self.globals.borrow().get(&name.lexeme).ok_or_else(|| {
                RuntimeError::new(name, format!("Undefined variable '{}'.", name.lexeme)).into()
            }),
        }
    }

    fn eval_super(&mut self, id: ExprId, keyword: &Token, method: &Token) -> EvalResult {
        // The resolver bound `super` at a known distance; `this` lives one
        // frame nearer (the method's bound frame).
        let distance: usize = *self
            .locals
            .get(&id)
            .expect("resolver/runtime mismatch: unresolved 'super'");

        let superclass: Value = Environment::get_at(&self.environment, distance, "super");
        let object: Value = Environment::get_at(&self.environment, distance - 1, "this");

        let (Value::Class(superclass), Value::Instance(instance)) = (superclass, object) else {
            panic!("resolver/runtime mismatch: malformed 'super' bindings");
        };

        match superclass.find_method(&method.lexeme) {
            Some(found) => Ok(Value::Function(Rc::new(found.bind(instance)))),
            None => Err(RuntimeError::new(
                method,
                format!("Undefined property '{}'.", method.lexeme),
            )
            .into()),
        }
    }

    // ───────────────────────── calls ────────────────────────────────────────

    fn call_value(&mut self, callee: Value, paren: &Token, arguments: Vec<Value>) -> EvalResult {
        match callee {
            Value::Native(native) => {
                self.check_arity(native.arity, arguments.len(), paren)?;

                let result: Value = (native.func)(&arguments)
                    .map_err(|message| RuntimeError::new(paren, message))?;
                Ok(result)
            }

            Value::Function(function) => {
                self.check_arity(function.arity(), arguments.len(), paren)?;
                self.call_function(&function, arguments)
            }

            Value::Class(class) => {
                self.check_arity(class.arity(), arguments.len(), paren)?;

                let instance = LoxInstance::new(Rc::clone(&class));

                // Run `init` if declared; the call's result is the new
                // instance no matter what the initializer returns.
                if let Some(initializer) = class.find_method("init") {
                    let bound: LoxFunction = initializer.bind(Rc::clone(&instance));
                    self.call_function(&bound, arguments)?;
                }

                Ok(Value::Instance(instance))
            }

            _ => Err(RuntimeError::new(paren, "Can only call functions and classes.").into()),
        }
    }

    fn check_arity(&self, expected: usize, got: usize, paren: &Token) -> Result<(), Interrupt> {
        if expected != got {
            return Err(RuntimeError::new(
                paren,
                format!("Expected {} arguments but got {}.", expected, got),
            )
            .into());
        }
        Ok(())
    }

    /// Invoke a user-defined function: bind parameters in a fresh frame
    /// under the captured closure, run the body, and translate the unwind
    /// signal back into a value at this call boundary.
    fn call_function(&mut self, function: &LoxFunction, arguments: Vec<Value>) -> EvalResult {
        let environment: EnvRef = Environment::with_enclosing(Rc::clone(&function.closure));

        for (param, arg) in function.declaration.params.iter().zip(arguments) {
            environment.borrow_mut().define(&param.lexeme, arg);
        }

        debug!("Calling function '{}'", function.declaration.name_str());
        let result: ExecResult = self.execute_block(&function.declaration.body, environment);

        match result {
            // An initializer always yields `this`, even through a bare
            // `return;` — `return <expr>;` inside init is rejected
            // statically.
            Ok(()) | Err(Interrupt::Return(_)) if function.is_initializer => {
                Ok(Environment::get_at(&function.closure, 0, "this"))
            }

            Ok(()) => Ok(Value::Nil),
            Err(Interrupt::Return(value)) => Ok(value),
            Err(e) => Err(e),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// `nil` and `false` are falsy; every other value (including `0` and the
/// empty string) is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,
        Value::Bool(b) => *b,
        _ => true,
    }
}
