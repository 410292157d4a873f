//! Static resolver pass for the **Lox** interpreter.
//!
//! This resolver does three things in one AST walk:
//! 1. Build lexical scopes (stack of `HashMap<String, bool>` tracking
//!    declared/defined).
//! 2. Report static legality errors (`return`/`this`/`super` misuse,
//!    self-inheritance).
//! 3. Record, for *each* variable occurrence found in a local scope, how many
//!    enclosing frames separate the use from its binding.
//!
//! The output is a side table keyed by [`ExprId`] — the AST is never mutated.
//! Occurrences absent from the table are globals and are looked up in the
//! root environment at runtime.
//!
//! A declaration's entry stays `false` while its own initializer is being
//! resolved, and `resolve_local` skips such entries.  That gives
//! `var a = a;` a defined meaning: the initializer binds to the *enclosing*
//! `a`, never to the slot being introduced.  Redeclaring a name in the same
//! scope is likewise legal — the later definition simply rebinds the slot.
//!
//! Diagnostics do not stop the walk: each is recorded and resolution
//! continues over the rest of the tree, so one misplaced `return` still
//! yields distances (and further diagnostics) for everything else.

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::error::LoxError;
use crate::token::Token;
use log::{debug, info};
use std::collections::HashMap;

/// Scope-distance side table: node identity → number of environment-chain
/// hops from the point of use to the defining frame.
pub type Locals = HashMap<ExprId, usize>;

/// What kind of function body are we inside?  Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

/// Are we inside a class body, and does it have a superclass?
/// Used to validate `this` and `super`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Resolver: tracks scopes, enforces static rules, and records binding
/// distances for the interpreter to consume.
pub struct Resolver {
    scopes: Vec<HashMap<String, bool>>, // false=declared, true=defined
    locals: Locals,
    diagnostics: Vec<LoxError>,
    current_function: FunctionType,
    current_class: ClassType,
}

impl Resolver {
    pub fn new() -> Self {
        info!("Resolver instantiated");
        Resolver {
            scopes: Vec::new(),
            locals: Locals::new(),
            diagnostics: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
        }
    }

    /// Walk all top-level statements and return the scope-distance table
    /// together with every legality diagnostic found on the way.
    pub fn resolve(mut self, statements: &[Stmt]) -> (Locals, Vec<LoxError>) {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        for stmt in statements {
            self.resolve_stmt(stmt);
        }

        (self.locals, self.diagnostics)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        debug!("Resolving stmt: {:?}", stmt);
        match stmt {
            Stmt::Block(statements) => {
                self.begin_scope();
                for s in statements {
                    self.resolve_stmt(s);
                }
                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // declare → resolve initializer → define, so that
                // `var a = a;` sees the *outer* `a`, never itself.
                self.declare(name);
                if let Some(expr) = initializer {
                    self.resolve_expr(expr);
                }
                self.define(name);
            }

            Stmt::Function(decl) => {
                // The name is visible inside its own body (recursion).
                if let Some(name) = &decl.name {
                    self.declare(name);
                    self.define(name);
                }
                self.resolve_function(decl, FunctionType::Function);
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => {
                self.resolve_expr(expr);
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb);
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.report(keyword.line, "Can't return from top-level code.");
                }

                if let Some(expr) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.report(keyword.line, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(expr);
                }
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let enclosing: ClassType = self.current_class;
                self.current_class = ClassType::Class;

                self.declare(name);
                self.define(name);

                if let Some(superclass) = superclass {
                    if let Expr::Variable {
                        name: super_name, ..
                    } = superclass
                    {
                        if super_name.lexeme == name.lexeme {
                            self.report(super_name.line, "A class can't inherit from itself.");
                        }
                    }

                    self.current_class = ClassType::Subclass;
                    self.resolve_expr(superclass);

                    // Methods of a subclass close over a frame binding `super`.
                    self.begin_scope();
                    self.scope_mut().insert("super".to_string(), true);
                }

                // Every method body closes over a frame binding `this`.
                self.begin_scope();
                self.scope_mut().insert("this".to_string(), true);

                for method in methods {
                    let declaration: FunctionType = if method.name_str() == "init" {
                        FunctionType::Initializer
                    } else {
                        FunctionType::Method
                    };
                    self.resolve_function(method, declaration);
                }

                self.end_scope();

                if superclass.is_some() {
                    self.end_scope();
                }

                self.current_class = enclosing;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) {
        debug!("Resolving expr: {:?}", expr);
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => {
                self.resolve_expr(inner);
            }

            Expr::Unary { right, .. } => {
                self.resolve_expr(right);
            }

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Variable { id, name } => {
                self.resolve_local(*id, name);
            }

            Expr::Assign { id, name, value } => {
                // First resolve RHS, then bind LHS.
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }

            Expr::Get { object, .. } => self.resolve_expr(object),

            Expr::Set { object, value, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(value);
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.report(keyword.line, "Can't use 'this' outside of a class.");
                    return;
                }
                self.resolve_local(*id, keyword);
            }

            Expr::Super { id, keyword, .. } => {
                match self.current_class {
                    ClassType::None => {
                        self.report(keyword.line, "Can't use 'super' outside of a class.");
                        return;
                    }
                    ClassType::Class => {
                        self.report(
                            keyword.line,
                            "Can't use 'super' in a class with no superclass.",
                        );
                        return;
                    }
                    ClassType::Subclass => {}
                }
                self.resolve_local(*id, keyword);
            }

            Expr::Function(decl) => {
                self.resolve_function(decl, FunctionType::Function);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function's parameters + body.  Resolution
    /// happens immediately at declaration time, so distances reflect the
    /// environment layout the closure will capture at runtime.
    fn resolve_function(&mut self, decl: &FunctionDecl, func_type: FunctionType) {
        let enclosing: FunctionType = self.current_function;
        self.current_function = func_type;

        self.begin_scope();
        for param in &decl.params {
            self.declare(param);
            self.define(param);
        }
        for stmt in &decl.body {
            self.resolve_stmt(stmt);
        }
        self.end_scope();

        self.current_function = enclosing;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    /// Innermost scope frame.  Only called between a `begin_scope` and its
    /// matching `end_scope`.
    fn scope_mut(&mut self) -> &mut HashMap<String, bool> {
        self.scopes.last_mut().expect("no active scope")
    }

    /// Introduce `name` in the innermost scope, initially marked
    /// mid-initialization.  Redeclaration is legal: the entry is simply
    /// reset, and the later definition wins.
    fn declare(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), false);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    fn report<S: Into<String>>(&mut self, line: usize, message: S) {
        self.diagnostics.push(LoxError::resolve(line, message));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding-distance helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Record this variable occurrence as a local at depth `d`, or leave it
    /// out of the table entirely if it is global.
    ///
    /// Entries still marked `false` are mid-initialization and are skipped,
    /// so an initializer mentioning its own name binds to the enclosing
    /// declaration instead.
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        // check innermost → outermost
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.get(name.lexeme.as_str()) == Some(&true) {
                debug!("Resolved '{}' at depth {}", name.lexeme, depth);
                self.locals.insert(id, depth);
                return;
            }
        }

        // not found in any local scope ⇒ global
        debug!("Resolved '{}' as global", name.lexeme);
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}
