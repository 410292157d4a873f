//! Runtime value model: the tagged union every expression evaluates to,
//! plus the callable/class/instance object types behind it.
//!
//! Functions, classes, and instances are shared by `Rc` handles — a bound
//! method references its instance, an instance references its class, and a
//! class references its superclass, so these objects routinely outlive the
//! call frame that created them.  Equality for those types is reference
//! identity; primitives compare by value with `nil` equal only to `nil`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::FunctionDecl;
use crate::environment::{EnvRef, Environment};
use crate::token::Token;

/// A Lox runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    Native(Rc<NativeFunction>),
    Function(Rc<LoxFunction>),
    Class(Rc<LoxClass>),
    Instance(Rc<RefCell<LoxInstance>>),
}

/// A host-provided function installed into the global environment.
#[derive(Debug)]
pub struct NativeFunction {
    pub name: String,
    pub arity: usize,
    pub func: fn(&[Value]) -> Result<Value, String>,
}

/// A user-defined function or method: the shared declaration plus the
/// environment captured at its definition site.
#[derive(Debug)]
pub struct LoxFunction {
    pub declaration: Rc<FunctionDecl>,
    pub closure: EnvRef,
    pub is_initializer: bool,
}

impl LoxFunction {
    pub fn new(declaration: Rc<FunctionDecl>, closure: EnvRef, is_initializer: bool) -> Self {
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    /// Produce a bound method: same declaration, but closed over a fresh
    /// one-slot frame defining `this`.  This is what makes `a.method`
    /// detachable — the returned callable can be stored and invoked later.
    pub fn bind(&self, instance: Rc<RefCell<LoxInstance>>) -> LoxFunction {
        let env: EnvRef = Environment::with_enclosing(Rc::clone(&self.closure));
        env.borrow_mut().define("this", Value::Instance(instance));

        LoxFunction {
            declaration: Rc::clone(&self.declaration),
            closure: env,
            is_initializer: self.is_initializer,
        }
    }
}

/// A class value: name, optional superclass, and its (immutable after
/// declaration) method table.
#[derive(Debug)]
pub struct LoxClass {
    pub name: String,
    pub superclass: Option<Rc<LoxClass>>,
    pub methods: HashMap<String, Rc<LoxFunction>>,
}

impl LoxClass {
    /// Method lookup walking the superclass chain on a miss.
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        match self.methods.get(name) {
            Some(method) => Some(Rc::clone(method)),
            None => self
                .superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(name)),
        }
    }

    /// Calling a class forwards the arguments to `init`, so the class's
    /// arity is its initializer's (or 0 without one).
    pub fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }
}

/// A class instance: its class plus a mutable field map.  Fields are only
/// ever created or overwritten one name at a time through property
/// assignment; the map itself is never replaced.
#[derive(Debug)]
pub struct LoxInstance {
    pub class: Rc<LoxClass>,
    fields: HashMap<String, Value>,
}

impl LoxInstance {
    pub fn new(class: Rc<LoxClass>) -> Rc<RefCell<LoxInstance>> {
        Rc::new(RefCell::new(LoxInstance {
            class,
            fields: HashMap::new(),
        }))
    }

    /// Property read: fields shadow methods; a method hit produces a bound
    /// method over this instance.  `None` means "undefined property" — the
    /// interpreter turns that into a runtime error carrying the name token.
    pub fn get(instance: &Rc<RefCell<LoxInstance>>, name: &Token) -> Option<Value> {
        if let Some(field) = instance.borrow().fields.get(name.lexeme.as_str()) {
            return Some(field.clone());
        }

        let method: Option<Rc<LoxFunction>> =
            instance.borrow().class.find_method(name.lexeme.as_str());

        method.map(|m| Value::Function(Rc::new(m.bind(Rc::clone(instance)))))
    }

    /// Property write: creates or overwrites the field, whether or not the
    /// class ever mentions that name.
    pub fn set(&mut self, name: &Token, value: Value) {
        self.fields.insert(name.lexeme.clone(), value);
    }
}

impl PartialEq for Value {
    /// Strict type-and-value equality for primitives; reference identity for
    /// callables, classes, and instances.  `nil` equals only `nil`.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// Canonical rendering used by `print` and the `evaluate` subcommand.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }

            Value::Str(s) => write!(f, "{}", s),

            Value::Native(native) => write!(f, "<native fn {}>", native.name),

            Value::Function(function) => match &function.declaration.name {
                Some(name) => write!(f, "<fn {}>", name.lexeme),
                None => write!(f, "<fn>"),
            },

            Value::Class(class) => write!(f, "{}", class.name),

            Value::Instance(instance) => {
                write!(f, "{} instance", instance.borrow().class.name)
            }
        }
    }
}
