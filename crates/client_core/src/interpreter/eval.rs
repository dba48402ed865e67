use std::sync::Arc;

use dom::{Document, NodeId};
use serde_json::{json, Value};
use shared::error::ExecError;

use super::{
    parser::{parse, BinaryOp, Expr, Stmt, UnaryOp},
    CommandInterpreter,
};

/// Largest magnitude at which every integer is exactly representable.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Interprets scripts against one page.
///
/// Besides operators and literals, scripts may call:
///
/// | builtin                 | effect                                        |
/// |-------------------------|-----------------------------------------------|
/// | `text(sel)`             | text of the first match, or `null`            |
/// | `html(sel)`             | inner HTML of the first match, or `null`      |
/// | `val(sel)`              | form value of the first match, or `null`      |
/// | `attr(sel, name)`       | attribute of the first match, or `null`       |
/// | `count(sel)`            | number of matches                             |
/// | `setText(sel, v)`       | sets text on every match, returns the count   |
/// | `setHtml(sel, v)`       | sets inner HTML on every match                |
/// | `setVal(sel, v)`        | sets the form value on every match            |
/// | `setAttr(sel, name, v)` | sets an attribute on every match              |
/// | `String(x)`, `Number(x)`| conversions                                   |
///
/// `new Error(msg)` (also `TypeError`, `RangeError`) builds a value that
/// `throw` reports as `Name: msg`.
pub struct ExpressionInterpreter {
    document: Arc<dyn Document>,
}

impl ExpressionInterpreter {
    pub fn new(document: Arc<dyn Document>) -> Self {
        Self { document }
    }

    fn statement(&self, statement: &Stmt) -> Result<Val, ExecError> {
        match statement {
            Stmt::Expr(expr) => self.eval(expr),
            Stmt::Throw(expr) => Err(ExecError::Thrown(self.eval(expr)?.to_display())),
        }
    }

    fn eval(&self, expr: &Expr) -> Result<Val, ExecError> {
        Ok(match expr {
            Expr::Number(n) => Val::Number(*n),
            Expr::Str(s) => Val::Str(s.clone()),
            Expr::Bool(b) => Val::Bool(*b),
            Expr::Null => Val::Null,
            Expr::Undefined => Val::Undefined,
            Expr::Array(items) => Val::Array(self.eval_all(items)?),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Negate => Val::Number(-value.to_number()),
                    UnaryOp::Plus => Val::Number(value.to_number()),
                    UnaryOp::Not => Val::Bool(!value.truthy()),
                }
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    self.eval(right)?
                } else {
                    left
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    left
                } else {
                    self.eval(right)?
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Call { callee, args } => self.call(callee, args)?,
            Expr::New { constructor, args } => {
                if !is_error_constructor(constructor) {
                    return Err(ExecError::Reference(constructor.clone()));
                }
                let args = self.eval_all(args)?;
                error_value(constructor, &args)
            }
            Expr::Identifier(name) => match name.as_str() {
                "NaN" => Val::Number(f64::NAN),
                "Infinity" => Val::Number(f64::INFINITY),
                _ => return Err(ExecError::Reference(name.clone())),
            },
        })
    }

    fn eval_all(&self, exprs: &[Expr]) -> Result<Vec<Val>, ExecError> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    fn call(&self, callee: &str, args: &[Expr]) -> Result<Val, ExecError> {
        if !is_builtin(callee) && !is_error_constructor(callee) {
            return Err(ExecError::Reference(callee.to_string()));
        }
        let args = self.eval_all(args)?;
        let document = self.document.as_ref();

        match callee {
            "String" => Ok(Val::Str(
                args.first().map_or_else(String::new, Val::to_display),
            )),
            "Number" => Ok(Val::Number(args.first().map_or(0.0, Val::to_number))),
            "count" => Ok(Val::Number(self.matches(callee, &args)?.len() as f64)),
            "text" | "html" | "val" => {
                let Some(node) = self.matches(callee, &args)?.into_iter().next() else {
                    return Ok(Val::Null);
                };
                let snapshot = document.snapshot(node).map_err(dom_error)?;
                Ok(match callee {
                    "text" => Val::Str(snapshot.text),
                    "html" => Val::Str(snapshot.html),
                    _ => snapshot.value.map_or(Val::Null, Val::Str),
                })
            }
            "attr" => {
                let name = string_arg(callee, &args, 1)?;
                let Some(node) = self.matches(callee, &args)?.into_iter().next() else {
                    return Ok(Val::Null);
                };
                Ok(document
                    .attribute(node, &name)
                    .map_err(dom_error)?
                    .map_or(Val::Null, Val::Str))
            }
            "setText" | "setHtml" | "setVal" => {
                let value = string_arg(callee, &args, 1)?;
                let nodes = self.matches(callee, &args)?;
                for node in &nodes {
                    let applied = match callee {
                        "setText" => document.set_text(*node, &value),
                        "setHtml" => document.set_html(*node, &value),
                        _ => document.set_value(*node, &value),
                    };
                    applied.map_err(dom_error)?;
                }
                Ok(Val::Number(nodes.len() as f64))
            }
            "setAttr" => {
                let name = string_arg(callee, &args, 1)?;
                let value = string_arg(callee, &args, 2)?;
                let nodes = self.matches(callee, &args)?;
                for node in &nodes {
                    document
                        .set_attribute(*node, &name, &value)
                        .map_err(dom_error)?;
                }
                Ok(Val::Number(nodes.len() as f64))
            }
            _ => Ok(error_value(callee, &args)),
        }
    }

    fn matches(&self, callee: &str, args: &[Val]) -> Result<Vec<NodeId>, ExecError> {
        let Some(Val::Str(selector)) = args.first() else {
            return Err(ExecError::Type(format!(
                "{callee} expects a selector string"
            )));
        };
        self.document.query_str(selector).map_err(dom_error)
    }
}

impl CommandInterpreter for ExpressionInterpreter {
    fn execute(&self, script: &str) -> Result<Value, ExecError> {
        let mut last = Val::Undefined;
        for statement in parse(script)? {
            last = self.statement(&statement)?;
        }
        Ok(last.into_json())
    }
}

fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "text"
            | "html"
            | "val"
            | "attr"
            | "count"
            | "setText"
            | "setHtml"
            | "setVal"
            | "setAttr"
            | "String"
            | "Number"
    )
}

fn is_error_constructor(name: &str) -> bool {
    matches!(name, "Error" | "TypeError" | "RangeError")
}

fn error_value(name: &str, args: &[Val]) -> Val {
    Val::Error {
        name: name.to_string(),
        message: match args.first() {
            None | Some(Val::Undefined) => String::new(),
            Some(value) => value.to_display(),
        },
    }
}

fn string_arg(callee: &str, args: &[Val], index: usize) -> Result<String, ExecError> {
    match args.get(index) {
        None | Some(Val::Undefined) => Err(ExecError::Type(format!(
            "{callee} expects at least {} arguments",
            index + 1
        ))),
        Some(value) => Ok(value.to_display()),
    }
}

fn dom_error(err: dom::DomError) -> ExecError {
    ExecError::Dom(err.to_string())
}

fn binary(op: BinaryOp, left: &Val, right: &Val) -> Val {
    match op {
        BinaryOp::StrictEq => Val::Bool(strict_eq(left, right)),
        BinaryOp::StrictNe => Val::Bool(!strict_eq(left, right)),
        BinaryOp::LooseEq => Val::Bool(loose_eq(left, right)),
        BinaryOp::LooseNe => Val::Bool(!loose_eq(left, right)),
        BinaryOp::Lt => Val::Bool(compare(left, right, |o| o.is_lt())),
        BinaryOp::Le => Val::Bool(compare(left, right, |o| o.is_le())),
        BinaryOp::Gt => Val::Bool(compare(left, right, |o| o.is_gt())),
        BinaryOp::Ge => Val::Bool(compare(left, right, |o| o.is_ge())),
        BinaryOp::Add if left.is_stringish() || right.is_stringish() => {
            Val::Str(format!("{}{}", left.to_display(), right.to_display()))
        }
        BinaryOp::Add => Val::Number(left.to_number() + right.to_number()),
        BinaryOp::Sub => Val::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Val::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Val::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Val::Number(left.to_number() % right.to_number()),
    }
}

fn strict_eq(left: &Val, right: &Val) -> bool {
    match (left, right) {
        (Val::Undefined, Val::Undefined) | (Val::Null, Val::Null) => true,
        (Val::Bool(a), Val::Bool(b)) => a == b,
        (Val::Number(a), Val::Number(b)) => a == b,
        (Val::Str(a), Val::Str(b)) => a == b,
        // Arrays and errors are distinct objects.
        _ => false,
    }
}

fn loose_eq(left: &Val, right: &Val) -> bool {
    match (left, right) {
        (Val::Undefined | Val::Null, Val::Undefined | Val::Null) => true,
        (Val::Undefined | Val::Null, _) | (_, Val::Undefined | Val::Null) => false,
        (Val::Number(_), Val::Str(_)) | (Val::Str(_), Val::Number(_)) => {
            left.to_number() == right.to_number()
        }
        (Val::Bool(_), _) if !matches!(right, Val::Bool(_)) => {
            loose_eq(&Val::Number(left.to_number()), right)
        }
        (_, Val::Bool(_)) if !matches!(left, Val::Bool(_)) => {
            loose_eq(left, &Val::Number(right.to_number()))
        }
        (Val::Array(_) | Val::Error { .. }, Val::Number(_) | Val::Str(_)) => {
            loose_eq(&Val::Str(left.to_display()), right)
        }
        (Val::Number(_) | Val::Str(_), Val::Array(_) | Val::Error { .. }) => {
            loose_eq(left, &Val::Str(right.to_display()))
        }
        _ => strict_eq(left, right),
    }
}

fn compare(left: &Val, right: &Val, accept: fn(std::cmp::Ordering) -> bool) -> bool {
    if let (Val::Str(a), Val::Str(b)) = (left, right) {
        return accept(a.cmp(b));
    }
    left.to_number()
        .partial_cmp(&right.to_number())
        .is_some_and(accept)
}

#[derive(Debug, Clone, PartialEq)]
enum Val {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Val>),
    Error { name: String, message: String },
}

impl Val {
    fn truthy(&self) -> bool {
        match self {
            Val::Undefined | Val::Null => false,
            Val::Bool(b) => *b,
            Val::Number(n) => *n != 0.0 && !n.is_nan(),
            Val::Str(s) => !s.is_empty(),
            Val::Array(_) | Val::Error { .. } => true,
        }
    }

    fn is_stringish(&self) -> bool {
        matches!(self, Val::Str(_) | Val::Array(_) | Val::Error { .. })
    }

    fn to_number(&self) -> f64 {
        match self {
            Val::Undefined | Val::Error { .. } => f64::NAN,
            Val::Null => 0.0,
            Val::Bool(b) => f64::from(u8::from(*b)),
            Val::Number(n) => *n,
            Val::Str(s) => parse_number(s),
            Val::Array(items) => match items.as_slice() {
                [] => 0.0,
                [only] => parse_number(&only.to_display()),
                _ => f64::NAN,
            },
        }
    }

    fn to_display(&self) -> String {
        match self {
            Val::Undefined => "undefined".to_string(),
            Val::Null => "null".to_string(),
            Val::Bool(b) => b.to_string(),
            Val::Number(n) => format_number(*n),
            Val::Str(s) => s.clone(),
            Val::Array(items) => items
                .iter()
                .map(|item| match item {
                    Val::Undefined | Val::Null => String::new(),
                    other => other.to_display(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Val::Error { name, message } if message.is_empty() => name.clone(),
            Val::Error { name, message } => format!("{name}: {message}"),
        }
    }

    /// Non-finite numbers and `undefined` have no JSON form and become `null`.
    fn into_json(self) -> Value {
        match self {
            Val::Undefined | Val::Null => Value::Null,
            Val::Bool(b) => Value::Bool(b),
            Val::Number(n) => number_json(n),
            Val::Str(s) => Value::String(s),
            Val::Array(items) => Value::Array(items.into_iter().map(Val::into_json).collect()),
            Val::Error { name, message } => json!({"name": name, "message": message}),
        }
    }
}

fn number_json(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

fn parse_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    match trimmed {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) =>
        {
            trimmed.parse().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}
