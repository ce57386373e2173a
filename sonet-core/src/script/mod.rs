use std::{cmp::Ordering, fmt};

pub mod array;
pub mod instruction;
pub mod interpreter;
pub mod scope;

pub use array::ValueArray;
pub use instruction::{BinOp, FunctionDef, Instruction, OpCode, Operand, Param, Program, UnOp};
pub use scope::Scope;

/// Represents a value that can be stored in the VM
///
/// Arrays are shared: cloning a `Value::Array` clones the reference, so
/// assignment and parameter passing alias the same storage.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Int(i64),
    Float(f64),
    Text(String),
    Array(ValueArray),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn bool(b: bool) -> Self {
        Value::Int(b as i64)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Nil)
    }

    /// C-like truthiness: zero, empty and nil are false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
        }
    }

    pub fn as_int(&self) -> i64 {
        match self {
            Value::Nil => 0,
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Text(s) => parse_leading_int(s),
            Value::Array(_) => 0,
        }
    }

    pub fn as_float(&self) -> f64 {
        match self {
            Value::Nil => 0.0,
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Text(s) => s.trim().parse::<f64>().unwrap_or_else(|_| parse_leading_int(s) as f64),
            Value::Array(_) => 0.0,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ValueArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Array(a) => write!(f, "<array len={}>", a.len()),
        }
    }
}

impl PartialEq for Value {
    /// Strict structural equality (no coercion). Script-level `==` is [`loose_eq`].
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b) || a.to_vec() == b.to_vec(),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<ValueArray> for Value {
    fn from(v: ValueArray) -> Self {
        Value::Array(v)
    }
}

/// `atoi`-style parse: optional sign then digits, anything else stops the scan.
fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (neg, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut acc: i64 = 0;
    for b in digits.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        acc = acc.wrapping_mul(10).wrapping_add((b - b'0') as i64);
    }
    if neg {
        acc.wrapping_neg()
    } else {
        acc
    }
}

/// Script-level equality: numbers compare after coercion, everything else
/// needs the same type.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        _ if a.is_numeric() && b.is_numeric() => a.as_float() == b.as_float(),
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => x.ptr_eq(y),
        _ => false,
    }
}

pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        _ if a.is_numeric() && b.is_numeric() => a.as_float().partial_cmp(&b.as_float()),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn either_float(a: &Value, b: &Value) -> bool {
    matches!(a, Value::Float(_)) || matches!(b, Value::Float(_))
}

pub fn vm_add(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Text(x), _) => Value::Text(format!("{x}{b}")),
        (_, Value::Text(y)) => Value::Text(format!("{a}{y}")),
        _ if either_float(a, b) => Value::Float(a.as_float() + b.as_float()),
        _ => Value::Int(a.as_int().wrapping_add(b.as_int())),
    }
}

pub fn vm_sub(a: &Value, b: &Value) -> Value {
    if either_float(a, b) {
        Value::Float(a.as_float() - b.as_float())
    } else {
        Value::Int(a.as_int().wrapping_sub(b.as_int()))
    }
}

pub fn vm_mul(a: &Value, b: &Value) -> Value {
    if either_float(a, b) {
        Value::Float(a.as_float() * b.as_float())
    } else {
        Value::Int(a.as_int().wrapping_mul(b.as_int()))
    }
}

/// Division by zero yields 0 instead of trapping.
pub fn vm_div(a: &Value, b: &Value) -> Value {
    if either_float(a, b) {
        let d = b.as_float();
        if d == 0.0 {
            log::warn!("division by zero");
            return Value::Float(0.0);
        }
        return Value::Float(a.as_float() / d);
    }
    let d = b.as_int();
    if d == 0 {
        log::warn!("division by zero");
        return Value::Int(0);
    }
    Value::Int(a.as_int().wrapping_div(d))
}

/// Modulo by zero yields 0 instead of trapping.
pub fn vm_mod(a: &Value, b: &Value) -> Value {
    if either_float(a, b) {
        let d = b.as_float();
        if d == 0.0 {
            log::warn!("modulo by zero");
            return Value::Float(0.0);
        }
        return Value::Float(a.as_float() % d);
    }
    let d = b.as_int();
    if d == 0 {
        log::warn!("modulo by zero");
        return Value::Int(0);
    }
    Value::Int(a.as_int().wrapping_rem(d))
}

/// Every operator except the short-circuiting `&&`/`||`, which the
/// interpreter evaluates itself.
pub fn binary(op: BinOp, a: &Value, b: &Value) -> Value {
    match op {
        BinOp::Add => vm_add(a, b),
        BinOp::Sub => vm_sub(a, b),
        BinOp::Mul => vm_mul(a, b),
        BinOp::Div => vm_div(a, b),
        BinOp::Mod => vm_mod(a, b),
        BinOp::Eq => Value::bool(loose_eq(a, b)),
        BinOp::Ne => Value::bool(!loose_eq(a, b)),
        BinOp::Lt => Value::bool(compare(a, b) == Some(Ordering::Less)),
        BinOp::Le => Value::bool(matches!(compare(a, b), Some(Ordering::Less | Ordering::Equal))),
        BinOp::Gt => Value::bool(compare(a, b) == Some(Ordering::Greater)),
        BinOp::Ge => Value::bool(matches!(compare(a, b), Some(Ordering::Greater | Ordering::Equal))),
        BinOp::And => Value::bool(a.truthy() && b.truthy()),
        BinOp::Or => Value::bool(a.truthy() || b.truthy()),
        BinOp::BitAnd => Value::Int(a.as_int() & b.as_int()),
        BinOp::BitOr => Value::Int(a.as_int() | b.as_int()),
        BinOp::BitXor => Value::Int(a.as_int() ^ b.as_int()),
        BinOp::Shl => Value::Int(a.as_int().wrapping_shl(b.as_int() as u32)),
        BinOp::Shr => Value::Int(a.as_int().wrapping_shr(b.as_int() as u32)),
    }
}

pub fn unary(op: UnOp, v: &Value) -> Value {
    match op {
        UnOp::Neg => match v {
            Value::Float(f) => Value::Float(-f),
            _ => Value::Int(v.as_int().wrapping_neg()),
        },
        UnOp::Not => Value::bool(!v.truthy()),
        UnOp::BitNot => Value::Int(!v.as_int()),
    }
}
