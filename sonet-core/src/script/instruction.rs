//! The pre-compiled instruction tree handed over by the front-end.
//!
//! Operand layouts per opcode:
//!
//! | opcode            | operands                                                   |
//! |-------------------|------------------------------------------------------------|
//! | `Assign`          | `Var(name), value`                                         |
//! | `Declare`         | `Var(name) [, init]`                                       |
//! | `ArrayAssign`     | `Var(name), index, value`                                  |
//! | `ArrayRead`       | `Var(name), index`                                         |
//! | `Call`            | `Text(name) | Var(name), args...`                          |
//! | `Binary(op)`      | `lhs, rhs`                                                 |
//! | `Unary(op)`       | `operand`                                                  |
//! | `If`              | `cond, Block(then) [, Block(else)]`                        |
//! | `For`             | `Block(init), cond | Nil, Block(post), Block(body)`        |
//! | `While`           | `cond, Block(body)`                                        |
//! | `DoWhile`         | `Block(body), cond`                                        |
//! | `Switch`          | `subject, Node(Case | Default)...`                         |
//! | `Case`            | `value, Block(body)`                                       |
//! | `Default`         | `Block(body)`                                              |
//! | `Return`          | `[value]`                                                  |
//! | `RegisterHandler` | `Text(category), Block(body)`                              |
//! | `Wait`            | `units`                                                    |
//! | `SetStep`         | `[events per unit]`                                        |
//! | `DefineFunction`  | `Text(name), Block(body), params...`                       |
//!
//! A function parameter is either `Var(name)` or a `Node(Assign)` whose
//! value is the default used when the caller omits that trailing argument.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpCode {
    Assign,
    Declare,
    ArrayAssign,
    ArrayRead,
    Call,
    Binary(BinOp),
    Unary(UnOp),
    If,
    For,
    While,
    DoWhile,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    RegisterHandler,
    Wait,
    SetStep,
    DefineFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Nil,
    Int(i64),
    Float(f64),
    Text(String),
    Var(String),
    Node(Box<Instruction>),
    Block(Vec<Instruction>),
}

impl Operand {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Operand::Var(s) | Operand::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&[Instruction]> {
        match self {
            Operand::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Instruction> {
        match self {
            Operand::Node(n) => Some(n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: OpCode,
    #[serde(default)]
    pub args: Vec<Operand>,
    #[serde(default)]
    pub line: Option<u32>,
}

impl Instruction {
    pub fn new(op: OpCode, args: Vec<Operand>) -> Self {
        Self { op, args, line: None }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn arg(&self, i: usize) -> Option<&Operand> {
        self.args.get(i)
    }

    pub fn location(&self, file: Option<&str>) -> Option<SourceLocation> {
        self.line.map(|line| SourceLocation {
            file: file.map(str::to_string),
            line,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub default: Option<Operand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    pub body: Vec<Instruction>,
}

impl FunctionDef {
    /// Parse a `DefineFunction` node.
    pub fn from_instruction(inst: &Instruction) -> Option<FunctionDef> {
        if inst.op != OpCode::DefineFunction {
            return None;
        }
        let name = inst.arg(0)?.as_name()?.to_string();
        let body = inst.arg(1)?.as_block()?.to_vec();
        let mut params = Vec::new();
        for p in &inst.args[2..] {
            match p {
                Operand::Var(name) | Operand::Text(name) => params.push(Param {
                    name: name.clone(),
                    default: None,
                }),
                Operand::Node(node) if node.op == OpCode::Assign => {
                    let name = node.arg(0)?.as_name()?.to_string();
                    params.push(Param {
                        name,
                        default: node.arg(1).cloned(),
                    });
                }
                _ => {
                    log::warn!("function `{}`: ignoring malformed parameter {:?}", name, p);
                }
            }
        }
        Some(FunctionDef { name, params, body })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub functions: HashMap<String, FunctionDef>,
    /// Source file name, used only for diagnostics.
    #[serde(default)]
    pub file: Option<String>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            ..Default::default()
        }
    }

    pub fn with_function(mut self, def: FunctionDef) -> Self {
        self.functions.insert(def.name.clone(), def);
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Program> {
        serde_json::from_str(json)
    }

    /// Every function known to the program: the front-end's table plus
    /// any `DefineFunction` nodes at top level. Keys are lowercased.
    pub fn collect_functions(&self) -> HashMap<String, FunctionDef> {
        let mut out: HashMap<String, FunctionDef> = self
            .functions
            .values()
            .map(|f| (f.name.to_lowercase(), f.clone()))
            .collect();
        for inst in &self.instructions {
            if inst.op != OpCode::DefineFunction {
                continue;
            }
            match FunctionDef::from_instruction(inst) {
                Some(def) => {
                    out.insert(def.name.to_lowercase(), def);
                }
                None => log::warn!("malformed function definition at {:?}", inst.line),
            }
        }
        out
    }
}

/// True if `body` contains a step initializer outside nested handlers and
/// function definitions.
pub fn has_step_block(body: &[Instruction]) -> bool {
    body.iter().any(|inst| match inst.op {
        OpCode::SetStep => true,
        OpCode::RegisterHandler | OpCode::DefineFunction => false,
        _ => inst.args.iter().any(|arg| match arg {
            Operand::Block(b) => has_step_block(b),
            Operand::Node(n) => has_step_block(std::slice::from_ref(n)),
            _ => false,
        }),
    })
}

/// Terse constructors for building trees by hand.
pub mod build {
    use super::*;

    pub fn int(v: i64) -> Operand {
        Operand::Int(v)
    }

    pub fn float(v: f64) -> Operand {
        Operand::Float(v)
    }

    pub fn text(s: &str) -> Operand {
        Operand::Text(s.to_string())
    }

    pub fn var(name: &str) -> Operand {
        Operand::Var(name.to_string())
    }

    pub fn block(body: Vec<Instruction>) -> Operand {
        Operand::Block(body)
    }

    pub fn node(inst: Instruction) -> Operand {
        Operand::Node(Box::new(inst))
    }

    pub fn assign(name: &str, value: Operand) -> Instruction {
        Instruction::new(OpCode::Assign, vec![var(name), value])
    }

    pub fn declare(name: &str, init: Operand) -> Instruction {
        Instruction::new(OpCode::Declare, vec![var(name), init])
    }

    pub fn array_assign(name: &str, index: Operand, value: Operand) -> Instruction {
        Instruction::new(OpCode::ArrayAssign, vec![var(name), index, value])
    }

    pub fn array_read(name: &str, index: Operand) -> Operand {
        node(Instruction::new(OpCode::ArrayRead, vec![var(name), index]))
    }

    pub fn call(name: &str, args: Vec<Operand>) -> Instruction {
        let mut all = vec![text(name)];
        all.extend(args);
        Instruction::new(OpCode::Call, all)
    }

    pub fn call_expr(name: &str, args: Vec<Operand>) -> Operand {
        node(call(name, args))
    }

    pub fn bin(op: BinOp, lhs: Operand, rhs: Operand) -> Operand {
        node(Instruction::new(OpCode::Binary(op), vec![lhs, rhs]))
    }

    pub fn un(op: UnOp, v: Operand) -> Operand {
        node(Instruction::new(OpCode::Unary(op), vec![v]))
    }

    pub fn if_else(cond: Operand, then: Vec<Instruction>, otherwise: Vec<Instruction>) -> Instruction {
        Instruction::new(OpCode::If, vec![cond, block(then), block(otherwise)])
    }

    pub fn for_loop(
        init: Vec<Instruction>,
        cond: Operand,
        post: Vec<Instruction>,
        body: Vec<Instruction>,
    ) -> Instruction {
        Instruction::new(OpCode::For, vec![block(init), cond, block(post), block(body)])
    }

    pub fn while_loop(cond: Operand, body: Vec<Instruction>) -> Instruction {
        Instruction::new(OpCode::While, vec![cond, block(body)])
    }

    pub fn switch(subject: Operand, cases: Vec<(Operand, Vec<Instruction>)>, default: Option<Vec<Instruction>>) -> Instruction {
        let mut args = vec![subject];
        for (value, body) in cases {
            args.push(node(Instruction::new(OpCode::Case, vec![value, block(body)])));
        }
        if let Some(body) = default {
            args.push(node(Instruction::new(OpCode::Default, vec![block(body)])));
        }
        Instruction::new(OpCode::Switch, args)
    }

    pub fn brk() -> Instruction {
        Instruction::new(OpCode::Break, vec![])
    }

    pub fn cont() -> Instruction {
        Instruction::new(OpCode::Continue, vec![])
    }

    pub fn ret(value: Operand) -> Instruction {
        Instruction::new(OpCode::Return, vec![value])
    }

    pub fn mes(category: &str, body: Vec<Instruction>) -> Instruction {
        Instruction::new(OpCode::RegisterHandler, vec![text(category), block(body)])
    }

    pub fn wait(units: i64) -> Instruction {
        Instruction::new(OpCode::Wait, vec![int(units)])
    }

    pub fn step(per_unit: i64) -> Instruction {
        Instruction::new(OpCode::SetStep, vec![int(per_unit)])
    }

    pub fn function(name: &str, params: &[&str], body: Vec<Instruction>) -> Instruction {
        let mut args = vec![text(name), block(body)];
        args.extend(params.iter().map(|p| var(p)));
        Instruction::new(OpCode::DefineFunction, args)
    }
}

#[cfg(test)]
mod tests {
    use super::build::*;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn step_detection_skips_nested_handlers() {
        assert!(has_step_block(&[step(2), wait(1)]));
        assert!(has_step_block(&[if_else(int(1), vec![step(1)], vec![])]));
        assert!(!has_step_block(&[mes("TIME", vec![step(1)])]));
        assert!(!has_step_block(&[call("foo", vec![])]));
    }

    #[test]
    fn function_prepass_is_case_insensitive_and_reads_defaults() {
        let with_default = node(assign("b", int(5)));
        let mut def = function("Sum", &["a"], vec![ret(bin(BinOp::Add, var("a"), var("b")))]);
        def.args.push(with_default);
        let program = Program::new(vec![def]);
        let fns = program.collect_functions();
        let f = fns.get("sum").unwrap();
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.params[1].default, Some(Operand::Int(5)));
    }

    #[test]
    fn json_roundtrip_keeps_tree() {
        let program = Program::new(vec![assign("x", bin(BinOp::Mul, int(6), int(7))).at_line(3)]);
        let json = serde_json::to_string(&program).unwrap();
        let back = Program::from_json(&json).unwrap();
        assert_eq!(back, program);
    }
}
