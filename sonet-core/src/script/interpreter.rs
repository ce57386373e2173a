//! Tree-walking execution of instruction bodies.
//!
//! Every instruction yields a [`Flow`]. Anything other than `Normal` leaves
//! the enclosing blocks untouched until something consumes it: loops take
//! `Break`/`Continue`, function calls take `Return`, and the handler runner
//! in [`crate::vm`] takes `Wait`.

use std::rc::Rc;

use crate::{
    error::{ErrorKind, Result, RuntimeError},
    subsystem::{components::builtins::Reply, resources::event_queue::EventKind},
    vm::Vm,
};

use super::{
    binary, loose_eq, unary, BinOp, FunctionDef, Instruction, OpCode, Operand, Scope, Value,
    ValueArray,
};

/// Result of executing one instruction or block.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal(Value),
    Break,
    Continue,
    Return(Value),
    /// Suspend for this many events (already multiplied by the step counter).
    Wait(i64),
}

#[derive(Debug)]
pub struct StackFrame {
    pub function: String,
    pub scope: Rc<Scope>,
    /// Top-level offset of the instruction that made the call.
    pub return_pc: usize,
}

fn name_arg(inst: &Instruction, i: usize) -> Result<&str> {
    inst.arg(i)
        .and_then(Operand::as_name)
        .ok_or_else(|| RuntimeError::invalid_argument(format!("{:?}: operand {i} must be a name", inst.op)))
}

fn block_arg(inst: &Instruction, i: usize) -> Result<&[Instruction]> {
    inst.arg(i)
        .and_then(Operand::as_block)
        .ok_or_else(|| RuntimeError::invalid_argument(format!("{:?}: operand {i} must be a block", inst.op)))
}

fn optional_block(inst: &Instruction, i: usize) -> &[Instruction] {
    inst.arg(i).and_then(Operand::as_block).unwrap_or(&[])
}

impl Vm {
    /// Scope of the innermost call frame, or the global scope.
    pub fn scope(&self) -> Rc<Scope> {
        match self.frames.last() {
            Some(frame) => frame.scope.clone(),
            None => self.globals.clone(),
        }
    }

    pub fn stack_depth(&self) -> usize {
        self.frames.len()
    }

    /// Run `body` to the end or until a non-`Normal` flow.
    ///
    /// Non-fatal errors are logged and the next sibling runs.
    pub fn exec_block(&mut self, body: &[Instruction]) -> Result<Flow> {
        let mut last = Value::Nil;
        for inst in body {
            match self.exec_instruction(inst) {
                Ok(Flow::Normal(v)) => last = v,
                Ok(flow) => return Ok(flow),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => log::error!("{e}"),
            }
        }
        Ok(Flow::Normal(last))
    }

    pub fn exec_instruction(&mut self, inst: &Instruction) -> Result<Flow> {
        let result = self.exec_op(inst);
        // a wait requested from inside an expression takes effect once the
        // statement is done, ahead of any return or loop signal it carries
        let pending = self.pending_wait.take();
        let flow = result.map_err(|e| e.at(inst.location(self.file.as_deref())))?;
        Ok(match (flow, pending) {
            (flow @ Flow::Wait(_), _) | (flow, None) => flow,
            (flow, Some(count)) => {
                if !matches!(flow, Flow::Normal(_)) {
                    log::debug!("wait of {count} supersedes {flow:?}");
                }
                Flow::Wait(count)
            }
        })
    }

    fn exec_op(&mut self, inst: &Instruction) -> Result<Flow> {
        match inst.op {
            OpCode::Assign => {
                let name = name_arg(inst, 0)?;
                let value = self.eval_arg(inst, 1)?;
                self.scope().set(name, value.clone());
                Ok(Flow::Normal(value))
            }
            OpCode::Declare => {
                let name = name_arg(inst, 0)?;
                let value = match inst.arg(1) {
                    Some(init) => self.eval(init)?,
                    None => Value::Int(0),
                };
                self.scope().set_local(name, value.clone());
                Ok(Flow::Normal(value))
            }
            OpCode::ArrayAssign => self.array_assign(inst).map(Flow::Normal),
            OpCode::ArrayRead => self.array_read(inst).map(Flow::Normal),
            OpCode::Call => self.call(inst),
            OpCode::Binary(_) | OpCode::Unary(_) => self.eval_node(inst).map(Flow::Normal),
            OpCode::If => {
                if self.eval_arg(inst, 0)?.truthy() {
                    self.exec_block(block_arg(inst, 1)?)
                } else {
                    self.exec_block(optional_block(inst, 2))
                }
            }
            OpCode::For => self.exec_for(inst),
            OpCode::While => {
                let body = block_arg(inst, 1)?;
                while self.eval_arg(inst, 0)?.truthy() {
                    match self.exec_block(body)? {
                        Flow::Normal(_) | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ (Flow::Return(_) | Flow::Wait(_)) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal(Value::Int(0)))
            }
            OpCode::DoWhile => {
                let body = block_arg(inst, 0)?;
                loop {
                    match self.exec_block(body)? {
                        Flow::Normal(_) | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ (Flow::Return(_) | Flow::Wait(_)) => return Ok(flow),
                    }
                    if !self.eval_arg(inst, 1)?.truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal(Value::Int(0)))
            }
            OpCode::Switch => self.exec_switch(inst),
            OpCode::Case | OpCode::Default => Err(RuntimeError::invalid_argument(format!(
                "{:?} outside of a switch",
                inst.op
            ))),
            OpCode::Break => Ok(Flow::Break),
            OpCode::Continue => Ok(Flow::Continue),
            OpCode::Return => {
                let value = match inst.arg(0) {
                    Some(v) => self.eval(v)?,
                    None => Value::Int(0),
                };
                Ok(Flow::Return(value))
            }
            OpCode::RegisterHandler => {
                let kind = match inst.arg(0) {
                    Some(Operand::Int(code)) => EventKind::from_code(*code).ok_or_else(|| {
                        RuntimeError::invalid_argument(format!("unknown event code {code}"))
                    })?,
                    _ => name_arg(inst, 0)?
                        .parse::<EventKind>()
                        .map_err(RuntimeError::invalid_argument)?,
                };
                let body = Rc::new(block_arg(inst, 1)?.to_vec());
                let id = self.register_handler(kind, body);
                Ok(Flow::Normal(Value::Int(id as i64)))
            }
            OpCode::Wait => {
                let units = self.eval_arg(inst, 0)?.as_int();
                Ok(self.wait_flow(units))
            }
            OpCode::SetStep => {
                let per_unit = match inst.arg(0) {
                    Some(v) => self.eval(v)?.as_int(),
                    None => 1,
                };
                self.set_step(per_unit);
                Ok(Flow::Normal(Value::Int(0)))
            }
            // collected before execution starts
            OpCode::DefineFunction => Ok(Flow::Normal(Value::Nil)),
        }
    }

    fn exec_for(&mut self, inst: &Instruction) -> Result<Flow> {
        let init = block_arg(inst, 0)?;
        let post = optional_block(inst, 2);
        let body = block_arg(inst, 3)?;

        match self.exec_block(init)? {
            Flow::Normal(_) => {}
            flow => return Ok(flow),
        }
        loop {
            let go = match inst.arg(1) {
                None | Some(Operand::Nil) => true,
                Some(cond) => self.eval(cond)?.truthy(),
            };
            if !go {
                break;
            }
            match self.exec_block(body)? {
                Flow::Normal(_) | Flow::Continue => {}
                Flow::Break => break,
                flow @ (Flow::Return(_) | Flow::Wait(_)) => return Ok(flow),
            }
            match self.exec_block(post)? {
                Flow::Normal(_) => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal(Value::Int(0)))
    }

    /// Runs the first matching arm only; its flow is relayed unchanged.
    fn exec_switch(&mut self, inst: &Instruction) -> Result<Flow> {
        let subject = self.eval_arg(inst, 0)?;
        let mut default = None;
        for arm in inst.args.iter().skip(1) {
            let Some(node) = arm.as_node() else {
                log::warn!("switch: ignoring non-arm operand {arm:?}");
                continue;
            };
            match node.op {
                OpCode::Case => {
                    let value = self.eval_arg(node, 0)?;
                    if loose_eq(&value, &subject) {
                        return self.exec_block(block_arg(node, 1)?);
                    }
                }
                OpCode::Default => default = Some(node),
                other => log::warn!("switch: ignoring {other:?} arm"),
            }
        }
        match default {
            Some(node) => self.exec_block(block_arg(node, 0)?),
            None => Ok(Flow::Normal(Value::Int(0))),
        }
    }

    pub fn eval(&mut self, operand: &Operand) -> Result<Value> {
        match operand {
            Operand::Nil => Ok(Value::Nil),
            Operand::Int(i) => Ok(Value::Int(*i)),
            Operand::Float(f) => Ok(Value::Float(*f)),
            Operand::Text(s) => Ok(Value::Text(s.clone())),
            Operand::Var(name) => Ok(self.read_var(name)),
            Operand::Node(inst) => self
                .eval_node(inst)
                .map_err(|e| e.at(inst.location(self.file.as_deref()))),
            Operand::Block(_) => Err(RuntimeError::invalid_argument("a block is not a value")),
        }
    }

    fn eval_arg(&mut self, inst: &Instruction, i: usize) -> Result<Value> {
        match inst.arg(i) {
            Some(operand) => self.eval(operand),
            None => Err(RuntimeError::invalid_argument(format!(
                "{:?}: missing operand {i}",
                inst.op
            ))),
        }
    }

    fn read_var(&self, name: &str) -> Value {
        match self.scope().get(name) {
            Some(v) => v,
            None => {
                log::debug!("{}: `{name}` read as 0", ErrorKind::UndefinedVariable);
                Value::Int(0)
            }
        }
    }

    fn eval_node(&mut self, inst: &Instruction) -> Result<Value> {
        match inst.op {
            OpCode::Binary(BinOp::And) => {
                if !self.eval_arg(inst, 0)?.truthy() {
                    return Ok(Value::Int(0));
                }
                Ok(Value::bool(self.eval_arg(inst, 1)?.truthy()))
            }
            OpCode::Binary(BinOp::Or) => {
                if self.eval_arg(inst, 0)?.truthy() {
                    return Ok(Value::Int(1));
                }
                Ok(Value::bool(self.eval_arg(inst, 1)?.truthy()))
            }
            OpCode::Binary(op) => {
                let lhs = self.eval_arg(inst, 0)?;
                let rhs = self.eval_arg(inst, 1)?;
                Ok(binary(op, &lhs, &rhs))
            }
            OpCode::Unary(op) => Ok(unary(op, &self.eval_arg(inst, 0)?)),
            OpCode::ArrayRead => self.array_read(inst),
            OpCode::Call => match self.call(inst)? {
                Flow::Normal(v) | Flow::Return(v) => Ok(v),
                Flow::Wait(count) => {
                    self.pending_wait = Some(count);
                    Ok(Value::Int(0))
                }
                Flow::Break | Flow::Continue => Ok(Value::Int(0)),
            },
            OpCode::Assign | OpCode::Declare | OpCode::ArrayAssign => match self.exec_op(inst)? {
                Flow::Normal(v) => Ok(v),
                _ => Ok(Value::Int(0)),
            },
            other => Err(RuntimeError::invalid_argument(format!(
                "{other:?} cannot be used as a value"
            ))),
        }
    }

    fn array_read(&mut self, inst: &Instruction) -> Result<Value> {
        let name = name_arg(inst, 0)?;
        let index = self.eval_arg(inst, 1)?.as_int();
        let Some(Value::Array(array)) = self.scope().get(name) else {
            log::warn!("`{name}` is not an array, `{name}[{index}]` read as 0");
            return Ok(Value::Int(0));
        };
        match array.get(index) {
            Some(v) => Ok(v),
            None => {
                log::warn!(
                    "{}: `{name}[{index}]` (len {}) read as 0",
                    ErrorKind::IndexOutOfRange,
                    array.len()
                );
                Ok(Value::Int(0))
            }
        }
    }

    /// Grows the array on demand. A variable that does not hold an array
    /// yet is rebound to a fresh one.
    fn array_assign(&mut self, inst: &Instruction) -> Result<Value> {
        let name = name_arg(inst, 0)?;
        let index = self.eval_arg(inst, 1)?.as_int();
        let value = self.eval_arg(inst, 2)?;
        let scope = self.scope();
        let array = match scope.get(name) {
            Some(Value::Array(array)) => array,
            _ => {
                let array = ValueArray::new();
                scope.set(name, Value::Array(array.clone()));
                array
            }
        };
        if !array.set(index, value.clone())? {
            log::warn!("{}: `{name}[{index}]` not assigned", ErrorKind::IndexOutOfRange);
            return Ok(Value::Int(0));
        }
        Ok(value)
    }

    fn call(&mut self, inst: &Instruction) -> Result<Flow> {
        let name = name_arg(inst, 0)?;
        let mut args = Vec::with_capacity(inst.args.len().saturating_sub(1));
        for operand in &inst.args[1..] {
            args.push(self.eval(operand)?);
        }
        self.call_named(name, args)
    }

    /// Builtins shadow user functions of the same name.
    pub fn call_named(&mut self, name: &str, args: Vec<Value>) -> Result<Flow> {
        if let Some(builtin) = self.builtins.get(name) {
            log::trace!("builtin {name}({} args)", args.len());
            return Ok(match builtin.call(self, args)? {
                Reply::Value(v) => Flow::Normal(v),
                Reply::Wait(units) => self.wait_flow(units),
            });
        }
        let Some(def) = self.functions.get(&name.to_lowercase()).cloned() else {
            return Err(RuntimeError::undefined_function(name));
        };
        self.call_function(&def, args)
    }

    /// Call a user function in a fresh frame. `Return` is consumed here;
    /// `Wait` is passed on to whoever runs the enclosing handler.
    pub fn call_function(&mut self, def: &FunctionDef, args: Vec<Value>) -> Result<Flow> {
        let limit = self.config.max_stack_depth;
        if self.frames.len() >= limit {
            return Err(RuntimeError::new(
                ErrorKind::StackOverflow,
                format!("calling `{}` would exceed {limit} frames", def.name),
            ));
        }

        let scope = Scope::with_parent(self.globals.clone());
        let mut args = args.into_iter();
        for param in &def.params {
            let value = match args.next() {
                Some(v) => v,
                None => match &param.default {
                    Some(default) => self.eval(default)?,
                    None => Value::Int(0),
                },
            };
            scope.set_local(&param.name, value);
        }
        if args.len() > 0 {
            log::debug!("`{}`: {} extra argument(s) ignored", def.name, args.len());
        }

        self.frames.push(StackFrame {
            function: def.name.clone(),
            scope,
            return_pc: self.pc,
        });
        let result = self.exec_block(&def.body);
        self.frames.pop();

        match result? {
            Flow::Normal(_) => Ok(Flow::Normal(Value::Int(0))),
            Flow::Return(v) => Ok(Flow::Normal(v)),
            Flow::Wait(count) => Ok(Flow::Wait(count)),
            Flow::Break | Flow::Continue => {
                log::warn!("`{}`: break/continue outside of a loop", def.name);
                Ok(Flow::Normal(Value::Int(0)))
            }
        }
    }

    /// Events per wait unit for whoever is running right now.
    pub fn step_counter(&self) -> i64 {
        self.current_handler
            .and_then(|id| self.handlers.get(id))
            .map_or(self.step_counter, |h| h.step_counter)
    }

    pub fn set_step(&mut self, per_unit: i64) {
        match self.current_handler.and_then(|id| self.handlers.get_mut(id)) {
            Some(handler) => handler.set_step(per_unit),
            None => self.step_counter = if per_unit > 0 { per_unit } else { 1 },
        }
    }

    /// Non-positive unit counts continue immediately.
    pub(crate) fn wait_flow(&self, units: i64) -> Flow {
        if units <= 0 {
            return Flow::Normal(Value::Int(0));
        }
        Flow::Wait(units.saturating_mul(self.step_counter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::NullAudio,
        config::VmConfigBuilder,
        script::{instruction::build::*, Program},
    };
    use pretty_assertions::assert_eq;

    fn vm(program: Program) -> Vm {
        let config = VmConfigBuilder::new().headless(true).get();
        Vm::new(program, config, Box::new(NullAudio::default())).unwrap()
    }

    fn run(body: Vec<Instruction>) -> Vm {
        let mut vm = vm(Program::new(body));
        vm.run_program().unwrap();
        vm
    }

    #[test]
    fn break_and_continue_are_consumed_by_loops() {
        // for (i = 0; i < 10; i = i + 1) { if (i == 2) continue; if (i == 5) break; n = n + 1 }
        let vm = run(vec![for_loop(
            vec![assign("i", int(0))],
            bin(BinOp::Lt, var("i"), int(10)),
            vec![assign("i", bin(BinOp::Add, var("i"), int(1)))],
            vec![
                if_else(bin(BinOp::Eq, var("i"), int(2)), vec![cont()], vec![]),
                if_else(bin(BinOp::Eq, var("i"), int(5)), vec![brk()], vec![]),
                assign("n", bin(BinOp::Add, var("n"), int(1))),
            ],
        )]);
        assert_eq!(vm.global("n"), Some(Value::Int(4)));
        assert_eq!(vm.global("i"), Some(Value::Int(5)));
    }

    #[test]
    fn signals_skip_remaining_siblings() {
        let mut vm = vm(Program::new(vec![]));
        let flow = vm
            .exec_block(&[
                if_else(int(1), vec![while_loop(int(1), vec![ret(int(7))])], vec![]),
                assign("after", int(1)),
            ])
            .unwrap();
        assert_eq!(flow, Flow::Return(Value::Int(7)));
        assert_eq!(vm.global("after"), None);
    }

    #[test]
    fn do_while_runs_at_least_once() {
        let body = vec![assign("n", bin(BinOp::Add, var("n"), int(1)))];
        let vm = run(vec![Instruction::new(OpCode::DoWhile, vec![block(body), int(0)])]);
        assert_eq!(vm.global("n"), Some(Value::Int(1)));
    }

    #[test]
    fn switch_runs_one_arm() {
        let vm = run(vec![switch(
            int(2),
            vec![
                (int(1), vec![assign("hit", text("one"))]),
                (float(2.0), vec![assign("hit", text("two"))]),
                (int(3), vec![assign("hit", text("three"))]),
            ],
            Some(vec![assign("hit", text("default"))]),
        )]);
        assert_eq!(vm.global("hit"), Some(Value::text("two")));

        let vm = run(vec![switch(int(9), vec![(int(1), vec![])], Some(vec![assign("hit", int(1))]))]);
        assert_eq!(vm.global("hit"), Some(Value::Int(1)));
    }

    #[test]
    fn short_circuit_skips_rhs() {
        let vm = run(vec![
            assign("a", bin(BinOp::And, int(0), call_expr("NoSuchFunction", vec![]))),
            assign("b", bin(BinOp::Or, int(3), call_expr("NoSuchFunction", vec![]))),
        ]);
        assert_eq!(vm.global("a"), Some(Value::Int(0)));
        assert_eq!(vm.global("b"), Some(Value::Int(1)));
    }

    #[test]
    fn recursion_with_defaults_and_case_insensitive_names() {
        // fact(n, acc = 1) { if (n <= 1) return acc; return fact(n - 1, acc * n) }
        let mut fact = function(
            "Fact",
            &["n"],
            vec![
                if_else(bin(BinOp::Le, var("n"), int(1)), vec![ret(var("acc"))], vec![]),
                ret(call_expr(
                    "fact",
                    vec![bin(BinOp::Sub, var("n"), int(1)), bin(BinOp::Mul, var("acc"), var("n"))],
                )),
            ],
        );
        fact.args.push(node(assign("acc", int(1))));
        let vm = run(vec![fact, assign("r", call_expr("FACT", vec![int(10)]))]);
        assert_eq!(vm.global("r"), Some(Value::Int(3_628_800)));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn locals_shadow_globals() {
        let vm = run(vec![
            function("f", &[], vec![declare("x", int(2)), assign("y", var("x"))]),
            assign("x", int(1)),
            call("f", vec![]),
        ]);
        assert_eq!(vm.global("x"), Some(Value::Int(1)));
        // `y` did not exist anywhere, so it was created in the frame
        assert_eq!(vm.global("y"), None);
    }

    #[test]
    fn functions_write_through_to_existing_globals() {
        let vm = run(vec![
            function("bump", &[], vec![assign("g", bin(BinOp::Add, var("g"), int(1)))]),
            assign("g", int(1)),
            call("bump", vec![]),
            call("bump", vec![]),
        ]);
        assert_eq!(vm.global("g"), Some(Value::Int(3)));
    }

    #[test]
    fn missing_return_yields_zero() {
        let vm = run(vec![
            function("noop", &[], vec![assign("z", int(5))]),
            assign("r", call_expr("noop", vec![])),
        ]);
        assert_eq!(vm.global("r"), Some(Value::Int(0)));
    }

    #[test]
    fn undefined_function_is_fatal() {
        let mut vm = vm(Program::new(vec![call("nope", vec![]).at_line(4), assign("after", int(1))]));
        let err = vm.run_program().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedFunction);
        assert_eq!(err.location.map(|l| l.line), Some(4));
        assert_eq!(vm.global("after"), None);
    }

    #[test]
    fn non_fatal_errors_continue_with_next_sibling() {
        let vm = run(vec![
            Instruction::new(OpCode::Case, vec![int(1), block(vec![])]),
            assign("q", bin(BinOp::Div, int(7), int(0))),
            assign("after", int(1)),
        ]);
        assert_eq!(vm.global("q"), Some(Value::Int(0)));
        assert_eq!(vm.global("after"), Some(Value::Int(1)));
    }

    #[test]
    fn negative_index_leaves_array_alone() {
        let vm = run(vec![
            array_assign("a", int(1), int(5)),
            array_assign("a", int(-1), int(9)),
            assign("r", array_read("a", int(-1))),
            assign("past", array_read("a", int(40))),
        ]);
        let a = vm.global("a").unwrap();
        assert_eq!(a.as_array().unwrap().to_vec(), vec![Value::Int(0), Value::Int(5)]);
        assert_eq!(vm.global("r"), Some(Value::Int(0)));
        assert_eq!(vm.global("past"), Some(Value::Int(0)));
    }

    #[test]
    fn huge_array_index_is_fatal_out_of_memory() {
        let mut vm = vm(Program::new(vec![
            array_assign("a", int(i64::MAX), int(1)),
            assign("after", int(1)),
        ]));
        let err = vm.run_program().unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfMemory);
        assert_eq!(vm.global("after"), None);
    }

    #[test]
    fn huge_insert_index_is_fatal_out_of_memory() {
        let mut vm = vm(Program::new(vec![
            array_assign("a", int(2), int(1)),
            call("InsArrayAt", vec![var("a"), int(1 << 60), int(1)]),
            assign("after", int(1)),
        ]));
        let err = vm.run_program().unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfMemory);
        assert_eq!(vm.global("after"), None);
        assert_eq!(vm.global("a").unwrap().as_array().unwrap().len(), 3);
    }

    #[test]
    fn stack_depth_is_enforced_before_push() {
        let config = VmConfigBuilder::new().headless(true).max_stack_depth(10).get();
        let program = Program::new(vec![
            function("down", &["n"], vec![call("down", vec![bin(BinOp::Add, var("n"), int(1))])]),
            call("down", vec![int(0)]),
        ]);
        let mut vm = Vm::new(program, config, Box::new(NullAudio::default())).unwrap();
        let err = vm.run_program().unwrap_err();
        assert_eq!(err.kind, ErrorKind::StackOverflow);
        assert_eq!(vm.stack_depth(), 0);
    }
}
