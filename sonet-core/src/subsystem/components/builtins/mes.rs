//! Builtins that steer handlers and the event loop.
//!
//! Malformed calls here are warned about and ignored; they never fail the
//! calling statement.

use crate::error::Result;
use crate::script::Value;
use crate::subsystem::resources::{
    event_queue::{Event, EventKind},
    handler::HandlerId,
};
use crate::vm::Vm;

use super::{get_var, Builtin, Reply};

pub fn del_me(vm: &mut Vm) -> Result<Value> {
    let Some(id) = vm.current_handler() else {
        log::warn!("del_me: not inside a handler");
        return Ok(Value::Int(0));
    };
    if let Some(h) = vm.handlers_mut().get_mut(id) {
        h.mark_for_deletion();
    }
    Ok(Value::Int(0))
}

/// Retire every handler sharing the running handler's category.
pub fn del_us(vm: &mut Vm) -> Result<Value> {
    let kind = vm
        .current_handler()
        .and_then(|id| vm.handlers().get(id))
        .map(|h| h.kind);
    match kind {
        Some(kind) => vm.handlers_mut().mark_kind_for_deletion(kind),
        None => log::warn!("del_us: not inside a handler"),
    }
    Ok(Value::Int(0))
}

pub fn del_all(vm: &mut Vm) -> Result<Value> {
    vm.handlers_mut().mark_all_for_deletion();
    Ok(Value::Int(0))
}

fn handler_arg(name: &str, args: &[Value]) -> Option<HandlerId> {
    if args.len() != 1 {
        log::warn!("{name}: expected 1 argument, got {}; ignored", args.len());
        return None;
    }
    match u32::try_from(args[0].as_int()) {
        Ok(id) => Some(id),
        Err(_) => {
            log::warn!("{name}: {} is not a handler id; ignored", args[0]);
            None
        }
    }
}

pub fn freeze_mes(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let Some(id) = handler_arg("FreezeMes", args) else {
        return Ok(Value::Int(0));
    };
    match vm.handlers_mut().get_mut(id) {
        Some(h) => h.freeze(),
        None => log::warn!("FreezeMes: no handler #{id}"),
    }
    Ok(Value::Int(0))
}

pub fn activate_mes(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let Some(id) = handler_arg("ActivateMes", args) else {
        return Ok(Value::Int(0));
    };
    match vm.handlers_mut().get_mut(id) {
        Some(h) => h.activate(),
        None => log::warn!("ActivateMes: no handler #{id}"),
    }
    Ok(Value::Int(0))
}

/// `PostMes(kind, p1, p2, p3, p4)`; `kind` is a category name or code.
pub fn post_mes(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let Some((kind, params)) = args.split_first() else {
        log::warn!("PostMes: missing event kind; ignored");
        return Ok(Value::Int(0));
    };
    let kind = match kind {
        Value::Text(name) => name.parse::<EventKind>().ok(),
        other => EventKind::from_code(other.as_int()),
    };
    let Some(kind) = kind else {
        log::warn!("PostMes: unknown event kind {}; ignored", args[0]);
        return Ok(Value::Int(0));
    };
    let params = params.iter().take(4).cloned().collect();
    vm.post_event(Event::with_params(kind, params));
    Ok(Value::Int(0))
}

/// Leave the title: stop the loop and retire every handler.
pub fn exit_title(vm: &mut Vm) -> Result<Value> {
    vm.handlers_mut().mark_all_for_deletion();
    vm.stop();
    Ok(Value::Int(0))
}

pub struct DelMe;
impl Builtin for DelMe {
    fn call(&self, vm: &mut Vm, _args: Vec<Value>) -> Result<Reply> {
        del_me(vm).map(Reply::Value)
    }
}

pub struct DelUs;
impl Builtin for DelUs {
    fn call(&self, vm: &mut Vm, _args: Vec<Value>) -> Result<Reply> {
        del_us(vm).map(Reply::Value)
    }
}

pub struct DelAll;
impl Builtin for DelAll {
    fn call(&self, vm: &mut Vm, _args: Vec<Value>) -> Result<Reply> {
        del_all(vm).map(Reply::Value)
    }
}

pub struct FreezeMes;
impl Builtin for FreezeMes {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        freeze_mes(vm, &args).map(Reply::Value)
    }
}

pub struct ActivateMes;
impl Builtin for ActivateMes {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        activate_mes(vm, &args).map(Reply::Value)
    }
}

pub struct PostMes;
impl Builtin for PostMes {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        post_mes(vm, &args).map(Reply::Value)
    }
}

pub struct Wait;
impl Builtin for Wait {
    fn call(&self, _vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        let units = match get_var!(args, 0) {
            Value::Nil => 1,
            v => v.as_int(),
        };
        Ok(Reply::Wait(units))
    }
}

pub struct ExitTitle;
impl Builtin for ExitTitle {
    fn call(&self, vm: &mut Vm, _args: Vec<Value>) -> Result<Reply> {
        exit_title(vm).map(Reply::Value)
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
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn vm(body: Vec<crate::script::Instruction>) -> Vm {
        let config = VmConfigBuilder::new().headless(true).get();
        let mut vm = Vm::new(Program::new(body), config, Box::new(NullAudio::default())).unwrap();
        vm.run_program().unwrap();
        vm
    }

    fn snapshot(vm: &Vm) -> Vec<(HandlerId, bool, usize, i64)> {
        vm.handlers()
            .iter()
            .map(|h| (h.id, h.active, h.current_pc, h.wait_counter))
            .collect()
    }

    #[test]
    fn freeze_activate_preserve_resume_state() {
        let mut vm = vm((0..5).map(|_| mes("LBDOWN", vec![wait(3), wait(3)])).collect());
        vm.dispatch(Event::new(EventKind::LButtonDown)).unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let before = snapshot(&vm);
            let target = rng.gen_range(1..=5u32);
            freeze_mes(&mut vm, &[Value::Int(target as i64)]).unwrap();
            let frozen = snapshot(&vm);
            for (b, f) in before.iter().zip(&frozen) {
                if b.0 == target {
                    assert!(!f.1);
                } else {
                    assert_eq!(b.1, f.1);
                }
                assert_eq!((b.2, b.3), (f.2, f.3));
            }
            if rng.gen_bool(0.7) {
                activate_mes(&mut vm, &[Value::Int(target as i64)]).unwrap();
                let restored = snapshot(&vm);
                let t = restored.iter().find(|h| h.0 == target).unwrap();
                let b = before.iter().find(|h| h.0 == target).unwrap();
                assert!(t.1);
                assert_eq!((t.2, t.3), (b.2, b.3));
            }
        }
    }

    #[test]
    fn wrong_arity_is_ignored() {
        let mut vm = vm(vec![mes("LBDOWN", vec![])]);
        freeze_mes(&mut vm, &[]).unwrap();
        freeze_mes(&mut vm, &[Value::Int(1), Value::Int(2)]).unwrap();
        freeze_mes(&mut vm, &[Value::Int(-1)]).unwrap();
        freeze_mes(&mut vm, &[Value::Int(99)]).unwrap();
        assert!(vm.handlers().get(1).unwrap().active);
    }

    #[test]
    fn del_me_retires_only_the_running_handler() {
        let mut vm = vm(vec![
            mes("TIME", vec![call("del_me", vec![]), assign("after", int(1))]),
            mes("TIME", vec![assign("other", bin(crate::script::BinOp::Add, var("other"), int(1)))]),
        ]);
        vm.dispatch(Event::new(EventKind::Time)).unwrap();
        vm.dispatch(Event::new(EventKind::Time)).unwrap();
        assert_eq!(vm.global("after"), None);
        assert_eq!(vm.global("other"), Some(Value::Int(2)));
        assert_eq!(vm.handlers().len(), 1);
    }

    #[test]
    fn del_us_retires_the_category() {
        let mut vm = vm(vec![
            mes("USER", vec![call("del_us", vec![])]),
            mes("USER", vec![]),
            mes("LBDOWN", vec![]),
        ]);
        vm.dispatch(Event::new(EventKind::User)).unwrap();
        let kinds: Vec<_> = vm.handlers().iter().map(|h| h.kind).collect();
        assert_eq!(kinds, vec![EventKind::LButtonDown]);
    }

    #[test]
    fn post_mes_queues_user_events() {
        let mut vm = vm(vec![mes("USER", vec![assign("p", var("MesP3"))])]);
        post_mes(&mut vm, &[Value::text("user"), Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap();
        post_mes(&mut vm, &[Value::Int(EventKind::User.code())]).unwrap();
        post_mes(&mut vm, &[Value::text("bogus")]).unwrap();
        assert_eq!(vm.pending_events(), 2);
        vm.pump().unwrap();
        assert_eq!(vm.global("p"), Some(Value::Int(3)));
        vm.pump().unwrap();
        assert_eq!(vm.global("p"), Some(Value::Int(0)));
    }
}
