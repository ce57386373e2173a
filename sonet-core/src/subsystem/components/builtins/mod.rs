use std::{collections::HashMap, fmt, rc::Rc};

use crate::{error::Result, script::Value, vm::Vm};

pub mod file;
pub mod graph;
pub mod media;
pub mod mes;
pub mod utils;

/// What a builtin hands back to the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Value(Value),
    /// Suspend the running handler for this many wait units.
    Wait(i64),
}

impl From<Value> for Reply {
    fn from(v: Value) -> Self {
        Reply::Value(v)
    }
}

pub trait Builtin {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply>;
}

impl<F> Builtin for F
where
    F: Fn(&mut Vm, Vec<Value>) -> Result<Reply>,
{
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        self(vm, args)
    }
}

macro_rules! get_var {
    ($args:expr, $i:expr) => {
        if let Some(value) = $args.get($i) {
            value
        } else {
            &$crate::script::Value::Nil
        }
    };
}

pub(crate) use get_var;

/// Host operations callable from scripts. Names are case-insensitive.
#[derive(Default)]
pub struct BuiltinRegistry {
    table: HashMap<String, Rc<dyn Builtin>>,
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinRegistry")
            .field("len", &self.table.len())
            .finish()
    }
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every standard builtin.
    pub fn with_defaults() -> Self {
        let mut m = Self::new();

        // utility apis
        m.register("StrLen", utils::StrLen);
        m.register("SubStr", utils::SubStr);
        m.register("StrFind", utils::StrFind);
        m.register("StrUp", utils::StrUp);
        m.register("StrLow", utils::StrLow);
        m.register("StrPrint", utils::StrPrint);
        m.register("IntToStr", utils::IntToStr);
        m.register("StrToInt", utils::StrToInt);
        m.register("CharCode", utils::CharCode);
        m.register("StrCode", utils::StrCode);
        m.register("Random", utils::Random);
        m.register("Abs", utils::Abs);
        m.register("Max", utils::Max);
        m.register("Min", utils::Min);
        m.register("MakeLong", utils::MakeLong);
        m.register("LoWord", utils::LoWord);
        m.register("HiWord", utils::HiWord);
        m.register("ArraySize", utils::ArraySize);
        m.register("DelArrayAll", utils::DelArrayAll);
        m.register("DelArrayAt", utils::DelArrayAt);
        m.register("InsArrayAt", utils::InsArrayAt);

        // file apis
        m.register("OpenF", file::OpenF);
        m.register("CloseF", file::CloseF);
        m.register("ReadF", file::ReadF);
        m.register("WriteF", file::WriteF);
        m.register("SeekF", file::SeekF);
        m.register("StrReadF", file::StrReadF);
        m.register("StrWriteF", file::StrWriteF);
        m.register("IsExist", file::IsExist);

        // media apis
        m.register("PlayMIDI", media::PlayMidi);
        m.register("PlayWAVE", media::PlayWave);
        m.register("StopMIDI", media::StopMidi);
        m.register("StopWAVE", media::StopWave);
        m.register("MuteMIDI", media::MuteMidi);

        // handler / process apis
        m.register("del_me", mes::DelMe);
        m.register("end_step", mes::DelMe);
        m.register("del_us", mes::DelUs);
        m.register("del_all", mes::DelAll);
        m.register("FreezeMes", mes::FreezeMes);
        m.register("ActivateMes", mes::ActivateMes);
        m.register("PostMes", mes::PostMes);
        m.register("Wait", mes::Wait);
        m.register("ExitTitle", mes::ExitTitle);

        // window, picture and cast apis
        for name in graph::STUBS {
            m.register(name, graph::Unimplemented(name));
        }

        m
    }

    /// Add or replace a builtin.
    pub fn register(&mut self, name: &str, builtin: impl Builtin + 'static) {
        self.table.insert(name.to_lowercase(), Rc::new(builtin));
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Builtin>> {
        self.table.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
