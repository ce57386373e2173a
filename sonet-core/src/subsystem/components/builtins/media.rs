use crate::error::Result;
use crate::script::Value;
use crate::vm::Vm;

use super::{get_var, Builtin, Reply};

pub fn play_midi(vm: &mut Vm, name: &Value) -> Result<Value> {
    let path = vm.resolve_path(&name.to_string());
    if let Err(e) = vm.audio_mut().play_midi(&path) {
        log::warn!("PlayMIDI {}: {e:#}", path.display());
    }
    Ok(Value::Int(0))
}

pub fn play_wave(vm: &mut Vm, name: &Value) -> Result<Value> {
    let path = vm.resolve_path(&name.to_string());
    if let Err(e) = vm.audio_mut().play_wav(&path) {
        log::warn!("PlayWAVE {}: {e:#}", path.display());
    }
    Ok(Value::Int(0))
}

pub fn stop_midi(vm: &mut Vm) -> Result<Value> {
    vm.audio_mut().stop_midi();
    Ok(Value::Int(0))
}

pub fn stop_wave(vm: &mut Vm) -> Result<Value> {
    vm.audio_mut().stop_wav();
    Ok(Value::Int(0))
}

/// `MuteMIDI()` mutes, `MuteMIDI(0)` unmutes.
pub fn mute_midi(vm: &mut Vm, flag: &Value) -> Result<Value> {
    let muted = flag.is_nil() || flag.truthy();
    if vm.config().headless && !muted {
        log::debug!("MuteMIDI: staying muted in headless mode");
        return Ok(Value::Int(0));
    }
    vm.audio_mut().mute(muted);
    Ok(Value::Int(0))
}

pub struct PlayMidi;
impl Builtin for PlayMidi {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        play_midi(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct PlayWave;
impl Builtin for PlayWave {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        play_wave(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct StopMidi;
impl Builtin for StopMidi {
    fn call(&self, vm: &mut Vm, _args: Vec<Value>) -> Result<Reply> {
        stop_midi(vm).map(Reply::Value)
    }
}

pub struct StopWave;
impl Builtin for StopWave {
    fn call(&self, vm: &mut Vm, _args: Vec<Value>) -> Result<Reply> {
        stop_wave(vm).map(Reply::Value)
    }
}

pub struct MuteMidi;
impl Builtin for MuteMidi {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        mute_midi(vm, get_var!(args, 0)).map(Reply::Value)
    }
}
