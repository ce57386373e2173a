use std::fs::OpenOptions;

use crate::error::{ErrorKind, Result, RuntimeError};
use crate::script::Value;
use crate::vm::Vm;

use super::{get_var, Builtin, Reply};

/// Open modes accepted by `OpenF`.
const MODE_READ: i64 = 0;
const MODE_CREATE: i64 = 1;
const MODE_READ_WRITE: i64 = 2;

pub fn open_file(vm: &mut Vm, name: &Value, mode: &Value) -> Result<Value> {
    let name = name.to_string();
    let path = vm.resolve_path(&name);
    let mut options = OpenOptions::new();
    match mode.as_int() {
        MODE_READ => options.read(true),
        MODE_CREATE => options.read(true).write(true).create(true).truncate(true),
        MODE_READ_WRITE => options.read(true).write(true).create(true),
        other => {
            return Err(RuntimeError::invalid_argument(format!(
                "OpenF: unknown mode {other} for {name:?}"
            )))
        }
    };
    let file = options.open(&path).map_err(|e| {
        let err = RuntimeError::from(e);
        RuntimeError::new(err.kind, format!("OpenF {}: {}", path.display(), err.message))
    })?;
    let handle = vm.files_mut().open(file);
    log::debug!("OpenF {} -> handle {handle}", path.display());
    Ok(Value::Int(handle))
}

pub fn close_file(vm: &mut Vm, handle: &Value) -> Result<Value> {
    vm.files_mut().close(handle.as_int())?;
    Ok(Value::Int(0))
}

pub fn read_file(vm: &mut Vm, handle: &Value, size: &Value) -> Result<Value> {
    let entry = vm.files_mut().get(handle.as_int())?;
    let v = entry.read_uint(size.as_int())?;
    Ok(Value::Int(v as i64))
}

pub fn write_file(vm: &mut Vm, handle: &Value, value: &Value, size: &Value) -> Result<Value> {
    let entry = vm.files_mut().get(handle.as_int())?;
    entry.write_uint(size.as_int(), value.as_int())?;
    Ok(Value::Int(0))
}

pub fn seek_file(vm: &mut Vm, handle: &Value, offset: &Value, origin: &Value) -> Result<Value> {
    let entry = vm.files_mut().get(handle.as_int())?;
    let pos = entry.seek(offset.as_int(), origin.as_int())?;
    Ok(Value::Int(pos as i64))
}

pub fn read_line(vm: &mut Vm, handle: &Value) -> Result<Value> {
    let codec = vm.codec();
    let entry = vm.files_mut().get(handle.as_int())?;
    Ok(Value::Text(entry.read_line(&codec)?))
}

pub fn write_text(vm: &mut Vm, handle: &Value, text: &Value) -> Result<Value> {
    let codec = vm.codec();
    let entry = vm.files_mut().get(handle.as_int())?;
    entry.write_text(&codec, &text.to_string())?;
    Ok(Value::Int(0))
}

pub fn is_exist(vm: &mut Vm, name: &Value) -> Result<Value> {
    let path = vm.resolve_path(&name.to_string());
    Ok(Value::bool(path.exists()))
}

fn require_handle(name: &str, args: &[Value]) -> Result<()> {
    if args.is_empty() {
        return Err(RuntimeError::new(
            ErrorKind::InvalidHandle,
            format!("{name}: missing file handle"),
        ));
    }
    Ok(())
}

pub struct OpenF;
impl Builtin for OpenF {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        open_file(vm, get_var!(args, 0), get_var!(args, 1)).map(Reply::Value)
    }
}

pub struct CloseF;
impl Builtin for CloseF {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        require_handle("CloseF", &args)?;
        close_file(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct ReadF;
impl Builtin for ReadF {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        require_handle("ReadF", &args)?;
        read_file(vm, get_var!(args, 0), get_var!(args, 1)).map(Reply::Value)
    }
}

pub struct WriteF;
impl Builtin for WriteF {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        require_handle("WriteF", &args)?;
        write_file(vm, get_var!(args, 0), get_var!(args, 1), get_var!(args, 2)).map(Reply::Value)
    }
}

pub struct SeekF;
impl Builtin for SeekF {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        require_handle("SeekF", &args)?;
        seek_file(vm, get_var!(args, 0), get_var!(args, 1), get_var!(args, 2)).map(Reply::Value)
    }
}

pub struct StrReadF;
impl Builtin for StrReadF {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        require_handle("StrReadF", &args)?;
        read_line(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct StrWriteF;
impl Builtin for StrWriteF {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        require_handle("StrWriteF", &args)?;
        write_text(vm, get_var!(args, 0), get_var!(args, 1)).map(Reply::Value)
    }
}

pub struct IsExist;
impl Builtin for IsExist {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        is_exist(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::NullAudio, config::VmConfigBuilder, script::Program};
    use pretty_assertions::assert_eq;

    fn vm_in(dir: &std::path::Path) -> Vm {
        let config = VmConfigBuilder::new().base_dir(dir).get();
        Vm::new(Program::default(), config, Box::new(NullAudio::default())).unwrap()
    }

    #[test]
    fn text_and_binary_through_handles() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = vm_in(dir.path());
        let name = Value::text("SAVE\\score.dat");
        std::fs::create_dir(dir.path().join("save")).unwrap();

        let h = open_file(&mut vm, &name, &Value::Int(MODE_CREATE)).unwrap();
        assert_eq!(h, Value::Int(1));
        write_text(&mut vm, &h, &Value::text("ハイスコア")).unwrap();
        write_file(&mut vm, &h, &Value::Int(0x0A), &Value::Int(1)).unwrap();
        write_file(&mut vm, &h, &Value::Int(0xBEEF), &Value::Int(2)).unwrap();
        close_file(&mut vm, &h).unwrap();

        assert_eq!(is_exist(&mut vm, &Value::text("save/SCORE.DAT")).unwrap(), Value::Int(1));

        let h = open_file(&mut vm, &name, &Value::Int(MODE_READ)).unwrap();
        assert_eq!(read_line(&mut vm, &h).unwrap(), Value::text("ハイスコア"));
        assert_eq!(read_file(&mut vm, &h, &Value::Int(2)).unwrap(), Value::Int(0xBEEF));
        assert_eq!(seek_file(&mut vm, &h, &Value::Int(0), &Value::Int(2)).unwrap(), Value::Int(13));
        close_file(&mut vm, &h).unwrap();
    }

    #[test]
    fn missing_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = vm_in(dir.path());
        let err = open_file(&mut vm, &Value::text("nope.txt"), &Value::Int(MODE_READ)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FileNotFound);
        assert!(!err.is_fatal());
        assert_eq!(is_exist(&mut vm, &Value::text("nope.txt")).unwrap(), Value::Int(0));
    }

    #[test]
    fn bad_handles_report_invalid_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = vm_in(dir.path());
        let err = ReadF.call(&mut vm, vec![Value::Int(3), Value::Int(1)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidHandle);
        let err = CloseF.call(&mut vm, vec![]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidHandle);
    }
}
