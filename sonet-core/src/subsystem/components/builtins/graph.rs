use crate::error::Result;
use crate::script::Value;
use crate::vm::Vm;

use super::{Builtin, Reply};

/// Window, picture, cast and text primitives. Rendering is not supported;
/// these accept any arguments and return 0 so titles keep running.
pub const STUBS: [&str; 24] = [
    "OpenWin",
    "CloseWin",
    "CloseWinAll",
    "MoveWin",
    "CapTitle",
    "WinColor",
    "LoadPic",
    "CreatePic",
    "DelPic",
    "MovePic",
    "ReversePic",
    "PicWidth",
    "PicHeight",
    "PutCast",
    "DelCast",
    "MoveCast",
    "TextWrite",
    "TextColor",
    "BgColor",
    "BackMode",
    "SetFont",
    "DrawLine",
    "DrawRect",
    "GetColor",
];

pub struct Unimplemented(pub &'static str);

impl Builtin for Unimplemented {
    fn call(&self, _vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        log::trace!("{}({} args): graphics are not rendered", self.0, args.len());
        Ok(Reply::Value(Value::Int(0)))
    }
}
