use rand::Rng;
use sonet_nls::TextDecoder;

use crate::error::Result;
use crate::script::{Value, ValueArray};
use crate::vm::Vm;

use super::{get_var, Builtin, Reply};

fn text_of(v: &Value) -> String {
    v.to_string()
}

pub fn str_len(_vm: &mut Vm, s: &Value) -> Result<Value> {
    Ok(Value::Int(text_of(s).chars().count() as i64))
}

/// Characters `[start, start + len)`; a missing or negative length takes the rest.
pub fn sub_str(_vm: &mut Vm, s: &Value, start: &Value, len: &Value) -> Result<Value> {
    let s = text_of(s);
    let start = start.as_int().max(0) as usize;
    let chars = s.chars().skip(start);
    let out: String = match len {
        Value::Nil => chars.collect(),
        len if len.as_int() < 0 => chars.collect(),
        len => chars.take(len.as_int() as usize).collect(),
    };
    Ok(Value::Text(out))
}

/// Character index of the first occurrence, or -1.
pub fn str_find(_vm: &mut Vm, haystack: &Value, needle: &Value) -> Result<Value> {
    let haystack = text_of(haystack);
    let needle = text_of(needle);
    let index = haystack
        .find(&needle)
        .map(|byte| haystack[..byte].chars().count() as i64)
        .unwrap_or(-1);
    Ok(Value::Int(index))
}

pub fn str_up(_vm: &mut Vm, s: &Value) -> Result<Value> {
    Ok(Value::Text(text_of(s).to_ascii_uppercase()))
}

pub fn str_low(_vm: &mut Vm, s: &Value) -> Result<Value> {
    Ok(Value::Text(text_of(s).to_ascii_lowercase()))
}

/// Widths and precisions beyond this are clamped.
const MAX_FIELD_SIZE: usize = 4096;

fn field_size(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> usize {
    let mut n = 0usize;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = n.saturating_mul(10).saturating_add(d as usize);
        chars.next();
    }
    if n > MAX_FIELD_SIZE {
        log::warn!("StrPrint: field size {n} clamped to {MAX_FIELD_SIZE}");
        return MAX_FIELD_SIZE;
    }
    n
}

/// `printf`-style formatting: `%d %i %u %x %X %o %c %s %f %%` with optional
/// `-`, `0`, width and precision.
pub fn format_printf(fmt: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut args = args.iter();
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut left = false;
        let mut zero = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left = true,
                '0' => zero = true,
                _ => break,
            }
            chars.next();
        }
        let width = field_size(&mut chars);
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            precision = Some(field_size(&mut chars));
        }
        // length modifiers carry no meaning here
        while matches!(chars.peek(), Some('l' | 'h')) {
            chars.next();
        }

        let Some(conv) = chars.next() else {
            out.push('%');
            break;
        };
        let arg = args.next().unwrap_or(&Value::Nil);
        let body = match conv {
            'd' | 'i' => arg.as_int().to_string(),
            'u' => (arg.as_int() as u32).to_string(),
            'x' => format!("{:x}", arg.as_int() as u32),
            'X' => format!("{:X}", arg.as_int() as u32),
            'o' => format!("{:o}", arg.as_int() as u32),
            'c' => char::from_u32(arg.as_int() as u32).map(String::from).unwrap_or_default(),
            'f' => format!("{:.*}", precision.unwrap_or(6), arg.as_float()),
            's' => {
                let s = arg.to_string();
                match precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s,
                }
            }
            other => {
                log::warn!("StrPrint: unknown conversion %{other}");
                out.push('%');
                out.push(other);
                continue;
            }
        };

        let len = body.chars().count();
        if len >= width {
            out.push_str(&body);
        } else if left {
            out.push_str(&body);
            out.extend(std::iter::repeat(' ').take(width - len));
        } else if zero && matches!(conv, 'd' | 'i' | 'u' | 'x' | 'X' | 'o' | 'f') {
            let (sign, digits) = match body.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("", body.as_str()),
            };
            out.push_str(sign);
            out.extend(std::iter::repeat('0').take(width - len));
            out.push_str(digits);
        } else {
            out.extend(std::iter::repeat(' ').take(width - len));
            out.push_str(&body);
        }
    }
    out
}

pub fn str_print(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let Some((fmt, rest)) = args.split_first() else {
        log::error!("StrPrint: missing format string");
        return Ok(Value::text(""));
    };
    Ok(Value::Text(format_printf(&text_of(fmt), rest)))
}

pub fn int_to_str(_vm: &mut Vm, value: &Value) -> Result<Value> {
    Ok(Value::Text(value.as_int().to_string()))
}

pub fn str_to_int(_vm: &mut Vm, value: &Value) -> Result<Value> {
    Ok(Value::Int(value.as_int()))
}

/// Character for a legacy code point: one byte below 0x100, else a
/// double-byte code with the lead byte high.
pub fn char_code(vm: &mut Vm, code: &Value) -> Result<Value> {
    let code = code.as_int();
    let bytes = match code {
        0..=0xFF => vec![code as u8],
        0x100..=0xFFFF => vec![(code >> 8) as u8, code as u8],
        _ => {
            log::error!("CharCode: {code} is not a character code");
            return Ok(Value::text(""));
        }
    };
    Ok(Value::Text(vm.codec().decode(&bytes).into_owned()))
}

/// Legacy code of the first character, 0 for an empty string.
pub fn str_code(vm: &mut Vm, s: &Value) -> Result<Value> {
    let s = text_of(s);
    let Some(first) = s.chars().next() else {
        return Ok(Value::Int(0));
    };
    let bytes = vm.codec().encode_owned(first.encode_utf8(&mut [0; 4]));
    let code = bytes.iter().fold(0i64, |acc, &b| (acc << 8) | b as i64);
    Ok(Value::Int(code))
}

/// Uniform in `[0, n)`; 0 when `n <= 0`.
pub fn random(vm: &mut Vm, n: &Value) -> Result<Value> {
    let n = n.as_int();
    if n <= 0 {
        return Ok(Value::Int(0));
    }
    Ok(Value::Int(vm.rng().gen_range(0..n)))
}

pub fn abs(_vm: &mut Vm, v: &Value) -> Result<Value> {
    Ok(match v {
        Value::Float(f) => Value::Float(f.abs()),
        other => Value::Int(other.as_int().wrapping_abs()),
    })
}

fn extreme(name: &str, args: &[Value], pick_left: fn(f64, f64) -> bool) -> Value {
    let Some(first) = args.first() else {
        log::error!("{name}: no arguments");
        return Value::Int(0);
    };
    let best = args[1..].iter().fold(first, |best, v| {
        if pick_left(best.as_float(), v.as_float()) {
            best
        } else {
            v
        }
    });
    match best {
        Value::Float(f) => Value::Float(*f),
        other => Value::Int(other.as_int()),
    }
}

pub fn max(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(extreme("Max", args, |a, b| a >= b))
}

pub fn min(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(extreme("Min", args, |a, b| a <= b))
}

pub fn make_long(_vm: &mut Vm, lo: &Value, hi: &Value) -> Result<Value> {
    let lo = lo.as_int() & 0xFFFF;
    let hi = hi.as_int() & 0xFFFF;
    Ok(Value::Int((hi << 16) | lo))
}

pub fn lo_word(_vm: &mut Vm, v: &Value) -> Result<Value> {
    Ok(Value::Int(v.as_int() & 0xFFFF))
}

pub fn hi_word(_vm: &mut Vm, v: &Value) -> Result<Value> {
    Ok(Value::Int((v.as_int() >> 16) & 0xFFFF))
}

fn expect_array<'a>(name: &str, v: &'a Value) -> Option<&'a ValueArray> {
    let array = v.as_array();
    if array.is_none() {
        log::error!("{name}: expected an array, got {}", v.type_name());
    }
    array
}

pub fn array_size(_vm: &mut Vm, array: &Value) -> Result<Value> {
    let len = expect_array("ArraySize", array).map_or(0, |a| a.len());
    Ok(Value::Int(len as i64))
}

pub fn del_array_all(_vm: &mut Vm, array: &Value) -> Result<Value> {
    if let Some(a) = expect_array("DelArrayAll", array) {
        a.clear();
    }
    Ok(Value::Int(0))
}

pub fn del_array_at(_vm: &mut Vm, array: &Value, index: &Value) -> Result<Value> {
    if let Some(a) = expect_array("DelArrayAt", array) {
        if a.remove(index.as_int()).is_none() {
            log::warn!("DelArrayAt: index {} out of range (len {})", index.as_int(), a.len());
        }
    }
    Ok(Value::Int(0))
}

pub fn ins_array_at(_vm: &mut Vm, array: &Value, index: &Value, value: &Value) -> Result<Value> {
    if let Some(a) = expect_array("InsArrayAt", array) {
        if !a.insert(index.as_int(), value.clone())? {
            log::warn!("InsArrayAt: negative index {}", index.as_int());
        }
    }
    Ok(Value::Int(0))
}

pub struct StrLen;
impl Builtin for StrLen {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        str_len(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct SubStr;
impl Builtin for SubStr {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        sub_str(vm, get_var!(args, 0), get_var!(args, 1), get_var!(args, 2)).map(Reply::Value)
    }
}

pub struct StrFind;
impl Builtin for StrFind {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        str_find(vm, get_var!(args, 0), get_var!(args, 1)).map(Reply::Value)
    }
}

pub struct StrUp;
impl Builtin for StrUp {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        str_up(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct StrLow;
impl Builtin for StrLow {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        str_low(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct StrPrint;
impl Builtin for StrPrint {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        str_print(vm, &args).map(Reply::Value)
    }
}

pub struct IntToStr;
impl Builtin for IntToStr {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        int_to_str(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct StrToInt;
impl Builtin for StrToInt {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        str_to_int(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct CharCode;
impl Builtin for CharCode {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        char_code(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct StrCode;
impl Builtin for StrCode {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        str_code(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct Random;
impl Builtin for Random {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        random(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct Abs;
impl Builtin for Abs {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        abs(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct Max;
impl Builtin for Max {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        max(vm, &args).map(Reply::Value)
    }
}

pub struct Min;
impl Builtin for Min {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        min(vm, &args).map(Reply::Value)
    }
}

pub struct MakeLong;
impl Builtin for MakeLong {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        make_long(vm, get_var!(args, 0), get_var!(args, 1)).map(Reply::Value)
    }
}

pub struct LoWord;
impl Builtin for LoWord {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        lo_word(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct HiWord;
impl Builtin for HiWord {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        hi_word(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct ArraySize;
impl Builtin for ArraySize {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        array_size(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct DelArrayAll;
impl Builtin for DelArrayAll {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        del_array_all(vm, get_var!(args, 0)).map(Reply::Value)
    }
}

pub struct DelArrayAt;
impl Builtin for DelArrayAt {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        del_array_at(vm, get_var!(args, 0), get_var!(args, 1)).map(Reply::Value)
    }
}

pub struct InsArrayAt;
impl Builtin for InsArrayAt {
    fn call(&self, vm: &mut Vm, args: Vec<Value>) -> Result<Reply> {
        ins_array_at(vm, get_var!(args, 0), get_var!(args, 1), get_var!(args, 2)).map(Reply::Value)
    }
}
