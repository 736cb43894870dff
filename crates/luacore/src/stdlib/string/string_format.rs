/// Optimized string.format implementation
/// Reduced from 400+ lines to ~200 lines with better performance
use crate::{LuaResult, LuaValue, lua_vm::LuaState};

/// string.format(formatstring, ...) - Format with various specifiers
///
/// The result is built as raw bytes, not a Rust `String`: `%s`/`%q` on a
/// string argument must reproduce its bytes exactly, and a binary string
/// argument need not be valid UTF-8.
pub fn string_format(l: &mut LuaState) -> LuaResult<usize> {
    // Get format string
    let format_str_value = l.get_arg(1)
        .ok_or_else(|| l.error("bad argument #1 to 'format' (string expected)".to_string()))?;

    // The format string itself (not the arguments it formats) is treated as
    // text — lossy decoding here only affects non-ASCII bytes inside the
    // format template, which Lua programs don't put there in practice.
    let format = l.get_string(&format_str_value)
        .ok_or_else(|| l.error("bad argument #1 to 'format' (string expected)".to_string()))?;

    // Collect arguments
    let args = l.get_args();
    let mut arg_index = 1;

    // Pre-allocate result (estimate: format length + 50% for expansions)
    let mut result: Vec<u8> = Vec::with_capacity(format.len() + format.len() / 2);
    let mut chars = format.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            let mut buf = [0u8; 4];
            result.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }

        // Check for %%
        if matches!(chars.peek(), Some(&'%')) {
            chars.next();
            result.push(b'%');
            continue;
        }

        // Parse flags (-, +, space, #, 0)
        let mut flags = String::new();
        while let Some(&c) = chars.peek() {
            if matches!(c, '-' | '+' | ' ' | '#' | '0' | '1'..='9' | '.') {
                flags.push(c);
                chars.next();
            } else {
                break;
            }
        }

        // Get format character
        let fmt_char = chars.next()
            .ok_or_else(|| l.error("incomplete format".to_string()))?;

        // Get argument
        let arg = args.get(arg_index)
            .ok_or_else(|| l.error(format!("bad argument #{} to 'format' (no value)", arg_index + 1)))?;
        arg_index += 1;

        // Format based on type
        match fmt_char {
            'c' => format_char(&mut result, arg, l)?,
            'd' | 'i' => format_int(&mut result, arg, l)?,
            'o' => format_octal(&mut result, arg, &flags, l)?,
            'u' => format_uint(&mut result, arg, l)?,
            'x' => format_hex(&mut result, arg, &flags, false, l)?,
            'X' => format_hex(&mut result, arg, &flags, true, l)?,
            'e' => format_sci(&mut result, arg, &flags, false, l)?,
            'E' => format_sci(&mut result, arg, &flags, true, l)?,
            'f' => format_float(&mut result, arg, &flags, l)?,
            'g' => format_auto(&mut result, arg, false, l)?,
            'G' => format_auto(&mut result, arg, true, l)?,
            's' => format_string(&mut result, arg, l)?,
            'q' => format_quoted(&mut result, arg, l)?,
            _ => return Err(l.error(format!("invalid option '%{}' to 'format'", fmt_char))),
        }
    }

    let result_str = l.create_binary(result);
    l.push_value(result_str)?;
    Ok(1)
}

// Helper functions - all inline for performance

#[inline]
fn get_num(arg: &LuaValue, _l: &LuaState) -> Result<f64, String> {
    arg.as_number()
        .or_else(|| arg.as_integer().map(|i| i as f64))
        .ok_or_else(|| "bad argument to 'format' (number expected)".to_string())
}

#[inline]
fn get_int(arg: &LuaValue, _l: &LuaState) -> Result<i64, String> {
    arg.as_integer()
        .or_else(|| arg.as_number().map(|n| n as i64))
        .ok_or_else(|| "bad argument to 'format' (number expected)".to_string())
}

#[inline]
fn format_char(buf: &mut Vec<u8>, arg: &LuaValue, l: &mut LuaState) -> LuaResult<()> {
    let num = get_int(arg, l).map_err(|e| l.error(e))?;
    if (0..=255).contains(&num) {
        buf.push(num as u8);
        Ok(())
    } else {
        Err(l.error("bad argument to 'format' (value out of range for %c)".to_string()))
    }
}

#[inline]
fn format_int(buf: &mut Vec<u8>, arg: &LuaValue, l: &mut LuaState) -> LuaResult<()> {
    let num = get_int(arg, l).map_err(|e| l.error(e))?;
    buf.extend_from_slice(num.to_string().as_bytes());
    Ok(())
}

#[inline]
fn format_octal(buf: &mut Vec<u8>, arg: &LuaValue, flags: &str, l: &mut LuaState) -> LuaResult<()> {
    let num = get_int(arg, l).map_err(|e| l.error(e))?;
    let s = format!("{:o}", num);
    if flags.contains('#') && !s.starts_with('0') {
        buf.push(b'0');
    }
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

#[inline]
fn format_uint(buf: &mut Vec<u8>, arg: &LuaValue, l: &mut LuaState) -> LuaResult<()> {
    let num = get_int(arg, l).map_err(|e| l.error(e))?;
    buf.extend_from_slice((num as u64).to_string().as_bytes());
    Ok(())
}

#[inline]
fn format_hex(buf: &mut Vec<u8>, arg: &LuaValue, flags: &str, upper: bool, l: &mut LuaState) -> LuaResult<()> {
    let num = get_int(arg, l).map_err(|e| l.error(e))?;

    if flags.contains('#') && num != 0 {
        buf.extend_from_slice(if upper { b"0X" } else { b"0x" });
    }

    if upper {
        buf.extend_from_slice(format!("{:X}", num).as_bytes());
    } else {
        buf.extend_from_slice(format!("{:x}", num).as_bytes());
    }
    Ok(())
}

#[inline]
fn format_sci(buf: &mut Vec<u8>, arg: &LuaValue, flags: &str, upper: bool, l: &mut LuaState) -> LuaResult<()> {
    let num = get_num(arg, l).map_err(|e| l.error(e))?;

    // Parse precision from flags (e.g., ".2")
    if let Some(dot_pos) = flags.find('.') {
        if let Ok(prec) = flags[dot_pos + 1..].trim_end_matches(|c: char| !c.is_ascii_digit()).parse::<usize>() {
            if upper {
                buf.extend_from_slice(format!("{:.prec$E}", num, prec = prec).as_bytes());
            } else {
                buf.extend_from_slice(format!("{:.prec$e}", num, prec = prec).as_bytes());
            }
            return Ok(());
        }
    }

    if upper {
        buf.extend_from_slice(format!("{:E}", num).as_bytes());
    } else {
        buf.extend_from_slice(format!("{:e}", num).as_bytes());
    }
    Ok(())
}

#[inline]
fn format_float(buf: &mut Vec<u8>, arg: &LuaValue, flags: &str, l: &mut LuaState) -> LuaResult<()> {
    let num = get_num(arg, l).map_err(|e| l.error(e))?;

    // Parse precision from flags (e.g., ".2")
    if let Some(dot_pos) = flags.find('.') {
        if let Ok(prec) = flags[dot_pos + 1..].trim_end_matches(|c: char| !c.is_ascii_digit()).parse::<usize>() {
            buf.extend_from_slice(format!("{:.prec$}", num, prec = prec).as_bytes());
            return Ok(());
        }
    }

    buf.extend_from_slice(num.to_string().as_bytes());
    Ok(())
}

#[inline]
fn format_auto(buf: &mut Vec<u8>, arg: &LuaValue, upper: bool, l: &mut LuaState) -> LuaResult<()> {
    let num = get_num(arg, l).map_err(|e| l.error(e))?;

    // Use scientific for very large/small numbers
    if num.abs() < 0.0001 || num.abs() >= 1e10 {
        if upper {
            buf.extend_from_slice(format!("{:E}", num).as_bytes());
        } else {
            buf.extend_from_slice(format!("{:e}", num).as_bytes());
        }
    } else {
        buf.extend_from_slice(num.to_string().as_bytes());
    }
    Ok(())
}

#[inline]
fn format_string(buf: &mut Vec<u8>, arg: &LuaValue, l: &mut LuaState) -> LuaResult<()> {
    if arg.as_string_id().is_some() {
        let bytes = l.get_binary(arg)
            .ok_or_else(|| l.error("invalid string".to_string()))?;
        buf.extend_from_slice(&bytes);
    } else if let Some(n) = arg.as_integer() {
        buf.extend_from_slice(n.to_string().as_bytes());
    } else if let Some(n) = arg.as_number() {
        buf.extend_from_slice(n.to_string().as_bytes());
    } else {
        let s = l.to_string(arg)?;
        buf.extend_from_slice(s.as_bytes());
    }
    Ok(())
}

#[inline]
fn format_quoted(buf: &mut Vec<u8>, arg: &LuaValue, l: &mut LuaState) -> LuaResult<()> {
    if arg.as_string_id().is_none() {
        return Err(l.error("bad argument to 'format' (string expected for %q)".to_string()));
    }

    let bytes = l.get_binary(arg)
        .ok_or_else(|| l.error("invalid string".to_string()))?;

    buf.push(b'"');
    for &byte in &bytes {
        match byte {
            b'"' => buf.extend_from_slice(b"\\\""),
            b'\\' => buf.extend_from_slice(b"\\\\"),
            b'\n' => buf.extend_from_slice(b"\\n"),
            b'\r' => buf.extend_from_slice(b"\\r"),
            b'\t' => buf.extend_from_slice(b"\\t"),
            b if b < 0x20 || b == 0x7f => buf.extend_from_slice(format!("\\{}", b).as_bytes()),
            b => buf.push(b),
        }
    }
    buf.push(b'"');
    Ok(())
}
