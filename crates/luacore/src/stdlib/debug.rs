// Debug library
// Implements: traceback, getinfo, plus the argument-checking helpers
// (objtypename, argerror, arg_typeerror, typeerror) shared across the
// rest of the standard library and the VM's call path.

use crate::lib_registry::LibraryModule;
use crate::lua_value::{LuaValue, LuaValueKind};
use crate::lua_vm::{LuaError, LuaResult, LuaState};

pub fn create_debug_lib() -> LibraryModule {
    crate::lib_module!("debug", {
        "traceback" => debug_traceback,
        "getinfo" => debug_getinfo,
        "getmetatable" => debug_getmetatable,
        "setmetatable" => debug_setmetatable,
    })
}

/// Name used for error messages describing `v`'s type, following Lua's
/// convention of naming the metatable's `__name` field for userdata/tables
/// when present, falling back to the raw type name otherwise.
pub fn objtypename(l: &mut LuaState, v: &LuaValue) -> String {
    if let Some(mt) = crate::lua_vm::get_metatable(l, v) {
        let name_key = l.create_string("__name");
        if let Some(name_val) = l.table_get(&mt, &name_key)
            && let Some(name) = l.get_string(&name_val)
        {
            return name;
        }
    }
    v.type_name().to_string()
}

/// `luaL_argerror` equivalent: builds a "bad argument #n to 'fname' (msg)"
/// error, looking up the calling function's name from the current frame.
pub fn argerror(l: &mut LuaState, n: usize, msg: &str) -> LuaError {
    let fname = current_function_name(l);
    l.error(format!("bad argument #{} to '{}' ({})", n, fname, msg))
}

/// `luaL_typeerror` equivalent: reports that argument `n` was expected to
/// be of type `expected` but was actually `got`.
pub fn arg_typeerror(l: &mut LuaState, n: usize, expected: &str, got: &LuaValue) -> LuaError {
    let got_name = objtypename(l, got);
    argerror(l, n, &format!("{} expected, got {}", expected, got_name))
}

/// `luaG_callerror`/`luaG_typeerror` equivalent used by the VM when a value
/// is used in a way its type doesn't support (e.g. calling a non-function).
pub fn typeerror(l: &mut LuaState, v: &LuaValue, op: &str) -> LuaError {
    let name = objtypename(l, v);
    l.error(format!("attempt to {} a {} value", op, name))
}

fn current_function_name(_l: &LuaState) -> String {
    // Call frames don't carry the call-site name of the function being
    // invoked, so we fall back to Lua's own "?" placeholder.
    "?".to_string()
}

fn debug_traceback(l: &mut LuaState) -> LuaResult<usize> {
    // debug.traceback([message [, level]])
    let message = l.get_arg(1);
    let message_str = match message {
        None => None,
        Some(v) if v.is_nil() => None,
        Some(v) => match l.get_string(&v) {
            Some(s) => Some(s),
            None => {
                // Non-string, non-nil message is returned unchanged (matches Lua).
                l.push_value(v)?;
                return Ok(1);
            }
        },
    };

    let mut trace = String::new();
    if let Some(msg) = message_str {
        trace.push_str(&msg);
        trace.push('\n');
    }
    trace.push_str("stack traceback:\n");
    trace.push_str(&l.generate_traceback());

    let result = l.create_string(&trace);
    l.push_value(result)?;
    Ok(1)
}

fn debug_getinfo(l: &mut LuaState) -> LuaResult<usize> {
    // Minimal subset: {source, currentline, what, short_src}.
    let frame_info = l
        .current_frame()
        .map(|ci| (ci.is_lua(), ci.func, ci.pc));

    let (source, line, what) = match frame_info {
        Some((true, func, pc)) => {
            if let Some(body) = l.resolve_function(&func)
                && let Some(chunk) = body.chunk()
            {
                let source = chunk.source_name.clone().unwrap_or_else(|| "?".to_string());
                let line = if pc > 0 && (pc as usize - 1) < chunk.line_info.len() {
                    chunk.line_info[pc as usize - 1] as i64
                } else {
                    0
                };
                (source, line, "Lua")
            } else {
                ("?".to_string(), 0, "Lua")
            }
        }
        Some((false, _, _)) => ("=[C]".to_string(), -1, "C"),
        None => ("?".to_string(), 0, "main"),
    };

    let table_val = l.create_table(0, 4);

    let source_val = l.create_string(&source);
    let key = l.create_string("source");
    l.raw_set(&table_val, key, source_val);

    let key = l.create_string("short_src");
    let short_src = l.create_string(&source);
    l.raw_set(&table_val, key, short_src);

    let key = l.create_string("currentline");
    l.raw_set(&table_val, key, LuaValue::integer(line));

    let key = l.create_string("what");
    let what_val = l.create_string(what);
    l.raw_set(&table_val, key, what_val);

    l.push_value(table_val)?;
    Ok(1)
}

fn debug_getmetatable(l: &mut LuaState) -> LuaResult<usize> {
    let value = l
        .get_arg(1)
        .ok_or_else(|| l.error("bad argument #1 to 'getmetatable' (value expected)".to_string()))?;
    let mt = match value.kind() {
        LuaValueKind::Table => value
            .as_table_id()
            .and_then(|id| l.vm_mut().object_pool.get_table(id))
            .and_then(|t| t.get_metatable())
            .map(LuaValue::table),
        _ => None,
    };
    l.push_value(mt.unwrap_or(LuaValue::nil()))?;
    Ok(1)
}

fn debug_setmetatable(l: &mut LuaState) -> LuaResult<usize> {
    let value = l
        .get_arg(1)
        .ok_or_else(|| l.error("bad argument #1 to 'setmetatable' (value expected)".to_string()))?;
    let mt_arg = l.get_arg(2).unwrap_or(LuaValue::nil());

    if value.as_table_id().is_some() {
        match mt_arg.kind() {
            LuaValueKind::Nil => l.set_metatable(&value, None),
            LuaValueKind::Table => l.set_metatable(&value, mt_arg.as_table_id()),
            _ => {
                return Err(
                    l.error("bad argument #2 to 'setmetatable' (nil or table expected)".to_string())
                );
            }
        }
    }

    l.push_value(value)?;
    Ok(1)
}
