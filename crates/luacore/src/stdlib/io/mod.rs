// IO library implementation
// Implements: close, flush, input, lines, open, output, read, write, type

use crate::lib_registry::LibraryModule;
use crate::lua_value::{LuaUserdata, LuaValue};
use crate::lua_vm::{LuaResult, LuaState};
use std::io::Write;

mod file;
pub use file::{LuaFile, ReadNumberResult, create_file_metatable};

pub fn create_io_lib() -> LibraryModule {
    crate::lib_module!("io", {
        "write" => io_write,
        "read" => io_read,
        "flush" => io_flush,
        "open" => io_open,
        "lines" => io_lines,
        "input" => io_input,
        "output" => io_output,
        "type" => io_type,
        "tmpfile" => io_tmpfile,
        "close" => io_close,
        "popen" => io_popen,
    })
}

/// Wrap a raw byte buffer as a Lua string value, preserving every byte
/// (bytes >= 0x80 must survive unchanged; this is what `io.read`/`file:read`
/// hand back to Lua code that may pattern-match or pack/unpack the result).
fn bytes_to_lua_value(l: &mut LuaState, bytes: Vec<u8>) -> LuaResult<LuaValue> {
    if let Ok(s) = String::from_utf8(bytes.clone()) {
        Ok(l.create_string_owned(s))
    } else {
        Ok(l.create_binary(bytes))
    }
}

// Note: stdin, stdout, stderr should be initialized separately with init_io_streams()

fn default_input_key(l: &mut LuaState) -> LuaValue {
    l.create_string("_default_input")
}

fn default_output_key(l: &mut LuaState) -> LuaValue {
    l.create_string("_default_output")
}

fn io_table(l: &mut LuaState) -> LuaResult<LuaValue> {
    l.get_global("io")
        .ok_or_else(|| l.error("io table not found".to_string()))
}

fn get_default_input(l: &mut LuaState) -> LuaResult<LuaValue> {
    let io_tbl = io_table(l)?;
    let key = default_input_key(l);
    match l.raw_get(&io_tbl, &key) {
        Some(v) if !v.is_nil() => Ok(v),
        _ => {
            let stdin_key = l.create_string("stdin");
            l.raw_get(&io_tbl, &stdin_key)
                .ok_or_else(|| l.error("io.stdin not found".to_string()))
        }
    }
}

fn get_default_output(l: &mut LuaState) -> LuaResult<LuaValue> {
    let io_tbl = io_table(l)?;
    let key = default_output_key(l);
    match l.raw_get(&io_tbl, &key) {
        Some(v) if !v.is_nil() => Ok(v),
        _ => {
            let stdout_key = l.create_string("stdout");
            l.raw_get(&io_tbl, &stdout_key)
                .ok_or_else(|| l.error("io.stdout not found".to_string()))
        }
    }
}

fn set_default_input(l: &mut LuaState, file: LuaValue) -> LuaResult<()> {
    let io_tbl = io_table(l)?;
    let key = default_input_key(l);
    l.raw_set(&io_tbl, key, file);
    Ok(())
}

fn set_default_output(l: &mut LuaState, file: LuaValue) -> LuaResult<()> {
    let io_tbl = io_table(l)?;
    let key = default_output_key(l);
    l.raw_set(&io_tbl, key, file);
    Ok(())
}

fn wrap_file(l: &mut LuaState, file: LuaFile) -> LuaResult<LuaValue> {
    let file_mt = create_file_metatable(l)?;
    let userdata = l.create_userdata(LuaUserdata::new(file));
    if let Some(ud) = l.get_userdata_mut(&userdata) {
        ud.set_metatable(file_mt);
    }
    Ok(userdata)
}

/// Initialize io standard streams (called after library registration)
pub fn init_io_streams(l: &mut LuaState) -> LuaResult<()> {
    let io_table = l.get_global("io")
        .ok_or_else(|| l.error("io table not found".to_string()))?;

    let Some(io_id) = io_table.as_table_id() else {
        return Err(l.error("io must be a table".to_string()));
    };

    // Create stdin
    let stdin_val = create_stdin(l)?;
    let stdin_key = l.create_string("stdin");
    {
        let vm = l.vm_mut();
        let Some(io_tbl) = vm.object_pool.get_table_mut(io_id) else {
            return Err(l.error("io table not found".to_string()));
        };
        io_tbl.raw_set(stdin_key, stdin_val.clone());
    }

    // Create stdout
    let stdout_val = create_stdout(l)?;
    let stdout_key = l.create_string("stdout");
    {
        let vm = l.vm_mut();
        let Some(io_tbl) = vm.object_pool.get_table_mut(io_id) else {
            return Err(l.error("io table not found".to_string()));
        };
        io_tbl.raw_set(stdout_key, stdout_val.clone());
    }

    // Create stderr
    let stderr_val = create_stderr(l)?;
    let stderr_key = l.create_string("stderr");
    {
        let vm = l.vm_mut();
        let Some(io_tbl) = vm.object_pool.get_table_mut(io_id) else {
            return Err(l.error("io table not found".to_string()));
        };
        io_tbl.raw_set(stderr_key, stderr_val);
    }

    set_default_input(l, stdin_val)?;
    set_default_output(l, stdout_val)?;

    Ok(())
}

/// Create stdin file handle
fn create_stdin(l: &mut LuaState) -> LuaResult<LuaValue> {
    wrap_file(l, LuaFile::stdin())
}

/// Create stdout file handle
fn create_stdout(l: &mut LuaState) -> LuaResult<LuaValue> {
    wrap_file(l, LuaFile::stdout())
}

/// Create stderr file handle
fn create_stderr(l: &mut LuaState) -> LuaResult<LuaValue> {
    wrap_file(l, LuaFile::stderr())
}

/// Read a sequence of formats (mirroring C Lua's `g_read`) from a single
/// already-open `LuaFile`, pushing each result and returning the count.
/// Shared by `file:read`, `io.read`, and the `io.lines`/`file:lines` iterators.
fn read_formats(l: &mut LuaState, lua_file: &mut LuaFile, formats: &[LuaValue]) -> LuaResult<usize> {
    read_formats_inner(l, lua_file, formats).map(|(n, _)| n)
}

/// Like `read_formats`, but also reports whether the very first format hit
/// EOF (nil) — used by the `io.lines`/`file:lines` iterators to decide
/// whether to auto-close the file.
fn read_formats_inner(
    l: &mut LuaState,
    lua_file: &mut LuaFile,
    formats: &[LuaValue],
) -> LuaResult<(usize, bool)> {
    let mut nresults = 0;
    let mut success = true;
    let mut first_nil = false;

    for fmt in formats {
        if !success {
            l.push_value(LuaValue::nil())?;
            nresults += 1;
            continue;
        }

        macro_rules! handle_read_err {
            ($e:expr, $l:expr, $nresults:expr) => {{
                $l.push_value(LuaValue::nil())?;
                let msg = $l.create_string(&format!("{}", $e));
                $l.push_value(msg)?;
                let errno = $e.raw_os_error().unwrap_or(0);
                $l.push_value(LuaValue::integer(errno as i64))?;
                return Ok($nresults + 3);
            }};
        }

        if let Some(n) = fmt.as_integer() {
            let n = n as usize;
            if n == 0 {
                match lua_file.is_eof() {
                    Ok(true) => {
                        l.push_value(LuaValue::nil())?;
                        success = false;
                    if nresults == 0 { first_nil = true; }
                    }
                    _ => {
                        let s = l.create_string("");
                        l.push_value(s)?;
                    }
                }
                nresults += 1;
                continue;
            }
            match lua_file.read_bytes(n) {
                Ok(bytes) => {
                    if bytes.is_empty() {
                        l.push_value(LuaValue::nil())?;
                        success = false;
                    if nresults == 0 { first_nil = true; }
                    } else {
                        let str_val = bytes_to_lua_value(l, bytes)?;
                        l.push_value(str_val)?;
                    }
                }
                Err(e) => handle_read_err!(e, l, nresults),
            }
            nresults += 1;
            continue;
        }

        let format_str = fmt.as_str().map(|s| s.to_string()).unwrap_or_else(|| "l".to_string());
        let format = format_str.strip_prefix('*').unwrap_or(&format_str);
        let first_char = format.chars().next().unwrap_or('l');

        let result: LuaValue = match first_char {
            'l' => match lua_file.read_line() {
                Ok(Some(line)) => l.create_string(&line),
                Ok(None) => {
                    success = false;
                    if nresults == 0 { first_nil = true; }
                    LuaValue::nil()
                }
                Err(e) => handle_read_err!(e, l, nresults),
            },
            'L' => match lua_file.read_line_with_newline() {
                Ok(Some(line)) => l.create_string(&line),
                Ok(None) => {
                    success = false;
                    if nresults == 0 { first_nil = true; }
                    LuaValue::nil()
                }
                Err(e) => handle_read_err!(e, l, nresults),
            },
            'a' => match lua_file.read_all() {
                Ok(content) => bytes_to_lua_value(l, content)?,
                Err(e) => handle_read_err!(e, l, nresults),
            },
            'n' => match lua_file.read_number() {
                Ok(Some(ReadNumberResult::Integer(n))) => LuaValue::integer(n),
                Ok(Some(ReadNumberResult::Float(n))) => LuaValue::float(n),
                Ok(None) => {
                    success = false;
                    if nresults == 0 { first_nil = true; }
                    LuaValue::nil()
                }
                Err(e) => handle_read_err!(e, l, nresults),
            },
            _ => {
                return Err(l.error(format!("invalid format: {}", format)));
            }
        };

        l.push_value(result)?;
        nresults += 1;
    }

    Ok((nresults, first_nil))
}

/// io.write(...) - Write to the default output file
fn io_write(l: &mut LuaState) -> LuaResult<usize> {
    let out = get_default_output(l)?;
    let mut i = 1;
    if let Some(ud) = l.get_userdata(&out) {
        let data = ud.get_data();
        let mut data_ref = data.borrow_mut();
        if let Some(lua_file) = data_ref.as_any_mut().downcast_mut::<LuaFile>() {
            loop {
                let arg = match l.get_arg(i) {
                    Some(v) => v,
                    None => break,
                };

                let write_result = if let Some(s) = l.get_string(&arg) {
                    lua_file.write(&s)
                } else if let Some(n) = arg.as_number() {
                    lua_file.write(&n.to_string())
                } else {
                    return Err(l.error("bad argument to 'write' (string or number expected)".to_string()));
                };

                if let Err(e) = write_result {
                    return Err(l.error(format!("write error: {}", e)));
                }
                i += 1;
            }
        }
    }

    l.push_value(out)?;
    Ok(1)
}

/// io.read([format, ...]) - Read from the default input file
fn io_read(l: &mut LuaState) -> LuaResult<usize> {
    let input = get_default_input(l)?;

    let mut formats = Vec::new();
    let mut i = 1;
    loop {
        match l.get_arg(i) {
            Some(v) => formats.push(v),
            None => break,
        }
        i += 1;
    }
    if formats.is_empty() {
        formats.push(LuaValue::nil());
    }

    if let Some(ud) = l.get_userdata(&input) {
        let data = ud.get_data();
        let mut data_ref = data.borrow_mut();
        if let Some(lua_file) = data_ref.as_any_mut().downcast_mut::<LuaFile>() {
            return read_formats(l, lua_file, &formats);
        }
    }

    Err(l.error("default input is not a file handle".to_string()))
}

/// io.flush() - Flush the default output file
fn io_flush(l: &mut LuaState) -> LuaResult<usize> {
    let out = get_default_output(l)?;
    if let Some(ud) = l.get_userdata(&out) {
        let data = ud.get_data();
        let mut data_ref = data.borrow_mut();
        if let Some(lua_file) = data_ref.as_any_mut().downcast_mut::<LuaFile>() {
            let _ = lua_file.flush();
        }
    } else {
        std::io::stdout().flush().ok();
    }
    Ok(0)
}

/// io.open(filename [, mode]) - Open a file
fn io_open(l: &mut LuaState) -> LuaResult<usize> {
    let filename_val = l.get_arg(1)
        .ok_or_else(|| l.error("bad argument #1 to 'io.open' (string expected)".to_string()))?;
    let filename_str = match l.get_string(&filename_val) {
        Some(s) => s.as_str().to_string(),
        None => return Err(l.error("bad argument #1 to 'io.open' (string expected)".to_string())),
    };

    let mode_str = l.get_arg(2)
        .and_then(|v| l.get_string(&v).map(|s| s.as_str().to_string()))
        .unwrap_or_else(|| "r".to_string());
    let mode = mode_str.trim_end_matches('b');

    let file_result = match mode {
        "r" => LuaFile::open_read(&filename_str),
        "w" => LuaFile::open_write(&filename_str),
        "a" => LuaFile::open_append(&filename_str),
        "r+" => LuaFile::open_readwrite(&filename_str),
        "w+" => LuaFile::open_write_read(&filename_str),
        "a+" => LuaFile::open_append_read(&filename_str),
        _ => return Err(l.error(format!("invalid mode: {}", mode))),
    };

    match file_result {
        Ok(file) => {
            let userdata = wrap_file(l, file)?;
            l.push_value(userdata)?;
            Ok(1)
        }
        Err(e) => {
            l.push_value(LuaValue::nil())?;
            let err_str = l.create_string(&format!("{}: {}", filename_str, e));
            l.push_value(err_str)?;
            Ok(2)
        }
    }
}

/// io.lines([filename [, formats]]) - Return iterator for lines
fn io_lines(l: &mut LuaState) -> LuaResult<usize> {
    let filename = l.get_arg(1);

    let (userdata, noclose) = if let Some(filename_val) = filename.filter(|v| !v.is_nil()) {
        let filename_str = match l.get_string(&filename_val) {
            Some(s) => s.as_str().to_string(),
            None => return Err(l.error("bad argument #1 to 'lines' (string expected)".to_string())),
        };

        match LuaFile::open_read(&filename_str) {
            Ok(file) => (wrap_file(l, file)?, false),
            Err(e) => return Err(l.error(format!("cannot open file '{}': {}", filename_str, e))),
        }
    } else {
        (get_default_input(l)?, true)
    };

    // Collect any trailing format arguments (io.lines(filename, fmt...))
    let mut formats = Vec::new();
    let mut i = 2;
    loop {
        match l.get_arg(i) {
            Some(v) => formats.push(v),
            None => break,
        }
        i += 1;
    }

    let state_table = l.create_table(0, 3);
    let file_key = l.create_string("file");
    l.raw_set(&state_table, file_key, userdata);
    let noclose_key = l.create_string("noclose");
    l.raw_set(&state_table, noclose_key, LuaValue::boolean(noclose));
    let fmts_table = l.create_table(formats.len(), 0);
    for (idx, fmt) in formats.iter().enumerate() {
        l.raw_seti(&fmts_table, (idx + 1) as i64, fmt.clone());
    }
    let fmts_key = l.create_string("fmts");
    l.raw_set(&state_table, fmts_key, fmts_table);
    let nfmts_key = l.create_string("nfmts");
    l.raw_set(&state_table, nfmts_key, LuaValue::integer(formats.len() as i64));

    l.push_value(LuaValue::cfunction(io_lines_call))?;
    l.push_value(state_table)?;
    l.push_value(LuaValue::nil())?;
    Ok(3)
}

/// Shared iterator body for both `io.lines` and `file:lines`: arg1 is the
/// state table with `file`, `fmts`, `nfmts`, `noclose` fields.
pub(crate) fn io_lines_call(l: &mut LuaState) -> LuaResult<usize> {
    let state_val = l.get_arg(1)
        .ok_or_else(|| l.error("iterator requires state".to_string()))?;

    let file_key = l.create_string("file");
    let file_val = l.raw_get(&state_val, &file_key)
        .ok_or_else(|| l.error("file not found in state".to_string()))?;
    let fmts_key = l.create_string("fmts");
    let nfmts_key = l.create_string("nfmts");
    let noclose_key = l.create_string("noclose");
    let nfmts = l.raw_get(&state_val, &nfmts_key).and_then(|v| v.as_integer()).unwrap_or(0);
    let noclose = l.raw_get(&state_val, &noclose_key).map(|v| v.is_truthy()).unwrap_or(true);

    let mut formats = Vec::new();
    if nfmts > 0 {
        let fmts_table = l.raw_get(&state_val, &fmts_key)
            .ok_or_else(|| l.error("fmts not found in state".to_string()))?;
        for idx in 1..=nfmts {
            if let Some(v) = l.raw_geti(&fmts_table, idx) {
                formats.push(v);
            }
        }
    }
    if formats.is_empty() {
        formats.push(LuaValue::nil());
    }

    let Some(ud) = l.get_userdata(&file_val) else {
        return Err(l.error("expected file handle".to_string()));
    };
    let data = ud.get_data();
    let mut data_ref = data.borrow_mut();
    let Some(lua_file) = data_ref.as_any_mut().downcast_mut::<LuaFile>() else {
        return Err(l.error("expected file handle".to_string()));
    };

    if lua_file.is_closed() {
        l.push_value(LuaValue::nil())?;
        return Ok(1);
    }

    let (n, first_is_nil) = read_formats_inner(l, lua_file, &formats)?;
    // An exhausted file opened by io.lines(filename) gets closed automatically;
    // file:lines() and io.lines() (stdin) never auto-close.
    if first_is_nil && !noclose && !lua_file.is_std_stream() {
        let _ = lua_file.close();
    }

    Ok(n)
}

/// io.input([file]) - Set or get default input file
fn io_input(l: &mut LuaState) -> LuaResult<usize> {
    if let Some(arg) = l.get_arg(1) {
        let file_val = if let Some(name) = l.get_string(&arg) {
            let name = name.as_str().to_string();
            match LuaFile::open_read(&name) {
                Ok(f) => wrap_file(l, f)?,
                Err(e) => return Err(l.error(format!("cannot open {}: {}", name, e))),
            }
        } else {
            arg
        };
        set_default_input(l, file_val.clone())?;
        l.push_value(file_val)?;
        return Ok(1);
    }

    let cur = get_default_input(l)?;
    l.push_value(cur)?;
    Ok(1)
}

/// io.output([file]) - Set or get default output file
fn io_output(l: &mut LuaState) -> LuaResult<usize> {
    if let Some(arg) = l.get_arg(1) {
        let file_val = if let Some(name) = l.get_string(&arg) {
            let name = name.as_str().to_string();
            match LuaFile::open_write(&name) {
                Ok(f) => wrap_file(l, f)?,
                Err(e) => return Err(l.error(format!("cannot open {}: {}", name, e))),
            }
        } else {
            arg
        };
        set_default_output(l, file_val.clone())?;
        l.push_value(file_val)?;
        return Ok(1);
    }

    let cur = get_default_output(l)?;
    l.push_value(cur)?;
    Ok(1)
}

/// io.type(obj) - Check if obj is a file handle
fn io_type(l: &mut LuaState) -> LuaResult<usize> {
    let obj = l.get_arg(1);

    if let Some(val) = obj {
        if let Some(ud) = l.get_userdata(&val) {
            let data = ud.get_data();
            let data_ref = data.borrow();
            if let Some(lua_file) = data_ref.as_any().downcast_ref::<LuaFile>() {
                let result = if lua_file.is_closed() {
                    l.create_string("closed file")
                } else {
                    l.create_string("file")
                };
                l.push_value(result)?;
                return Ok(1);
            }
        }
    }

    l.push_value(LuaValue::nil())?;
    Ok(1)
}

/// io.tmpfile() - Create a temporary file
fn io_tmpfile(l: &mut LuaState) -> LuaResult<usize> {
    match tempfile::tempfile() {
        Ok(file) => {
            let lua_file = LuaFile::from_file(file);
            let userdata = wrap_file(l, lua_file)?;
            l.push_value(userdata)?;
            Ok(1)
        }
        Err(e) => {
            l.push_value(LuaValue::nil())?;
            let err_str = l.create_string(&e.to_string());
            l.push_value(err_str)?;
            Ok(2)
        }
    }
}

/// io.close([file]) - Close a file, or the default output if none given
fn io_close(l: &mut LuaState) -> LuaResult<usize> {
    let file_val = match l.get_arg(1) {
        Some(v) => v,
        None => get_default_output(l)?,
    };

    if let Some(ud) = l.get_userdata(&file_val) {
        let data = ud.get_data();
        let mut data_ref = data.borrow_mut();
        if let Some(lua_file) = data_ref.as_any_mut().downcast_mut::<LuaFile>() {
            if lua_file.is_std_stream() {
                l.push_value(LuaValue::boolean(true))?;
                return Ok(1);
            }
            return match lua_file.close() {
                Ok(_) => {
                    l.push_value(LuaValue::boolean(true))?;
                    Ok(1)
                }
                Err(e) => Err(l.error(format!("close error: {}", e))),
            };
        }
    }

    Err(l.error("bad argument #1 to 'close' (file expected)".to_string()))
}

/// io.popen(prog [, mode]) - Execute program and return file handle
fn io_popen(l: &mut LuaState) -> LuaResult<usize> {
    // Spawning subprocesses is outside the sandboxed contract this runtime
    // offers hosts; report the standard "unsupported" failure like builds
    // of reference Lua configured without popen.
    l.push_value(LuaValue::nil())?;
    let msg = l.create_string("'popen' not supported");
    l.push_value(msg)?;
    Ok(2)
}
