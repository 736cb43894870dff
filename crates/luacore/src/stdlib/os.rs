// OS library
// Implements: clock, date, difftime, execute, exit, getenv, remove, rename,
// setlocale, time, tmpname

use crate::lib_registry::LibraryModule;
use crate::lua_value::LuaValue;
use crate::lua_vm::{LuaResult, LuaState};
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};

pub fn create_os_lib() -> LibraryModule {
    crate::lib_module!("os", {
        "clock" => os_clock,
        "time" => os_time,
        "date" => os_date,
        "difftime" => os_difftime,
        "execute" => os_execute,
        "exit" => os_exit,
        "getenv" => os_getenv,
        "remove" => os_remove,
        "rename" => os_rename,
        "setlocale" => os_setlocale,
        "tmpname" => os_tmpname,
    })
}

fn os_clock(l: &mut LuaState) -> LuaResult<usize> {
    use std::time::Instant;

    thread_local! {
        static START_TIME: Instant = Instant::now();
    }

    let elapsed = START_TIME.with(|start| start.elapsed().as_secs_f64());
    l.push_value(LuaValue::float(elapsed))?;
    Ok(1)
}

fn os_time(l: &mut LuaState) -> LuaResult<usize> {
    // os.time([table])
    if let Some(table_val) = l.get_arg(1)
        && table_val.as_table_id().is_some()
    {
        let field = |l: &mut LuaState, name: &str| -> Option<i64> {
            let key = l.create_string(name);
            l.table_get(&table_val, &key).and_then(|v| v.as_integer())
        };

        let year = field(l, "year")
            .ok_or_else(|| l.error("field 'year' missing in date table".to_string()))?;
        let month = field(l, "month")
            .ok_or_else(|| l.error("field 'month' missing in date table".to_string()))?;
        let day = field(l, "day")
            .ok_or_else(|| l.error("field 'day' missing in date table".to_string()))?;
        let hour = field(l, "hour").unwrap_or(12);
        let min = field(l, "min").unwrap_or(0);
        let sec = field(l, "sec").unwrap_or(0);

        let datetime = Local
            .with_ymd_and_hms(
                year as i32,
                month.clamp(1, 12) as u32,
                day.clamp(1, 31) as u32,
                hour.clamp(0, 23) as u32,
                min.clamp(0, 59) as u32,
                sec.clamp(0, 61) as u32,
            )
            .single();

        return match datetime {
            Some(dt) => {
                l.push_value(LuaValue::integer(dt.timestamp()))?;
                Ok(1)
            }
            None => {
                l.push_value(LuaValue::nil())?;
                Ok(1)
            }
        };
    }

    let timestamp = Utc::now().timestamp();
    l.push_value(LuaValue::integer(timestamp))?;
    Ok(1)
}

fn os_difftime(l: &mut LuaState) -> LuaResult<usize> {
    let t2 = l
        .get_arg(1)
        .and_then(|v| v.as_number())
        .ok_or_else(|| l.error("bad argument #1 to 'difftime' (number expected)".to_string()))?;
    let t1 = l
        .get_arg(2)
        .and_then(|v| v.as_number())
        .ok_or_else(|| l.error("bad argument #2 to 'difftime' (number expected)".to_string()))?;

    l.push_value(LuaValue::float(t2 - t1))?;
    Ok(1)
}

fn os_date(l: &mut LuaState) -> LuaResult<usize> {
    let format = l
        .get_arg(1)
        .and_then(|v| l.get_string(&v))
        .unwrap_or_else(|| "%c".to_string());
    let time = l.get_arg(2).and_then(|v| v.as_integer());

    let (format, utc) = if let Some(rest) = format.strip_prefix('!') {
        (rest.to_string(), true)
    } else {
        (format, false)
    };

    let dt: DateTime<Utc> = match time {
        Some(t) => Utc
            .timestamp_opt(t, 0)
            .single()
            .ok_or_else(|| l.error("time result cannot be represented".to_string()))?,
        None => Utc::now(),
    };

    if format == "*t" {
        let (year, month, day, hour, min, sec, wday, yday) = if utc {
            (
                dt.year(),
                dt.month(),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second(),
                dt.weekday().num_days_from_sunday(),
                dt.ordinal(),
            )
        } else {
            let local = dt.with_timezone(&Local);
            (
                local.year(),
                local.month(),
                local.day(),
                local.hour(),
                local.minute(),
                local.second(),
                local.weekday().num_days_from_sunday(),
                local.ordinal(),
            )
        };

        let table_val = l.create_table(0, 8);
        let fields: &[(&str, i64)] = &[
            ("year", year as i64),
            ("month", month as i64),
            ("day", day as i64),
            ("hour", hour as i64),
            ("min", min as i64),
            ("sec", sec as i64),
            ("wday", wday as i64 + 1),
            ("yday", yday as i64),
        ];
        for (name, value) in fields {
            let key = l.create_string(name);
            l.raw_set(&table_val, key, LuaValue::integer(*value));
        }
        let isdst_key = l.create_string("isdst");
        l.raw_set(&table_val, isdst_key, LuaValue::boolean(false));

        l.push_value(table_val)?;
        return Ok(1);
    }

    let formatted = if utc {
        strftime(&format, &dt)
    } else {
        strftime(&format, &dt.with_timezone(&Local))
    };
    let result = l.create_string(&formatted);
    l.push_value(result)?;
    Ok(1)
}

/// Translate the handful of strftime directives chrono's `format()` shares
/// syntax with, plus Lua's `%c` default conversion.
fn strftime<Tz: chrono::TimeZone>(format: &str, dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let format = if format == "%c" {
        "%a %b %e %H:%M:%S %Y"
    } else {
        format
    };
    dt.format(format).to_string()
}

fn os_execute(l: &mut LuaState) -> LuaResult<usize> {
    use std::process::Command;

    let Some(cmd_val) = l.get_arg(1) else {
        // os.execute() with no arguments: report whether a shell is available.
        l.push_value(LuaValue::boolean(true))?;
        return Ok(1);
    };
    let cmd = l
        .get_string(&cmd_val)
        .ok_or_else(|| l.error("bad argument #1 to 'execute' (string expected)".to_string()))?;

    match Command::new("sh").arg("-c").arg(&cmd).output() {
        Ok(result) => {
            let exit_str = l.create_string("exit");
            l.push_value(LuaValue::boolean(result.status.success()))?;
            l.push_value(exit_str)?;
            l.push_value(LuaValue::integer(result.status.code().unwrap_or(-1) as i64))?;
            Ok(3)
        }
        Err(_) => {
            l.push_value(LuaValue::nil())?;
            Ok(1)
        }
    }
}

fn os_exit(l: &mut LuaState) -> LuaResult<usize> {
    let code = match l.get_arg(1) {
        None => 0,
        Some(v) if v.is_nil() => 0,
        Some(v) => match v.as_integer() {
            Some(i) => i as i32,
            None => i32::from(!v.as_boolean().unwrap_or(true)),
        },
    };
    std::process::exit(code);
}

fn os_getenv(l: &mut LuaState) -> LuaResult<usize> {
    let varname = l
        .get_arg(1)
        .and_then(|v| l.get_string(&v))
        .ok_or_else(|| l.error("bad argument #1 to 'getenv' (string expected)".to_string()))?;

    match std::env::var(&varname) {
        Ok(value) => {
            let result = l.create_string(&value);
            l.push_value(result)?;
        }
        Err(_) => l.push_value(LuaValue::nil())?,
    }
    Ok(1)
}

fn os_remove(l: &mut LuaState) -> LuaResult<usize> {
    let filename = l
        .get_arg(1)
        .and_then(|v| l.get_string(&v))
        .ok_or_else(|| l.error("bad argument #1 to 'remove' (string expected)".to_string()))?;

    match std::fs::remove_file(&filename) {
        Ok(_) => {
            l.push_value(LuaValue::boolean(true))?;
            Ok(1)
        }
        Err(e) => {
            let err_msg = l.create_string(&format!("{}: {}", filename, e));
            l.push_value(LuaValue::nil())?;
            l.push_value(err_msg)?;
            Ok(2)
        }
    }
}

fn os_rename(l: &mut LuaState) -> LuaResult<usize> {
    let oldname = l
        .get_arg(1)
        .and_then(|v| l.get_string(&v))
        .ok_or_else(|| l.error("bad argument #1 to 'rename' (string expected)".to_string()))?;
    let newname = l
        .get_arg(2)
        .and_then(|v| l.get_string(&v))
        .ok_or_else(|| l.error("bad argument #2 to 'rename' (string expected)".to_string()))?;

    match std::fs::rename(&oldname, &newname) {
        Ok(_) => {
            l.push_value(LuaValue::boolean(true))?;
            Ok(1)
        }
        Err(e) => {
            let err_msg = l.create_string(&format!("{}: {}", oldname, e));
            l.push_value(LuaValue::nil())?;
            l.push_value(err_msg)?;
            Ok(2)
        }
    }
}

fn os_setlocale(l: &mut LuaState) -> LuaResult<usize> {
    // Only the "C"/"POSIX" locale is supported; report it regardless of request.
    let requested = l.get_arg(1).and_then(|v| l.get_string(&v));
    match requested.as_deref() {
        None | Some("C") | Some("POSIX") | Some("") => {
            let result = l.create_string("C");
            l.push_value(result)?;
        }
        Some(_) => l.push_value(LuaValue::nil())?,
    }
    Ok(1)
}

fn os_tmpname(l: &mut LuaState) -> LuaResult<usize> {
    let file = tempfile::Builder::new()
        .prefix("lua_")
        .tempfile()
        .map_err(|e| l.error(format!("unable to generate a unique filename: {}", e)))?;
    let (_, path) = file.keep().map_err(|e| l.error(e.to_string()))?;
    let result = l.create_string(&path.to_string_lossy());
    l.push_value(result)?;
    Ok(1)
}
