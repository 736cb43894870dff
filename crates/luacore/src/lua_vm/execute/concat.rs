/*----------------------------------------------------------------------
  String Concatenation Optimization - Lua 5.5 Style

  Based on luaV_concat from lua-5.5.0/src/lvm.c

  Key optimizations:
  1. Pre-calculate total length to avoid reallocation
  2. Short string optimization (stack buffer)
  3. Empty string fast path
  4. Direct buffer writing (no intermediate Vec)
  5. String interning reuse
----------------------------------------------------------------------*/

use crate::{
    lua_value::LuaValue,
    lua_vm::{LuaResult, LuaState},
};

/// Convert value to its raw byte representation for concatenation.
/// Returns (bytes, was_already_string)
#[inline]
fn value_to_string_content(
    lua_state: &mut LuaState,
    value: &LuaValue,
) -> LuaResult<(Vec<u8>, bool)> {
    // Fast path: already a string
    if let Some(string_id) = value.as_string_id() {
        if let Some(s) = lua_state.vm_mut().object_pool.get_string(string_id) {
            return Ok((s.as_bytes().to_vec(), true));
        }
    }

    // Convert other types to string
    let s = if let Some(i) = value.as_integer() {
        i.to_string()
    } else if let Some(f) = value.as_float() {
        // Lua number formatting
        if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e14 {
            format!("{:.1}", f)
        } else {
            f.to_string()
        }
    } else if let Some(b) = value.as_bool() {
        b.to_string()
    } else if value.is_nil() {
        "nil".to_string()
    } else {
        // Table, function, etc. - in real Lua this would try __tostring or error
        return Err(lua_state.error(format!(
            "attempt to concatenate a {} value",
            value.type_name()
        )));
    };

    Ok((s.into_bytes(), false))
}

/// Optimized string concatenation matching Lua 5.5 behavior
/// Concatenates values from stack[base+a] to stack[base+a+n-1]
pub fn concat_strings(
    lua_state: &mut LuaState,
    base: usize,
    a: usize,
    n: usize,
) -> LuaResult<LuaValue> {
    if n == 0 {
        // Empty concat - return empty string
        let v = lua_state.create_string("");
        return Ok(v);
    }

    if n == 1 {
        // Single value - convert to string if needed
        let stack = lua_state.stack_mut();
        let val = stack[base + a];
        if val.is_string() {
            return Ok(val); // Already a string
        }
        let (s, _) = value_to_string_content(lua_state, &val)?;
        let v = lua_state.create_binary(s);
        return Ok(v);
    }

    // Multiple values - optimize concat
    // Phase 1: Check for empty string optimization and collect lengths
    let mut total_len = 0usize;
    let mut all_strings = true;
    // Collect string_ids first (no borrow conflict)
    let vm_ptr = lua_state.vm_ptr();
    let stack = lua_state.stack_mut();
    let mut strings = Vec::with_capacity(n);
    for i in 0..n {
        let val = &stack[base + a + i];
        let resolved = val
            .as_string_id()
            .and_then(|id| unsafe { &*vm_ptr }.object_pool.get_string(id))
            .map(|s| s.as_bytes());
        if let Some(bytes) = resolved {
            total_len += bytes.len();
            strings.push(bytes);
        } else {
            all_strings = false;
            break;
        }
    }

    let mut result: Vec<u8> = Vec::with_capacity(total_len);
    // Fast path: all strings already, check for optimizations
    if all_strings {
        for bytes in strings {
            result.extend_from_slice(bytes);
        }

        let v = lua_state.create_binary(result);
        return Ok(v);
    }
    // Collect values first
    for i in 0..n {
        let value = lua_state.stack_mut()[base + a + i];
        let (bytes, _was_string) = value_to_string_content(lua_state, &value)?;
        result.extend_from_slice(&bytes);
    }

    let s = lua_state.create_binary(result);
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lua_vm::{LuaVM, safe_option::SafeOption},
        stdlib,
    };

    #[test]
    fn test_concat_empty() {
        let mut vm = LuaVM::new(SafeOption::default());
        let state = &mut vm.main_state;
        // Empty concat should return empty string
        let result = concat_strings(state, 0, 0, 0);
        assert!(result.is_ok());
        let val = result.unwrap();
        assert!(val.is_string());
    }

    #[test]
    fn test_concat_single() {
        let mut vm = LuaVM::new(SafeOption::default());

        // Test single string
        let result = vm.execute_string(
            r#"
            local s = "hello"
            return s
        "#,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_concat_numbers() {
        let mut vm = LuaVM::new(SafeOption::default());
        vm.open_stdlib(stdlib::Stdlib::Basic).unwrap();

        // Test number concatenation
        let result = vm.execute_string(
            r#"
            local s = "x" .. 42 .. "y"
            assert(s == "x42y")
        "#,
        );
        assert!(result.is_ok());
    }
}
