// Tests for metatable-dispatched metamethods (excluding __gc/__mode, covered separately)
use crate::*;

#[test]
fn test_index_metamethod_function() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local t = setmetatable({}, {__index = function(_, k) return "missing:" .. k end})
        assert(t.foo == "missing:foo")
        t.foo = 1
        assert(t.foo == 1)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_index_metamethod_table_chain() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local base = {greet = "hi"}
        local derived = setmetatable({}, {__index = base})
        assert(derived.greet == "hi")
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_newindex_metamethod() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local log = {}
        local t = setmetatable({}, {__newindex = function(_, k, v) log[k] = v end})
        t.x = 10
        assert(rawget(t, "x") == nil)
        assert(log.x == 10)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_arithmetic_metamethods() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local mt = {
            __add = function(a, b) return a.v + b.v end,
            __unm = function(a) return -a.v end,
        }
        local a = setmetatable({v = 3}, mt)
        local b = setmetatable({v = 4}, mt)
        assert(a + b == 7)
        assert(-a == -3)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_comparison_metamethods() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local mt = {
            __eq = function(a, b) return a.v == b.v end,
            __lt = function(a, b) return a.v < b.v end,
            __le = function(a, b) return a.v <= b.v end,
        }
        local a = setmetatable({v = 1}, mt)
        local b = setmetatable({v = 2}, mt)
        local c = setmetatable({v = 1}, mt)
        assert(a == c)
        assert(a < b)
        assert(a <= c)
        assert(not (b < a))
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_call_metamethod() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local callable = setmetatable({}, {__call = function(self, a, b) return a + b end})
        assert(callable(3, 4) == 7)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_tostring_and_concat_metamethods() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local mt = {
            __tostring = function(self) return "Point(" .. self.x .. ")" end,
            __concat = function(a, b)
                local function str(x) return type(x) == "table" and tostring(x) or x end
                return str(a) .. str(b)
            end,
        }
        local p = setmetatable({x = 5}, mt)
        assert(tostring(p) == "Point(5)")
        assert(p .. "!" == "Point(5)!")
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_len_metamethod() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local t = setmetatable({}, {__len = function() return 42 end})
        assert(#t == 42)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_rawequal_bypasses_eq_metamethod() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local mt = {__eq = function() return true end}
        local a = setmetatable({}, mt)
        local b = setmetatable({}, mt)
        assert(a == b)
        assert(not rawequal(a, b))
    "#,
    );

    assert!(result.is_ok());
}
