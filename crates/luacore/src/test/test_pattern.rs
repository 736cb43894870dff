// Tests for the Lua pattern matching engine (string.find/match/gmatch/gsub edge cases)
use crate::*;

#[test]
fn test_pattern_anchors() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(string.find("hello", "^hel") == 1)
        assert(string.find("hello", "^ell") == nil)
        assert(string.find("hello", "llo$") == 3)
        assert(string.find("hello", "hel$") == nil)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pattern_character_classes() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(string.match("abc123", "%a+") == "abc")
        assert(string.match("abc123", "%d+") == "123")
        assert(string.match("  x", "%s+") == "  ")
        assert(string.match("ABCdef", "%u+") == "ABC")
        assert(string.match("ABCdef", "%l+") == "def")
        assert(string.match("a.b", "%p") == ".")
        assert(string.match("abc", "[^%d]+") == "abc")
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pattern_captures() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local k, v = string.match("key=value", "(%w+)=(%w+)")
        assert(k == "key")
        assert(v == "value")

        local a, b, c = string.find("2026-07-29", "(%d+)-(%d+)-(%d+)")
        assert(a == 1 and b == 10 and c == "2026")
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pattern_balanced_match() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local s = "(nested (parens) here)"
        local m = string.match(s, "%b()")
        assert(m == "(nested (parens) here)")
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pattern_frontier() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local count = 0
        for w in string.gmatch("THE (quick) fox", "%f[%a]%u+%f[%A]") do
            count = count + 1
            assert(w == "THE")
        end
        assert(count == 1)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pattern_gmatch_iteration() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local words = {}
        for w in string.gmatch("the quick brown fox", "%a+") do
            table.insert(words, w)
        end
        assert(#words == 4)
        assert(words[1] == "the")
        assert(words[4] == "fox")
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pattern_gsub_with_table() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local names = {["$name"] = "world", ["$greeting"] = "hello"}
        local s = string.gsub("$greeting, $name!", "%$%a+", names)
        assert(s == "hello, world!")
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pattern_empty_match_handling() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        -- empty-match patterns must still advance position to avoid infinite loops
        local s, n = string.gsub("abc", "%a*", "X")
        assert(n == 2)
    "#,
    );

    assert!(result.is_ok());
}
