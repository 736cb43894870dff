// Tests for the utf8 library
use crate::*;

#[test]
fn test_utf8_len() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(utf8.len("hello") == 5)
        assert(utf8.len("héllo") == 5)
        assert(utf8.len("日本語") == 3)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_utf8_char() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(utf8.char(65, 66, 67) == "ABC")
        assert(utf8.char(0x65e5) == "日")
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_utf8_codepoint() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local c = utf8.codepoint("A")
        assert(c == 65)

        local a, b = utf8.codepoint("AB", 1, 2)
        assert(a == 65)
        assert(b == 66)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_utf8_codes_iteration() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local codepoints = {}
        for p, c in utf8.codes("abc") do
            table.insert(codepoints, c)
        end
        assert(#codepoints == 3)
        assert(codepoints[1] == string.byte("a"))
        assert(codepoints[3] == string.byte("c"))
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_utf8_offset() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local s = "日本語"
        assert(utf8.offset(s, 1) == 1)
        assert(utf8.offset(s, 2) == 4)
        assert(utf8.offset(s, 3) == 7)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_utf8_charpattern_constant() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(type(utf8.charpattern) == "string")
        assert(#utf8.charpattern > 0)
    "#,
    );

    assert!(result.is_ok());
}
