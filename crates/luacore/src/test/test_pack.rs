// Tests for string.pack / string.unpack / string.packsize
use crate::*;

#[test]
fn test_pack_integers_roundtrip() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local packed = string.pack("<i4", 1000)
        local v, pos = string.unpack("<i4", packed)
        assert(v == 1000)
        assert(pos == 5)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pack_unsigned_byte() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local packed = string.pack("B", 255)
        assert(#packed == 1)
        local v = string.unpack("B", packed)
        assert(v == 255)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pack_mixed_format() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local packed = string.pack("<i4B", 42, 7)
        local a, b, pos = string.unpack("<i4B", packed)
        assert(a == 42)
        assert(b == 7)
        assert(pos == 6)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pack_zero_terminated_string() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local packed = string.pack("z", "hello")
        local s, pos = string.unpack("z", packed)
        assert(s == "hello")
        assert(pos == 7)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pack_fixed_length_string() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local packed = string.pack("c5", "abc")
        assert(#packed == 5)
        local s = string.unpack("c5", packed)
        assert(s:sub(1, 3) == "abc")
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pack_double_roundtrip() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local packed = string.pack("d", 3.5)
        local v = string.unpack("d", packed)
        assert(v == 3.5)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_packsize_fixed_formats() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        assert(string.packsize("i4") == 4)
        assert(string.packsize("B") == 1)
        assert(string.packsize("d") == 8)
        assert(string.packsize("i4B") == 5)
    "#,
    );

    assert!(result.is_ok());
}

#[test]
fn test_pack_big_endian() {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_stdlib(crate::stdlib::Stdlib::All).unwrap();

    let result = vm.execute_string(
        r#"
        local le = string.pack("<i4", 1)
        local be = string.pack(">i4", 1)
        assert(le ~= be)
        assert(string.unpack(">i4", be) == 1)
    "#,
    );

    assert!(result.is_ok());
}
