// Lua runtime: lexer, parser, register-based VM, GC and standard library.

#[cfg(test)]
mod test;

pub(crate) mod branch;
pub mod compiler;
pub mod gc;
pub mod lib_registry;
pub mod lua_value;
pub mod lua_vm;
#[cfg(feature = "serde")]
pub mod serde;
pub mod stdlib;
pub use compiler::Compiler;
pub use gc::*;
pub use lib_registry::LibraryRegistry;
pub use lua_value::{Chunk, LuaFunction, LuaString, LuaTable, LuaValue, UpvaluePtr};
pub use lua_vm::{CreateResult, Instruction, LuaResult, LuaVM, OpCode, SafeOption};
pub use luacore_derive::{LuaUserData, lua_methods};
use std::rc::Rc;

/// Main entry point for executing Lua code
pub fn execute(source: &str) -> LuaResult<LuaValue> {
    // Create VM and compile using its string pool
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs();
    let chunk = vm.compile(source)?;
    vm.execute(Rc::new(chunk))
}

/// Execute Lua code with custom VM instance
pub fn execute_with_vm(vm: &mut LuaVM, source: &str) -> LuaResult<LuaValue> {
    let chunk = vm.compile(source)?;
    vm.open_libs();
    vm.execute(Rc::new(chunk))
}
