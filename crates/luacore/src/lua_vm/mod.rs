// Lua Virtual Machine
// Executes compiled bytecode with register-based architecture
mod call_info;
mod const_string;
mod execute;
mod lua_error;
pub mod lua_limits;
mod lua_state;
pub mod opcode;
mod rng;
mod safe_option;

use crate::compiler::{compile_code, compile_code_with_name};
use crate::gc::GC;
use crate::lua_value::{Chunk, LuaUserdata, LuaValue};
pub use crate::lua_vm::call_info::CallInfo;
use crate::lua_vm::const_string::ConstString;
use crate::lua_vm::execute::lua_execute;
pub use crate::lua_vm::lua_error::LuaError;
pub use crate::lua_vm::lua_state::LuaState;
pub use crate::lua_vm::safe_option::SafeOption;
use crate::stdlib::Stdlib;
use crate::{GcId, GcKind, ObjectPool, ThreadId, UpvalueId, lib_registry};
pub use execute::TmKind;
pub use execute::{get_metamethod_event, get_metatable};
pub use opcode::{Instruction, OpCode};
pub use rng::LuaRng;
use std::rc::Rc;

pub type LuaResult<T> = Result<T, LuaError>;

/// Return type of the `create_*` family (`create_string`, `create_table`, ...).
/// Object creation never fails on its own; `LuaValue` is an alias rather than
/// a `Result` so call sites don't pay for an unreachable error path.
pub type CreateResult = LuaValue;
/// C Function type - Rust function callable from Lua
/// Now takes LuaContext instead of LuaVM for better ergonomics
pub type CFunction = fn(&mut LuaState) -> LuaResult<usize>;

/// Global VM state (equivalent to global_State in Lua C API)
/// Manages global resources shared by all execution threads/coroutines
pub struct LuaVM {
    /// Global environment table (_G and _ENV point to this)
    pub(crate) global: LuaValue,

    /// Registry table (like Lua's LUA_REGISTRYINDEX)
    pub(crate) registry: LuaValue,

    /// Object pool for unified object management
    pub object_pool: ObjectPool,

    /// Garbage collector state
    pub(crate) gc: GC,

    /// Main thread execution state, embedded directly (never stored in
    /// `object_pool.threads`, never collected). Identified by the
    /// `ThreadId::main_id()` sentinel for GC-root bookkeeping purposes.
    pub(crate) main_state: LuaState,

    #[allow(unused)]
    /// String metatable (shared by all strings)
    pub(crate) string_mt: Option<LuaValue>,

    pub(crate) safe_option: SafeOption,

    pub const_strings: ConstString,

    /// Backing generator for `math.random`/`math.randomseed`.
    pub rng: LuaRng,
}

impl LuaVM {
    pub fn new(option: SafeOption) -> Box<Self> {
        let mut gc = GC::new();
        let mut object_pool = ObjectPool::new(option.short_string_limit());
        let cs = ConstString::new(&mut object_pool, &mut gc);
        let main_state = LuaState::new(6, std::ptr::null_mut(), true, option.clone());
        let mut vm = Box::new(LuaVM {
            global: LuaValue::nil(),
            registry: LuaValue::nil(),
            object_pool,
            gc,
            main_state,
            string_mt: None,
            safe_option: option.clone(),
            const_strings: cs,
            rng: LuaRng::default(),
        });

        // The main thread's LuaState needs a pointer back to this LuaVM, but
        // that pointer isn't known until the Box is allocated - patch it now.
        let ptr_vm = vm.as_mut() as *mut LuaVM;
        unsafe {
            vm.main_state.set_vm_ptr(ptr_vm);
            vm.main_state.set_thread_id(ThreadId::main_id());
        }

        // Initialize registry (like Lua's init_registry)
        // Registry is a GC root and protects all values stored in it
        let registry = vm.create_table(2, 8);
        vm.registry = registry;

        // Set _G to point to the global table itself
        let globals_value = vm.create_table(0, 20);
        vm.global = globals_value;
        vm.set_global("_G", globals_value);
        vm.set_global("_ENV", globals_value);

        // Store globals in registry (like Lua's LUA_RIDX_GLOBALS)
        vm.registry_seti(1, globals_value);

        vm
    }

    pub fn main_state(&mut self) -> &mut LuaState {
        &mut self.main_state
    }

    pub fn main_state_ref(&self) -> &LuaState {
        &self.main_state
    }

    /// Set a value in the registry by integer key
    pub fn registry_seti(&mut self, key: i64, value: LuaValue) {
        self.raw_seti(&self.registry.clone(), key, value);
    }

    /// Get a value from the registry by integer key
    pub fn registry_geti(&self, key: i64) -> Option<LuaValue> {
        self.raw_geti(&self.registry, key)
    }

    /// Set a value in the registry by string key
    pub fn registry_set(&mut self, key: &str, value: LuaValue) {
        let key_value = self.create_string(key);

        // Use VM table_set so we always run the GC barrier
        let registry = self.registry;
        self.raw_set(&registry, key_value, value);
    }

    /// Get a value from the registry by string key
    pub fn registry_get(&mut self, key: &str) -> Option<LuaValue> {
        let key = self.create_string(key);
        self.raw_get(&self.registry, &key)
    }

    pub fn open_stdlib(&mut self, lib: Stdlib) -> LuaResult<()> {
        lib_registry::create_standard_registry(lib).load_all(self)?;
        Ok(())
    }

    /// Execute a chunk in the main thread
    pub fn execute(&mut self, chunk: Rc<Chunk>) -> LuaResult<Vec<LuaValue>> {
        // Main chunk needs _ENV upvalue pointing to global table
        // This matches Lua 5.4+ behavior where all chunks have _ENV as upvalue[0]
        let env_upvalue_id = self.create_upvalue_closed(self.global);
        let func = self.create_function(chunk, vec![env_upvalue_id]);
        self.execute_function(func, vec![])
    }

    pub fn execute_string(&mut self, source: &str) -> LuaResult<Vec<LuaValue>> {
        let chunk = self.compile(source)?;
        self.execute(Rc::new(chunk))
    }

    /// Execute a function with arguments
    pub(crate) fn execute_function(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
    ) -> LuaResult<Vec<LuaValue>> {
        // Save function index - will be at current logical top
        let main_state = self.main_state();
        let func_idx = main_state.get_top();
        let nargs = args.len();

        // Push function onto stack (updates stack_top)
        main_state.push_value(func.clone())?;

        // Push arguments (each updates stack_top)
        for arg in args {
            main_state.push_value(arg)?;
        }

        // Create initial call frame
        // base points to first argument (func_idx + 1), following Lua convention
        let base = func_idx + 1;
        // Top-level call expects multiple return values
        main_state.push_frame(func, base, nargs, -1)?;

        // Run the VM execution loop
        let results = self.run()?;

        // Reset logical stack top for next execution
        self.main_state().set_top(0);

        Ok(results)
    }

    /// Main VM execution loop (equivalent to luaV_execute)
    fn run(&mut self) -> LuaResult<Vec<LuaValue>> {
        if let Err(e) = lua_execute(self.main_state(), 0) {
            // Close any pending to-be-closed variables before the error
            // leaves the VM entirely (§4.6: __close on error unwind).
            let main_state = self.main_state();
            let frame_base = main_state.get_frame(0).map(|f| f.base);
            if let Some(frame_base) = frame_base {
                // Peek (don't consume) the message: callers further up still
                // need to read it via `get_error_message` to display it.
                let error_msg = main_state.error_msg().to_string();
                let err_value = main_state.create_string(&error_msg);
                let _ = main_state.close_all_with_error(frame_base, err_value);
            }
            return Err(e);
        }

        let main_state = self.main_state();
        // Collect all values from logical stack (0 to stack_top) as return values
        let mut results = Vec::new();
        let top = main_state.get_top();
        for i in 0..top {
            if let Some(val) = main_state.stack_get(i) {
                results.push(val);
            }
        }

        // Check GC after VM execution completes (like Lua's luaC_checkGC after returning to caller)
        // At this point, all return values are collected and safe from collection
        main_state.check_gc()?;

        Ok(results)
    }

    /// Compile source code using VM's string pool
    pub fn compile(&mut self, source: &str) -> LuaResult<Chunk> {
        let chunk = match compile_code(source, self) {
            Ok(c) => c,
            Err(e) => return Err(self.compile_error(e)),
        };

        Ok(chunk)
    }

    pub fn compile_with_name(&mut self, source: &str, chunk_name: &str) -> LuaResult<Chunk> {
        let chunk = match compile_code_with_name(source, self, chunk_name) {
            Ok(c) => c,
            Err(e) => return Err(self.compile_error(e)),
        };

        Ok(chunk)
    }

    pub fn get_global(&mut self, name: &str) -> Option<LuaValue> {
        let key = self.create_string(name);
        self.raw_get(&self.global, &key)
    }

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        let key = self.create_string(name);

        // Use VM table_set so we always run the GC barrier
        let global = self.global;
        self.raw_set(&global, key, value);
    }

    /// Set the metatable for all strings
    /// This allows string methods to be called with : syntax (e.g., str:upper())
    pub fn set_string_metatable(&mut self, string_lib_table: LuaValue) {
        // Create a metatable with __index pointing to the string library
        let mt_value = self.create_table(0, 1);

        // Set __index to point to the string library
        let index_key = self.const_strings.tm_index;
        self.raw_set(&mt_value, index_key, string_lib_table);

        // Store in the VM
        self.string_mt = Some(mt_value);
    }

    // ============ Coroutine Support ============

    /// Create a new thread (coroutine) - returns ThreadId-based LuaValue
    /// OPTIMIZED: Minimal initial allocations - grows on demand
    pub fn create_thread(&mut self, func: LuaValue) -> LuaValue {
        // Create a new LuaState for the coroutine
        let mut thread = LuaState::new(1, self as *mut LuaVM, false, self.safe_option.clone());

        // Push the function onto the thread's stack (updates stack_top)
        // It will be used when resume() is first called
        thread
            .push_value(func)
            .expect("Failed to push function onto coroutine stack");

        // Create thread in ObjectPool and return LuaValue
        let current_white = self.gc.current_white;
        let id = self.object_pool.create_thread(thread, current_white);
        unsafe {
            self.object_pool.get_thread_mut(id).unwrap().set_thread_id(id);
        }
        self.gc.track_object(GcId::ThreadId(id), 1024, &mut self.object_pool);
        LuaValue::thread(id)
    }

    /// Resume a coroutine - DEPRECATED: Use thread_state.resume() instead
    /// This method is kept for backward compatibility but delegates to LuaState
    pub fn resume_thread(
        &mut self,
        thread_val: LuaValue,
        args: Vec<LuaValue>,
    ) -> LuaResult<(bool, Vec<LuaValue>)> {
        let Some(thread_id) = thread_val.as_thread_id() else {
            return Err(self.error("invalid thread".to_string()));
        };
        let Some(l) = self.object_pool.get_thread_mut(thread_id) else {
            return Err(self.error("invalid thread".to_string()));
        };

        if l.is_main_thread() {
            return Err(self.error("cannot resume main thread".to_string()));
        }

        // Borrow mutably and delegate to LuaState::resume
        l.resume(args)
    }

    /// Fast table get - NO metatable support!
    /// Use this for normal field access (GETFIELD, GETTABLE, GETI)
    /// This is the correct behavior for Lua bytecode instructions
    /// Only use table_get_with_meta when you explicitly need __index metamethod
    #[inline(always)]
    pub fn raw_get(&self, table_value: &LuaValue, key: &LuaValue) -> Option<LuaValue> {
        let table_id = table_value.as_table_id()?;
        let table = self.object_pool.get_table(table_id)?;
        table.raw_get(key)
    }

    #[inline]
    pub fn raw_set(&mut self, table_value: &LuaValue, key: LuaValue, value: LuaValue) -> bool {
        let Some(table_id) = table_value.as_table_id() else {
            return false;
        };
        let Some(table) = self.object_pool.get_table_mut(table_id) else {
            return false;
        };
        let new_key = table.raw_set(&key, value);
        let mut need_barrier = false;
        if new_key && key.iscollectable() {
            // New key inserted - run GC barrier
            need_barrier = true;
        }

        if value.iscollectable() {
            need_barrier = true;
        }

        // GC backward barrier (luaC_barrierback)
        // Tables use backward barrier since they may be modified many times
        if need_barrier {
            self.gc.barrier_back(GcId::TableId(table_id), &mut self.object_pool);
        }
        true
    }

    #[inline(always)]
    pub fn raw_geti(&self, table_value: &LuaValue, key: i64) -> Option<LuaValue> {
        let table_id = table_value.as_table_id()?;
        let table = self.object_pool.get_table(table_id)?;
        table.raw_geti(key)
    }

    pub fn raw_seti(&mut self, table_value: &LuaValue, key: i64, value: LuaValue) -> bool {
        let Some(table_id) = table_value.as_table_id() else {
            return false;
        };
        let Some(table) = self.object_pool.get_table_mut(table_id) else {
            return false;
        };
        table.raw_seti(key, value.clone());

        // GC backward barrier (luaC_barrierback)
        // Tables use backward barrier since they may be modified many times
        if value.iscollectable() {
            self.gc.barrier_back(GcId::TableId(table_id), &mut self.object_pool);
        }
        true
    }

    /// Create a string value with automatic interning for short strings
    /// Returns LuaValue directly with ZERO allocation overhead for interned strings
    ///
    /// Performance characteristics:
    /// - Cache hit (interned): O(1) hash lookup, 0 allocations, 0 atomic ops
    /// - Cache miss (new): 1 Box allocation, GC registration, pool insertion
    /// - Long string: 1 Box allocation, GC registration, no pooling
    pub fn create_string(&mut self, s: &str) -> LuaValue {
        let current_white = self.gc.current_white;
        let id = self.object_pool.create_string(s, current_white);
        self.gc.track_object(GcId::StringId(id), s.len(), &mut self.object_pool);
        LuaValue::string(id)
    }

    /// Table assignment with `__newindex` dispatch, for code that only
    /// holds a `&mut LuaVM` (e.g. library bootstrap, before any call frame
    /// exists on the main thread).
    pub fn table_set_with_meta(
        &mut self,
        table: LuaValue,
        key: LuaValue,
        value: LuaValue,
    ) -> LuaResult<()> {
        self.main_state().table_set(&table, key, value)
    }

    /// Table lookup with `__index` dispatch, counterpart to
    /// `table_set_with_meta`.
    pub fn table_get_with_meta(&mut self, table: &LuaValue, key: &LuaValue) -> Option<LuaValue> {
        self.main_state().table_get(table, key)
    }

    /// Binary payload as a Lua string. Lua strings are raw byte arrays
    /// with no required encoding; this preserves the bytes exactly,
    /// never re-encoding through UTF-8.
    pub fn create_binary(&mut self, data: Vec<u8>) -> LuaValue {
        let current_white = self.gc.current_white;
        let len = data.len();
        let id = self.object_pool.create_string_bytes(&data, current_white);
        self.gc.track_object(GcId::StringId(id), len, &mut self.object_pool);
        LuaValue::string(id)
    }

    /// Create string from owned String (avoids clone for non-interned strings)
    #[inline]
    pub fn create_string_owned(&mut self, s: String) -> LuaValue {
        self.create_string(&s)
    }

    /// Create substring (optimized for string.sub)
    #[inline]
    pub fn create_substring(&mut self, s_value: LuaValue, start: usize, end: usize) -> LuaValue {
        let Some(s_id) = s_value.as_string_id() else {
            return LuaValue::nil();
        };
        let current_white = self.gc.current_white;
        let len = end.saturating_sub(start);
        let id = self.object_pool.create_substring(s_id, start, end, current_white);
        self.gc.track_object(GcId::StringId(id), len, &mut self.object_pool);
        LuaValue::string(id)
    }

    /// Create a new table in object pool
    /// GC tracks objects via ObjectPool iteration, no allgc list needed
    pub fn create_table(&mut self, array_size: usize, hash_size: usize) -> LuaValue {
        let current_white = self.gc.current_white;
        let id = self.object_pool.create_table(array_size, hash_size, current_white);
        let size = 64 + (array_size + hash_size) * 16;
        self.gc.track_object(GcId::TableId(id), size, &mut self.object_pool);
        LuaValue::table(id)
    }

    /// Create new userdata in object pool
    pub fn create_userdata(&mut self, data: LuaUserdata) -> LuaValue {
        let current_white = self.gc.current_white;
        let id = self.object_pool.create_userdata(data, current_white);
        self.gc.track_object(GcId::UserdataId(id), 64, &mut self.object_pool);
        LuaValue::userdata(id)
    }

    /// Create a function in object pool
    /// Tracks the object in GC's allgc list for efficient sweep
    #[inline(always)]
    pub fn create_function(&mut self, chunk: Rc<Chunk>, upvalue_ids: Vec<UpvalueId>) -> LuaValue {
        let current_white = self.gc.current_white;
        let size = 32 + upvalue_ids.len() * 16;
        let id = self.object_pool.create_function(chunk, upvalue_ids, current_white);
        self.gc.track_object(GcId::FunctionId(id), size, &mut self.object_pool);
        LuaValue::function(id)
    }

    /// Create a C closure (native function with upvalues stored as closed upvalues)
    /// The upvalues are automatically created as closed upvalues with the given values
    #[inline]
    pub fn create_c_closure(&mut self, func: CFunction, upvalues: Vec<LuaValue>) -> LuaValue {
        // Create closed upvalues for each value
        let upvalue_ids: Vec<UpvalueId> = upvalues
            .into_iter()
            .map(|v| self.create_upvalue_closed(v))
            .collect();

        let current_white = self.gc.current_white;
        let size = 32 + upvalue_ids.len() * 16;
        let id = self.object_pool.create_c_closure(func, upvalue_ids, current_white);
        self.gc.track_object(GcId::FunctionId(id), size, &mut self.object_pool);
        LuaValue::function(id)
    }

    /// Create an open upvalue pointing to a stack index
    #[inline(always)]
    pub fn create_upvalue_open(&mut self, stack_index: usize) -> UpvalueId {
        let current_white = self.gc.current_white;
        let id = self.object_pool.create_upvalue_open(stack_index, current_white);
        self.gc.track_object(GcId::UpvalueId(id), 24, &mut self.object_pool);
        id
    }

    /// Create a closed upvalue with a value
    #[inline(always)]
    pub fn create_upvalue_closed(&mut self, value: LuaValue) -> UpvalueId {
        let current_white = self.gc.current_white;
        let id = self.object_pool.create_upvalue_closed(value, current_white);
        self.gc.track_object(GcId::UpvalueId(id), 24, &mut self.object_pool);
        id
    }

    // Port of Lua 5.5's luaC_condGC macro:
    // #define luaC_condGC(L,pre,pos) \
    //   { if (G(L)->GCdebt <= 0) { pre; luaC_step(L); pos;}; }
    //
    /// Check GC and run a step if needed (like luaC_checkGC in Lua 5.5)
    #[inline(always)]
    fn check_gc(&mut self, l: &mut LuaState) -> bool {
        if self.gc.gc_debt <= 0 {
            self.gc.step(l);
            return true;
        }

        false
    }

    // ============ GC Management ============
    /// Perform a full GC cycle (like luaC_fullgc in Lua 5.5)
    /// This is the internal version that can be called in emergency situations
    fn full_gc(&mut self, l: &mut LuaState, is_emergency: bool) {
        self.gc.gc_emergency = is_emergency;

        // Dispatch based on GC mode (from luaC_fullgc)
        match self.gc.gc_kind {
            GcKind::GenMinor => {
                self.full_gen(l);
            }
            GcKind::Inc => {
                self.full_inc(l);
            }
            GcKind::GenMajor => {
                // Temporarily switch to incremental mode
                self.gc.gc_kind = GcKind::Inc;
                self.full_inc(l);
                self.gc.gc_kind = GcKind::GenMajor;
            }
        }

        self.gc.gc_emergency = false;
    }

    /// Full GC cycle for incremental mode (like fullinc in Lua 5.5)
    fn full_inc(&mut self, l: &mut LuaState) {
        // NOTE: mark_open_upvalues should NOT be called here!
        // In Lua 5.5, remarkupvals is called DURING the atomic phase,
        // after restart_collection. Calling it here would add objects
        // to the gray list, which then gets cleared by restart_collection.

        // If we're keeping invariant (in marking phase), sweep first
        if self.gc.keep_invariant() {
            self.gc.enter_sweep(l);
        }

        // Run until pause state
        self.gc.run_until_state(l, crate::gc::GcState::Pause);
        // Run finalizers
        self.gc.run_until_state(l, crate::gc::GcState::CallFin);
        // Complete the cycle
        self.gc.run_until_state(l, crate::gc::GcState::Pause);

        // Set pause for next cycle
        self.gc.set_pause();
    }

    /// Full GC cycle for generational mode (like fullgen in Lua 5.5)
    fn full_gen(&mut self, l: &mut LuaState) {
        // NOTE: mark_open_upvalues should NOT be called here!
        // In Lua 5.5, remarkupvals is called DURING the atomic phase.
        self.gc.full_generation(l);
    }

    // /// Collect all GC roots (objects that must not be collected)
    // pub fn collect_roots(&self) -> Vec<LuaValue> {
    //     let mut roots = Vec::with_capacity(128);

    //     // 1. Global table
    //     roots.push(self.global);

    //     // 2. Registry table (persistent objects storage)
    //     roots.push(self.registry);

    //     // 3. String metatable
    //     if let Some(mt) = &self.string_mt {
    //         roots.push(*mt);
    //     }

    //     // 4. All values in the logical stack (0..stack_top)
    //     // Lua semantics: only slots below L->top are live. Slots above may contain
    //     // stale temporaries and MUST NOT be treated as roots, otherwise weak-table
    //     // tests will keep dead objects alive.
    //     let top = self.main_state.get_top();
    //     for i in 0..top {
    //         if let Some(value) = self.main_state.stack_get(i) {
    //             if !value.is_nil() {
    //                 roots.push(value);
    //             }
    //         }
    //     }

    //     // 5. All call frames (functions being executed)
    //     for i in 0..self.main_state.call_depth() {
    //         if let Some(frame) = self.main_state.get_frame(i) {
    //             roots.push(frame.func.clone());
    //         }
    //     }

    //     // 6. Open upvalues - handled separately in GC by mark_open_upvalues
    //     // Open upvalue objects themselves are marked directly by GC
    //     // Their values (stack slots) are already marked above in step 4

    //     roots
    // }

    /// Get GC statistics
    pub fn gc_stats(&self) -> String {
        let stats = self.gc.stats();
        format!(
            "GC Stats:\n\
            - Bytes allocated: {}\n\
            - Threshold: {}\n\
            - Total collections: {}\n\
            - Minor collections: {}\n\
            - Major collections: {}\n\
            - Objects collected: {}\n\
            - Young generation size: {}\n\
            - Old generation size: {}\n\
            - Promoted objects: {}",
            stats.bytes_allocated,
            stats.threshold,
            stats.collection_count,
            stats.minor_collections,
            stats.major_collections,
            stats.objects_collected,
            stats.young_gen_size,
            stats.old_gen_size,
            stats.promoted_objects
        )
    }

    // ===== Error Handling =====

    pub fn error(&mut self, message: impl Into<String>) -> LuaError {
        self.main_state().error(message.into());
        LuaError::RuntimeError
    }

    #[inline]
    pub fn compile_error(&mut self, message: impl Into<String>) -> LuaError {
        self.main_state().error(message.into());
        LuaError::CompileError
    }

    #[inline]
    pub fn get_error_message(&self) -> &str {
        self.main_state_ref().error_msg()
    }

    /// Generate a stack traceback string
    pub fn generate_traceback(&self, error_msg: &str) -> String {
        // Delegate to LuaState's generate_traceback
        let traceback = self.main_state_ref().generate_traceback();
        if !traceback.is_empty() {
            format!("{}\nstack traceback:\n{}", error_msg, traceback)
        } else {
            error_msg.to_string()
        }
    }

    // ============ Protected Call (pcall/xpcall) ============

    /// Execute a function with protected call (pcall semantics)
    /// Note: Yields are NOT caught by pcall - they propagate through
    pub fn protected_call(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
    ) -> LuaResult<(bool, Vec<LuaValue>)> {
        // Delegate to main_state
        self.main_state().pcall(func, args)
    }

    /// ULTRA-OPTIMIZED pcall for CFunction calls
    /// Works directly on the stack without any Vec allocations
    /// Returns: (success, result_count) where results are on stack
    #[inline]
    pub fn protected_call_stack_based(
        &mut self,
        func_idx: usize,
        arg_count: usize,
    ) -> LuaResult<(bool, usize)> {
        // Delegate to main_state
        self.main_state().pcall_stack_based(func_idx, arg_count)
    }

    /// Protected call with error handler (xpcall semantics)
    /// The error handler is called if an error occurs
    /// Note: Yields are NOT caught by xpcall - they propagate through
    pub fn protected_call_with_handler(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
        err_handler: LuaValue,
    ) -> LuaResult<(bool, Vec<LuaValue>)> {
        // Delegate to main_state
        self.main_state().xpcall(func, args, err_handler)
    }

    pub fn get_main_thread_id(&self) -> ThreadId {
        ThreadId::main_id()
    }
}
