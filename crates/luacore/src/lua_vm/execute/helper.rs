use crate::{
    Chunk, GcId, LuaResult, LuaValue,
    lua_value::{LUA_VNUMFLT, LUA_VNUMINT, LuaValueKind},
    lua_vm::LuaState,
    lua_vm::execute::metamethod::{TmKind, call_tm},
};

/// Map a value to its `GcId` for GC write-barrier bookkeeping, or `None`
/// for non-collectable values (nil, boolean, number, light userdata).
#[inline]
pub fn value_to_gc_id(value: &LuaValue) -> Option<GcId> {
    match value.kind() {
        LuaValueKind::String => value.as_string_id().map(GcId::StringId),
        LuaValueKind::Table => value.as_table_id().map(GcId::TableId),
        LuaValueKind::Function => value.as_function_id().map(GcId::FunctionId),
        LuaValueKind::Thread => value.as_thread_id().map(GcId::ThreadId),
        LuaValueKind::Userdata => value.as_userdata_id().map(GcId::UserdataId),
        _ => None,
    }
}

/// Get the metatable of an arbitrary value, or `None` if it has none.
/// Mirrors reference Lua's per-type metatable dispatch (`luaT_gettmbyobj`'s
/// metatable lookup half): strings share one global metatable, tables and
/// userdata carry their own.
pub fn get_metatable(lua_state: &mut LuaState, obj: &LuaValue) -> Option<LuaValue> {
    if obj.is_string() {
        return lua_state.vm_mut().string_mt;
    }
    if let Some(ud_id) = obj.as_userdata_id() {
        let mt = lua_state
            .vm_mut()
            .object_pool
            .get_userdata(ud_id)?
            .get_metatable();
        return if mt.is_nil() { None } else { Some(mt) };
    }
    if let Some(table_id) = obj.as_table_id() {
        let mt_id = lua_state
            .vm_mut()
            .object_pool
            .get_table(table_id)?
            .get_metatable()?;
        return Some(LuaValue::table(mt_id));
    }
    None
}

/// Fetch a named tag-method/field from a value's metatable via raw lookup.
/// Port of reference Lua's `luaT_gettmbyobj` (ltm.c): looks the event name up
/// directly in the metatable, without going through `__index`.
pub fn get_metamethod_event(
    lua_state: &mut LuaState,
    obj: &LuaValue,
    tm_kind: TmKind,
) -> Option<LuaValue> {
    let mt = get_metatable(lua_state, obj)?;
    let mt_table_id = mt.as_table_id()?;
    let key = lua_state.vm_mut().const_strings.tmname[tm_kind as usize];
    let table = lua_state.vm_mut().object_pool.get_table(mt_table_id)?;
    let value = table.raw_get(&key)?;
    if value.is_nil() { None } else { Some(value) }
}

/// Resolve a binary-operator metamethod, trying the left operand first and
/// the right operand second, per §4.4.1's "left then right" fallback rule.
pub fn get_binop_metamethod(
    lua_state: &mut LuaState,
    p1: &LuaValue,
    p2: &LuaValue,
    tm_kind: TmKind,
) -> Option<LuaValue> {
    get_metamethod_event(lua_state, p1, tm_kind).or_else(|| get_metamethod_event(lua_state, p2, tm_kind))
}

/// Build hidden arguments for vararg functions
/// Port of ltm.c:245-270 buildhiddenargs
///
/// Initial stack:  func arg1 ... argn extra1 ...
///                 ^ ci->func                    ^ L->top
/// Final stack: func nil ... nil extra1 ... func arg1 ... argn
///                                          ^ ci->func
pub fn buildhiddenargs(
    lua_state: &mut LuaState,
    frame_idx: usize,
    chunk: &Chunk,
    totalargs: usize,
    nfixparams: usize,
    _nextra: usize,
) -> LuaResult<usize> {
    let call_info = lua_state.get_call_info(frame_idx);
    let old_base = call_info.base;
    let func_pos = if old_base > 0 { old_base - 1 } else { 0 };
    let stack_top = lua_state.get_top();

    let stack = lua_state.stack_mut();
    let mut top = stack_top;

    // Step 1: Copy function to top (after all arguments)
    // setobjs2s(L, L->top.p++, ci->func.p);
    let func_src = stack[func_pos];
    stack[top] = func_src;
    top += 1;

    // Step 2: Copy fixed parameters to after copied function
    // for (i = 1; i <= nfixparams; i++)
    for i in 0..nfixparams {
        let src = stack[func_pos + 1 + i];
        stack[top] = src;
        top += 1;
        // Erase original parameter with nil (for GC)
        setnilvalue(&mut stack[func_pos + 1 + i]);
    }

    // Step 3: Update ci->func.p and ci->top.p
    // ci->func.p += totalargs + 1;
    // ci->top.p += totalargs + 1;
    let new_func_pos = func_pos + totalargs + 1;
    let new_base = new_func_pos + 1;

    let new_call_info_top = {
        let call_info = lua_state.get_call_info_mut(frame_idx);
        call_info.base = new_base;
        call_info.top += totalargs + 1;
        call_info.func_offset = new_base - func_pos; // Distance from new_base to original func
        call_info.top
    };

    // Ensure enough stack space for new base + registers
    let new_needed_size = new_base + chunk.max_stack_size;
    if new_needed_size > lua_state.stack_len() {
        lua_state.grow_stack(new_needed_size - lua_state.stack_len())?;
    }

    // Update lua_state.top to match call_info.top
    // This ensures that subsequent set_top calls preserve our data
    lua_state.set_top(new_call_info_top);

    Ok(new_base)
}

// ============ Type tag检查宏 (对应 Lua 的 ttis* 宏) ============

/// ttisinteger - 检查是否是整数 (最快的类型检查)
#[inline(always)]
pub fn ttisinteger(v: &LuaValue) -> bool {
    (*v).tt_ == LUA_VNUMINT
}

/// ttisfloat - 检查是否是浮点数
#[inline(always)]
pub fn ttisfloat(v: &LuaValue) -> bool {
    (*v).tt_ == LUA_VNUMFLT
}

/// ttisnumber - 检查是否是任意数字 (整数或浮点)
#[inline(always)]
pub fn ttisnumber(v: &LuaValue) -> bool {
    (*v).tt_ == LUA_VNUMINT || (*v).tt_ == LUA_VNUMFLT
}

// ============ 值访问宏 (对应 Lua 的 ivalue/fltvalue) ============

/// ivalue - 直接获取整数值 (调用前必须用 ttisinteger 检查)
#[inline(always)]
pub fn ivalue(v: &LuaValue) -> i64 {
    unsafe { (*v).value_.i }
}

/// fltvalue - 直接获取浮点值 (调用前必须用 ttisfloat 检查)
#[inline(always)]
pub fn fltvalue(v: &LuaValue) -> f64 {
    unsafe { (*v).value_.n }
}

/// setivalue - 设置整数值
#[inline(always)]
pub fn setivalue(v: &mut LuaValue, i: i64) {
    (*v).value_.i = i;
    (*v).tt_ = LUA_VNUMINT;
}

/// chgivalue - 只修改整数值，不修改类型标签（Lua的chgivalue宏）
/// 调用前必须确认类型已经是整数！
#[inline(always)]
pub fn chgivalue(v: &mut LuaValue, i: i64) {
    (*v).value_.i = i;
}

/// setfltvalue - 设置浮点值
#[inline(always)]
pub fn setfltvalue(v: &mut LuaValue, n: f64) {
    (*v).value_.n = n;
    (*v).tt_ = LUA_VNUMFLT;
}

/// chgfltvalue - 只修改浮点值，不修改类型标签
/// 调用前必须确认类型已经是浮点！
#[inline(always)]
pub fn chgfltvalue(v: &mut LuaValue, n: f64) {
    (*v).value_.n = n;
}

/// setbfvalue - 设置false
#[inline(always)]
pub fn setbfvalue(v: &mut LuaValue) {
    (*v) = LuaValue::boolean(false);
}

/// setbtvalue - 设置true
#[inline(always)]
pub fn setbtvalue(v: &mut LuaValue) {
    (*v) = LuaValue::boolean(true);
}

/// setnilvalue - 设置nil
#[inline(always)]
pub fn setnilvalue(v: &mut LuaValue) {
    *v = LuaValue::nil();
}

// ============ 类型转换辅助函数 ============

/// tointegerns - 尝试转换为整数 (不抛出错误)
/// 对应 Lua 的 tointegerns 宏
#[inline(always)]
pub fn tointegerns(v: &LuaValue, out: &mut i64) -> bool {
    if ttisinteger(v) {
        *out = ivalue(v);
        true
    } else {
        false
    }
}

/// tonumberns - 尝试转换为浮点数 (不抛出错误)
#[inline(always)]
pub fn tonumberns(v: &LuaValue, out: &mut f64) -> bool {
    if ttisfloat(v) {
        *out = fltvalue(v);
        true
    } else if ttisinteger(v) {
        *out = ivalue(v) as f64;
        true
    } else {
        false
    }
}

/// tonumber - 从LuaValue引用转换为浮点数 (用于常量)
#[inline(always)]
pub fn tonumber(v: &LuaValue, out: &mut f64) -> bool {
    if v.tt_ == LUA_VNUMFLT {
        unsafe {
            *out = v.value_.n;
        }
        true
    } else if v.tt_ == LUA_VNUMINT {
        unsafe {
            *out = v.value_.i as f64;
        }
        true
    } else {
        false
    }
}

/// tointeger - 从LuaValue引用获取整数 (用于常量)
#[inline(always)]
pub fn tointeger(v: &LuaValue, out: &mut i64) -> bool {
    if v.tt_ == LUA_VNUMINT {
        unsafe {
            *out = v.value_.i;
        }
        true
    } else {
        false
    }
}

/// Lookup value from object's metatable __index
/// Returns Some(value) if found, None if not found or no metatable
pub fn lookup_from_metatable(
    lua_state: &mut LuaState,
    obj: &LuaValue,
    key: &LuaValue,
) -> Option<LuaValue> {
    // For string: use string_mt
    if obj.is_string() {
        let mt_val = lua_state.vm_mut().string_mt?;
        return lookup_index_from_metatable_value(lua_state, mt_val, key);
    }
    
    // For userdata: use userdata's metatable
    if let Some(ud_id) = obj.as_userdata_id() {
        let mt_val = lua_state.vm_mut().object_pool.get_userdata(ud_id)?.get_metatable();
        if mt_val.is_nil() {
            return None;
        }
        return lookup_index_from_metatable_value(lua_state, mt_val, key);
    }

    // For table: check if it has metatable
    if let Some(table_id) = obj.as_table_id() {
        let mt_id = lua_state.vm_mut().object_pool.get_table(table_id)?.get_metatable()?;
        return lookup_index_from_metatable_value(lua_state, LuaValue::table(mt_id), key);
    }
    
    None
}

/// Helper: lookup from metatable's __index field
fn lookup_index_from_metatable_value(
    lua_state: &mut LuaState,
    mt_val: LuaValue,
    key: &LuaValue,
) -> Option<LuaValue> {
    let mt_table_id = mt_val.as_table_id()?;
    let vm = lua_state.vm_mut();
    let index_key = vm.create_string("__index");
    let mt = vm.object_pool.get_table(mt_table_id)?;
    let index_value = mt.raw_get(&index_key)?;
    let index_table_id = index_value.as_table_id()?;
    let index_table = vm.object_pool.get_table(index_table_id)?;
    index_table.raw_get(key)
}

/// Fetch a value's `__newindex` metamethod/table, or `None` if it has no
/// metatable or the metatable has no `__newindex` entry.
fn get_newindex(lua_state: &mut LuaState, obj: &LuaValue) -> Option<LuaValue> {
    let mt_val = get_metatable(lua_state, obj)?;
    let mt_table_id = mt_val.as_table_id()?;
    let vm = lua_state.vm_mut();
    let key = vm.create_string("__newindex");
    let mt = vm.object_pool.get_table(mt_table_id)?;
    let value = mt.raw_get(&key)?;
    if value.is_nil() { None } else { Some(value) }
}

/// Finish a table-store operation that missed the raw fast path, following
/// the `__newindex` chain. Port of reference Lua's `luaV_finishset` (lvm.c):
/// if `obj` is a table with no `__newindex` entry, raw-set the key directly
/// (this is the "new key in a table with a metatable" case — the caller's
/// raw fast path only skips tables that have one); otherwise chase
/// `__newindex`, recursing through tables and invoking functions as the
/// metamethod.
pub fn store_to_metatable(
    lua_state: &mut LuaState,
    obj: &LuaValue,
    key: &LuaValue,
    value: LuaValue,
) -> LuaResult<()> {
    let mut obj = *obj;
    let key = *key;
    const MAXTAGLOOP: u32 = 2000;

    for _ in 0..MAXTAGLOOP {
        if let Some(table_id) = obj.as_table_id() {
            match get_newindex(lua_state, &obj) {
                None => {
                    let vm = lua_state.vm_mut();
                    if let Some(table) = vm.object_pool.get_table_mut(table_id) {
                        table.raw_set(&key, value);
                    }
                    lua_state.gc_barrier_back(GcId::TableId(table_id));
                    return Ok(());
                }
                Some(newindex) if newindex.as_table_id().is_some() => {
                    obj = newindex;
                    continue;
                }
                Some(newindex) => {
                    return call_tm(lua_state, newindex, obj, key, value);
                }
            }
        } else {
            match get_newindex(lua_state, &obj) {
                None => {
                    return Err(lua_state.error(format!(
                        "attempt to index a {} value",
                        obj.type_name()
                    )));
                }
                Some(newindex) if newindex.as_table_id().is_some() => {
                    obj = newindex;
                    continue;
                }
                Some(newindex) => {
                    return call_tm(lua_state, newindex, obj, key, value);
                }
            }
        }
    }

    Err(lua_state.error("'__newindex' chain too long; possible loop".to_string()))
}

/// Alias matching the reference VM's entry point name (`luaV_finishset`),
/// used by opcode handlers that index through an upvalue (`SETTABUP`).
#[inline]
pub fn finishset(
    lua_state: &mut LuaState,
    obj: &LuaValue,
    key: &LuaValue,
    value: LuaValue,
) -> LuaResult<()> {
    store_to_metatable(lua_state, obj, key, value)
}
