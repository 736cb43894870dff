// Typed, GcHeader-tagged object storage for every kind of GC-managed value.
//
// Each kind (table, function, upvalue, binary, userdata, thread) lives in its
// own `TypedSlotPool`, addressed by a small `u32` index wrapped in a newtype
// id. Strings get two pools (short/interned, long/uninterned) folded behind
// a single `StringId` so callers never need to know which one a string lives
// in. This is the storage the GC in `gc::mod` walks during mark/sweep.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::gc::gc_object::{CachedUpvalue, FunctionBody, GcHeader, Upvalue};
use crate::lua_value::{Chunk, LuaString, LuaTable, LuaUserdata};
use crate::lua_vm::{CFunction, LuaState};

/// A pooled object: GC bookkeeping plus the payload.
pub struct Slot<T> {
    pub header: GcHeader,
    pub data: T,
}

/// Growable slot storage with a free list, so freed ids get reused.
/// Slots are individually boxed so a `Vec` growth never moves a live
/// object's address - this keeps raw pointers into slots (see
/// `CachedUpvalue`) valid for as long as the id stays allocated.
pub struct TypedSlotPool<T> {
    slots: Vec<Option<Box<Slot<T>>>>,
    free_list: Vec<u32>,
}

impl<T> TypedSlotPool<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    fn insert(&mut self, data: T, current_white: u8, size: u32) -> u32 {
        let slot = Box::new(Slot {
            header: GcHeader::with_white(current_white, size),
            data,
        });
        if let Some(id) = self.free_list.pop() {
            self.slots[id as usize] = Some(slot);
            id
        } else {
            let id = self.slots.len() as u32;
            self.slots.push(Some(slot));
            id
        }
    }

    #[inline(always)]
    pub fn get(&self, id: u32) -> Option<&Slot<T>> {
        self.slots.get(id as usize).and_then(|s| s.as_deref())
    }

    #[inline(always)]
    pub fn get_mut(&mut self, id: u32) -> Option<&mut Slot<T>> {
        self.slots.get_mut(id as usize).and_then(|s| s.as_deref_mut())
    }

    pub fn free(&mut self, id: u32) -> Option<T> {
        if let Some(slot) = self.slots.get_mut(id as usize).and_then(|s| s.take()) {
            self.free_list.push(id);
            return Some(slot.data);
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Slot<T>)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_deref().map(|s| (i as u32, s)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut Slot<T>)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_deref_mut().map(|s| (i as u32, s)))
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn shrink_to_fit(&mut self) {
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        self.slots.shrink_to_fit();
        self.free_list.shrink_to_fit();
    }
}

impl<T> Default for TypedSlotPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! plain_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub struct $name(pub u32);

        impl $name {
            #[inline(always)]
            pub fn to_u32(self) -> u32 {
                self.0
            }
        }
    };
}

plain_id!(TableId);
plain_id!(FunctionId);
plain_id!(UpvalueId);
plain_id!(UserdataId);
plain_id!(BinaryId);

/// Thread id. `main_id()` is a sentinel representing the main coroutine,
/// which is not itself stored in `ObjectPool::threads` (it lives in
/// `LuaVM::main_state` and is never collected).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ThreadId(pub u32);

impl ThreadId {
    pub const MAIN: u32 = u32::MAX;

    #[inline(always)]
    pub fn main_id() -> Self {
        ThreadId(Self::MAIN)
    }

    #[inline(always)]
    pub fn is_main(self) -> bool {
        self.0 == Self::MAIN
    }

    #[inline(always)]
    pub fn to_u32(self) -> u32 {
        self.0
    }
}

/// String id. Bit 31 selects which of the two string pools (short/long)
/// the remaining 31 bits index into - mirrors Lua's split between interned
/// short strings and heap long strings (`lstring.c`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StringId(pub u32);

const STRING_LONG_BIT: u32 = 1 << 31;

impl StringId {
    #[inline(always)]
    pub fn short(index: u32) -> Self {
        StringId(index & !STRING_LONG_BIT)
    }

    #[inline(always)]
    pub fn long(index: u32) -> Self {
        StringId(index | STRING_LONG_BIT)
    }

    #[inline(always)]
    pub fn is_short(self) -> bool {
        self.0 & STRING_LONG_BIT == 0
    }

    #[inline(always)]
    pub fn index(self) -> u32 {
        self.0 & !STRING_LONG_BIT
    }

    #[inline(always)]
    pub fn raw(self) -> u32 {
        self.0
    }
}

fn hash_bytes(s: &[u8]) -> u64 {
    use ahash::AHasher;
    let mut hasher = AHasher::default();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Storage for every GC-managed object kind in the VM.
pub struct ObjectPool {
    pub tables: TypedSlotPool<LuaTable>,
    pub functions: TypedSlotPool<FunctionBody>,
    pub upvalues: TypedSlotPool<Upvalue>,
    pub binaries: TypedSlotPool<Vec<u8>>,
    pub userdata: TypedSlotPool<LuaUserdata>,
    pub threads: TypedSlotPool<LuaState>,

    short_strings: TypedSlotPool<LuaString>,
    long_strings: TypedSlotPool<LuaString>,
    intern: HashMap<u64, u32>,
    short_string_limit: usize,
}

impl ObjectPool {
    pub fn new(short_string_limit: usize) -> Self {
        Self {
            tables: TypedSlotPool::new(),
            functions: TypedSlotPool::new(),
            upvalues: TypedSlotPool::new(),
            binaries: TypedSlotPool::new(),
            userdata: TypedSlotPool::new(),
            threads: TypedSlotPool::new(),
            short_strings: TypedSlotPool::new(),
            long_strings: TypedSlotPool::new(),
            intern: HashMap::new(),
            short_string_limit,
        }
    }

    pub fn short_string_limit(&self) -> usize {
        self.short_string_limit
    }

    // ============ Strings ============

    pub fn create_string(&mut self, s: &str, current_white: u8) -> StringId {
        self.create_string_bytes(s.as_bytes(), current_white)
    }

    pub fn create_string_owned(&mut self, s: String, current_white: u8) -> StringId {
        self.create_string_bytes(s.as_bytes(), current_white)
    }

    /// Intern a byte-exact string. This is the primitive every other
    /// `create_string*` helper funnels through — it never re-encodes.
    pub fn create_string_bytes(&mut self, s: &[u8], current_white: u8) -> StringId {
        if s.len() <= self.short_string_limit {
            let hash = hash_bytes(s);
            if let Some(&idx) = self.intern.get(&hash) {
                if let Some(slot) = self.short_strings.get(idx) {
                    if slot.data.as_bytes() == s {
                        return StringId::short(idx);
                    }
                }
            }
            let idx = self.short_strings.insert(
                LuaString::from_bytes(s.to_vec(), hash),
                current_white,
                s.len() as u32,
            );
            self.intern.insert(hash, idx);
            StringId::short(idx)
        } else {
            let hash = hash_bytes(s);
            let idx = self.long_strings.insert(
                LuaString::from_bytes(s.to_vec(), hash),
                current_white,
                s.len() as u32,
            );
            StringId::long(idx)
        }
    }

    pub fn create_substring(
        &mut self,
        s_id: StringId,
        start: usize,
        end: usize,
        current_white: u8,
    ) -> StringId {
        let content = self
            .get_string(s_id)
            .map(|s| s.as_bytes()[start..end].to_vec())
            .unwrap_or_default();
        self.create_string_bytes(&content, current_white)
    }

    pub fn get_string(&self, id: StringId) -> Option<&LuaString> {
        if id.is_short() {
            self.short_strings.get(id.index()).map(|s| &s.data)
        } else {
            self.long_strings.get(id.index()).map(|s| &s.data)
        }
    }

    pub fn get_string_gc_mut(&mut self, id: StringId) -> Option<&mut Slot<LuaString>> {
        if id.is_short() {
            self.short_strings.get_mut(id.index())
        } else {
            self.long_strings.get_mut(id.index())
        }
    }

    pub fn remove_string(&mut self, id: StringId) -> Option<LuaString> {
        let removed = if id.is_short() {
            self.short_strings.free(id.index())
        } else {
            self.long_strings.free(id.index())
        };
        if let Some(s) = &removed {
            let hash = hash_bytes(s.as_bytes());
            if self.intern.get(&hash) == Some(&id.index()) {
                self.intern.remove(&hash);
            }
        }
        removed
    }

    pub fn iter_strings(&self) -> impl Iterator<Item = (u32, &Slot<LuaString>)> + '_ {
        self.short_strings
            .iter()
            .map(|(i, s)| (StringId::short(i).raw(), s))
            .chain(self.long_strings.iter().map(|(i, s)| (StringId::long(i).raw(), s)))
    }

    pub fn iter_strings_mut(&mut self) -> impl Iterator<Item = (u32, &mut Slot<LuaString>)> + '_ {
        self.short_strings
            .iter_mut()
            .map(|(i, s)| (StringId::short(i).raw(), s))
            .chain(
                self.long_strings
                    .iter_mut()
                    .map(|(i, s)| (StringId::long(i).raw(), s)),
            )
    }

    // ============ Tables ============

    pub fn create_table(&mut self, array_size: usize, hash_size: usize, current_white: u8) -> TableId {
        let size = 64 + (array_size + hash_size) as u32 * 16;
        TableId(self.tables.insert(LuaTable::new(array_size as u32, hash_size as u32), current_white, size))
    }

    pub fn get_table(&self, id: TableId) -> Option<&LuaTable> {
        self.tables.get(id.0).map(|s| &s.data)
    }

    pub fn get_table_mut(&mut self, id: TableId) -> Option<&mut LuaTable> {
        self.tables.get_mut(id.0).map(|s| &mut s.data)
    }

    pub fn remove_table(&mut self, id: TableId) -> Option<LuaTable> {
        self.tables.free(id.0)
    }

    // ============ Userdata ============

    pub fn create_userdata(&mut self, data: LuaUserdata, current_white: u8) -> UserdataId {
        UserdataId(self.userdata.insert(data, current_white, 64))
    }

    pub fn get_userdata(&self, id: UserdataId) -> Option<&LuaUserdata> {
        self.userdata.get(id.0).map(|s| &s.data)
    }

    pub fn get_userdata_mut(&mut self, id: UserdataId) -> Option<&mut LuaUserdata> {
        self.userdata.get_mut(id.0).map(|s| &mut s.data)
    }

    // ============ Binaries ============

    pub fn create_binary(&mut self, data: Vec<u8>, current_white: u8) -> BinaryId {
        let size = data.len() as u32;
        BinaryId(self.binaries.insert(data, current_white, size))
    }

    // ============ Upvalues ============

    pub fn create_upvalue_open(&mut self, stack_index: usize, current_white: u8) -> UpvalueId {
        UpvalueId(self.upvalues.insert(Upvalue::Open(stack_index), current_white, 24))
    }

    pub fn create_upvalue_closed(&mut self, value: crate::lua_value::LuaValue, current_white: u8) -> UpvalueId {
        UpvalueId(self.upvalues.insert(Upvalue::Closed(value), current_white, 24))
    }

    /// Raw pointer into the upvalue slot, for `CachedUpvalue`'s fast path.
    /// Valid for as long as the id is not freed (slots are individually boxed).
    pub fn upvalue_ptr(&self, id: UpvalueId) -> *const Upvalue {
        self.upvalues
            .get(id.0)
            .map(|s| &s.data as *const Upvalue)
            .unwrap_or(std::ptr::null())
    }

    // ============ Functions ============

    pub fn create_function(
        &mut self,
        chunk: Rc<Chunk>,
        upvalue_ids: Vec<UpvalueId>,
        current_white: u8,
    ) -> FunctionId {
        let cached: Vec<CachedUpvalue> = upvalue_ids
            .into_iter()
            .map(|id| CachedUpvalue::new(id, self.upvalue_ptr(id)))
            .collect();
        let size = 32 + cached.len() as u32 * 16;
        FunctionId(self.functions.insert(FunctionBody::Lua(chunk, cached), current_white, size))
    }

    pub fn create_c_closure(
        &mut self,
        f: CFunction,
        upvalue_ids: Vec<UpvalueId>,
        current_white: u8,
    ) -> FunctionId {
        let cached: Vec<CachedUpvalue> = upvalue_ids
            .into_iter()
            .map(|id| CachedUpvalue::new(id, self.upvalue_ptr(id)))
            .collect();
        let size = 32 + cached.len() as u32 * 16;
        FunctionId(self.functions.insert(FunctionBody::CClosure(f, cached), current_white, size))
    }

    pub fn get_function(&self, id: FunctionId) -> Option<&FunctionBody> {
        self.functions.get(id.0).map(|s| &s.data)
    }

    pub fn get_function_mut(&mut self, id: FunctionId) -> Option<&mut FunctionBody> {
        self.functions.get_mut(id.0).map(|s| &mut s.data)
    }

    pub fn get_upvalue(&self, id: UpvalueId) -> Option<&Upvalue> {
        self.upvalues.get(id.0).map(|s| &s.data)
    }

    pub fn get_upvalue_mut(&mut self, id: UpvalueId) -> Option<&mut Upvalue> {
        self.upvalues.get_mut(id.0).map(|s| &mut s.data)
    }

    // ============ Threads ============

    pub fn create_thread(&mut self, thread: LuaState, current_white: u8) -> ThreadId {
        ThreadId(self.threads.insert(thread, current_white, 1024))
    }

    pub fn get_thread(&self, id: ThreadId) -> Option<&LuaState> {
        self.threads.get(id.0).map(|s| &s.data)
    }

    pub fn get_thread_mut(&mut self, id: ThreadId) -> Option<&mut LuaState> {
        self.threads.get_mut(id.0).map(|s| &mut s.data)
    }

    // ============ Maintenance ============

    pub fn shrink_to_fit(&mut self) {
        self.tables.shrink_to_fit();
        self.functions.shrink_to_fit();
        self.upvalues.shrink_to_fit();
        self.binaries.shrink_to_fit();
        self.userdata.shrink_to_fit();
        self.threads.shrink_to_fit();
        self.short_strings.shrink_to_fit();
        self.long_strings.shrink_to_fit();
        self.intern.shrink_to_fit();
    }
}
