use crate::gc::{BinaryId, FunctionId, StringId, TableId, ThreadId, UpvalueId, UserdataId};

/// Unified GC object identifier, tagged by the kind of object it addresses.
/// Used by the collector to walk gray lists and sweep lists without caring
/// which typed pool an id belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GcId {
    StringId(StringId),
    TableId(TableId),
    FunctionId(FunctionId),
    UpvalueId(UpvalueId),
    ThreadId(ThreadId),
    UserdataId(UserdataId),
    BinaryId(BinaryId),
}

impl GcId {
    pub fn main_id() -> Self {
        GcId::ThreadId(ThreadId::main_id())
    }

    pub fn is_main(self) -> bool {
        matches!(self, GcId::ThreadId(id) if id.is_main())
    }
}
