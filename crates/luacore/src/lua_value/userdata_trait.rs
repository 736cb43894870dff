//! The `UserDataTrait`/`UdValue` contract behind `LuaUserdata`.
//!
//! `#[derive(LuaUserData)]` (in `luacore-derive`) implements `UserDataTrait`
//! for a Rust struct; `#[lua_methods]` adds the method table it dispatches
//! through. Host code that can't use the derive macro (third-party types)
//! goes through [`crate::lua_value::userdata_builder::UserDataBuilder`]
//! instead.

use std::any::Any;

use crate::lua_vm::CFunction;

/// A single Lua-visible value used at the userdata boundary.
///
/// Kept separate from [`crate::LuaValue`] so `UserDataTrait` methods don't
/// need a live `LuaVM`/GC handle just to describe a field or argument.
#[derive(Clone)]
pub enum UdValue {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Str(String),
    Function(CFunction),
    UserdataOwned(std::rc::Rc<std::cell::RefCell<Box<dyn UserDataTrait>>>),
}

impl UdValue {
    /// Wrap a Rust value implementing `UserDataTrait` as an owned userdata result.
    ///
    /// Used by derive-generated arithmetic/unary metamethods, whose Rust
    /// operator impls produce a new `Self` that then needs to travel back
    /// across the boundary as a `UdValue`.
    pub fn from_userdata<T: UserDataTrait>(value: T) -> Self {
        UdValue::UserdataOwned(std::rc::Rc::new(std::cell::RefCell::new(Box::new(value))))
    }

    /// Downcast a `UserdataOwned` payload to `&T`, if it holds one and the
    /// concrete type matches.
    pub fn as_userdata_ref<T: 'static>(&self) -> Option<std::cell::Ref<'_, T>> {
        match self {
            UdValue::UserdataOwned(rc) => {
                std::cell::Ref::filter_map(rc.borrow(), |b| b.as_any().downcast_ref::<T>()).ok()
            }
            _ => None,
        }
    }

    pub fn to_integer(&self) -> Option<i64> {
        match self {
            UdValue::Integer(i) => Some(*i),
            UdValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn to_number(&self) -> Option<f64> {
        match self {
            UdValue::Integer(i) => Some(*i as f64),
            UdValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_str(&self) -> Option<&str> {
        match self {
            UdValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Lua truthiness: only `nil` and `false` are falsy.
    pub fn to_bool(&self) -> bool {
        !matches!(self, UdValue::Nil | UdValue::Boolean(false))
    }
}

impl std::fmt::Debug for UdValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UdValue::Nil => write!(f, "nil"),
            UdValue::Boolean(b) => write!(f, "{b}"),
            UdValue::Integer(i) => write!(f, "{i}"),
            UdValue::Number(n) => write!(f, "{n}"),
            UdValue::Str(s) => write!(f, "{s:?}"),
            UdValue::Function(_) => write!(f, "function"),
            UdValue::UserdataOwned(rc) => write!(f, "userdata<{}>", rc.borrow().type_name()),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for UdValue {
                fn from(v: $t) -> Self {
                    UdValue::Integer(v as i64)
                }
            }
        )*
    };
}
impl_from_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<f32> for UdValue {
    fn from(v: f32) -> Self {
        UdValue::Number(v as f64)
    }
}

impl From<f64> for UdValue {
    fn from(v: f64) -> Self {
        UdValue::Number(v)
    }
}

impl From<bool> for UdValue {
    fn from(v: bool) -> Self {
        UdValue::Boolean(v)
    }
}

impl From<String> for UdValue {
    fn from(v: String) -> Self {
        UdValue::Str(v)
    }
}

impl From<&str> for UdValue {
    fn from(v: &str) -> Self {
        UdValue::Str(v.to_owned())
    }
}

impl<T> From<Option<T>> for UdValue
where
    T: Into<UdValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => UdValue::Nil,
        }
    }
}

/// Exposes a Rust type to Lua as opaque userdata: field access, metamethods,
/// and the `Any` downcast that lets host code get its concrete type back.
///
/// `#[derive(LuaUserData)]` generates this impl; everything but `type_name`,
/// `as_any` and `as_any_mut` has a no-op default so a struct only needs to
/// override the metamethods it actually supports (via `#[lua_impl(...)]`).
pub trait UserDataTrait: 'static {
    /// Name reported by `type()`/error messages (e.g. `"FILE*"`, `"Point"`).
    fn type_name(&self) -> &'static str;

    /// Read a named field or method. Returns `None` for unknown keys so the
    /// caller can fall back to a metatable `__index`.
    fn get_field(&self, _key: &str) -> Option<UdValue> {
        None
    }

    /// Write a named field. `None` means the key is not settable at all
    /// (falls through to `__newindex`); `Some(Err(_))` means the key is
    /// known but the value was rejected (wrong type, read-only, ...).
    fn set_field(&mut self, _key: &str, _value: UdValue) -> Option<Result<(), String>> {
        None
    }

    /// Names of the fields exposed via `get_field`/`set_field`, for
    /// introspection (`pairs` over userdata, error messages).
    fn field_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// `__tostring`.
    fn lua_tostring(&self) -> Option<String> {
        None
    }

    /// `__eq`.
    fn lua_eq(&self, _other: &dyn UserDataTrait) -> Option<bool> {
        None
    }

    /// `__lt`.
    fn lua_lt(&self, _other: &dyn UserDataTrait) -> Option<bool> {
        None
    }

    /// `__le`.
    fn lua_le(&self, _other: &dyn UserDataTrait) -> Option<bool> {
        None
    }

    /// `__len`.
    fn lua_len(&self) -> Option<UdValue> {
        None
    }

    /// `__pairs`/stateless iteration step: given the previous control value
    /// (`UdValue::Nil` to start), return the next `(key, value)` pair.
    fn lua_next(&self, _control: &UdValue) -> Option<(UdValue, UdValue)> {
        None
    }

    /// `__add`.
    fn lua_add(&self, _other: &UdValue) -> Option<UdValue> {
        None
    }

    /// `__sub`.
    fn lua_sub(&self, _other: &UdValue) -> Option<UdValue> {
        None
    }

    /// `__mul`.
    fn lua_mul(&self, _other: &UdValue) -> Option<UdValue> {
        None
    }

    /// `__div`.
    fn lua_div(&self, _other: &UdValue) -> Option<UdValue> {
        None
    }

    /// `__mod`.
    fn lua_mod(&self, _other: &UdValue) -> Option<UdValue> {
        None
    }

    /// `__unm`.
    fn lua_unm(&self) -> Option<UdValue> {
        None
    }

    /// `__gc` - called when the userdata is collected.
    fn lua_gc(&mut self) {}

    /// `__close` - called when a to-be-closed userdata goes out of scope.
    fn lua_close(&mut self) {}
}

/// Generated by `#[derive(LuaUserData)]` for C-like enums: exposes the
/// variant/discriminant table without needing field access at all.
pub trait LuaEnum {
    /// `(variant name, discriminant)` pairs, in declaration order.
    fn variants() -> &'static [(&'static str, i64)];
    fn enum_name() -> &'static str;
}

/// Implement a minimal `UserDataTrait` for a type with no exposed fields or
/// metamethods — just a `type()` name and the `Any` downcast.
///
/// ```ignore
/// struct SimpleHandle { id: u32 }
/// luacore::impl_simple_userdata!(SimpleHandle, "SimpleHandle");
/// ```
#[macro_export]
macro_rules! impl_simple_userdata {
    ($ty:ty, $name:expr) => {
        impl $crate::lua_value::userdata_trait::UserDataTrait for $ty {
            fn type_name(&self) -> &'static str {
                $name
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }
    };
}
