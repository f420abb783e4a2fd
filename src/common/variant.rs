use thiserror::Error;

#[cfg(windows)]
use windows::{core::{IUnknown, Interface, BSTR, VARIANT}, Win32::System::Com::IDispatch};

use super::args::ArgSlot;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VariantError {
    #[error("Null-pointer in non-empty VARIANT")]
    NullPointer,
    #[error("Unsupported VARIANT type: {0:#06x}")]
    Unsupported(u16),
}

pub const VT_EMPTY: u16 = 0x00;
pub const VT_NULL: u16 = 0x01;
pub const VT_I2: u16 = 0x02;
pub const VT_I4: u16 = 0x03;
pub const VT_R4: u16 = 0x04;
pub const VT_R8: u16 = 0x05;
pub const VT_CY: u16 = 0x06;
pub const VT_DATE: u16 = 0x07;
pub const VT_BSTR: u16 = 0x08;
pub const VT_DISPATCH: u16 = 0x09;
pub const VT_ERROR: u16 = 0x0A;
pub const VT_BOOL: u16 = 0x0B;
pub const VT_VARIANT: u16 = 0x0C;
pub const VT_UNKNOWN: u16 = 0x0D;
pub const VT_I1: u16 = 0x10;
pub const VT_UI1: u16 = 0x11;
pub const VT_UI2: u16 = 0x12;
pub const VT_UI4: u16 = 0x13;
pub const VT_I8: u16 = 0x14;
pub const VT_UI8: u16 = 0x15;
pub const VT_BYREF: u16 = 0x4000;

/// `VARIANT_TRUE`; false is zero.
#[cfg(windows)]
const VARIANT_TRUE: i16 = -1;

/// Fixed-point currency, scaled by 10 000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Currency(pub i64);

impl Currency {
    pub const SCALE: i64 = 10_000;

    /// `None` when `units` is outside the representable range.
    pub fn from_units(units: i64) -> Option<Self> {
        units.checked_mul(Self::SCALE).map(Currency)
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }
}

/// Owned argument or result value of a dispatch call.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Empty,
    /// SQL-style null, distinct from `Empty`.
    Null,
    Bool(bool),
    I1(i8),
    I2(i16),
    I4(i32),
    I8(i64),
    UI1(u8),
    UI2(u16),
    UI4(u32),
    UI8(u64),
    R4(f32),
    R8(f64),
    Currency(Currency),
    /// OLE automation date: days since 1899-12-30.
    Date(f64),
    /// `SCODE`, also used for omitted optional arguments.
    Error(i32),
    Bstr(String),
    Variant(Box<Variant>),
    #[cfg(windows)]
    Dispatch(IDispatch),
    #[cfg(windows)]
    Unknown(IUnknown),
}

impl Variant {
    /// The `VARTYPE` tag this value travels under.
    pub fn vartype(&self) -> u16 {
        match self {
            Variant::Empty => VT_EMPTY,
            Variant::Null => VT_NULL,
            Variant::Bool(_) => VT_BOOL,
            Variant::I1(_) => VT_I1,
            Variant::I2(_) => VT_I2,
            Variant::I4(_) => VT_I4,
            Variant::I8(_) => VT_I8,
            Variant::UI1(_) => VT_UI1,
            Variant::UI2(_) => VT_UI2,
            Variant::UI4(_) => VT_UI4,
            Variant::UI8(_) => VT_UI8,
            Variant::R4(_) => VT_R4,
            Variant::R8(_) => VT_R8,
            Variant::Currency(_) => VT_CY,
            Variant::Date(_) => VT_DATE,
            Variant::Error(_) => VT_ERROR,
            Variant::Bstr(_) => VT_BSTR,
            Variant::Variant(_) => VT_VARIANT | VT_BYREF,
            #[cfg(windows)]
            Variant::Dispatch(_) => VT_DISPATCH,
            #[cfg(windows)]
            Variant::Unknown(_) => VT_UNKNOWN,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    /// Strips any number of nesting levels.
    pub fn flatten(self) -> Variant {
        match self {
            Variant::Variant(inner) => inner.flatten(),
            other => other,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            Variant::Variant(inner) => inner.as_bool(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::Bstr(s) => Some(s),
            Variant::Variant(inner) => inner.as_str(),
            _ => None,
        }
    }

    /// Widens any integer variant that fits into an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Variant::I1(n) => Some(n.into()),
            Variant::I2(n) => Some(n.into()),
            Variant::I4(n) => Some(n.into()),
            Variant::I8(n) => Some(n),
            Variant::UI1(n) => Some(n.into()),
            Variant::UI2(n) => Some(n.into()),
            Variant::UI4(n) => Some(n.into()),
            Variant::UI8(n) => i64::try_from(n).ok(),
            Variant::Variant(ref inner) => inner.as_i64(),
            _ => None,
        }
    }
}

impl ArgSlot for Variant {
    fn is_null(&self) -> bool {
        matches!(self, Variant::Empty | Variant::Null)
    }
}

macro_rules! variant_from {
    ($($ty:ty => $arm:ident),* $(,)?) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    Variant::$arm(value)
                }
            }
        )*
    };
}

variant_from! {
    bool => Bool,
    i8 => I1,
    i16 => I2,
    i32 => I4,
    i64 => I8,
    u8 => UI1,
    u16 => UI2,
    u32 => UI4,
    u64 => UI8,
    f32 => R4,
    f64 => R8,
    Currency => Currency,
    String => Bstr,
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::Bstr(value.to_string())
    }
}

impl From<Box<Variant>> for Variant {
    fn from(value: Box<Variant>) -> Self {
        Variant::Variant(value)
    }
}

#[cfg(windows)]
impl From<IDispatch> for Variant {
    fn from(value: IDispatch) -> Self {
        Variant::Dispatch(value)
    }
}

#[cfg(windows)]
impl From<IUnknown> for Variant {
    fn from(value: IUnknown) -> Self {
        Variant::Unknown(value)
    }
}

/// Memory layout of a `VARIANT`.
#[cfg(windows)]
#[derive(Debug)]
#[repr(C)]
struct RawVariant {
    vt: u16,
    reserved1: u16,
    reserved2: u16,
    reserved3: u16,
    union: u64,
    #[cfg(target_pointer_width = "64")]
    record: usize,
}

#[cfg(windows)]
impl RawVariant {
    fn new(vt: u16, union: u64) -> Self {
        RawVariant {
            vt,
            reserved1: 0,
            reserved2: 0,
            reserved3: 0,
            union,
            #[cfg(target_pointer_width = "64")]
            record: 0,
        }
    }

    fn of(value: &VARIANT) -> &RawVariant {
        unsafe { &*(value as *const VARIANT as *const RawVariant) }
    }

    fn pointer(&self) -> usize {
        self.union as usize
    }

    /// Nothing a receiver could be: empty, null, or an interface tag
    /// without an interface behind it.
    fn is_null(&self) -> bool {
        match self.vt {
            VT_EMPTY | VT_NULL => true,
            VT_DISPATCH | VT_UNKNOWN => self.pointer() == 0,
            _ => false,
        }
    }

    fn read(&self) -> Result<Variant, VariantError> {
        // The union holds either an inline value or a pointer, depending on vt.
        let bits = self.union;
        let value = match self.vt {
            VT_EMPTY => Variant::Empty,
            VT_NULL => Variant::Null,
            VT_BOOL => Variant::Bool(bits as u16 as i16 != 0),
            VT_I1 => Variant::I1(bits as u8 as i8),
            VT_I2 => Variant::I2(bits as u16 as i16),
            VT_I4 => Variant::I4(bits as u32 as i32),
            VT_I8 => Variant::I8(bits as i64),
            VT_UI1 => Variant::UI1(bits as u8),
            VT_UI2 => Variant::UI2(bits as u16),
            VT_UI4 => Variant::UI4(bits as u32),
            VT_UI8 => Variant::UI8(bits),
            VT_R4 => Variant::R4(f32::from_bits(bits as u32)),
            VT_R8 => Variant::R8(f64::from_bits(bits)),
            VT_CY => Variant::Currency(Currency(bits as i64)),
            VT_DATE => Variant::Date(f64::from_bits(bits)),
            VT_ERROR => Variant::Error(bits as u32 as i32),
            VT_BSTR if self.pointer() == 0 => Variant::Bstr(String::new()),
            VT_BSTR => {
                let raw = self.pointer();
                let bstr = unsafe { std::mem::transmute::<&usize, &BSTR>(&raw) };
                Variant::Bstr(bstr.to_string())
            }
            _ if self.pointer() == 0 => return Err(VariantError::NullPointer),
            VT_DISPATCH => {
                let raw = self.pointer() as *mut std::ffi::c_void;
                let dispatch = unsafe { IDispatch::from_raw_borrowed(&raw) }
                    .ok_or(VariantError::NullPointer)?;
                Variant::Dispatch(dispatch.clone())
            }
            VT_UNKNOWN => {
                let raw = self.pointer() as *mut std::ffi::c_void;
                let unknown = unsafe { IUnknown::from_raw_borrowed(&raw) }
                    .ok_or(VariantError::NullPointer)?;
                Variant::Unknown(unknown.clone())
            }
            vt if vt == VT_VARIANT | VT_BYREF => {
                let inner = unsafe { &*(self.pointer() as *const RawVariant) };
                Variant::Variant(Box::new(inner.read()?))
            }
            vt => return Err(VariantError::Unsupported(vt)),
        };
        Ok(value)
    }
}

#[cfg(windows)]
impl TryFrom<&VARIANT> for Variant {
    type Error = VariantError;

    fn try_from(value: &VARIANT) -> Result<Variant, VariantError> {
        RawVariant::of(value).read()
    }
}

#[cfg(windows)]
impl TryFrom<VARIANT> for Variant {
    type Error = VariantError;

    fn try_from(value: VARIANT) -> Result<Variant, VariantError> {
        // Borrowed contents are cloned out; `value` releases its own on drop.
        Variant::try_from(&value)
    }
}

#[cfg(windows)]
impl From<Variant> for VARIANT {
    fn from(value: Variant) -> VARIANT {
        // Nested values travel by value, the native side never sees the box.
        let value = value.flatten();
        let vt = value.vartype();

        // Ownership of strings and interfaces moves into the VARIANT.
        let union = match value {
            Variant::Empty | Variant::Null => 0,
            Variant::Bool(b) => (if b { VARIANT_TRUE } else { 0 }) as u16 as u64,
            Variant::I1(n) => n as u8 as u64,
            Variant::I2(n) => n as u16 as u64,
            Variant::I4(n) => n as u32 as u64,
            Variant::I8(n) => n as u64,
            Variant::UI1(n) => n as u64,
            Variant::UI2(n) => n as u64,
            Variant::UI4(n) => n as u64,
            Variant::UI8(n) => n,
            Variant::R4(n) => n.to_bits() as u64,
            Variant::R8(n) => n.to_bits(),
            Variant::Currency(cy) => cy.0 as u64,
            Variant::Date(days) => days.to_bits(),
            Variant::Error(scode) => scode as u32 as u64,
            Variant::Bstr(s) => BSTR::from(s.as_str()).into_raw() as usize as u64,
            Variant::Dispatch(dispatch) => dispatch.into_raw() as usize as u64,
            Variant::Unknown(unknown) => unknown.into_raw() as usize as u64,
            Variant::Variant(_) => unreachable!("flattened above"),
        };

        unsafe { std::mem::transmute::<RawVariant, VARIANT>(RawVariant::new(vt, union)) }
    }
}

#[cfg(windows)]
impl ArgSlot for VARIANT {
    fn is_null(&self) -> bool {
        RawVariant::of(self).is_null()
    }
}
