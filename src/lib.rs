//! Argument lists for late-bound automation calls.
//!
//! [`DispatchArgs`] collects arguments in call order and exports them in
//! the reversed layout `DISPPARAMS` uses, optionally with an implicit
//! "this" receiver. On Windows the [`HasDispatch`] and [`HasDispatchEx`]
//! traits hand such a list to `Invoke` / `InvokeEx`.

mod common;
#[cfg(windows)]
mod object;

use thiserror::Error;

pub use common::args::{ArgSlot, ArgsError, ArgsView, DispatchArgs, DISPID_THIS, GROW_BY};
pub use common::variant::{Currency, Variant, VariantError};

#[cfg(windows)]
pub use common::dispatch::{DispatchError, HasDispatch, HasDispatchEx, Invocation, Params};
#[cfg(windows)]
pub use object::DispatchObject;

#[cfg(windows)]
use once_cell::sync::OnceCell;
#[cfg(windows)]
use windows::Win32::System::Com::{CoInitialize, CLSCTX, CLSCTX_INPROC_SERVER, CLSCTX_LOCAL_SERVER};

#[cfg(windows)]
const OBJECT_CONTEXT: CLSCTX = CLSCTX(CLSCTX_LOCAL_SERVER.0 | CLSCTX_INPROC_SERVER.0);
#[cfg(windows)]
const LOCALE_USER_DEFAULT: u32 = 0x0400;

#[cfg(windows)]
static CO_INITIALIZED: OnceCell<()> = OnceCell::new();

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Args(#[from] ArgsError),
    #[error(transparent)]
    Variant(#[from] VariantError),
    #[cfg(windows)]
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[cfg(windows)]
    #[error(transparent)]
    Internal(#[from] windows::core::Error),
}

/// Nul-terminated UTF-16 copy of `rstr`. Keep it alive while a `PCWSTR`
/// points into it.
#[cfg(windows)]
fn wide(rstr: &str) -> Vec<u16> {
    rstr.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Enters a single-threaded apartment once per process.
#[cfg(windows)]
pub fn co_initialize() -> Result<(), Error> {
    CO_INITIALIZED
        .get_or_try_init(|| unsafe { CoInitialize(None) }.ok().map_err(Error::Internal))
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_errors_convert() {
        let err: Error = ArgsError::NullReceiver.into();
        assert!(matches!(err, Error::Args(ArgsError::NullReceiver)));
        assert_eq!(err.to_string(), "receiver must not be empty");
    }

    #[test]
    fn variant_errors_convert() {
        let err: Error = VariantError::Unsupported(0x24).into();
        assert_eq!(err.to_string(), "Unsupported VARIANT type: 0x0024");
    }

    #[cfg(windows)]
    #[test]
    fn wide_is_nul_terminated() {
        assert_eq!(wide("ab"), vec![b'a' as u16, b'b' as u16, 0]);
    }
}
