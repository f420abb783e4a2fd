use log::{debug, trace, warn};
use thiserror::Error;
use windows::{
    core::{BSTR, GUID, PCWSTR, VARIANT},
    Win32::System::{
        Com::{IDispatch, IServiceProvider, DISPATCH_FLAGS, DISPPARAMS, EXCEPINFO},
        Ole::IDispatchEx,
    },
};

use crate::{wide, Error, LOCALE_USER_DEFAULT};

use super::{args::DispatchArgs, variant::Variant};

/// `fdexNameEnsure`: create the member if it does not exist yet.
const FDEX_NAME_ENSURE: u32 = 0x2;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invoking `{invoked_name}` failed: {description}")]
    InvokeError {
        invoked_name: String,
        description: String,
        #[source]
        error: windows::core::Error,
    },
    #[error("no dispatch id for `{name}`")]
    DispidError {
        name: String,
        #[source]
        error: windows::core::Error,
    },
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    Method = 1,
    PropertyGet = 2,
}

/// `DISPPARAMS` borrowing the argument list it points into.
pub struct Params<'a> {
    raw: DISPPARAMS,
    _args: std::marker::PhantomData<&'a mut DispatchArgs<VARIANT>>,
}

impl Params<'_> {
    pub fn as_ptr(&self) -> *const DISPPARAMS {
        &self.raw
    }
}

impl DispatchArgs<VARIANT> {
    pub fn dispparams(&mut self) -> Params<'_> {
        let view = self.view();
        let args = view.args();
        let named = view.named_args();
        let raw = DISPPARAMS {
            rgvarg: if args.is_empty() { std::ptr::null_mut() } else { args.as_ptr() as *mut _ },
            rgdispidNamedArgs: if named.is_empty() { std::ptr::null_mut() } else { named.as_ptr() as *mut i32 },
            cArgs: args.len() as u32,
            cNamedArgs: named.len() as u32,
        };
        Params {
            raw,
            _args: std::marker::PhantomData,
        }
    }
}

fn invoke_error(name: &str, exception: &EXCEPINFO, error: windows::core::Error) -> Error {
    let description = exception.bstrDescription.to_string();
    warn!("invoking `{}` failed: {} ({})", name, description, error);
    Error::Dispatch(DispatchError::InvokeError {
        invoked_name: name.to_string(),
        description,
        error,
    })
}

pub trait HasDispatch {
    fn dispatch(&self) -> &IDispatch;

    fn get_dispid(&self, member_name: &str) -> Result<i32, Error> {
        let mut rgdispid: i32 = 0;
        let utf16 = wide(member_name);
        let name = PCWSTR(utf16.as_ptr());

        if let Err(e) = unsafe {
            self.dispatch().GetIDsOfNames(
                &GUID::zeroed(),
                &name as *const PCWSTR,
                1,
                LOCALE_USER_DEFAULT,
                &mut rgdispid as *mut i32,
            )
        } {
            return Err(Error::Dispatch(DispatchError::DispidError {
                name: member_name.to_string(),
                error: e,
            }));
        };

        debug!("resolved `{}` to dispid {}", member_name, rgdispid);
        Ok(rgdispid)
    }

    fn invoke(
        &self,
        dispid: i32,
        flag: Invocation,
        args: &mut DispatchArgs<VARIANT>,
    ) -> Result<Variant, Error> {
        self.invoke_named(&dispid.to_string(), dispid, flag, args)
    }

    /// Like [`invoke`](Self::invoke), with `name` used only for reporting.
    fn invoke_named(
        &self,
        name: &str,
        dispid: i32,
        flag: Invocation,
        args: &mut DispatchArgs<VARIANT>,
    ) -> Result<Variant, Error> {
        trace!("invoke `{}` ({:?}) with {} args", name, flag, args.len());
        let params = args.dispparams();
        let mut exception = EXCEPINFO::default();
        let mut result = VARIANT::new();

        if let Err(e) = unsafe {
            self.dispatch().Invoke(
                dispid,
                &GUID::zeroed(),
                LOCALE_USER_DEFAULT,
                DISPATCH_FLAGS(flag as u16),
                params.as_ptr(),
                Some(&mut result as *mut VARIANT),
                Some(&mut exception as *mut EXCEPINFO),
                None,
            )
        } {
            return Err(invoke_error(name, &exception, e));
        };

        Ok(Variant::try_from(result)?)
    }

    fn call(&self, method_name: &str, args: &mut DispatchArgs<VARIANT>) -> Result<Variant, Error> {
        let dispid = self.get_dispid(method_name)?;
        self.invoke_named(method_name, dispid, Invocation::Method, args)
    }
}

impl HasDispatch for IDispatch {
    fn dispatch(&self) -> &IDispatch {
        self
    }
}

/// Expando-aware calls through `IDispatchEx`, as script objects expose.
pub trait HasDispatchEx {
    fn dispatch_ex(&self) -> &IDispatchEx;

    fn get_ex_dispid(&self, member_name: &str, ensure_exists: bool) -> Result<i32, Error> {
        let grfdex = if ensure_exists { FDEX_NAME_ENSURE } else { 0 };
        let name = BSTR::from(member_name);

        let dispid = unsafe { self.dispatch_ex().GetDispID(&name, grfdex) }.map_err(|e| {
            Error::Dispatch(DispatchError::DispidError {
                name: member_name.to_string(),
                error: e,
            })
        })?;

        debug!("resolved expando `{}` to dispid {}", member_name, dispid);
        Ok(dispid)
    }

    fn invoke_ex(
        &self,
        dispid: i32,
        flag: Invocation,
        args: &mut DispatchArgs<VARIANT>,
    ) -> Result<Variant, Error> {
        self.invoke_ex_named(&dispid.to_string(), dispid, flag, args)
    }

    fn invoke_ex_named(
        &self,
        name: &str,
        dispid: i32,
        flag: Invocation,
        args: &mut DispatchArgs<VARIANT>,
    ) -> Result<Variant, Error> {
        trace!("invoke_ex `{}` ({:?}) with {} args", name, flag, args.len());
        let params = args.dispparams();
        let mut exception = EXCEPINFO::default();
        let mut result = VARIANT::new();

        if let Err(e) = unsafe {
            self.dispatch_ex().InvokeEx(
                dispid,
                LOCALE_USER_DEFAULT,
                flag as u16,
                params.as_ptr(),
                Some(&mut result as *mut VARIANT),
                Some(&mut exception as *mut EXCEPINFO),
                None::<&IServiceProvider>,
            )
        } {
            return Err(invoke_error(name, &exception, e));
        };

        Ok(Variant::try_from(result)?)
    }

    /// Calls an existing member; the name is never created.
    fn call_ex(&self, method_name: &str, args: &mut DispatchArgs<VARIANT>) -> Result<Variant, Error> {
        let dispid = self.get_ex_dispid(method_name, false)?;
        self.invoke_ex_named(method_name, dispid, Invocation::Method, args)
    }
}

impl HasDispatchEx for IDispatchEx {
    fn dispatch_ex(&self) -> &IDispatchEx {
        self
    }
}
