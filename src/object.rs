use log::debug;
use windows::{
    core::{IUnknown, Interface, GUID, PCWSTR},
    Win32::System::Com::{CLSIDFromProgID, CoCreateInstance, IDispatch},
};

use crate::{co_initialize, common::dispatch::HasDispatch, wide, Error, OBJECT_CONTEXT};

/// Automation object created by ProgID.
#[derive(Debug, Clone)]
pub struct DispatchObject(pub IDispatch);

impl DispatchObject {
    pub fn new(class_id: &GUID) -> Result<Self, Error> {
        co_initialize()?;

        let unknown: IUnknown = unsafe { CoCreateInstance(class_id as *const GUID, None, OBJECT_CONTEXT) }?;

        let dispatch: IDispatch = unknown.cast()?;
        Ok(DispatchObject(dispatch))
    }

    /// `prog_id` is something like `"Scripting.Dictionary"`.
    pub fn from_prog_id(prog_id: &str) -> Result<Self, Error> {
        co_initialize()?;

        let utf16 = wide(prog_id);
        let class_id = unsafe { CLSIDFromProgID(PCWSTR(utf16.as_ptr())) }?;
        debug!("{} has class id {:?}", prog_id, class_id);

        Self::new(&class_id)
    }
}

impl From<IDispatch> for DispatchObject {
    fn from(dispatch: IDispatch) -> Self {
        DispatchObject(dispatch)
    }
}

impl HasDispatch for DispatchObject {
    fn dispatch(&self) -> &IDispatch {
        &self.0
    }
}
