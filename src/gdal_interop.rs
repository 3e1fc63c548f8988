//! Adapter over GDAL's thread-local "last error" state for raw `gdal-sys` calls.
//!
//! The state must be read right after the call that may have set it, on the
//! same thread; callers hand the return code straight to [`check_rc`].

use std::ffi::CStr;

use gdal::errors::GdalError;
use gdal_sys::CPLErr;

use crate::error::{Error, Result};

/// Turns a CPL return code into a `Result`, collecting GDAL's last error
/// message when the call failed.
pub fn check_rc(rc: CPLErr::Type) -> Result<()> {
    if rc == CPLErr::CE_None {
        Ok(())
    } else {
        Err(last_error(rc))
    }
}

pub fn last_error(class: CPLErr::Type) -> Error {
    let (number, msg) = unsafe {
        let number = gdal_sys::CPLGetLastErrorNo();
        let ptr = gdal_sys::CPLGetLastErrorMsg();
        let msg = if ptr.is_null() {
            String::new()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        };
        gdal_sys::CPLErrorReset();
        (number, msg)
    };
    Error::Gdal(GdalError::CplError { class, number, msg })
}
