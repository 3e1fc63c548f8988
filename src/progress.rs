//! Progress reporting for long-running raster operations.
//!
//! The callback runs synchronously on the caller's thread with a completion
//! fraction in `[0, 1]` that never decreases, plus a status message.
//! Returning `false` cancels the operation, which then fails with
//! [`Error::Cancelled`] and discards its partial output.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::fmt;

use crate::error::{Error, Result};

type Callback<'a> = Box<dyn FnMut(f64, &str) -> bool + Send + 'a>;

#[derive(Default)]
pub struct Progress<'a> {
    callback: Option<Callback<'a>>,
    last: f64,
    cancelled: bool,
}

impl<'a> Progress<'a> {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(f64, &str) -> bool + Send + 'a,
    {
        Self {
            callback: Some(Box::new(callback)),
            last: 0.0,
            cancelled: false,
        }
    }

    pub fn is_set(&self) -> bool {
        self.callback.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Forwards `fraction` to the callback, clamped so the sequence never decreases.
    pub fn report(&mut self, fraction: f64, message: &str) -> Result<()> {
        if self.cancelled {
            return Err(Error::Cancelled);
        }
        let Some(callback) = self.callback.as_mut() else {
            return Ok(());
        };
        let fraction = fraction.clamp(0.0, 1.0).max(self.last);
        self.last = fraction;
        if callback(fraction, message) {
            Ok(())
        } else {
            self.cancelled = true;
            Err(Error::Cancelled)
        }
    }

    /// Progress function and argument pair for raw GDAL algorithm calls.
    /// The argument points at `self` and must not outlive the call.
    pub(crate) fn as_gdal(&mut self) -> (gdal_sys::GDALProgressFunc, *mut c_void) {
        if self.callback.is_none() {
            return (None, std::ptr::null_mut());
        }
        (Some(gdal_progress), self as *mut Progress<'a> as *mut c_void)
    }
}

impl fmt::Debug for Progress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("callback", &self.callback.is_some())
            .field("last", &self.last)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

unsafe extern "C" fn gdal_progress(complete: f64, message: *const c_char, arg: *mut c_void) -> c_int {
    if arg.is_null() {
        return 1;
    }
    let progress = &mut *(arg as *mut Progress<'_>);
    let message = if message.is_null() {
        String::new()
    } else {
        CStr::from_ptr(message).to_string_lossy().into_owned()
    };
    c_int::from(progress.report(complete, &message).is_ok())
}
