//! Windows DPAPI backend

use super::OsUnwrap;
use crate::error::DecryptError;
use std::ptr;
use tracing::debug;
use windows_sys::Win32::Foundation::LocalFree;
use windows_sys::Win32::Security::Cryptography::{CryptUnprotectData, CRYPT_INTEGER_BLOB};

#[derive(Debug, Default, Clone, Copy)]
pub struct DpapiUnwrap;

impl OsUnwrap for DpapiUnwrap {
    fn name(&self) -> &'static str {
        "windows-dpapi"
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, DecryptError> {
        let input = CRYPT_INTEGER_BLOB {
            cbData: blob.len() as u32,
            pbData: blob.as_ptr() as *mut u8,
        };
        let mut output = CRYPT_INTEGER_BLOB {
            cbData: 0,
            pbData: ptr::null_mut(),
        };

        // SAFETY: `input` borrows `blob` for the duration of the call and
        // `output` is allocated by the system, released with LocalFree below.
        let ok = unsafe {
            CryptUnprotectData(
                &input,
                ptr::null_mut(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                0,
                &mut output,
            )
        };
        if ok == 0 {
            debug!("CryptUnprotectData failed for {}-byte blob", blob.len());
            return Err(DecryptError::OsUnprotectFailed);
        }

        let plain = unsafe { std::slice::from_raw_parts(output.pbData, output.cbData as usize).to_vec() };
        unsafe {
            LocalFree(output.pbData as _);
        }
        Ok(plain)
    }
}
