//! C interface
//!
//! Strings returned in a [ParseResponse] are owned by the caller and must be released with
//! [tfparse_free].
use crate::options::Options;
use std::ffi::{c_char, c_int, CStr, CString};
use std::ptr::null_mut;

/// Either `json` or `err` is set, the other one is null
#[repr(C)]
pub struct ParseResponse {
    pub json: *mut c_char,
    pub err: *mut c_char,
}

impl ParseResponse {
    fn json(json: String) -> Self {
        Self {
            json: into_raw(json),
            err: null_mut(),
        }
    }

    fn error(message: impl std::fmt::Display) -> Self {
        Self {
            json: null_mut(),
            err: into_raw(format!("unable to convert terraform: {message}")),
        }
    }
}

/// Convert the terraform module at `path`
///
/// # Safety
///
/// `path` and `workspace` must be null or point to nul-terminated strings. Unless it is null,
/// `vars_files` must point to `num_vars_files` pointers of the same kind.
#[no_mangle]
pub unsafe extern "C" fn tfparse_parse(
    path: *const c_char,
    stop_on_hcl_error: bool,
    debug: bool,
    allow_downloads: bool,
    num_vars_files: c_int,
    vars_files: *const *const c_char,
    workspace: *const c_char,
) -> ParseResponse {
    let Some(path) = string_arg(path) else {
        return ParseResponse::error("path must be a utf-8 string");
    };

    let mut options = Options::default()
        .with_stop_on_hcl_error(stop_on_hcl_error)
        .with_debug(debug)
        .with_allow_downloads(allow_downloads);

    if let Some(workspace) = string_arg(workspace).filter(|workspace| !workspace.is_empty()) {
        options = options.with_workspace_name(workspace);
    }

    if !vars_files.is_null() {
        for index in 0..num_vars_files.max(0) as usize {
            if let Some(vars_file) = string_arg(*vars_files.add(index)) {
                options = options.with_vars_path(vars_file);
            }
        }
    }

    match crate::load_json_string(path, &options) {
        Ok(json) => ParseResponse::json(json),
        Err(error) => ParseResponse::error(error),
    }
}

/// Release a string handed out by [tfparse_parse]
///
/// # Safety
///
/// `ptr` must be null or a pointer from a [ParseResponse] that was not released before.
#[no_mangle]
pub unsafe extern "C" fn tfparse_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

unsafe fn string_arg(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }

    CStr::from_ptr(ptr).to_str().ok().map(str::to_string)
}

fn into_raw(text: String) -> *mut c_char {
    // interior nul bytes can not be represented
    let text = text.replace('\0', "");
    CString::new(text).unwrap_or_default().into_raw()
}

#[cfg(test)]
mod test {
    use super::*;

    unsafe fn take(ptr: *mut c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        let text = CStr::from_ptr(ptr).to_string_lossy().into_owned();
        tfparse_free(ptr);
        Some(text)
    }

    #[test]
    fn missing_directory() {
        let path = CString::new("/this/path/does/not/exist").unwrap();

        let response = unsafe {
            tfparse_parse(path.as_ptr(), false, false, false, 0, std::ptr::null(), std::ptr::null())
        };

        let (json, err) = unsafe { (take(response.json), take(response.err)) };
        assert!(json.is_none());
        let err = err.expect("error is set");
        assert!(err.starts_with("unable to convert terraform: "));
        assert!(err.contains("no such file or directory"));
    }

    #[test]
    fn null_path() {
        let response = unsafe {
            tfparse_parse(std::ptr::null(), false, false, false, 0, std::ptr::null(), std::ptr::null())
        };

        let err = unsafe { take(response.err) };
        assert!(response.json.is_null());
        assert!(err.is_some());
    }
}
