// SPDX-License-Identifier: GPL-3.0-only

/// Login name of `uid` from the password database
pub fn username_for_uid(uid: u32) -> Option<String> {
    // SAFETY: getpwuid returns a pointer into static storage or null; the name
    // is copied out before any other passwd call can overwrite it.
    unsafe {
        let pw = libc::getpwuid(uid);
        if pw.is_null() {
            return None;
        }
        let name = std::ffi::CStr::from_ptr((*pw).pw_name);
        name.to_str().ok().map(|name| name.to_string())
    }
}
