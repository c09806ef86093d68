//! Safe wrappers for platform-specific unsafe operations.
//!
//! Every `unsafe` block in the crate lives here.

use std::ffi::CStr;

/// Peak resident set size of this process in megabytes.
///
/// Returns `None` if `getrusage` fails.
pub fn peak_rss_mb() -> Option<f64> {
    // SAFETY: getrusage fills a zeroed struct we own; the return value is
    // checked before any field is read.
    let max_rss = unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) != 0 {
            return None;
        }
        usage.ru_maxrss
    };
    // Linux reports kilobytes, macOS bytes.
    let kb = if cfg!(target_os = "macos") {
        max_rss as f64 / 1024.0
    } else {
        max_rss as f64
    };
    Some(kb / 1024.0)
}

/// Return available disk space in megabytes for the filesystem containing `path`.
///
/// Returns `None` if the `statvfs` call fails (e.g. path does not exist).
pub fn available_disk_mb(path: &CStr) -> Option<u64> {
    // SAFETY: statvfs is a standard POSIX call; we pass a valid CStr and a
    // zeroed struct, then check the return value before reading fields.
    unsafe {
        let mut stat: libc::statvfs = std::mem::zeroed();
        if libc::statvfs(path.as_ptr(), &mut stat) != 0 {
            return None;
        }
        Some((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64) / (1024 * 1024))
    }
}

/// Set an environment variable.
///
/// Caller must ensure no other threads are reading environment variables concurrently.
pub fn set_env(key: &str, value: &str) {
    // SAFETY: callers guarantee no concurrent environment access.
    #[allow(unsafe_code)]
    unsafe {
        std::env::set_var(key, value);
    }
}

/// Remove an environment variable.
///
/// Caller must ensure no other threads are reading environment variables concurrently.
pub fn remove_env(key: &str) {
    // SAFETY: callers guarantee no concurrent environment access.
    #[allow(unsafe_code)]
    unsafe {
        std::env::remove_var(key);
    }
}
