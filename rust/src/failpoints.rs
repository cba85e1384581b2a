//! Wrappers and utilities on top of the `fail` crate.
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// Evaluate a failpoint; when it is configured, return an I/O error
/// carrying the failpoint message from the enclosing function.
#[macro_export]
macro_rules! try_fail_point {
    ($name:expr) => {{
        if let Some(e) = fail::eval($name, |msg| {
            let msg = msg.unwrap_or_else(|| "synthetic failpoint".to_string());
            std::io::Error::new(std::io::ErrorKind::Other, msg)
        }) {
            return Err(From::from(e));
        }
    }};
    ($name:expr, $cond:expr) => {{
        if $cond {
            $crate::try_fail_point!($name);
        }
    }};
}
