// This file is part of VaultLog.
//
// This Source Code Form is subject to the terms of the Mozilla Public License
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at http://mozilla.org/MPL/2.0/.

//! Utility macros for VaultLog.

/// Times the execution of a block and invokes a callback with the label and
/// elapsed duration.
///
/// In **debug builds** (`debug_assertions` enabled) the block is timed and
/// the callback receives `(label, duration)`. In **release builds** the
/// timing is completely eliminated — only the block executes.
#[macro_export]
#[cfg(debug_assertions)]
macro_rules! timed {
    ($label:expr, $callback:expr, $block:expr) => {{
        let __timed_start = ::std::time::Instant::now();
        let __timed_result = $block;
        ($callback)($label, __timed_start.elapsed());
        __timed_result
    }};
}

#[macro_export]
#[cfg(not(debug_assertions))]
macro_rules! timed {
    ($label:expr, $callback:expr, $block:expr) => {
        $block
    };
}

/// Times the execution of a block and prints the result to stderr in the
/// format `[vaultlog] {label}: {duration:?}`.
///
/// In **release builds**, this macro is a no-op — only the block executes.
#[macro_export]
#[cfg(debug_assertions)]
macro_rules! timed_dbg {
    ($label:expr, $block:expr) => {{
        let __timed_start = ::std::time::Instant::now();
        let __timed_result = $block;
        #[cfg(feature = "debug_eprintln")]
        ::std::eprintln!("[vaultlog] {}: {:?}", $label, __timed_start.elapsed());
        let _ = __timed_start;
        __timed_result
    }};
}

#[macro_export]
#[cfg(not(debug_assertions))]
macro_rules! timed_dbg {
    ($label:expr, $block:expr) => {
        $block
    };
}
