//! Build script for miheap.
//!
//! Emits build-time notes about feature combinations. The engine itself is
//! compiled by libmimalloc-sys.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_SECURE");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DEBUG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_MINIMAL");

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    if env::var("CARGO_FEATURE_SECURE").is_ok() {
        emit_info("secure mode: mimalloc built with guard pages and encrypted free lists");
    }

    if env::var("CARGO_FEATURE_DEBUG").is_ok() {
        emit_info("debug features enabled (heap creation backtraces)");
        if is_release {
            emit_warning("'debug' feature has no effect in release builds:");
            emit_warning("  ownership checks only run under debug_assertions");
        }
    }

    if is_release && env::var("CARGO_FEATURE_PARKING_LOT").is_err() {
        // Only the debug-build ownership registry takes a lock, so this
        // matters less here than it sounds.
        emit_info("tip: the 'parking_lot' feature speeds up debug-build checks");
    }
}

fn emit_info(msg: &str) {
    println!("cargo:warning=[miheap] {}", msg);
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[miheap] ⚠️  {}", msg);
}
