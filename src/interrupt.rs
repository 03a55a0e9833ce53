//! Ctrl-C handling.
//!
//! The first SIGINT only sets a flag; the convergence wait notices it on its
//! next check and returns, leaving the remote operation running. A second
//! SIGINT exits immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use stackkit::CancelToken;

static INTERRUPTED: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Exit status used for a forced second interrupt
const FORCED_EXIT: libc::c_int = 130;

extern "C" fn on_sigint(_signal: libc::c_int) {
    if let Some(flag) = INTERRUPTED.get()
        && flag.swap(true, Ordering::SeqCst)
    {
        // SAFETY: _exit is async-signal-safe.
        #[allow(unsafe_code)]
        unsafe {
            libc::_exit(FORCED_EXIT);
        }
    }
}

/// Install the SIGINT handler and return a token that observes it.
///
/// Safe to call more than once; every token shares the same flag.
pub fn install() -> CancelToken {
    let flag = Arc::clone(INTERRUPTED.get_or_init(|| Arc::new(AtomicBool::new(false))));

    let handler = on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only touches an atomic and calls _exit.
    #[allow(unsafe_code)]
    let previous = unsafe { libc::signal(libc::SIGINT, handler) };
    if previous == libc::SIG_ERR {
        log::warn!("Could not install Ctrl-C handler; interrupts will abort immediately");
    }

    CancelToken::from_flag(flag)
}
