//! Thread-local storage probe.
//!
//! Two thread-local integers live in this crate, one zero-initialized (emitted into `.tbss`) and
//! one initialized to [entries::TDATA_INIT] (emitted into `.tdata`). The `tls-probe` binary prints
//! them along with its arguments, and the `tls-inspect` binary checks that a built executable
//! actually carries the TLS sections and the `PT_TLS` template.

pub mod entries;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod report;

#[cfg(any(test, feature = "testing"))]
#[doc(hidden)]
pub mod testelf;

pub use entries::{snapshot, TlsSnapshot, TDATA_INIT};
pub use error::*;
pub use inspect::{Expectations, TlsImage};
