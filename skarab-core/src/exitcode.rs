//! sysexits-style exit codes. Rust has no `<sysexits.h>` binding, so the
//! values are restated here for the CLI and any other embedder to share.

/// Successful termination.
pub const EX_OK: i32 = 0;
/// Command line usage error.
pub const EX_USAGE: i32 = 64;
/// Service unavailable — used here for operator-cancelled runs.
pub const EX_UNAVAILABLE: i32 = 69;
/// Internal software error — engine abort (problems/burst threshold).
pub const EX_SOFTWARE: i32 = 70;
/// System error, e.g. cannot open/map the image or create the socket.
pub const EX_OSERR: i32 = 71;
