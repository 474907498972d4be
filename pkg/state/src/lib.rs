//! Remote resource access for the DNS cache: the list/watch contract every
//! mirror consumes, selectors passed through it, and an in-memory event log
//! that serves it.

pub mod selector;
pub mod source;
pub mod watch;
