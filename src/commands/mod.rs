pub mod cancel;
pub mod common;
pub mod complete;
pub mod status;
pub mod watch;
