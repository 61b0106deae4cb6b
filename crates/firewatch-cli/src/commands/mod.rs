pub mod common;
pub mod completions;
pub mod enqueue;
pub mod queue;
pub mod watch;
