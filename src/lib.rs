pub mod cancel;
pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod pipeline;
pub mod probe;
pub mod report;
pub mod util;
pub mod waiter;
