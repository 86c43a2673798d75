pub mod cli;
pub mod error;
pub mod fs_sink;
pub mod gitfmt;
pub mod html;
pub mod http;
pub mod orchestrator;
pub mod pool;
pub mod task;
pub mod workers;
