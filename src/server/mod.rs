pub mod runtime;

pub use runtime::{create_router, pipeline_options, serve, shutdown_signal, start_server};
