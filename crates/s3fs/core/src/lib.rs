pub mod env;
pub mod tracer;
