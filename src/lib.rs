pub mod cli;
pub mod convert;
pub mod dae;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod internal;
pub mod math;
pub mod pipeline;
pub mod settings;
