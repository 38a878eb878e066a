pub mod archive;
pub mod bundle;
pub mod cleanup;
pub mod commands;
pub mod condense;
pub mod config;
pub mod package;
pub mod runtime;
pub mod scan;
pub mod worker;
