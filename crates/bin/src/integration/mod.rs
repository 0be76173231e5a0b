//! Glue between the command line and the store: file locations, argument
//! parsing and CSV output.

pub(crate) mod output;
pub(crate) mod parse;
pub(crate) mod store_path;
