//! Track reconciliation library - shared modules for the binary and tests.

pub mod catalog;
pub mod config;
pub mod driver;
pub mod lexicon;
pub mod models;
pub mod normalize;
pub mod parse;
pub mod progress;
pub mod query;
pub mod safety;
pub mod scan;
pub mod scoring;
pub mod state;
