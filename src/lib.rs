pub mod app;
pub mod config;
pub mod convert;
pub mod cooccurrence;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod idmap;
pub mod jsonld;
pub mod listing;
pub mod mappings;
pub mod merge;
pub mod output;
pub mod pubtator;
pub mod segment;
pub mod standoff;
pub mod webannotation;
