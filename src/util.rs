//! Integer collections, sparse sequences, and utilities

pub mod sparse;

pub use sparse::SparseSequence;
