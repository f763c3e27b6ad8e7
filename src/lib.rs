//! Core of a trace-driven simulator for a hierarchical tag cache: a
//! multi-level tag table with zero-subtree elision, fronted at every level
//! by a set-associative cache.

pub mod error;
pub mod tagcache;
pub mod tagmemory;
pub mod trace;
