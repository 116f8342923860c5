//! Codecs for embedding task data in remote item bodies.
//!
//! [`marker`] handles single scalar values and marker comment lines;
//! [`body`] renders and parses whole task-tree documents built from them.

pub mod body;
pub mod marker;
