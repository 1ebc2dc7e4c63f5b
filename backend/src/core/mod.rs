//! Core primitives shared by every accounting component

pub mod time;
