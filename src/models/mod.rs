//! Domain model module declarations.

pub mod demo;
pub mod role;
