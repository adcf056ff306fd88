//! Lua front end.
//!
//! Build descriptions are `kiln.lua` files evaluated by an embedded Lua 5.4
//! VM. Every project gets its own VM; the files of one project share a single
//! environment table, so globals set in one file are visible in the files it
//! includes with `subdir()`.
//!
//! # Submodules
//!
//! - [`convert`] - Lua values to interpreter values and back, argument parsing
//! - [`globals`] - Builtin registration and the general builtins
//! - [`runtime`] - VM creation, file execution, error recovery

pub mod convert;
mod deps;
mod frontend;
pub mod globals;
mod kiln;
pub mod runtime;
mod rust;
mod targets;

pub use frontend::LuaFrontend;
