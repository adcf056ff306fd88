//! kiln-lib: the evaluation core of the kiln build description interpreter.
//!
//! A project is described by `kiln.lua` files. Evaluating them produces a
//! [`graph::BuildGraph`]: targets, tests, arguments and the subprojects that
//! were pulled in along the way. The main pieces are:
//! - [`interpreter`]: the operations behind every builtin, including
//!   subproject composition and dependency resolution
//! - [`lua`]: the Lua front end that runs build files against an interpreter
//! - [`eval`]: one full evaluation of a source tree into a build directory
//! - [`coredata`]: state persisted in the build directory between runs

pub mod consts;
pub mod context;
pub mod coredata;
pub mod dependency;
pub mod error;
pub mod eval;
pub mod frontend;
pub mod graph;
pub mod interpreter;
pub mod lua;
pub mod machine;
pub mod options;
pub mod program;
pub mod sandbox;
pub mod subproject;
pub mod target;
pub mod util;
pub mod value;
pub mod version;
