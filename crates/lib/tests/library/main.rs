//! End-to-end evaluation of Lua build descriptions.

mod common;
mod dependency_tests;
mod project_tests;
mod rust_tests;
mod subproject_tests;
