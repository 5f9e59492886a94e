//! Root module for test modules, so that the tests are built into a single binary.

mod engine;

const fn main() {}
