//! Unit tests for bytecode_system

mod test_loader;
mod test_records;
