pub mod assembly;
pub mod ast;
pub mod codegen;
pub mod error;
pub mod symtab;
pub mod vm;
