pub mod simulate;
pub mod tokenize;
