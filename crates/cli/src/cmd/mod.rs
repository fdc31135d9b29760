pub mod matching;
pub mod validate;
