pub mod build;
pub mod call;
pub mod describe;
pub mod keys;
