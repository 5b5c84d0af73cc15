pub mod actors;
pub mod config;
pub mod engine;
pub mod rules;
pub mod storage;
pub mod util;

#[cfg(test)]
mod testing;
