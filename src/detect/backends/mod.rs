pub mod random;

pub use random::RandomBackend;
