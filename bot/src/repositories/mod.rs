pub mod signal_repository;

pub use signal_repository::SignalRepository;
