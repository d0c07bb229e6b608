pub mod aggregator;
pub mod backtest;
pub mod cooldown;
pub mod indicators;
pub mod market_data;
pub mod notifier;
pub mod patterns;
pub mod scanner;
pub mod scorer;
pub mod tracker;

#[cfg(test)]
pub mod testing;
