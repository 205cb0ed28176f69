//! Name to constructor registry for strategies and gateways.
//!
//! A [`Registry`] is built once at startup and handed around by reference.

use std::{collections::BTreeMap, sync::Arc};

use tracing::debug;

use crate::{
    errors::{Error, Result},
    gateway::ExchangeGateway,
    strategy::{RangeConfig, RangeStrategy, Strategy, StrategyParams},
};

type StrategyConstructor = Box<dyn Fn(&StrategyParams) -> Result<Box<dyn Strategy>> + Send + Sync>;
type GatewayConstructor = Box<dyn Fn() -> Result<Arc<dyn ExchangeGateway>> + Send + Sync>;

/// Constructors of strategies and gateways, looked up by name.
#[derive(Default)]
pub struct Registry {
    strategies: BTreeMap<String, StrategyConstructor>,
    gateways: BTreeMap<String, GatewayConstructor>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("strategies", &self.strategies.keys().collect::<Vec<_>>())
            .field("gateways", &self.gateways.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry knowing the strategies shipped with the crate:
    /// `range`, configured from [`RangeConfig::from_params`].
    pub fn with_builtins() -> Self {
        Self::new().register_strategy("range", |params| {
            let strategy = RangeStrategy::new(RangeConfig::from_params(params)?)?;
            Ok(Box::new(strategy) as Box<dyn Strategy>)
        })
    }

    /// Registers a strategy constructor, replacing any previous one with the same name.
    pub fn register_strategy<F>(mut self, name: impl ToString, constructor: F) -> Self
    where
        F: Fn(&StrategyParams) -> Result<Box<dyn Strategy>> + Send + Sync + 'static,
    {
        let name = name.to_string();
        debug!(%name, "strategy registered");
        self.strategies.insert(name, Box::new(constructor));
        self
    }

    /// Registers a gateway constructor, replacing any previous one with the same name.
    pub fn register_gateway<F>(mut self, name: impl ToString, constructor: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn ExchangeGateway>> + Send + Sync + 'static,
    {
        let name = name.to_string();
        debug!(%name, "gateway registered");
        self.gateways.insert(name, Box::new(constructor));
        self
    }

    /// Builds the strategy registered under `name`.
    pub fn create_strategy(&self, name: &str, params: &StrategyParams) -> Result<Box<dyn Strategy>> {
        let constructor = self
            .strategies
            .get(name)
            .ok_or_else(|| Error::NotRegistered(name.to_string()))?;
        constructor(params)
    }

    /// Builds the gateway registered under `name`.
    pub fn create_gateway(&self, name: &str) -> Result<Arc<dyn ExchangeGateway>> {
        let constructor = self
            .gateways
            .get(name)
            .ok_or_else(|| Error::NotRegistered(name.to_string()))?;
        constructor()
    }

    /// Returns the registered strategy names, sorted.
    pub fn strategy_names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    /// Returns the registered gateway names, sorted.
    pub fn gateway_names(&self) -> impl Iterator<Item = &str> {
        self.gateways.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::{
        engine::{BacktestConfig, BacktestEngine, OrderSide, TapeRecord},
        gateway::SimulatedExchange,
    };

    #[test]
    fn builtins_know_range() {
        let registry = Registry::with_builtins();
        assert_eq!(registry.strategy_names().collect::<Vec<_>>(), vec!["range"]);

        let params = StrategyParams::new().set("volatility", 2.0).set("take_profit", 1.0);
        let strategy = registry.create_strategy("range", &params).unwrap();
        assert!(strategy.capabilities().market_analytics);

        let missing = registry.create_strategy("range", &StrategyParams::new());
        assert!(matches!(missing, Err(Error::MissingParameter(_))));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let registry = Registry::new();
        assert!(matches!(
            registry.create_strategy("grid", &StrategyParams::new()),
            Err(Error::NotRegistered(name)) if name == "grid"
        ));
        assert!(matches!(registry.create_gateway("binance"), Err(Error::NotRegistered(_))));
    }

    #[test]
    fn gateway_constructor_is_called_per_lookup() {
        let registry = Registry::new().register_gateway("sim", || {
            let t0 = DateTime::from_timestamp_secs(1515151515).unwrap();
            let tape = vec![TapeRecord::from((1, 100.0, 1.0, t0, OrderSide::Buy))];
            let engine = BacktestEngine::new(tape, BacktestConfig::new("BTC", "USD"))?;
            Ok(Arc::new(SimulatedExchange::new(engine).with_name("sim")) as Arc<dyn ExchangeGateway>)
        });

        let first = registry.create_gateway("sim").unwrap();
        let second = registry.create_gateway("sim").unwrap();
        assert_eq!(first.name(), "sim");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.gateway_names().collect::<Vec<_>>(), vec!["sim"]);
    }
}
