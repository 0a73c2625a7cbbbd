//! Strategy selector: turns configuration plus an optional per-request
//! override into the ordered list of strategies a run will walk.

use tracing::debug;

use crate::config::Config;
use crate::types::StrategyKind;

#[derive(Debug, Clone)]
pub struct StrategySelector {
    order: Vec<StrategyKind>,
}

impl StrategySelector {
    /// A request-level override replaces the configured order entirely.
    /// Duplicates keep their first position; disabled strategies are
    /// dropped, as is injection when no injector is configured.
    pub fn from_config(config: &Config, override_order: Option<&[StrategyKind]>) -> Self {
        let requested: Vec<StrategyKind> = override_order
            .map(|o| o.to_vec())
            .unwrap_or_else(|| config.strategies.order.clone());

        let mut order = Vec::with_capacity(requested.len());
        for kind in requested {
            if order.contains(&kind) {
                continue;
            }
            if config.strategies.disabled.contains(&kind) {
                debug!(strategy = %kind, "strategy disabled by configuration");
                continue;
            }
            if kind == StrategyKind::Inject && !config.inject.is_configured() {
                debug!("injection unavailable, no injector configured");
                continue;
            }
            order.push(kind);
        }
        Self { order }
    }

    pub fn order(&self) -> &[StrategyKind] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_order_without_injector_drops_inject() {
        let config = Config::default();
        let selector = StrategySelector::from_config(&config, None);
        assert_eq!(
            selector.order(),
            &[StrategyKind::Tree, StrategyKind::Template, StrategyKind::Fixed]
        );
    }

    #[test]
    fn inject_kept_when_configured() {
        let mut config = Config::default();
        config.inject.injector_path = Some(PathBuf::from("injector.exe"));
        config.inject.helper_path = Some(PathBuf::from("helper.dll"));
        let selector = StrategySelector::from_config(&config, None);
        assert_eq!(selector.order(), &StrategyKind::DEFAULT_ORDER);
    }

    #[test]
    fn override_wins_and_dedups() {
        let config = Config::default();
        let selector = StrategySelector::from_config(
            &config,
            Some(&[
                StrategyKind::Fixed,
                StrategyKind::Tree,
                StrategyKind::Fixed,
            ]),
        );
        assert_eq!(selector.order(), &[StrategyKind::Fixed, StrategyKind::Tree]);
    }

    #[test]
    fn disabled_strategies_are_dropped() {
        let mut config = Config::default();
        config.strategies.disabled = vec![StrategyKind::Template];
        let selector = StrategySelector::from_config(&config, None);
        assert_eq!(selector.order(), &[StrategyKind::Tree, StrategyKind::Fixed]);
    }

    #[test]
    fn everything_disabled_is_empty() {
        let mut config = Config::default();
        config.strategies.disabled = StrategyKind::DEFAULT_ORDER.to_vec();
        let selector = StrategySelector::from_config(&config, None);
        assert!(selector.is_empty());
    }
}
