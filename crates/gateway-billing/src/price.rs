//! Reservation estimates and charges.

use crate::ledger::Charge;
use gateway_core::{ChatCompletionRequest, Pricing, ProviderProfile};
use std::collections::HashMap;

/// Pricing table used to estimate and charge requests.
///
/// A per-model entry overrides the serving provider's pricing. Estimates are
/// made before routing, so they fall back to the default pricing instead.
#[derive(Debug, Clone)]
pub struct PriceBook {
    models: HashMap<String, Pricing>,
    default_pricing: Pricing,
    default_completion_tokens: u64,
}

impl PriceBook {
    /// Create a price book with no per-model entries
    #[must_use]
    pub fn new(default_pricing: Pricing, default_completion_tokens: u64) -> Self {
        Self {
            models: HashMap::new(),
            default_pricing,
            default_completion_tokens,
        }
    }

    /// Add a per-model price
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, pricing: Pricing) -> Self {
        self.models.insert(model.into(), pricing);
        self
    }

    /// Add several per-model prices
    #[must_use]
    pub fn with_models(mut self, models: impl IntoIterator<Item = (String, Pricing)>) -> Self {
        self.models.extend(models);
        self
    }

    /// Per-model override, if any
    #[must_use]
    pub fn model_pricing(&self, model: &str) -> Option<Pricing> {
        self.models.get(model).copied()
    }

    /// Tokens a request is expected to consume
    #[must_use]
    pub fn estimated_tokens(&self, request: &ChatCompletionRequest) -> u64 {
        let completion = request
            .max_tokens()
            .map_or(self.default_completion_tokens, |m| u64::from(m.value()));
        request.estimated_prompt_tokens().saturating_add(completion)
    }

    /// Credits to reserve for a request
    #[must_use]
    pub fn estimate(&self, request: &ChatCompletionRequest) -> u64 {
        self.model_pricing(request.model())
            .unwrap_or(self.default_pricing)
            .cost(self.estimated_tokens(request))
    }

    /// Actual charge for `total_tokens` served by `provider`
    #[must_use]
    pub fn charge(&self, model: &str, provider: &ProviderProfile, total_tokens: u64) -> Charge {
        let pricing = self.model_pricing(model).unwrap_or(provider.pricing);
        Charge {
            total_tokens,
            amount: pricing.cost(total_tokens),
        }
    }
}

impl Default for PriceBook {
    fn default() -> Self {
        Self::new(Pricing::per_1k_tokens(1), 1024)
    }
}
