//! Immutable provider registry.
//!
//! Built once at process start from configuration and shared by reference
//! afterwards. Declaration order is significant: it breaks match ties and
//! defines the implicit fallback order.

use gateway_config::ProviderSettings;
use gateway_core::{ModelMatch, ModelObject, ProviderProfile, ProviderTransport};
use std::sync::Arc;
use tracing::{info, warn};

/// A registered provider: its profile and the transport that reaches it
#[derive(Clone)]
pub struct ProviderEntry {
    /// Static provider description
    pub profile: Arc<ProviderProfile>,
    /// Transport used to call the provider
    pub transport: Arc<dyn ProviderTransport>,
}

impl ProviderEntry {
    /// Provider ID
    #[must_use]
    pub fn id(&self) -> &str {
        &self.profile.id
    }
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("id", &self.profile.id)
            .field("available", &self.profile.is_available())
            .finish_non_exhaustive()
    }
}

/// Ordered, read-only set of providers
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    entries: Vec<ProviderEntry>,
}

/// Builder for [`ProviderRegistry`]
#[derive(Debug, Default)]
pub struct ProviderRegistryBuilder {
    entries: Vec<ProviderEntry>,
}

impl ProviderRegistryBuilder {
    /// Register a provider after the ones already registered.
    ///
    /// A profile whose ID is already registered is ignored.
    #[must_use]
    pub fn register(mut self, profile: ProviderProfile, transport: Arc<dyn ProviderTransport>) -> Self {
        if self.entries.iter().any(|e| e.profile.id == profile.id) {
            warn!(provider = %profile.id, "Duplicate provider ignored");
            return self;
        }
        self.entries.push(ProviderEntry {
            profile: Arc::new(profile),
            transport,
        });
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            entries: self.entries,
        }
    }
}

impl ProviderRegistry {
    /// Start building a registry
    #[must_use]
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Build a registry from configured providers, all sharing one transport.
    ///
    /// Disabled providers are skipped. API keys are taken from `api_key`, or
    /// looked up with `env` when `api_key_env` is set.
    pub fn from_settings(
        settings: &[ProviderSettings],
        transport: Arc<dyn ProviderTransport>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut builder = Self::builder();
        for provider in settings.iter().filter(|p| p.enabled) {
            let profile = profile_from_settings(provider, &env);
            info!(
                provider = %profile.id,
                available = profile.is_available(),
                models = profile.models.len(),
                "Registered provider"
            );
            builder = builder.register(profile, Arc::clone(&transport));
        }
        builder.build()
    }

    /// Providers in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.entries.iter()
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no provider is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a provider by ID
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ProviderEntry> {
        self.entries.iter().find(|e| e.profile.id == id)
    }

    /// Best provider for `model`.
    ///
    /// Exact model matches beat prefix matches, longer prefixes beat shorter
    /// ones, and ties go to the provider declared first.
    #[must_use]
    pub fn resolve(&self, model: &str) -> Option<&ProviderEntry> {
        let mut best: Option<(ModelMatch, &ProviderEntry)> = None;
        for entry in &self.entries {
            if let Some(m) = entry.profile.match_model(model) {
                if best.map_or(true, |(current, _)| m > current) {
                    best = Some((m, entry));
                }
            }
        }
        best.map(|(_, entry)| entry)
    }

    /// Fallback for the provider `id`.
    ///
    /// The explicit `fallback` of the profile wins when it is registered.
    /// Otherwise the next available provider in declaration order is used,
    /// wrapping around to the start of the list.
    #[must_use]
    pub fn fallback_for(&self, id: &str) -> Option<&ProviderEntry> {
        let position = self.entries.iter().position(|e| e.profile.id == id)?;
        let primary = &self.entries[position];

        if let Some(explicit) = primary.profile.fallback.as_deref() {
            if let Some(entry) = self.get(explicit) {
                return Some(entry);
            }
            warn!(provider = %id, fallback = %explicit, "Configured fallback is not registered");
        }

        self.entries[position + 1..]
            .iter()
            .chain(self.entries[..position].iter())
            .find(|e| e.profile.is_available())
    }

    /// Model descriptors advertised by all providers, in declaration order
    #[must_use]
    pub fn models(&self) -> Vec<ModelObject> {
        let mut seen = std::collections::HashSet::new();
        self.entries
            .iter()
            .flat_map(|entry| {
                entry.profile.models.iter().map(move |model| {
                    ModelObject::new(model.clone(), entry.profile.id.clone(), entry.profile.pricing)
                        .with_description(entry.profile.description.clone())
                })
            })
            .filter(|m| seen.insert(m.id.clone()))
            .collect()
    }
}

/// Convert provider settings into a profile, resolving the API key
pub fn profile_from_settings(
    settings: &ProviderSettings,
    env: impl Fn(&str) -> Option<String>,
) -> ProviderProfile {
    let mut profile = ProviderProfile::new(&settings.id, &settings.base_url, settings.pricing)
        .with_description(&settings.description);
    profile.models.clone_from(&settings.models);
    profile.prefixes.clone_from(&settings.prefixes);
    profile.fallback.clone_from(&settings.fallback);

    if let Some(key) = &settings.api_key {
        profile.api_key = Some(key.clone());
    } else if let Some(var) = &settings.api_key_env {
        profile = profile.with_api_key_ref(var);
        match env(var).filter(|v| !v.trim().is_empty()) {
            Some(key) => profile = profile.with_api_key(key),
            None => warn!(provider = %settings.id, var = %var, "API key variable not set; provider unavailable"),
        }
    }
    profile
}
