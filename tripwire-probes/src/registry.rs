use std::collections::HashMap;
use std::error::Error;

use tripwire_config::Config;

use crate::{DefinitionEntry, Probe, ProbeDefinition, RegistrationError};

/// The set of active probes, keyed by probe id.
#[derive(Debug, Default)]
pub struct ProbeRegistry {
    config: Config,
    probes: HashMap<String, Probe>,
}

impl ProbeRegistry {
    /// Creates an empty registry that compiles probes with the defaults of `config`.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            probes: HashMap::new(),
        }
    }

    /// The configuration used to compile probes.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Compiles and registers a probe.
    ///
    /// A probe with the same id is replaced, including its sampling state. If the definition does
    /// not compile, the registry is left unchanged.
    pub fn register(&mut self, definition: &ProbeDefinition) -> Result<(), RegistrationError> {
        let probe = Probe::compile(definition, &self.config).inspect_err(|error| {
            tripwire_log::error!(
                error = error as &dyn Error,
                probe_id = definition.id.as_str(),
                probe_version = definition.version,
                "failed to register probe"
            );
        })?;

        tripwire_log::debug!(
            probe_id = probe.id(),
            probe_version = probe.version(),
            "registered probe"
        );
        self.probes.insert(probe.id().to_owned(), probe);
        Ok(())
    }

    /// Registers a list of probes.
    ///
    /// Each probe is registered on its own, a failing probe does not prevent the others from being
    /// registered. Returns the errors of all probes that failed.
    pub fn register_all<'a, I>(&mut self, definitions: I) -> Vec<RegistrationError>
    where
        I: IntoIterator<Item = &'a ProbeDefinition>,
    {
        definitions
            .into_iter()
            .filter_map(|definition| self.register(definition).err())
            .collect()
    }

    /// Registers a list of probe definitions that may have failed to parse.
    ///
    /// Malformed entries are reported like probes that fail to compile.
    pub fn register_entries<I>(&mut self, entries: I) -> Vec<RegistrationError>
    where
        I: IntoIterator<Item = DefinitionEntry>,
    {
        let mut errors = Vec::new();

        for entry in entries {
            match entry {
                DefinitionEntry::Valid(definition) => {
                    if let Err(error) = self.register(&definition) {
                        errors.push(error);
                    }
                }
                DefinitionEntry::Invalid { id, error } => {
                    tripwire_log::error!(
                        error = &*error as &dyn Error,
                        probe_id = id.as_deref(),
                        "failed to parse probe definition"
                    );
                    errors.push(RegistrationError::InvalidDefinition {
                        probe_id: id,
                        error,
                    });
                }
            }
        }

        errors
    }

    /// Removes a probe. In-flight calls of the probe are not reported.
    pub fn remove(&mut self, id: &str) -> Option<Probe> {
        let probe = self.probes.remove(id)?;
        tripwire_log::debug!(probe_id = id, "removed probe");
        Some(probe)
    }

    /// Removes all probes.
    pub fn clear(&mut self) {
        self.probes.clear();
    }

    /// Returns the probe with the given id.
    pub fn get(&self, id: &str) -> Option<&Probe> {
        self.probes.get(id)
    }

    /// Returns the probe with the given id for updating its sampling state.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Probe> {
        self.probes.get_mut(id)
    }

    /// Returns `true` if a probe with the given id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.probes.contains_key(id)
    }

    /// The number of registered probes.
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    /// Returns `true` if no probes are registered.
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Iterates over all registered probes in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Probe> {
        self.probes.values()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    fn definition(value: serde_json::Value) -> ProbeDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_register_and_replace() {
        let mut registry = ProbeRegistry::default();
        registry
            .register(&definition(json!({"id": "p1", "version": 1})))
            .unwrap();
        registry
            .register(&definition(json!({"id": "p1", "version": 2})))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("p1").map(Probe::version), Some(2));
    }

    #[test]
    fn test_failed_registration_keeps_previous() {
        let mut registry = ProbeRegistry::default();
        registry
            .register(&definition(json!({"id": "p1", "version": 1})))
            .unwrap();

        let result = registry.register(&definition(json!({
            "id": "p1",
            "version": 2,
            "when": {"dsl": "?", "json": {"nope": 1}}
        })));

        assert!(result.is_err());
        assert_eq!(registry.get("p1").map(Probe::version), Some(1));
    }

    #[test]
    fn test_register_all_isolates_failures() {
        tripwire_log::init_test!();

        let definitions = [
            definition(json!({"id": "a"})),
            definition(json!({"id": "b", "when": {"dsl": "?", "json": {"nope": 1}}})),
            definition(json!({"id": "c", "sampling": {"snapshotsPerSecond": -1}})),
            definition(json!({"id": "d"})),
        ];

        let mut registry = ProbeRegistry::default();
        let errors = registry.register_all(&definitions);

        let failed: Vec<_> = errors.iter().filter_map(|e| e.probe_id()).collect();
        assert_eq!(failed, vec!["b", "c"]);
        assert!(registry.contains("a"));
        assert!(registry.contains("d"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_entries() {
        let entries: Vec<DefinitionEntry> = serde_json::from_value(json!([
            {"id": "a"},
            {"id": "b", "captureSnapshot": "yes"},
        ]))
        .unwrap();

        let mut registry = ProbeRegistry::default();
        let errors = registry.register_entries(entries);

        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            RegistrationError::InvalidDefinition { .. }
        ));
        assert_eq!(errors[0].probe_id(), Some("b"));
        assert!(registry.contains("a"));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut registry = ProbeRegistry::default();
        registry.register(&definition(json!({"id": "a"}))).unwrap();
        registry.register(&definition(json!({"id": "b"}))).unwrap();

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }
}
