use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Default, Debug)]
struct Registry {
    names: AHashMap<usize, String>,
    dependencies: AHashMap<usize, Vec<usize>>,
}

/// An optional side table of human-readable names and dependency edges between resources,
/// keyed by resource identity. Nothing in the simulation reads it.
///
/// Cloning shares the table, so a branch and all of its forks see the same names.
#[derive(Clone, Default, Debug)]
pub struct Diagnostics(Option<Arc<RwLock<Registry>>>);

impl Diagnostics {
    pub fn enabled() -> Self {
        Diagnostics(Some(Arc::default()))
    }

    pub fn disabled() -> Self {
        Diagnostics(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    pub fn name(&self, key: usize, name: impl Into<String>) {
        if let Some(registry) = &self.0 {
            registry.write().names.insert(key, name.into());
        }
    }

    pub fn add_dependency(&self, dependent: usize, dependency: usize) {
        if let Some(registry) = &self.0 {
            let mut registry = registry.write();
            let edges = registry.dependencies.entry(dependent).or_default();
            if !edges.contains(&dependency) {
                edges.push(dependency);
            }
        }
    }

    pub fn dependencies(&self, key: usize) -> Vec<usize> {
        match &self.0 {
            Some(registry) => registry
                .read()
                .dependencies
                .get(&key)
                .cloned()
                .unwrap_or_default(),
            None => vec![],
        }
    }

    /// The resource's name followed by the names of its direct dependencies.
    pub fn describe(&self, key: usize) -> String {
        let Some(registry) = &self.0 else {
            return label(None, key);
        };
        let registry = registry.read();
        let name = label(registry.names.get(&key), key);
        match registry.dependencies.get(&key) {
            Some(deps) if !deps.is_empty() => {
                let deps: Vec<String> = deps
                    .iter()
                    .map(|d| label(registry.names.get(d), *d))
                    .collect();
                format!("{name} <- [{}]", deps.join(", "))
            }
            _ => name,
        }
    }
}

fn label(name: Option<&String>, key: usize) -> String {
    match name {
        Some(name) => name.clone(),
        None => format!("resource@{key:#x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_table_records_nothing() {
        let diagnostics = Diagnostics::disabled();
        diagnostics.name(1, "volume");
        diagnostics.add_dependency(1, 2);
        assert!(diagnostics.dependencies(1).is_empty());
        assert_eq!("resource@0x1", diagnostics.describe(1));
    }

    #[test]
    fn forks_share_names() {
        let diagnostics = Diagnostics::enabled();
        let fork = diagnostics.clone();
        diagnostics.name(1, "margin");
        fork.name(2, "volume");
        diagnostics.add_dependency(1, 2);
        diagnostics.add_dependency(1, 2);
        assert_eq!(vec![2], fork.dependencies(1));
        assert_eq!("margin <- [volume]", fork.describe(1));
    }
}
