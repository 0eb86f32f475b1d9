//! Static description of the deployable artifacts and their wiring.
//!
//! Declaration order encodes the dependency topology: a spec may only depend
//! on specs declared before it. The registry validates that property once and
//! the orchestrator relies on it instead of sorting.

use {
    crate::{
        deployment::{ProxyHost, ResolvedArtifact},
        error::{Error, Result},
    },
    alloy::{
        primitives::{Address, Bytes},
        sol_types::SolValue,
    },
    std::collections::{BTreeMap, HashSet},
};

/// Artifacts resolved so far in the current pass, keyed by spec name.
pub type ResolvedMap = BTreeMap<String, ResolvedArtifact>;

/// Pure function from the partially-resolved artifact map to ABI-encoded
/// constructor arguments. Evaluated lazily, right before the artifact is
/// created, so it can reference the addresses of earlier specs.
pub type ArgsTemplate = Box<dyn Fn(&ResolvedMap) -> Result<Bytes> + Send + Sync>;

pub struct ArtifactSpec {
    pub name: String,
    pub depends_on: Vec<String>,
    /// Creation bytecode without constructor arguments.
    pub code: Bytes,
    pub constructor_args: ArgsTemplate,
    pub is_proxy: bool,
    /// Name of the sibling spec this proxy fronts.
    pub implementation: Option<String>,
}

impl ArtifactSpec {
    pub fn new(name: &str, code: Bytes) -> Self {
        Self {
            name: name.to_string(),
            depends_on: Vec::new(),
            code,
            constructor_args: Box::new(|_| Ok(Bytes::new())),
            is_proxy: false,
            implementation: None,
        }
    }

    pub fn depends_on(mut self, names: &[&str]) -> Self {
        self.depends_on = names.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn constructor_args(mut self, template: ArgsTemplate) -> Self {
        self.constructor_args = template;
        self
    }

    pub fn proxy(mut self, implementation: &str) -> Self {
        self.is_proxy = true;
        self.implementation = Some(implementation.to_string());
        self
    }
}

/// Address of a dependency that must already be resolved in this pass.
pub fn dependency(resolved: &ResolvedMap, name: &str) -> Result<Address> {
    resolved
        .get(name)
        .map(|artifact| artifact.address)
        .ok_or_else(|| Error::Precondition(format!("artifact {name:?} is not resolved yet")))
}

pub struct Registry {
    specs: Vec<ArtifactSpec>,
}

impl Registry {
    pub fn new(specs: Vec<ArtifactSpec>) -> Result<Self> {
        let mut earlier: HashSet<&str> = HashSet::new();
        for spec in &specs {
            for dep in &spec.depends_on {
                if !earlier.contains(dep.as_str()) {
                    return Err(Error::Precondition(format!(
                        "artifact {:?} depends on {dep:?} which is not declared before it",
                        spec.name
                    )));
                }
            }
            if let Some(implementation) = &spec.implementation {
                if !spec.is_proxy {
                    return Err(Error::Precondition(format!(
                        "artifact {:?} references an implementation but is not a proxy",
                        spec.name
                    )));
                }
                if !earlier.contains(implementation.as_str()) {
                    return Err(Error::Precondition(format!(
                        "proxy {:?} fronts {implementation:?} which is not declared before it",
                        spec.name
                    )));
                }
            }
            if !earlier.insert(&spec.name) {
                return Err(Error::Precondition(format!(
                    "duplicate artifact name {:?}",
                    spec.name
                )));
            }
        }
        Ok(Self { specs })
    }

    pub fn specs(&self) -> &[ArtifactSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ArtifactSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }
}

/// Role addresses wired into constructor arguments.
#[derive(Debug, Clone, Copy)]
pub struct Roles {
    pub admin: Address,
    pub treasury: Address,
}

/// Creation bytecode of the standard artifact set.
pub struct StandardCode {
    pub token: Bytes,
    pub collection: Bytes,
    pub minter: Bytes,
}

pub const TOKEN: &str = "token";
pub const COLLECTION: &str = "collection";
pub const MINTER: &str = "minter";

/// The standard three-artifact set: companion token, migrated collection and
/// the minter proxy fronting it. The minter's host is fixed by `proxy_host`,
/// decided once per environment at the first run.
pub fn standard(code: StandardCode, proxy_host: ProxyHost, roles: Roles) -> Result<Registry> {
    let token = ArtifactSpec::new(TOKEN, code.token).constructor_args(Box::new(move |_| {
        Ok((roles.treasury,).abi_encode_params().into())
    }));

    let collection = ArtifactSpec::new(COLLECTION, code.collection)
        .depends_on(&[TOKEN])
        .constructor_args(Box::new(move |resolved| {
            let token = dependency(resolved, TOKEN)?;
            Ok((token, roles.admin).abi_encode_params().into())
        }));

    let host = match proxy_host {
        ProxyHost::SelfHosted => roles.admin,
        ProxyHost::External { host } => host,
    };
    let minter = ArtifactSpec::new(MINTER, code.minter)
        .depends_on(&[TOKEN, COLLECTION])
        .proxy(COLLECTION)
        .constructor_args(Box::new(move |resolved| {
            let collection = dependency(resolved, COLLECTION)?;
            Ok((collection, host).abi_encode_params().into())
        }));

    Registry::new(vec![token, collection, minter])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> ArtifactSpec {
        ArtifactSpec::new(name, Bytes::from_static(&[0x60, 0x80]))
    }

    #[test]
    fn accepts_declaration_order_topology() {
        let registry = Registry::new(vec![
            spec("a"),
            spec("b").depends_on(&["a"]),
            spec("c").depends_on(&["a", "b"]),
        ])
        .unwrap();
        assert_eq!(registry.specs().len(), 3);
        assert!(registry.get("b").is_some());
    }

    #[test]
    fn rejects_forward_dependency() {
        let result = Registry::new(vec![spec("a").depends_on(&["b"]), spec("b")]);
        assert!(matches!(result, Err(Error::Precondition(_))));
    }

    #[test]
    fn rejects_self_dependency() {
        let result = Registry::new(vec![spec("a").depends_on(&["a"])]);
        assert!(matches!(result, Err(Error::Precondition(_))));
    }

    #[test]
    fn rejects_duplicate_names() {
        let result = Registry::new(vec![spec("a"), spec("a")]);
        assert!(matches!(result, Err(Error::Precondition(_))));
    }

    #[test]
    fn rejects_proxy_with_forward_implementation() {
        let result = Registry::new(vec![spec("proxy").proxy("impl"), spec("impl")]);
        assert!(matches!(result, Err(Error::Precondition(_))));
    }

    #[test]
    fn unresolved_dependency_is_a_precondition_error() {
        let resolved = ResolvedMap::new();
        assert!(matches!(
            dependency(&resolved, "token"),
            Err(Error::Precondition(_))
        ));
    }
}
