//! Registry and selector for backend services.

use super::{AiService, PromptExecutionSettings, ServiceCapability};
use crate::error::{KernelError, KernelResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Reserved service id marking the default entry.
pub const DEFAULT_SERVICE_ID: &str = "default";

/// Holds named service instances and resolves "give me a service for this
/// logical id and/or required capability" queries.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn AiService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under its own id.
    pub fn add(&mut self, service: Arc<dyn AiService>) -> KernelResult<()> {
        let service_id = service.service_id().to_string();
        if self.services.contains_key(&service_id) {
            return Err(KernelError::DuplicateService(service_id));
        }
        tracing::debug!(service_id = %service_id, "registering service");
        self.services.insert(service_id, service);
        Ok(())
    }

    /// Remove a service by id.
    pub fn remove(&mut self, service_id: &str) -> KernelResult<Arc<dyn AiService>> {
        self.services
            .remove(service_id)
            .ok_or_else(|| KernelError::ServiceNotFound(format!("no service '{service_id}'")))
    }

    /// Remove every registered service. Never fails.
    pub fn remove_all(&mut self) {
        self.services.clear();
    }

    /// Resolve a service.
    ///
    /// With an explicit id, the entry must exist and (when `required` is
    /// non-empty) satisfy one of the capabilities, otherwise the lookup fails
    /// with `ServiceNotFound` or `InvalidServiceType` respectively. Without an
    /// id, the entry registered under [`DEFAULT_SERVICE_ID`] wins when it
    /// satisfies the capabilities; otherwise there must be exactly one
    /// matching entry, and zero or several is `ServiceNotFound`.
    pub fn select(
        &self,
        service_id: Option<&str>,
        required: &[ServiceCapability],
    ) -> KernelResult<Arc<dyn AiService>> {
        if let Some(service_id) = service_id {
            let service = self.services.get(service_id).ok_or_else(|| {
                KernelError::ServiceNotFound(format!("no service '{service_id}'"))
            })?;
            if !satisfies(service.as_ref(), required) {
                return Err(KernelError::InvalidServiceType(format!(
                    "service '{service_id}' does not satisfy {required:?}"
                )));
            }
            return Ok(service.clone());
        }
        if let Some(service) = self.services.get(DEFAULT_SERVICE_ID) {
            if satisfies(service.as_ref(), required) {
                return Ok(service.clone());
            }
        }
        let mut matches = self
            .services
            .values()
            .filter(|service| satisfies(service.as_ref(), required));
        match (matches.next(), matches.next()) {
            (Some(service), None) => Ok(service.clone()),
            (Some(_), Some(_)) => Err(KernelError::ServiceNotFound(format!(
                "multiple services satisfy {required:?} and none is marked '{DEFAULT_SERVICE_ID}'"
            ))),
            (None, _) => Err(KernelError::ServiceNotFound(format!(
                "no service satisfies {required:?}"
            ))),
        }
    }

    /// Every service satisfying one of the capabilities, keyed by id.
    /// Never fails; returns an empty map when none match.
    pub fn get_all_of_type(
        &self,
        required: &[ServiceCapability],
    ) -> HashMap<String, Arc<dyn AiService>> {
        self.services
            .iter()
            .filter(|(_, service)| satisfies(service.as_ref(), required))
            .map(|(id, service)| (id.clone(), service.clone()))
            .collect()
    }

    /// Instantiate the execution settings of the service registered under the
    /// given id, bound to that id.
    pub fn execution_settings(&self, service_id: &str) -> KernelResult<PromptExecutionSettings> {
        Ok(self.select(Some(service_id), &[])?.execution_settings())
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.services.contains_key(service_id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// The registered service ids.
    pub fn service_ids(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }
}

fn satisfies(service: &dyn AiService, required: &[ServiceCapability]) -> bool {
    required.is_empty()
        || required
            .iter()
            .any(|capability| service.capabilities().contains(capability))
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("service_count", &self.services.len())
            .field("service_ids", &self.service_ids())
            .finish()
    }
}
