use std::{collections::HashMap, fmt, sync::Arc};

use crate::{gatt::ServiceId, service::ServiceHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    Duplicate(ServiceId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RegistryError::Duplicate(id) => write!(f, "{} is already registered", id),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Table of the services served by this peripheral.
///
/// Filled once during server setup. After that it is owned by the dispatcher which only ever
/// reads from it.
#[derive(Default)]
pub struct ServiceRegistry {
    index: HashMap<ServiceId, usize>,
    handlers: Vec<(ServiceId, Arc<dyn ServiceHandler>)>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: ServiceId,
        handler: Arc<dyn ServiceHandler>,
    ) -> Result<(), RegistryError> {
        if self.index.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.index.insert(id, self.handlers.len());
        self.handlers.push((id, handler));
        Ok(())
    }

    pub fn lookup(&self, id: ServiceId) -> Option<&Arc<dyn ServiceHandler>> {
        self.index.get(&id).map(|&idx| &self.handlers[idx].1)
    }

    /// All handlers in registration order.
    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn ServiceHandler>> {
        self.handlers.iter().map(|(_, h)| h)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gatt::{uuid16, GattService};

    struct Empty(GattService);

    impl ServiceHandler for Empty {
        fn service(&self) -> &GattService {
            &self.0
        }
    }

    fn handler(id: u16) -> Arc<dyn ServiceHandler> {
        Arc::new(Empty(
            GattService::build(ServiceId(id), uuid16(0x1800 + id))
                .finish()
                .unwrap(),
        ))
    }

    #[test]
    fn lookup_registered() {
        let mut registry = ServiceRegistry::new();
        let a = handler(1);
        let b = handler(8);
        let c = handler(16);
        registry.register(ServiceId(1), a.clone()).unwrap();
        registry.register(ServiceId(8), b.clone()).unwrap();
        registry.register(ServiceId(16), c.clone()).unwrap();

        assert!(Arc::ptr_eq(registry.lookup(ServiceId(1)).unwrap(), &a));
        assert!(Arc::ptr_eq(registry.lookup(ServiceId(8)).unwrap(), &b));
        assert!(Arc::ptr_eq(registry.lookup(ServiceId(16)).unwrap(), &c));
        assert!(registry.lookup(ServiceId(2)).is_none());
        assert!(registry.lookup(ServiceId(0)).is_none());
        assert_eq!(registry.handlers().count(), 3);
    }

    #[test]
    fn duplicate_rejected() {
        let mut registry = ServiceRegistry::new();
        let first = handler(1);
        registry.register(ServiceId(1), first.clone()).unwrap();
        assert_eq!(
            registry.register(ServiceId(1), handler(1)),
            Err(RegistryError::Duplicate(ServiceId(1)))
        );
        assert!(Arc::ptr_eq(registry.lookup(ServiceId(1)).unwrap(), &first));
        assert_eq!(registry.handlers().count(), 1);
    }

    #[test]
    fn handlers_in_insertion_order() {
        let mut registry = ServiceRegistry::new();
        for id in [5, 1, 3] {
            registry.register(ServiceId(id), handler(id)).unwrap();
        }
        let ids: Vec<_> = registry.handlers().map(|h| h.service().id.0).collect();
        assert_eq!(ids, vec![5, 1, 3]);
    }
}
