#![deny(missing_docs)]
//! SIP Endpoint Builder
//!

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use itertools::Itertools;

use crate::dialog::DialogSet;
use crate::endpoint::{Endpoint, Inner};
use crate::transaction::TransactionSet;
use crate::SipService;

/// Builder for creating a new SIP `Endpoint`.
pub struct Builder {
    name: String,
    services: Vec<Box<dyn SipService>>,
}

impl Builder {
    /// Creates a new default instance of `Builder` to construct a `Endpoint`.
    pub fn new() -> Self {
        Builder {
            name: String::new(),
            services: vec![],
        }
    }

    /// Sets the endpoint name.
    pub fn with_name<T: AsRef<str>>(mut self, s: T) -> Self {
        self.name = s.as_ref().to_string();

        self
    }

    /// Adds a service to the endpoint.
    ///
    /// This function can be called multiple times to add additional services.
    /// If a service with the same name already exists, the new service will not
    /// be added.
    pub fn with_service(mut self, service: impl SipService) -> Self {
        if self.service_exists(service.name()) {
            return self;
        }
        self.services.push(Box::new(service));

        self
    }

    /// Add a collection of services to the endpoint.
    ///
    /// Similar to [`Builder::with_service`], but allows adding multiple
    /// services at once as trait objects.
    pub fn with_services<I>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn SipService>>,
    {
        for service in services {
            if self.service_exists(service.name()) {
                continue;
            }
            self.services.push(service);
        }

        self
    }

    fn service_exists(&self, name: &str) -> bool {
        let exists = self.services.iter().any(|s| s.name() == name);
        if exists {
            log::warn!("Service with name '{}' already exists", name);
        }
        exists
    }

    /// Finalize the builder into a `Endpoint`.
    ///
    /// Services are ordered by ascending priority; registration order
    /// breaks ties.
    pub fn build(mut self) -> Endpoint {
        self.services.sort_by_key(|service| service.priority());

        log::debug!(
            "Services registered {}",
            format_args!("({})", self.services.iter().map(|s| s.name()).join(", "))
        );

        Endpoint(Arc::new(Inner {
            name: self.name,
            services: self.services.into_boxed_slice(),
            dialogs: DialogSet::new(),
            transactions: TransactionSet::new(),
            booted: AtomicBool::new(false),
        }))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
