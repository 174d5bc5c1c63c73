//! Named FIFO task queues, the unit of message ordering.
//!
//! A serializer owns a queue and a single consumer loop on the shared tokio
//! runtime, so tasks pushed onto one serializer run sequentially in push
//! order while different serializers run concurrently. Serializers are
//! registered by name in a [`SerializerRegistry`]; the registry only holds
//! weak handles, so a serializer disappears (and its name becomes free)
//! once the last [`Serializer`] clone is dropped. Whatever was still queued
//! at that point is drained before the consumer exits.
//!
//! The registry also tracks the process-wide overload alert: any serializer
//! whose queue depth crosses the high water mark raises it, and clears it
//! again once it drains below the low water mark.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use util::ArcStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Queue depth at which a serializer raises the overload alert.
pub const HIGH_WATER_MARK: usize = 500;
/// Queue depth at which an alerting serializer clears its alert.
pub const LOW_WATER_MARK: usize = 450;

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

tokio::task_local! {
    static CURRENT_SERIALIZER: Serializer;
}

#[derive(Debug)]
struct RegistryInner {
    /// Registered serializers, by name. Entries are weak on purpose: the
    /// registry must not keep a serializer alive.
    names: Mutex<HashMap<ArcStr, Weak<SerializerInner>>>,
    /// Number of serializers currently above their high water mark.
    alerts: AtomicUsize,
    high_water: usize,
    low_water: usize,
}

/// The process-wide set of serializers, indexed by name.
#[derive(Clone)]
pub struct SerializerRegistry(Arc<RegistryInner>);

impl SerializerRegistry {
    /// Creates a registry with the default watermarks.
    pub fn new() -> Self {
        Self::with_watermarks(HIGH_WATER_MARK, LOW_WATER_MARK)
    }

    /// Creates a registry with custom overload watermarks.
    ///
    /// The alert is raised when a queue reaches `high` tasks and cleared
    /// when it drains back to `low` or fewer.
    pub fn with_watermarks(high: usize, low: usize) -> Self {
        SerializerRegistry(Arc::new(RegistryInner {
            names: Mutex::new(HashMap::new()),
            alerts: AtomicUsize::new(0),
            high_water: high,
            low_water: low,
        }))
    }

    /// Creates and registers a new serializer.
    ///
    /// Fails if a live serializer with this name already exists.
    pub fn create(&self, name: &str) -> Result<Serializer> {
        let name: ArcStr = name.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let inner = Arc::new(SerializerInner {
            name: name.clone(),
            tx,
            depth: AtomicUsize::new(0),
            alerted: AtomicBool::new(false),
            registry: self.0.clone(),
        });

        {
            // Liveness is checked through strong_count rather than upgrade:
            // an upgraded Arc dropped inside this critical section could be
            // the last one and re-enter the lock from SerializerInner::drop.
            let mut names = self.0.names.lock().expect("Lock failed");
            if names.get(&name).is_some_and(|entry| entry.strong_count() > 0) {
                return Err(Error::SerializerNameTaken(name));
            }
            names.insert(name.clone(), Arc::downgrade(&inner));
        }

        tokio::spawn(run(name, Arc::downgrade(&inner), rx));

        Ok(Serializer { inner })
    }

    /// Creates a serializer with a system-generated unique name derived
    /// from `base`.
    pub fn create_unique(&self, base: &str) -> Serializer {
        loop {
            let name = format!("{}-{}", base, Uuid::new_v4().as_simple());
            match self.create(&name) {
                Ok(serializer) => return serializer,
                Err(_) => continue,
            }
        }
    }

    /// Looks a live serializer up by name.
    pub fn find(&self, name: &str) -> Option<Serializer> {
        let names = self.0.names.lock().expect("Lock failed");
        let inner = names.get(name)?.upgrade()?;

        Some(Serializer { inner })
    }

    /// Returns `true` while at least one serializer sits above its high
    /// water mark.
    pub fn overloaded(&self) -> bool {
        self.0.alerts.load(Ordering::SeqCst) > 0
    }

    /// Number of live serializers currently registered.
    pub fn count(&self) -> usize {
        let names = self.0.names.lock().expect("Lock failed");
        names.values().filter(|entry| entry.strong_count() > 0).count()
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct SerializerInner {
    name: ArcStr,
    tx: mpsc::UnboundedSender<Task>,
    depth: AtomicUsize,
    alerted: AtomicBool,
    registry: Arc<RegistryInner>,
}

impl SerializerInner {
    fn complete_one(&self) {
        let depth = self.depth.fetch_sub(1, Ordering::SeqCst) - 1;
        if depth <= self.registry.low_water && self.alerted.swap(false, Ordering::SeqCst) {
            self.registry.alerts.fetch_sub(1, Ordering::SeqCst);
            log::debug!(
                "Serializer '{}' drained to {} queued tasks; overload alert cleared",
                self.name,
                depth
            );
        }
    }
}

impl Drop for SerializerInner {
    fn drop(&mut self) {
        if self.alerted.load(Ordering::SeqCst) {
            self.registry.alerts.fetch_sub(1, Ordering::SeqCst);
        }

        let mut names = self.registry.names.lock().expect("Lock failed");
        if let Some(entry) = names.get(&self.name) {
            // The name may already belong to a successor created after our
            // strong count hit zero.
            if entry.strong_count() == 0 {
                names.remove(&self.name);
            }
        }
    }
}

/// A named FIFO task queue.
///
/// Cheap to clone; every holder owns its own reference and the queue lives
/// until the last clone is dropped.
#[derive(Clone, Debug)]
pub struct Serializer {
    inner: Arc<SerializerInner>,
}

impl Serializer {
    /// Returns the serializer name.
    pub fn name(&self) -> &ArcStr {
        &self.inner.name
    }

    /// Current queue depth, including the task being run.
    pub fn depth(&self) -> usize {
        self.inner.depth.load(Ordering::SeqCst)
    }

    /// Queues a task. Tasks run strictly in push order.
    pub fn push<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let inner = &self.inner;

        inner.depth.fetch_add(1, Ordering::SeqCst);
        if inner.tx.send(Box::pin(task)).is_err() {
            inner.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::SerializerClosed(inner.name.clone()));
        }

        let depth = inner.depth.load(Ordering::SeqCst);
        if depth >= inner.registry.high_water && !inner.alerted.swap(true, Ordering::SeqCst) {
            inner.registry.alerts.fetch_add(1, Ordering::SeqCst);
            log::warn!(
                "Serializer '{}' reached {} queued tasks; raising overload alert",
                inner.name,
                depth
            );
        }

        Ok(())
    }

    /// Returns the serializer whose consumer is running the current task,
    /// if the current task was pushed onto one.
    pub fn current() -> Option<Serializer> {
        CURRENT_SERIALIZER.try_with(|serializer| serializer.clone()).ok()
    }
}

async fn run(name: ArcStr, inner: Weak<SerializerInner>, mut rx: mpsc::UnboundedReceiver<Task>) {
    while let Some(task) = rx.recv().await {
        let owner = inner.upgrade().map(|inner| Serializer { inner });

        // Each task runs as its own spawn on the shared runtime, awaited
        // here so ordering holds; a panicking task must not take the whole
        // lane down with it.
        let job = match &owner {
            Some(serializer) => {
                tokio::spawn(CURRENT_SERIALIZER.scope(serializer.clone(), task))
            }
            // The last handle is gone; drain the remainder without an owner.
            None => tokio::spawn(task),
        };

        if let Err(err) = job.await {
            log::error!("Task on serializer '{}' failed: {}", name, err);
        }

        if let Some(serializer) = owner {
            serializer.inner.complete_one();
        }
    }

    log::trace!("Serializer '{}' consumer exiting", name);
}
