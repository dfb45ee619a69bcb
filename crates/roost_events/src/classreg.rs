//! Classes instantiated on fire, with per-instance hook methods.
//!
//! A type implementing [`HookClass`] is registered against a hook with
//! [`Hook::register_instantiation`]. Every firing of that hook constructs a
//! new instance. The type's [`MethodTable`] lists the methods to attach to
//! other hooks; each such method is represented by one method proxy that is
//! registered with its hooks while at least one instance is alive, and calls
//! the method on every live instance.
//!
//! Instances are freed through the [`InstanceHandle`] passed to
//! [`HookClass::construct`].
//!
//! # Example
//!
//! ```
//! use roost_events::{Event, HandlerError, Hook, HookClass, InstanceHandle, MethodTable, RegisterOptions};
//!
//! struct Session {
//!     handle: InstanceHandle,
//! }
//!
//! static MESSAGE: std::sync::LazyLock<Hook> = std::sync::LazyLock::new(|| Hook::new("message"));
//!
//! impl HookClass for Session {
//!     const NAME: &'static str = "chat.Session";
//!
//!     fn construct(_event: &mut Event, handle: InstanceHandle) -> Result<Self, HandlerError> {
//!         Ok(Self { handle })
//!     }
//!
//!     fn hook_methods(methods: &mut MethodTable<Self>) {
//!         methods
//!             .method("on_message", |session: &mut Session, event: &mut Event| {
//!                 if event.get_str("text") == Some("bye") {
//!                     session.handle.delete()?;
//!                 }
//!                 Ok(())
//!             })
//!             .on(&MESSAGE, RegisterOptions::new());
//!     }
//! }
//!
//! let connect = Hook::new("connect");
//! let sessions = connect
//!     .register_instantiation::<Session>(RegisterOptions::new())
//!     .unwrap();
//!
//! connect.fire().unwrap();
//! assert_eq!(sessions.instance_count(), 1);
//!
//! MESSAGE.fire_with([[("text", "bye")]]).unwrap();
//! assert_eq!(sessions.instance_count(), 0);
//! assert!(!sessions.proxies_registered());
//! ```

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::dependency::RegisterOptions;
use crate::error::HookError;
use crate::event::Event;
use crate::handler::{Handler, HandlerError, HandlerResult};
use crate::hook::Hook;

/// Name of the constructor entry; it may not carry hook registrations.
const CONSTRUCTOR: &str = "new";

type MethodFn<T> = Arc<dyn Fn(&mut T, &mut Event) -> HandlerResult + Send + Sync>;
type Instances<T> = IndexMap<InstanceId, Arc<Mutex<T>>>;

// ─────────────────────────────────────────────────────────────────────────────
// HookClass
// ─────────────────────────────────────────────────────────────────────────────

/// A type whose instances are created by a hook firing.
pub trait HookClass: Sized + Send + 'static {
    /// Fully-qualified class name. Method proxies are named `NAME.method`.
    const NAME: &'static str;

    /// Builds an instance from the firing event.
    ///
    /// # Errors
    ///
    /// An error aborts the instantiation and is reported like any handler
    /// error.
    fn construct(event: &mut Event, handle: InstanceHandle) -> Result<Self, HandlerError>;

    /// Declares the methods to attach to hooks.
    ///
    /// A subtype reuses its base by calling the base's table function first
    /// and then re-declaring the methods it overrides.
    fn hook_methods(methods: &mut MethodTable<Self>);
}

// ─────────────────────────────────────────────────────────────────────────────
// MethodTable
// ─────────────────────────────────────────────────────────────────────────────

struct MethodRegistration {
    hook: Hook,
    options: RegisterOptions,
}

/// One declared method and the hooks it is attached to.
pub struct MethodEntry<T> {
    func: MethodFn<T>,
    registrations: Vec<MethodRegistration>,
}

impl<T> MethodEntry<T> {
    /// Attaches the method to `hook`.
    pub fn on(&mut self, hook: &Hook, options: RegisterOptions) -> &mut Self {
        self.registrations.push(MethodRegistration {
            hook: hook.clone(),
            options,
        });
        self
    }

    /// Number of hooks the method is attached to.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }
}

/// Ordered table of a class's hookable methods.
pub struct MethodTable<T> {
    methods: IndexMap<String, MethodEntry<T>>,
}

impl<T> MethodTable<T> {
    fn new() -> Self {
        Self {
            methods: IndexMap::new(),
        }
    }

    /// Declares a method, replacing any entry of the same name.
    ///
    /// A replaced entry keeps its position but loses its hook attachments.
    pub fn method(
        &mut self,
        name: &str,
        func: impl Fn(&mut T, &mut Event) -> HandlerResult + Send + Sync + 'static,
    ) -> &mut MethodEntry<T> {
        let entry = MethodEntry {
            func: Arc::new(func),
            registrations: Vec::new(),
        };
        let (index, _) = self.methods.insert_full(name.to_owned(), entry);
        &mut self.methods[index]
    }

    /// Returns the entry called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MethodEntry<T>> {
        self.methods.get(name)
    }

    /// Declared method names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instances
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of one live instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

trait InstanceOwner: Send + Sync {
    fn free(&self, id: InstanceId) -> Result<(), HookError>;
}

/// Lets an instance free itself.
///
/// Keeps the class's bookkeeping alive, so an instance can always detach
/// itself from its method hooks.
#[derive(Clone)]
pub struct InstanceHandle {
    id: InstanceId,
    owner: Arc<dyn InstanceOwner>,
}

impl InstanceHandle {
    /// The instance's identity.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Stops tracking the instance and detaches it from every method hook.
    ///
    /// Freeing the last instance unregisters the method proxies.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::NotRegistered`] if the instance was already
    /// freed.
    pub fn delete(&self) -> Result<(), HookError> {
        self.owner.free(self.id)
    }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MethodProxy
// ─────────────────────────────────────────────────────────────────────────────

/// Fans one method out to every live instance.
struct MethodProxy<T> {
    handler: Handler,
    registrations: Vec<MethodRegistration>,
    bound: Arc<Mutex<Instances<T>>>,
    hooks_registered: Mutex<Vec<Hook>>,
}

impl<T: HookClass> MethodProxy<T> {
    fn new(method: &str, entry: MethodEntry<T>) -> Self {
        let bound: Arc<Mutex<Instances<T>>> = Arc::new(Mutex::new(IndexMap::new()));
        let instances = Arc::clone(&bound);
        let func = entry.func;
        let handler = Handler::new(format!("{}.{method}", T::NAME), move |event| {
            let snapshot: Vec<Arc<Mutex<T>>> = instances.lock().values().cloned().collect();
            for instance in snapshot {
                func(&mut instance.lock(), event)?;
            }
            Ok(())
        });

        Self {
            handler,
            registrations: entry.registrations,
            bound,
            hooks_registered: Mutex::new(Vec::new()),
        }
    }

    /// Registers the proxy with every attached hook, or with none.
    fn register(&self) -> Result<(), HookError> {
        let mut registered = self.hooks_registered.lock();
        if !registered.is_empty() {
            return Err(HookError::AlreadyRegistered(format!(
                "method proxy {}",
                self.handler
            )));
        }
        for registration in &self.registrations {
            if let Err(err) = registration
                .hook
                .register(&self.handler, registration.options.clone())
            {
                for hook in registered.drain(..) {
                    if let Err(rollback) = hook.unregister(&self.handler) {
                        warn!(proxy = %self.handler, hook = %hook, error = %rollback, "rollback failed");
                    }
                }
                return Err(err);
            }
            registered.push(registration.hook.clone());
        }
        Ok(())
    }

    fn unregister(&self) -> Result<(), HookError> {
        let hooks: Vec<Hook> = core::mem::take(&mut *self.hooks_registered.lock());
        if hooks.is_empty() {
            return Err(HookError::NotRegistered(format!(
                "method proxy {}",
                self.handler
            )));
        }
        for hook in hooks {
            hook.unregister(&self.handler)?;
        }
        Ok(())
    }

    fn add_bound(&self, id: InstanceId, instance: Arc<Mutex<T>>) -> Result<(), HookError> {
        let mut bound = self.bound.lock();
        if bound.contains_key(&id) {
            return Err(HookError::AlreadyRegistered(format!(
                "instance {id} to method proxy {}",
                self.handler
            )));
        }
        bound.insert(id, instance);
        Ok(())
    }

    fn remove_bound(&self, id: InstanceId) -> Result<(), HookError> {
        self.bound
            .lock()
            .shift_remove(&id)
            .map(drop)
            .ok_or_else(|| {
                HookError::NotRegistered(format!("instance {id} to method proxy {}", self.handler))
            })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ClassRegistration
// ─────────────────────────────────────────────────────────────────────────────

struct ClassState<T> {
    instances: Instances<T>,
    proxies_registered: bool,
}

struct ClassInner<T> {
    proxies: Vec<MethodProxy<T>>,
    state: Mutex<ClassState<T>>,
}

impl<T: HookClass> ClassInner<T> {
    fn instantiate(self: &Arc<Self>, event: &mut Event) -> HandlerResult {
        let id = InstanceId::new();
        let owner: Arc<dyn InstanceOwner> = Arc::clone(self) as Arc<dyn InstanceOwner>;
        let instance = Arc::new(Mutex::new(T::construct(event, InstanceHandle { id, owner })?));

        let mut state = self.state.lock();
        if state.instances.is_empty() {
            if state.proxies_registered {
                return Err(HookError::AlreadyRegistered(format!(
                    "method proxies of class '{}' with no live instance",
                    T::NAME
                ))
                .into());
            }
            for (index, proxy) in self.proxies.iter().enumerate() {
                if let Err(err) = proxy.register() {
                    for registered in &self.proxies[..index] {
                        if let Err(rollback) = registered.unregister() {
                            warn!(class = T::NAME, error = %rollback, "rollback failed");
                        }
                    }
                    return Err(err.into());
                }
            }
            state.proxies_registered = true;
        }

        state.instances.insert(id, Arc::clone(&instance));
        for proxy in &self.proxies {
            proxy.add_bound(id, Arc::clone(&instance))?;
        }

        debug!(class = T::NAME, instance = %id, live = state.instances.len(), "instantiated");
        Ok(())
    }
}

impl<T: HookClass> InstanceOwner for ClassInner<T> {
    fn free(&self, id: InstanceId) -> Result<(), HookError> {
        let mut state = self.state.lock();
        if state.instances.shift_remove(&id).is_none() {
            return Err(HookError::NotRegistered(format!(
                "instance {id} of class '{}'",
                T::NAME
            )));
        }
        for proxy in &self.proxies {
            proxy.remove_bound(id)?;
        }

        if state.instances.is_empty() {
            if !state.proxies_registered {
                return Err(HookError::NotRegistered(format!(
                    "method proxies of class '{}' are already unregistered",
                    T::NAME
                )));
            }
            for proxy in &self.proxies {
                proxy.unregister()?;
            }
            state.proxies_registered = false;
        }

        debug!(class = T::NAME, instance = %id, live = state.instances.len(), "freed instance");
        Ok(())
    }
}

/// Tracks the live instances of a class registered for instantiation.
///
/// The hook keeps the class registered whether or not this value is kept.
pub struct ClassRegistration<T> {
    inner: Arc<ClassInner<T>>,
    handler: Handler,
}

impl<T> Clone for ClassRegistration<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            handler: self.handler.clone(),
        }
    }
}

impl<T: HookClass> ClassRegistration<T> {
    fn new(table: MethodTable<T>) -> Self {
        let proxies = table
            .methods
            .into_iter()
            .filter(|(_, entry)| !entry.registrations.is_empty())
            .map(|(name, entry)| MethodProxy::new(&name, entry))
            .collect();

        let inner = Arc::new(ClassInner {
            proxies,
            state: Mutex::new(ClassState {
                instances: IndexMap::new(),
                proxies_registered: false,
            }),
        });
        let owned = Arc::clone(&inner);
        let handler = Handler::new(T::NAME, move |event| owned.instantiate(event));
        Self { inner, handler }
    }

    /// The handler registered with the instantiation hook.
    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Number of live instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.inner.state.lock().instances.len()
    }

    /// Handles of the live instances, oldest first.
    #[must_use]
    pub fn instances(&self) -> Vec<InstanceHandle> {
        let owner: Arc<dyn InstanceOwner> = Arc::clone(&self.inner) as Arc<dyn InstanceOwner>;
        self.inner
            .state
            .lock()
            .instances
            .keys()
            .map(|&id| InstanceHandle {
                id,
                owner: owner.clone(),
            })
            .collect()
    }

    /// Returns the live instance behind `handle`.
    #[must_use]
    pub fn instance(&self, handle: &InstanceHandle) -> Option<Arc<Mutex<T>>> {
        self.inner.state.lock().instances.get(&handle.id).cloned()
    }

    /// Returns true while the method proxies are registered with their hooks.
    #[must_use]
    pub fn proxies_registered(&self) -> bool {
        self.inner.state.lock().proxies_registered
    }

    /// Names of the method proxies (`NAME.method`).
    #[must_use]
    pub fn proxy_names(&self) -> Vec<String> {
        self.inner
            .proxies
            .iter()
            .filter_map(|proxy| proxy.handler.name().map(str::to_owned))
            .collect()
    }
}

impl Hook {
    /// Registers `T` to be instantiated every time this hook fires.
    ///
    /// # Errors
    ///
    /// - [`HookError::NotInstantiable`] if the `"new"` constructor entry of
    ///   `T`'s method table is attached to a hook.
    /// - Any error of [`register`](Hook::register) for the class handler.
    pub fn register_instantiation<T: HookClass>(
        &self,
        options: RegisterOptions,
    ) -> Result<ClassRegistration<T>, HookError> {
        let mut table = MethodTable::new();
        T::hook_methods(&mut table);

        if table
            .get(CONSTRUCTOR)
            .is_some_and(|entry| !entry.registrations.is_empty())
        {
            return Err(HookError::NotInstantiable {
                class: T::NAME.to_owned(),
                reason: "its constructor is attached to a hook".to_owned(),
            });
        }

        let registration = ClassRegistration::new(table);
        self.register(registration.handler(), options)?;
        Ok(registration)
    }
}
