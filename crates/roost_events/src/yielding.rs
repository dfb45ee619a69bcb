//! Handlers that suspend until another hook fires.
//!
//! A yielding handler is driven by a [`Coroutine`]: each resume either
//! finishes or names a hook to wait for. Waiting registers a one-shot
//! continuation on that hook; when the hook fires, the coroutine resumes with
//! that hook's event. Continuations are named `"<name>/<n>"` and must run in
//! the order they were created.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::dependency::RegisterOptions;
use crate::event::Event;
use crate::handler::{Handler, HandlerError, HandlerResult};
use crate::hook::Hook;

/// What a coroutine wants after a resume.
#[derive(Debug, Clone)]
pub enum Resume {
    /// Suspend until this hook fires next.
    Await(Hook),
    /// Done; nothing more to run.
    Finished,
}

/// An explicit state machine standing in for a suspended handler.
///
/// Closures `FnMut(&mut Event) -> Result<Resume, HandlerError>` are
/// coroutines too.
pub trait Coroutine: Send + 'static {
    /// Runs until the next suspension point.
    ///
    /// `event` is the event of the hook that resumed the coroutine: the
    /// original hook on the first call, the awaited hook afterwards.
    ///
    /// # Errors
    ///
    /// An error is reported by whichever hook resumed the coroutine.
    fn resume(&mut self, event: &mut Event) -> Result<Resume, HandlerError>;
}

impl<F> Coroutine for F
where
    F: FnMut(&mut Event) -> Result<Resume, HandlerError> + Send + 'static,
{
    fn resume(&mut self, event: &mut Event) -> Result<Resume, HandlerError> {
        self(event)
    }
}

struct Driver<C> {
    coroutine: C,
    call_position: usize,
    name: String,
}

/// Builds a handler that starts a fresh coroutine from `factory` on every
/// call.
///
/// # Example
///
/// ```
/// use roost_events::{Hook, RegisterOptions, Resume, yielding};
///
/// let login = Hook::new("login");
/// let welcome = Hook::new("welcome");
///
/// let handler = yielding("app.greeter", || {
///     |event: &mut roost_events::Event| -> Result<Resume, roost_events::HandlerError> {
///         Ok(match event.hook("then").cloned() {
///             Some(next) => Resume::Await(next),
///             None => {
///                 event.insert("greeted", true);
///                 Resume::Finished
///             }
///         })
///     }
/// });
/// login.register(&handler, RegisterOptions::new()).unwrap();
///
/// let context = roost_events::Context::new().with_hook("then", &welcome);
/// assert_eq!(login.fire_with([context]).unwrap().get_bool("greeted"), None);
/// assert_eq!(welcome.fire().unwrap().get_bool("greeted"), Some(true));
/// assert_eq!(welcome.fire().unwrap().get_bool("greeted"), None);
/// ```
#[must_use]
pub fn yielding<C, F>(name: impl Into<String>, factory: F) -> Handler
where
    C: Coroutine,
    F: Fn() -> C + Send + Sync + 'static,
{
    let name = name.into();
    Handler::new(name.clone(), move |event| {
        let driver = Arc::new(Mutex::new(Driver {
            coroutine: factory(),
            call_position: 0,
            name: name.clone(),
        }));
        step(&driver, event)
    })
}

fn step<C: Coroutine>(driver: &Arc<Mutex<Driver<C>>>, event: &mut Event) -> HandlerResult {
    let mut state = driver.lock();
    match state.coroutine.resume(event)? {
        Resume::Finished => {
            debug!(handler = %state.name, "coroutine finished");
            Ok(())
        }
        Resume::Await(hook) => {
            let position = state.call_position + 1;
            let name = format!("{}/{position}", state.name);
            drop(state);

            let resumed = Arc::clone(driver);
            let continuation = Handler::new(name, move |event| {
                {
                    let mut state = resumed.lock();
                    state.call_position += 1;
                    assert_eq!(
                        state.call_position, position,
                        "continuation of {} resumed out of yield order",
                        state.name
                    );
                }
                step(&resumed, event)
            });

            debug!(handler = %continuation, hook = %hook, "coroutine suspended");
            hook.register_once(&continuation, RegisterOptions::new())?;
            Ok(())
        }
    }
}
