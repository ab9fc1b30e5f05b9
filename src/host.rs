//! Scene host integration
//!
//! [`SceneOperations`] is the host application hook: it enumerates file
//! references in the open document and rewrites them. Many hosts only allow
//! this from one designated thread, so the core never calls the hook
//! directly. It goes through a [`SceneHost`], which decides where the call runs.

use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, warn};

use crate::error::{BreakdownError, Result};

/// One file reference in the scene, as reported by or sent to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneReference {
    pub node: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub path: String,
}

impl SceneReference {
    pub fn new(node: impl Into<String>, node_type: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            node_type: node_type.into(),
            path: path.into(),
        }
    }
}

/// Host application hook
pub trait SceneOperations {
    fn scan_scene(&mut self) -> Result<Vec<SceneReference>>;

    fn update(&mut self, items: &[SceneReference]) -> Result<()>;
}

/// Execution context for the scene hooks
pub trait SceneHost: Send + Sync {
    fn scan_scene(&self) -> Result<Vec<SceneReference>>;

    fn update(&self, items: Vec<SceneReference>) -> Result<()>;
}

fn poisoned() -> BreakdownError {
    BreakdownError::HostUnavailable("scene hook lock poisoned".to_string())
}

/// Runs hooks on whichever thread calls it
pub struct InlineHost<H> {
    hooks: Mutex<H>,
}

impl<H: SceneOperations> InlineHost<H> {
    pub fn new(hooks: H) -> Self {
        Self { hooks: Mutex::new(hooks) }
    }

    pub fn into_inner(self) -> Result<H> {
        self.hooks.into_inner().map_err(|_| poisoned())
    }
}

impl<H: SceneOperations + Send> SceneHost for InlineHost<H> {
    fn scan_scene(&self) -> Result<Vec<SceneReference>> {
        self.hooks.lock().map_err(|_| poisoned())?.scan_scene()
    }

    fn update(&self, items: Vec<SceneReference>) -> Result<()> {
        self.hooks.lock().map_err(|_| poisoned())?.update(&items)
    }
}

enum HostRequest {
    Scan(mpsc::Sender<Result<Vec<SceneReference>>>),
    Update(Vec<SceneReference>, mpsc::Sender<Result<()>>),
}

/// Owns the hooks on a dedicated thread and marshals every call onto it.
///
/// The hooks are built on that thread, so they need not be `Send`.
pub struct ThreadAffineHost {
    requests: Mutex<Option<mpsc::Sender<HostRequest>>>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl ThreadAffineHost {
    pub fn spawn<H, F>(name: &str, make_hooks: F) -> Result<Self>
    where
        H: SceneOperations + 'static,
        F: FnOnce() -> H + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<HostRequest>();
        let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
            let mut hooks = make_hooks();
            for request in rx {
                match request {
                    HostRequest::Scan(reply) => {
                        let _ = reply.send(hooks.scan_scene());
                    }
                    HostRequest::Update(items, reply) => {
                        let _ = reply.send(hooks.update(&items));
                    }
                }
            }
            debug!("scene host thread stopped");
        })?;

        Ok(Self {
            requests: Mutex::new(Some(tx)),
            thread_id: thread.thread().id(),
            thread: Some(thread),
        })
    }

    /// Thread the hooks run on
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    fn send(&self, request: HostRequest) -> Result<()> {
        let guard = self.requests.lock().map_err(|_| poisoned())?;
        let sender = guard
            .as_ref()
            .ok_or_else(|| BreakdownError::HostUnavailable("host stopped".to_string()))?;
        sender
            .send(request)
            .map_err(|_| BreakdownError::HostUnavailable("host thread exited".to_string()))
    }
}

fn await_reply<T>(rx: mpsc::Receiver<Result<T>>) -> Result<T> {
    rx.recv()
        .map_err(|_| BreakdownError::HostUnavailable("host dropped the request".to_string()))?
}

impl SceneHost for ThreadAffineHost {
    fn scan_scene(&self) -> Result<Vec<SceneReference>> {
        let (tx, rx) = mpsc::channel();
        self.send(HostRequest::Scan(tx))?;
        await_reply(rx)
    }

    fn update(&self, items: Vec<SceneReference>) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        self.send(HostRequest::Update(items, tx))?;
        await_reply(rx)
    }
}

impl Drop for ThreadAffineHost {
    fn drop(&mut self) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.take();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("scene host thread panicked");
            }
        }
    }
}
