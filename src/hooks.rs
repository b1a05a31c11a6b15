use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::MeterId;
use crate::error::{BoxError, MeterError, Result};
use crate::models::{MeterDescriptor, MeterRecord};

/// The three gated lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Insert,
    Remove,
    Use,
}

impl HookKind {
    pub const ALL: [HookKind; 3] = [HookKind::Insert, HookKind::Remove, HookKind::Use];
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookKind::Insert => write!(f, "insert"),
            HookKind::Remove => write!(f, "remove"),
            HookKind::Use => write!(f, "use"),
        }
    }
}

/// Payload delivered to a hook handler.
///
/// `Insert` fires before the record is persisted and can veto creation.
/// `Remove` fires after the delete; the id may already be gone from
/// storage. `Use` fires after a usage report and carries the updated
/// aggregate record.
#[derive(Debug)]
pub enum HookEvent<'a> {
    Insert { meter: &'a MeterDescriptor },
    Remove { id: MeterId },
    Use { record: &'a MeterRecord },
}

impl HookEvent<'_> {
    pub fn kind(&self) -> HookKind {
        match self {
            HookEvent::Insert { .. } => HookKind::Insert,
            HookEvent::Remove { .. } => HookKind::Remove,
            HookEvent::Use { .. } => HookKind::Use,
        }
    }
}

/// External handler invoked at a lifecycle transition.
/// A returned error is the handler's own domain error; the engine
/// propagates it without interpreting it.
#[async_trait]
pub trait MeterHook: Send + Sync {
    async fn invoke(&self, event: HookEvent<'_>) -> std::result::Result<(), BoxError>;
}

/// Registry holding at most one handler per lifecycle transition.
///
/// Registration needs `&mut self` and happens during single-threaded
/// startup; the registry is then frozen behind `Arc` for the serving
/// phase, so handlers cannot change once operations are in flight.
#[derive(Default)]
pub struct HookRegistry {
    insert: Option<Arc<dyn MeterHook>>,
    remove: Option<Arc<dyn MeterHook>>,
    usage: Option<Arc<dyn MeterHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: HookKind) -> Option<&Arc<dyn MeterHook>> {
        match kind {
            HookKind::Insert => self.insert.as_ref(),
            HookKind::Remove => self.remove.as_ref(),
            HookKind::Use => self.usage.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: HookKind) -> &mut Option<Arc<dyn MeterHook>> {
        match kind {
            HookKind::Insert => &mut self.insert,
            HookKind::Remove => &mut self.remove,
            HookKind::Use => &mut self.usage,
        }
    }

    /// Register a handler for one transition. Each slot can be set
    /// exactly once; re-registration is a startup configuration error.
    pub fn register(&mut self, kind: HookKind, hook: Arc<dyn MeterHook>) -> Result<()> {
        let slot = self.slot_mut(kind);
        if slot.is_some() {
            return Err(MeterError::AlreadyRegistered(kind));
        }
        *slot = Some(hook);
        Ok(())
    }

    pub fn is_registered(&self, kind: HookKind) -> bool {
        self.slot(kind).is_some()
    }

    /// Startup completeness check: every transition must be gated before
    /// lifecycle operations are allowed to run
    pub fn require_all(&self) -> Result<()> {
        for kind in HookKind::ALL {
            if self.slot(kind).is_none() {
                return Err(MeterError::MissingHandler(kind));
            }
        }
        Ok(())
    }

    /// Deliver an event to its registered handler
    pub async fn invoke(&self, event: HookEvent<'_>) -> Result<()> {
        let kind = event.kind();
        let hook = self
            .slot(kind)
            .ok_or(MeterError::HandlerNotSet(kind))?
            .clone();
        hook.invoke(event)
            .await
            .map_err(|source| MeterError::HookFailed { kind, source })
    }
}
