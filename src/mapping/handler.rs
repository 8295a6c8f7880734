use std::fmt;
use std::sync::Arc;

use crate::binding::BoundArguments;
use crate::dispatcher::ReturnValue;
use crate::request::RequestContext;

/// A handler invoked with its bound arguments.
///
/// Errors are classified by the dispatcher: a [`crate::error::ClientError`]
/// or [`crate::error::BindingError`] in the chain becomes a 400 with its
/// message, anything else a generic 500.
pub trait HandlerMethod: Send + Sync {
    fn invoke(&self, args: BoundArguments, request: &RequestContext) -> anyhow::Result<ReturnValue>;
}

impl<F> HandlerMethod for F
where
    F: Fn(BoundArguments, &RequestContext) -> anyhow::Result<ReturnValue> + Send + Sync,
{
    fn invoke(&self, args: BoundArguments, request: &RequestContext) -> anyhow::Result<ReturnValue> {
        self(args, request)
    }
}

/// Named, shared handler target.
///
/// Two refs are the same handler only when they point at the same target.
#[derive(Clone)]
pub struct HandlerRef {
    name: Arc<str>,
    target: Arc<dyn HandlerMethod>,
}

impl HandlerRef {
    /// Wrap a closure; its signature is inferred from this bound.
    pub fn new<F>(name: &str, target: F) -> Self
    where
        F: Fn(BoundArguments, &RequestContext) -> anyhow::Result<ReturnValue> + Send + Sync + 'static,
    {
        Self::from_method(name, target)
    }

    pub fn from_method(name: &str, target: impl HandlerMethod + 'static) -> Self {
        Self {
            name: Arc::from(name),
            target: Arc::new(target),
        }
    }

    #[must_use]
    pub fn from_arc(name: &str, target: Arc<dyn HandlerMethod>) -> Self {
        Self {
            name: Arc::from(name),
            target,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn target(&self) -> &Arc<dyn HandlerMethod> {
        &self.target
    }

    /// # Errors
    ///
    /// Whatever the handler returns.
    pub fn invoke(&self, args: BoundArguments, request: &RequestContext) -> anyhow::Result<ReturnValue> {
        self.target.invoke(args, request)
    }
}

impl PartialEq for HandlerRef {
    fn eq(&self, other: &Self) -> bool {
        // Compare data pointers only; vtables may be duplicated across units.
        std::ptr::eq(
            Arc::as_ptr(&self.target).cast::<()>(),
            Arc::as_ptr(&other.target).cast::<()>(),
        )
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRef").field("name", &self.name).finish()
    }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
