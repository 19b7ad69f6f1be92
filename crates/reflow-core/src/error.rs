use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::host::HostError;

#[derive(Debug, Error)]
enum ErrorRepr {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("{0}")]
    Source(Box<dyn StdError + 'static>),
}

/// An error raised by user code (render, lifecycle hook, effect, ref
/// callback) or by a host-tree operation.
///
/// Values are cheap to clone so they can be carried up the ancestor
/// chain while a boundary is searched for.
#[derive(Clone)]
pub struct RenderError {
    inner: Rc<ErrorRepr>,
}

impl RenderError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(ErrorRepr::Message(message.into())),
        }
    }

    pub fn source(error: impl StdError + 'static) -> Self {
        Self {
            inner: Rc::new(ErrorRepr::Source(Box::new(error))),
        }
    }
}

impl From<HostError> for RenderError {
    fn from(error: HostError) -> Self {
        Self {
            inner: Rc::new(ErrorRepr::Host(error)),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl fmt::Debug for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RenderError({})", self.inner)
    }
}

impl StdError for RenderError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &*self.inner {
            ErrorRepr::Message(_) => None,
            ErrorRepr::Host(e) => Some(e),
            ErrorRepr::Source(e) => Some(e.as_ref()),
        }
    }
}
