//! Interactive session: contacts in, operations out.
//!
//! A [`Session`] owns the document-owning worker thread. The interactive
//! layer feeds it pointer contacts through [`Session::submit_contact`]; the
//! worker runs them through the [`GestureResolver`], asks the host's
//! [`OperationProvider`] what the gesture means, and on release invokes the
//! chosen [`Operation`] inside the daemon pause bracket. Presentation
//! collaborators follow along through [`Session::subscribe`].

mod config;
mod error;
mod events;
mod executor;
pub mod gesture;
mod operation;
mod refresh;
mod session;
mod worker;

pub use config::{Config, ConfigError, EventsConfig, GestureConfig, RefreshConfig};
pub use error::SessionError;
pub use events::SessionEvent;
pub use gesture::{Contact, GestureError, GestureResolver, Hit, HitList, OperationProvider, ResolveContext, Status, Step};
pub use operation::{Operation, OperationError};
pub use session::Session;
