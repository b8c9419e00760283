//! HTTP gateway over the reconciliation engine: read-only participant and
//! match views, plus bearer-protected profile writes for the local participant.

mod error;
mod guard;
mod handlers;
mod router;
mod server;

pub use error::GatewayError;
pub use server::GatewayServer;
