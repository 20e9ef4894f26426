//! Internal HTTP requests from one agent to another.
//!
//! Agents talk to each other (most importantly to the watchdog) with simple
//! HTTP/1.1 requests over their API sockets. A request runs on its own
//! worker thread and reports back through the event loop:
//!
//! ```rust,ignore
//! let request = InternalRequest::new("unix:/run/warden/agents.s/watchdog_api", "/ping.json", |response| {
//!     // runs on the event loop
//! });
//! submit_internal_request(server.event_loop(), &client_request, request);
//! ```

mod address;
mod deadline;
mod error;
mod executor;
pub mod fd_passing;
mod parse;
mod request;
mod stream;

pub use address::{AgentAddress, AgentStream};
pub use deadline::{Deadline, DeadlineExceeded};
pub use error::InternalRequestError;
pub use executor::submit_internal_request;
pub use fd_passing::{
    read_file_descriptor_with_negotiation, write_file_descriptor_with_negotiation, FdPassingError,
};
pub use request::{
    BodyProcessor, CompletionCallback, InternalRequest, InternalResponse, ResponseStatus,
    DEFAULT_TIMEOUT,
};
pub use stream::ResponseStream;
