//! Guided invoice-draft conversation flow.
//!
//! One conversation per merchant phone number, persisted between
//! messages. Each inbound message either advances the flow one step,
//! undoes exactly one step, or cancels the draft.

pub mod draft;
pub mod error;
pub mod machine;
pub mod step;
pub mod transport;

pub use draft::{CompletedDraft, ConversationState, InvoiceDraft};
pub use error::ConversationError;
pub use machine::{ConversationMachine, Outcome, Reply};
pub use step::{PredecessorError, Step, predecessor_of};
pub use transport::{InMemoryTransport, MessagingTransport, SentMessage, TransportError};
