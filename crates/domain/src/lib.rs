//! Invoice and payment domain model.
//!
//! The invoice lifecycle, payment attempts, payout instruments and the
//! parsing of merchant-entered input all live here, together with the
//! services that persist them through the entity store.

pub mod error;
pub mod instrument;
pub mod invoice;
pub mod method;
pub mod parse;
pub mod payment;

pub use common::{InvoiceId, MethodId, Money, Msisdn, PaymentId};
pub use error::{DomainError, ParseError};
pub use instrument::{InstrumentKind, PayoutInstrument};
pub use invoice::{
    Invoice, InvoiceService, InvoiceStatus, InvoiceTotals, LineItem, MIN_INVOICE_TOTAL_CENTS,
};
pub use method::{PaymentMethod, PaymentMethodService};
pub use parse::{DueDate, parse_due_date, parse_line_items};
pub use payment::{Payment, PaymentChannel, PaymentStatus};
