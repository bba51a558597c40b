//! Invoice aggregate: line items, lifecycle state machine, service.

mod aggregate;
mod line_item;
mod service;
mod status;

pub use aggregate::Invoice;
pub use line_item::{InvoiceTotals, LineItem, MIN_INVOICE_TOTAL_CENTS};
pub use service::InvoiceService;
pub use status::InvoiceStatus;
