pub mod alert;
pub mod attribute;
pub mod document;
pub mod metering;

pub use alert::ConfidenceAlert;
pub use attribute::{AttributeConfig, AttributeKind};
pub use document::{sort_page_ids, Document, Page, Section};
pub use metering::Metering;
