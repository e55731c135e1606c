mod document_store;
pub mod fs;
mod ids;
mod index;
mod layout;
mod structure;

pub use document_store::EndpointStore;
pub use layout::DataLayout;
