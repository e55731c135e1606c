pub mod api_docs;
pub mod patch;

pub use api_docs::LocatedEndpoint;
