//! Drive service: uploads, downloads and deletes that span the blob
//! transport and the metadata catalog.

mod service;

pub use service::Drive;
