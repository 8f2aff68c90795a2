//! End-to-end tests through the service facade.

pub(crate) mod store;
mod tenancy;
