pub(crate) mod bundle;
mod encounter;
pub(crate) mod mapper;
mod observation;
mod patient;
