pub mod account_service;
pub mod anchor;
pub mod export;
pub mod media_store;
pub mod query;
pub mod record_form;
pub mod record_service;
pub mod species;
