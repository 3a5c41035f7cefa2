pub mod postgrest;

pub use postgrest::ClinicStoreClient;
