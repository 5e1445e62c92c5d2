pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::InMemoryVoucherStore;
pub use record::VoucherRecord;
pub use traits::VoucherStore;
