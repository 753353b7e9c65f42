pub mod store;
pub mod types;

pub use store::{load_fields, SchemaStore};
pub use types::{FieldDescriptor, FieldMode, FieldType};
