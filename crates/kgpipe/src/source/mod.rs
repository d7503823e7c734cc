pub mod batches;
pub mod fetch;
pub mod inspect;
pub mod json_schema;

pub use batches::{for_each_item_batch, read_sample_items, Record};
pub use inspect::{collection_names, count_collection_items, read_metadata_value};
pub use json_schema::infer_json_schema;
