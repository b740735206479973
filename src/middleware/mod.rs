pub mod request_id;

pub use request_id::{with_request_ids, UuidRequestIds, REQUEST_ID_HEADER};
