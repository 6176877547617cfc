//! Access to the host Grist document: the host API surface, the REST client
//! built on top of its access token, and the metadata types both return.

mod types;
mod host;
mod rest;

pub use types::{AccessLevel, AuthInfo, ColumnDescriptor, ColumnFields, ColumnsResponse, Row, TableData, REFERENCE_TYPE_PREFIX};
pub use host::{HostApi, GristHost, MemoryHost, get_auth_info, fetch_rows};
pub use rest::{GristRestClient, build_request_url, get_columns_for_table};
