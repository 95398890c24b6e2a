//! HTTP wire handling: method classification, request parsing, response
//! serialization, multipart bodies and media type detection.

pub mod method;
pub mod mime;
pub mod multipart;
pub mod request;
pub mod response;

pub use method::Method;
pub use multipart::{Multipart, MultipartPart};
pub use request::{Headers, Request};
pub use response::Response;
