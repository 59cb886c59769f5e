//! Request line/header/body parsing (§4.2) and response framing (§4.6).

pub mod headers;
pub mod method;
pub mod parser;
pub mod request;
pub mod response;

pub use headers::HeaderMap;
pub use method::{Method, Version};
pub use parser::{ParseError, Parser, Step};
pub use request::Request;
pub use response::{ResponseBuffer, ResponseMeta, SEND_BUFF_SIZE};
