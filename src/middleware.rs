// Request logging middleware and the pieces it is built from

mod body;
mod finish;
pub mod logging;
pub mod request_id;

pub use body::{decode_body, is_truthy};
pub use finish::FinishBody;
pub use logging::{
    request_logger, RequestContext, RequestLog, RequestLogOptions, RequestLogger, END_MESSAGE,
    START_MESSAGE,
};
pub use request_id::{resolve_request_id, IdGenerator, RequestId, DEFAULT_HEADER};
