pub mod encoding;
pub mod http;
pub mod logging;
pub mod timing;
pub mod upload;
