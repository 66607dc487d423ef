pub mod pipethrough;
pub mod service_auth;
