//! Operation names of the flat call surface, and the JS client that binds them.

pub const LOG: &str = "log";
pub const SLEEP: &str = "sleep";
pub const SERVICE_REGISTER: &str = "astral_service_register";
pub const SERVICE_CLOSE: &str = "astral_service_close";
pub const CONN_ACCEPT: &str = "astral_conn_accept";
pub const CONN_CLOSE: &str = "astral_conn_close";
pub const CONN_WRITE: &str = "astral_conn_write";
pub const CONN_READ: &str = "astral_conn_read";
pub const QUERY: &str = "astral_query";
pub const QUERY_NAME: &str = "astral_query_name";
pub const GET_NODE_INFO: &str = "astral_node_info";
pub const RESOLVE: &str = "astral_resolve";

/// Every operation the dispatcher understands.
pub const OPERATIONS: &[&str] = &[
    LOG,
    SLEEP,
    SERVICE_REGISTER,
    SERVICE_CLOSE,
    CONN_ACCEPT,
    CONN_CLOSE,
    CONN_WRITE,
    CONN_READ,
    QUERY,
    QUERY_NAME,
    GET_NODE_INFO,
    RESOLVE,
];

const CLIENT_JS: &str = include_str!("apphost.js");

/// Client-side glue for JS hosts. Expects the host to expose `__apphost_call(op, args)`.
pub fn client_js() -> &'static str {
    CLIENT_JS
}
