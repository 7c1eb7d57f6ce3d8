//! Endpoint address formatting

/// Address to bind a listening socket on every interface
pub fn tcp_bind_address(port: u16) -> String {
    format!("tcp://*:{}", port)
}

/// Address used to reach a host's RPC port directly
pub fn tcp_call_address(host: &str, port: u16) -> String {
    format!("tcp://{}:{}", host, port)
}

/// Address of a host that already carries its port
pub fn tcp_direct_address(host: &str) -> String {
    format!("tcp://{}", host)
}

/// Bind address on every interface and a random port
pub fn tcp_random_address() -> String {
    "tcp://*".to_string()
}

/// Combine a host and port into `host:port`
pub fn combine_address(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}
