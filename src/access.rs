//! Edit access for mutating routes.
//!
//! The decision looks only at the `Host` header the client sent, which any client can set.
//! It keeps casual visitors on a shared deployment from editing, and that is all it does.

/// True when the declared host names the local machine.
pub fn is_localhost(host: Option<&str>) -> bool {
    host.is_some_and(|host| host.contains("localhost") || host.contains("127.0.0.1"))
}

pub fn can_edit(host: Option<&str>, allow_external_edit: bool) -> bool {
    is_localhost(host) || allow_external_edit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_can_always_edit() {
        for host in ["localhost", "localhost:3000", "127.0.0.1:8080"] {
            assert!(can_edit(Some(host), false), "{host}");
            assert!(can_edit(Some(host), true), "{host}");
        }
    }

    #[test]
    fn other_hosts_follow_the_flag() {
        for host in [Some("docs.example.com"), Some("10.0.0.5:3000"), None] {
            assert!(!can_edit(host, false));
            assert!(can_edit(host, true));
        }
    }
}
