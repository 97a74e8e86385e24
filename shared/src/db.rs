//! Database connection string helpers.

use url::{Host, Url};

fn is_loopback(host: Host<&str>) -> bool {
    match host {
        Host::Domain(name) => {
            name.eq_ignore_ascii_case("localhost") || name.parse::<std::net::IpAddr>().is_ok_and(|ip| ip.is_loopback())
        }
        Host::Ipv4(ip) => ip.is_loopback(),
        Host::Ipv6(ip) => ip.is_loopback(),
    }
}

/// Appends `sslmode=disable` to loopback connection strings that do not set
/// an sslmode. Anything unparseable or remote is returned unchanged.
pub fn ensure_sslmode_disable(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let has_sslmode = url.query_pairs().any(|(key, _)| key.eq_ignore_ascii_case("sslmode"));
    if has_sslmode || !url.host().is_some_and(is_loopback) {
        return raw.to_string();
    }
    url.query_pairs_mut().append_pair("sslmode", "disable");
    url.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_urls_get_sslmode_disable() {
        assert_eq!(
            ensure_sslmode_disable("postgres://u:p@localhost:5432/db"),
            "postgres://u:p@localhost:5432/db?sslmode=disable"
        );
        assert_eq!(
            ensure_sslmode_disable("postgres://u:p@127.0.0.1/db?application_name=x"),
            "postgres://u:p@127.0.0.1/db?application_name=x&sslmode=disable"
        );
    }

    #[test]
    fn remote_and_explicit_urls_are_untouched() {
        let remote = "postgres://u:p@db.internal:5432/db";
        assert_eq!(ensure_sslmode_disable(remote), remote);
        let explicit = "postgres://u:p@localhost/db?SSLMODE=require";
        assert_eq!(ensure_sslmode_disable(explicit), explicit);
        assert_eq!(ensure_sslmode_disable("not a url"), "not a url");
    }

    #[test]
    fn ipv6_loopback_is_local() {
        assert_eq!(
            ensure_sslmode_disable("postgres://u:p@[::1]:5432/db"),
            "postgres://u:p@[::1]:5432/db?sslmode=disable"
        );
    }
}
