//! Transport adapters behind the channel strategies.
//!
//! Both seams are traits so tests and embedders can swap the network out.

pub mod http;
pub mod socket;

use chatlink_core::TransportError;
use url::Url;

pub use http::{HttpReply, HttpTransport, ReqwestTransport};
pub use socket::{
    OutgoingFrame, SocketConnector, SocketEvent, SocketEventSink, SocketHandler,
    TungsteniteConnector,
};

/// Parse `raw` and require one of `schemes`.
pub(crate) fn parse_endpoint(raw: &str, schemes: &[&str]) -> Result<Url, TransportError> {
    let url = Url::parse(raw).map_err(|err| TransportError::Setup(format!("{raw}: {err}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(TransportError::Setup(format!(
            "{raw}: unsupported scheme '{}', expected one of {}",
            url.scheme(),
            schemes.join(", ")
        )));
    }
    Ok(url)
}

pub(crate) const HTTP_SCHEMES: &[&str] = &["http", "https"];
pub(crate) const WS_SCHEMES: &[&str] = &["ws", "wss"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_scheme() {
        let url = parse_endpoint("https://chat.example.org/poll", HTTP_SCHEMES)
            .expect("https endpoint should parse");
        assert_eq!(url.host_str(), Some("chat.example.org"));
    }

    #[test]
    fn rejects_wrong_scheme_as_setup_error() {
        let err = parse_endpoint("https://chat.example.org/ws", WS_SCHEMES)
            .expect_err("https is not a socket scheme");
        assert!(matches!(err, TransportError::Setup(_)));
    }

    #[test]
    fn rejects_unparseable_url() {
        let err = parse_endpoint("not a url", HTTP_SCHEMES).expect_err("garbage must fail");
        assert!(matches!(err, TransportError::Setup(_)));
    }
}
