use crate::config::{IceServerConfig, IceServerKind};
use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Prefixes the url with `stun:`/`turn:` when the configured entry omits it.
pub fn add_ice_url_scheme(config: &IceServerConfig) -> String {
    if config.url.starts_with("turn:") || config.url.starts_with("stun:") {
        config.url.clone()
    } else {
        let scheme = match config.kind {
            IceServerKind::Turn => "turn:",
            IceServerKind::Stun => "stun:",
        };
        format!("{}{}", scheme, config.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_added_only_when_missing() {
        let mut server = IceServerConfig {
            url: "turn.example.org:3478".into(),
            kind: IceServerKind::Turn,
            username: Some("u".into()),
            credential: Some("p".into()),
        };
        assert_eq!(add_ice_url_scheme(&server), "turn:turn.example.org:3478");

        server.url = "stun:stun.example.org".into();
        assert_eq!(add_ice_url_scheme(&server), "stun:stun.example.org");
    }

    #[test]
    fn random_ids_are_hex() {
        let id = random_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
