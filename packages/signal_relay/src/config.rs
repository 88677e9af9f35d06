use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [signaling]
//                    default_room = "lobby"
//
//   env var:         SIGNAL_SIGNALING__DEFAULT_ROOM=lobby   (double underscore = nesting)
//
//   CLI:             --host / --port override whatever the layers produced

/// Named configuration presets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// host=127.0.0.1
    Local,
    /// host=0.0.0.0
    Server,
}

/// What to do when a caller registers a `peerId` another open connection holds.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePeerIdPolicy {
    /// Accept it; lookups by id resolve to the earliest registration.
    #[default]
    Allow,
    /// Refuse the registration with `register-rejected`.
    Reject,
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub signaling: SignalingFileConfig,
}

/// Server tuning knobs (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            send_queue_capacity: default_send_queue_capacity(),
        }
    }
}

/// Signaling behavior (lives under `[signaling]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignalingFileConfig {
    #[serde(default = "default_room")]
    pub default_room: String,
    #[serde(default)]
    pub duplicate_peer_ids: DuplicatePeerIdPolicy,
}

impl Default for SignalingFileConfig {
    fn default() -> Self {
        Self {
            default_room: default_room(),
            duplicate_peer_ids: DuplicatePeerIdPolicy::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3002
}
fn default_send_queue_capacity() -> usize {
    256
}
fn default_room() -> String {
    "default".to_string()
}

/// Build a figment that layers: defaults → profile defaults → config file → SIGNAL_* env vars.
///
/// The CLI profile takes priority over a profile named in the file or env.
///
/// Env vars use double-underscore for nesting into sections:
///   `SIGNAL_SERVER__PORT=4000`  →  `server.port = 4000`
pub fn load_config(config_path: Option<&Path>, cli_profile: Option<&Profile>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let with_file = |base: Figment| match config_path {
        Some(path) => base.merge(Toml::file(path)),
        None => base,
    };

    // Pass 1: peek at profile from the file/env (CLI overrides both)
    let base = with_file(Figment::from(Serialized::defaults(FileConfig::default())))
        .merge(Env::prefixed("SIGNAL_").split("__"));

    let profile: Option<Profile> = cli_profile
        .cloned()
        .or_else(|| base.extract_inner("profile").ok());

    // Pass 2: rebuild with profile defaults between struct defaults and the file
    let profile_layer = profile_to_file_config(profile.as_ref());

    with_file(
        Figment::from(Serialized::defaults(FileConfig::default()))
            .merge(Serialized::defaults(profile_layer)),
    )
    .merge(Env::prefixed("SIGNAL_").split("__"))
}

/// Convert a profile into a `FileConfig` with the profile's values filled in.
fn profile_to_file_config(profile: Option<&Profile>) -> FileConfig {
    match profile {
        Some(Profile::Local) => FileConfig {
            profile: Some(Profile::Local),
            server: ServerFileConfig {
                host: "127.0.0.1".to_string(),
                ..Default::default()
            },
            signaling: Default::default(),
        },
        Some(Profile::Server) => FileConfig {
            profile: Some(Profile::Server),
            server: ServerFileConfig {
                host: "0.0.0.0".to_string(),
                ..Default::default()
            },
            signaling: Default::default(),
        },
        None => FileConfig::default(),
    }
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

/// Listener and transport settings (runtime view).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Outbound frames buffered per connection before new ones are dropped
    pub send_queue_capacity: usize,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Self {
        Self {
            host: fc.host.clone(),
            port: fc.port,
            send_queue_capacity: fc.send_queue_capacity.max(1),
        }
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        use anyhow::Context;
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

/// Signaling behavior (runtime view).
#[derive(Clone, Debug)]
pub struct SignalingConfig {
    /// Room used when a peer registers without a `roomId`
    pub default_room: String,
    pub duplicate_peer_ids: DuplicatePeerIdPolicy,
}

impl SignalingConfig {
    pub fn from_file(fc: &SignalingFileConfig) -> Self {
        let default_room = if fc.default_room.is_empty() {
            default_room()
        } else {
            fc.default_room.clone()
        };
        Self {
            default_room,
            duplicate_peer_ids: fc.duplicate_peer_ids,
        }
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self::from_file(&SignalingFileConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── profile_to_file_config ──────────────────────────────────────────

    #[test]
    fn test_local_profile() {
        let fc = profile_to_file_config(Some(&Profile::Local));
        assert_eq!(fc.profile, Some(Profile::Local));
        assert_eq!(fc.server.host, "127.0.0.1");
    }

    #[test]
    fn test_server_profile() {
        let fc = profile_to_file_config(Some(&Profile::Server));
        assert_eq!(fc.profile, Some(Profile::Server));
        assert_eq!(fc.server.host, "0.0.0.0");
        assert_eq!(fc.server.port, 3002);
    }

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert!(fc.profile.is_none());
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.port, 3002);
        assert_eq!(fc.server.send_queue_capacity, 256);
        assert_eq!(fc.signaling.default_room, "default");
        assert_eq!(fc.signaling.duplicate_peer_ids, DuplicatePeerIdPolicy::Allow);
    }

    // ── runtime views ───────────────────────────────────────────────────

    #[test]
    fn test_signaling_config_empty_room_falls_back() {
        let sc = SignalingConfig::from_file(&SignalingFileConfig {
            default_room: String::new(),
            duplicate_peer_ids: DuplicatePeerIdPolicy::Reject,
        });
        assert_eq!(sc.default_room, "default");
        assert_eq!(sc.duplicate_peer_ids, DuplicatePeerIdPolicy::Reject);
    }

    #[test]
    fn test_server_config_bind_addr() {
        let sc = ServerConfig::from_file(&ServerFileConfig {
            host: "0.0.0.0".into(),
            port: 4000,
            send_queue_capacity: 0,
        });
        assert_eq!(sc.bind_addr().unwrap().to_string(), "0.0.0.0:4000");
        assert_eq!(sc.send_queue_capacity, 1);

        let bad = ServerConfig {
            host: "not a host".into(),
            port: 1,
            send_queue_capacity: 1,
        };
        assert!(bad.bind_addr().is_err());
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        let fc: FileConfig = load_config(None, None).extract().unwrap();
        assert!(fc.profile.is_none());
        assert_eq!(fc.server.port, 3002);
        assert_eq!(fc.signaling.default_room, "default");
    }

    #[test]
    fn test_load_config_with_profile() {
        let fc: FileConfig = load_config(None, Some(&Profile::Server)).extract().unwrap();
        assert_eq!(fc.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_config_toml_overrides_profile() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[server]\nhost = \"10.0.0.5\"\n").unwrap();
        let fc: FileConfig = load_config(Some(&path), Some(&Profile::Server))
            .extract()
            .unwrap();
        assert_eq!(fc.server.host, "10.0.0.5");
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nport = 8080\n\n[signaling]\ndefault_room = \"lobby\"\nduplicate_peer_ids = \"reject\"\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(Some(&path), None).extract().unwrap();
        assert_eq!(fc.server.port, 8080);
        assert_eq!(fc.signaling.default_room, "lobby");
        assert_eq!(fc.signaling.duplicate_peer_ids, DuplicatePeerIdPolicy::Reject);
    }

    #[test]
    fn test_load_config_profile_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "profile = \"server\"\n").unwrap();
        let fc: FileConfig = load_config(Some(&path), None).extract().unwrap();
        assert_eq!(fc.profile, Some(Profile::Server));
        assert_eq!(fc.server.host, "0.0.0.0");
    }
}
