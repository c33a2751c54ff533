//! Config defaults: fills in whatever the config file leaves out.

use deskforge_core::ReservedAction;

use crate::schema::{ClockConfig, HostConfig, LoggingConfig, ServerConfig};

pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

pub const DEFAULT_PORT: u16 = 7878;

/// Clock plugin tick.
pub const DEFAULT_CLOCK_INTERVAL_MS: u64 = 1000;

/// Reserved actions installed when the config names none.
pub const DEFAULT_RESERVED_ACTIONS: &[(&str, ReservedAction)] = &[
    ("screenshot.builtin", ReservedAction::StartCapture),
    ("sticky-notes.builtin", ReservedAction::ToggleUtilityWindow),
];

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: HostConfig) -> HostConfig {
    let config = apply_logging_defaults(config);
    let config = apply_server_defaults(config);
    let config = apply_clock_defaults(config);
    apply_reserved_action_defaults(config)
}

fn apply_logging_defaults(mut config: HostConfig) -> HostConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    if logging.level.is_none() {
        logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    config
}

fn apply_server_defaults(mut config: HostConfig) -> HostConfig {
    let server = config.server.get_or_insert_with(ServerConfig::default);
    if server.bind_address.is_none() {
        server.bind_address = Some(DEFAULT_BIND_ADDRESS.to_string());
    }
    if server.port.is_none() {
        server.port = Some(DEFAULT_PORT);
    }
    config
}

fn apply_clock_defaults(mut config: HostConfig) -> HostConfig {
    let clock = config.clock.get_or_insert_with(ClockConfig::default);
    if clock.interval_ms.is_none() {
        clock.interval_ms = Some(DEFAULT_CLOCK_INTERVAL_MS);
    }
    config
}

fn apply_reserved_action_defaults(mut config: HostConfig) -> HostConfig {
    if config.reserved_actions.is_empty() {
        config.reserved_actions = DEFAULT_RESERVED_ACTIONS
            .iter()
            .map(|(id, action)| (id.to_string(), *action))
            .collect();
    }
    config
}
