//! Config validation with field paths and user-friendly messages.

use std::collections::HashMap;

use thiserror::Error;

use crate::schema::HostConfig;

/// A config validation finding with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// Everything found in one validation pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &HostConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_server(config, &mut report);
    validate_shortcuts(config, &mut report);
    validate_reserved_actions(config, &mut report);
    validate_autostart(config, &mut report);
    validate_clock(config, &mut report);
    report
}

fn validate_server(config: &HostConfig, report: &mut ValidationReport) {
    let Some(server) = &config.server else { return };
    if let Some(port) = server.port {
        if port == 0 {
            report.error("server.port", "port must be > 0");
        } else if port < 1024 {
            report.warn(
                "server.port",
                format!("Port {port} requires elevated privileges; consider using a port >= 1024"),
            );
        }
    }
    if let Some(bind) = &server.bind_address {
        if bind.trim().is_empty() {
            report.error("server.bindAddress", "bindAddress cannot be empty");
        }
    }
}

fn validate_shortcuts(config: &HostConfig, report: &mut ValidationReport) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for (i, binding) in config.shortcuts.iter().enumerate() {
        let path = format!("shortcuts[{i}]");
        let combo = normalize_combo(&binding.combo);
        if combo.is_empty() {
            report.error(format!("{path}.combo"), "combo must name at least one key");
        } else if let Some(first) = seen.insert(combo, i) {
            report.warn(
                format!("{path}.combo"),
                format!("combo '{}' is already bound by shortcuts[{first}]; the later binding wins", binding.combo),
            );
        }
        if binding.plugin_id.trim().is_empty() {
            report.error(format!("{path}.pluginId"), "pluginId cannot be empty");
        }
    }
}

/// Same key form the shortcut dispatcher looks bindings up by.
fn normalize_combo(combo: &str) -> String {
    combo
        .split('+')
        .map(|key| key.trim().to_lowercase())
        .filter(|key| !key.is_empty())
        .collect::<Vec<_>>()
        .join("+")
}

fn validate_reserved_actions(config: &HostConfig, report: &mut ValidationReport) {
    for id in config.reserved_actions.keys() {
        if id.trim().is_empty() {
            report.error("reservedActions", "plugin id cannot be empty");
        }
    }
}

fn validate_autostart(config: &HostConfig, report: &mut ValidationReport) {
    let mut seen = std::collections::HashSet::new();
    for (i, id) in config.autostart.iter().enumerate() {
        if id.trim().is_empty() {
            report.error(format!("autostart[{i}]"), "plugin id cannot be empty");
        } else if !seen.insert(id.as_str()) {
            report.warn(format!("autostart[{i}]"), format!("'{id}' is listed more than once"));
        }
    }
}

fn validate_clock(config: &HostConfig, report: &mut ValidationReport) {
    let Some(clock) = &config.clock else { return };
    if clock.interval_ms == Some(0) {
        report.error("clock.intervalMs", "intervalMs must be >= 1");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::apply_all_defaults;
    use crate::schema::ClockConfig;
    use deskforge_core::ShortcutBinding;

    fn binding(combo: &str, plugin_id: &str) -> ShortcutBinding {
        ShortcutBinding {
            combo: combo.to_string(),
            plugin_id: plugin_id.to_string(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        let report = validate(&apply_all_defaults(HostConfig::default()));
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn empty_combo_and_plugin_are_errors() {
        let mut cfg = HostConfig::default();
        cfg.shortcuts = vec![binding(" ", "calculator.builtin"), binding("Ctrl+K", "")];
        let report = validate(&cfg);
        let paths: Vec<_> = report.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["shortcuts[0].combo", "shortcuts[1].pluginId"]);
    }

    #[test]
    fn duplicate_combo_is_warning() {
        let mut cfg = HostConfig::default();
        cfg.shortcuts = vec![binding("Ctrl+K", "a"), binding("ctrl + k", "b")];
        let report = validate(&cfg);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].path, "shortcuts[1].combo");
    }

    #[test]
    fn combo_without_keys_is_error() {
        let mut cfg = HostConfig::default();
        cfg.shortcuts = vec![binding("+", "a"), binding(" + + ", "b")];
        let report = validate(&cfg);
        let paths: Vec<_> = report.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["shortcuts[0].combo", "shortcuts[1].combo"]);
    }

    #[test]
    fn empty_key_segments_do_not_hide_duplicates() {
        let mut cfg = HostConfig::default();
        cfg.shortcuts = vec![binding("Alt+Space", "a"), binding("Alt++Space", "b")];
        let report = validate(&cfg);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].path, "shortcuts[1].combo");
    }

    #[test]
    fn zero_clock_interval_is_error() {
        let mut cfg = HostConfig::default();
        cfg.clock = Some(ClockConfig {
            interval_ms: Some(0),
        });
        let report = validate(&cfg);
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].path, "clock.intervalMs");
    }

    #[test]
    fn duplicate_autostart_is_warning() {
        let mut cfg = HostConfig::default();
        cfg.autostart = vec!["clock.builtin".to_string(), "clock.builtin".to_string()];
        let report = validate(&cfg);
        assert!(report.is_valid());
        assert_eq!(report.warnings[0].path, "autostart[1]");
    }
}
