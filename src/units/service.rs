//! Typed unit definitions matching the `[Unit]`/`[Service]` subset we honor

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::parser::{last_value, ParsedFile};

/// Service type determines startup notification
///
/// Recorded for callers; every type is launched the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceType {
    #[default]
    Simple,   // Ready immediately after exec
    Forking,  // Ready when main process exits
    Oneshot,  // Run once, no main process
    Notify,   // Ready on sd_notify READY=1
    Dbus,     // Ready when D-Bus name acquired
}

/// Restart policy (recorded, enforcement belongs to the caller)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    #[default]
    No,
    OnFailure,
    Always,
}

/// Default delay recorded for `RestartSec=` when none is given
pub const DEFAULT_RESTART_SEC: u64 = 5;

/// A unit definition as stored in the units directory
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDefinition {
    pub name: String,
    pub description: Option<String>,
    pub exec_start: Option<String>,
    pub working_directory: Option<PathBuf>,
    pub restart: RestartPolicy,
    /// Seconds
    pub restart_sec: u64,
    pub service_type: ServiceType,
    /// Everything that was parsed, including sections and keys we ignore
    pub raw: ParsedFile,
}

impl UnitDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            exec_start: None,
            working_directory: None,
            restart: RestartPolicy::default(),
            restart_sec: DEFAULT_RESTART_SEC,
            service_type: ServiceType::default(),
            raw: ParsedFile::new(),
        }
    }

    /// Build a typed definition from parsed INI data
    pub fn from_parsed(name: &str, parsed: ParsedFile) -> Self {
        let mut def = Self::new(name);

        // [Unit] section
        def.description = last_value(&parsed, "[Unit]", "Description").map(str::to_string);

        // [Service] section
        def.exec_start = last_value(&parsed, "[Service]", "ExecStart").map(str::to_string);
        def.working_directory =
            last_value(&parsed, "[Service]", "WorkingDirectory").map(PathBuf::from);
        if let Some(t) = last_value(&parsed, "[Service]", "Type") {
            def.service_type = ServiceType::parse(t).unwrap_or_default();
        }
        if let Some(r) = last_value(&parsed, "[Service]", "Restart") {
            def.restart = RestartPolicy::parse(r).unwrap_or_default();
        }
        if let Some(s) = last_value(&parsed, "[Service]", "RestartSec") {
            def.restart_sec = parse_duration(s)
                .map(|d| d.as_secs())
                .unwrap_or(DEFAULT_RESTART_SEC);
        }

        def.raw = parsed;
        def
    }

    /// Whether the definition names something to run
    pub fn has_exec_start(&self) -> bool {
        self.exec_start.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// Render through the fixed unit template used by `create`
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("[Unit]\n");
        out.push_str(&format!(
            "Description={}\n",
            self.description.as_deref().unwrap_or_default()
        ));
        out.push_str("\n[Service]\n");
        out.push_str(&format!("Type={}\n", self.service_type));
        out.push_str(&format!(
            "ExecStart={}\n",
            self.exec_start.as_deref().unwrap_or_default()
        ));
        if let Some(wd) = &self.working_directory {
            out.push_str(&format!("WorkingDirectory={}\n", wd.display()));
        }
        out.push_str(&format!("Restart={}\n", self.restart));
        out.push_str(&format!("RestartSec={}\n", self.restart_sec));
        out
    }
}

// Parsing helpers

impl ServiceType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "forking" => Some(Self::Forking),
            "oneshot" => Some(Self::Oneshot),
            "notify" => Some(Self::Notify),
            "dbus" => Some(Self::Dbus),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Forking => "forking",
            Self::Oneshot => "oneshot",
            Self::Notify => "notify",
            Self::Dbus => "dbus",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RestartPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "no" => Some(Self::No),
            "on-failure" => Some(Self::OnFailure),
            "always" => Some(Self::Always),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::OnFailure => "on-failure",
            Self::Always => "always",
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse duration from systemd format (e.g., "5s", "100ms", "1min")
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Some(n) = s.strip_suffix("ms") {
        n.trim().parse().ok().map(Duration::from_millis)
    } else if let Some(n) = s.strip_suffix("min") {
        n.trim().parse::<u64>().ok().and_then(|m| m.checked_mul(60)).map(Duration::from_secs)
    } else if let Some(n) = s.strip_suffix('s') {
        n.trim().parse().ok().map(Duration::from_secs)
    } else if let Some(n) = s.strip_suffix('h') {
        n.trim().parse::<u64>().ok().and_then(|h| h.checked_mul(3600)).map(Duration::from_secs)
    } else {
        // Bare number = seconds
        s.parse().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::parse_file;

    #[test]
    fn test_service_type_parse() {
        assert_eq!(ServiceType::parse("simple"), Some(ServiceType::Simple));
        assert_eq!(ServiceType::parse("SIMPLE"), Some(ServiceType::Simple));
        assert_eq!(ServiceType::parse("forking"), Some(ServiceType::Forking));
        assert_eq!(ServiceType::parse("oneshot"), Some(ServiceType::Oneshot));
        assert_eq!(ServiceType::parse("invalid"), None);
        assert_eq!(ServiceType::parse(""), None);
    }

    #[test]
    fn test_restart_policy_parse() {
        assert_eq!(RestartPolicy::parse("no"), Some(RestartPolicy::No));
        assert_eq!(RestartPolicy::parse("ON-FAILURE"), Some(RestartPolicy::OnFailure));
        assert_eq!(RestartPolicy::parse("always"), Some(RestartPolicy::Always));
        assert_eq!(RestartPolicy::parse("sometimes"), None);
        assert_eq!(RestartPolicy::default(), RestartPolicy::No);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("100ms"), Some(Duration::from_millis(100)));
        assert_eq!(parse_duration("2min"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("  5s  "), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("-1"), None);
        assert_eq!(parse_duration("5x"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert_eq!(parse_duration("999999999999999999min"), None);
        assert_eq!(parse_duration("18446744073709551615h"), None);
        assert_eq!(parse_duration("99999999999999999999s"), None);

        let parsed = parse_file("[Service]\nExecStart=/bin/true\nRestartSec=999999999999999999min\n");
        let def = UnitDefinition::from_parsed("big.service", parsed);
        assert_eq!(def.restart_sec, DEFAULT_RESTART_SEC);
    }

    #[test]
    fn test_from_parsed_fields() {
        let parsed = parse_file(
            r#"
[Unit]
Description=Web application

[Service]
Type=oneshot
ExecStart=/usr/bin/webapp --port 8080
WorkingDirectory=/srv/webapp
Restart=always
RestartSec=7
"#,
        );
        let def = UnitDefinition::from_parsed("webapp.service", parsed);
        assert_eq!(def.name, "webapp.service");
        assert_eq!(def.description.as_deref(), Some("Web application"));
        assert_eq!(def.exec_start.as_deref(), Some("/usr/bin/webapp --port 8080"));
        assert_eq!(def.working_directory, Some(PathBuf::from("/srv/webapp")));
        assert_eq!(def.service_type, ServiceType::Oneshot);
        assert_eq!(def.restart, RestartPolicy::Always);
        assert_eq!(def.restart_sec, 7);
        assert!(def.has_exec_start());
    }

    #[test]
    fn test_from_parsed_defaults() {
        let def = UnitDefinition::from_parsed("bare.service", parse_file("[Unit]\n"));
        assert_eq!(def.service_type, ServiceType::Simple);
        assert_eq!(def.restart, RestartPolicy::No);
        assert_eq!(def.restart_sec, DEFAULT_RESTART_SEC);
        assert!(!def.has_exec_start());
    }

    #[test]
    fn test_invalid_restart_sec_falls_back() {
        let parsed = parse_file("[Service]\nRestartSec=soon\n");
        let def = UnitDefinition::from_parsed("x.service", parsed);
        assert_eq!(def.restart_sec, DEFAULT_RESTART_SEC);
    }

    #[test]
    fn test_render_parses_back() {
        let mut def = UnitDefinition::new("api.service");
        def.description = Some("API".into());
        def.exec_start = Some("/usr/bin/api serve".into());
        def.working_directory = Some(PathBuf::from("/srv/api"));
        def.restart = RestartPolicy::OnFailure;
        def.restart_sec = 3;

        let text = def.render();
        assert!(text.starts_with("[Unit]\nDescription=API\n"));

        let back = UnitDefinition::from_parsed("api.service", parse_file(&text));
        assert_eq!(back.exec_start, def.exec_start);
        assert_eq!(back.working_directory, def.working_directory);
        assert_eq!(back.restart, RestartPolicy::OnFailure);
        assert_eq!(back.restart_sec, 3);
        assert_eq!(back.service_type, ServiceType::Simple);
    }
}
