//! systemd service lookup
//!
//! Maps a unit name to its main PID via `systemctl show`.

use crate::command::run_bounded;
use crate::ProbeConfig;
use witr_core::{ProbeError, ProbeResult};

/// Main PID of a running unit
///
/// Accepts `nginx` or `nginx.service`. A unit that is stopped, unknown, or a
/// host without systemd all come back as [`ProbeError::NotRunning`].
pub fn service_main_pid(unit: &str, config: &ProbeConfig) -> ProbeResult<u32> {
    let unit = unit_name(unit).ok_or_else(|| ProbeError::NotRunning {
        unit: unit.to_string(),
    })?;
    let output = match run_bounded(
        "systemctl",
        &["show", "-p", "MainPID", "--value", "--", &unit],
        config,
    ) {
        Ok(output) => output,
        Err(ProbeError::CommandFailed { .. }) => return Err(ProbeError::NotRunning { unit }),
        Err(e) => return Err(e),
    };
    parse_main_pid(&output).ok_or(ProbeError::NotRunning { unit })
}

/// `name` as a full unit name, or None when it cannot be one
fn unit_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty()
        || name.starts_with('-')
        || name.contains('/')
        || name.chars().any(char::is_whitespace)
    {
        return None;
    }
    if name.ends_with(".service") {
        Some(name.to_string())
    } else {
        Some(format!("{name}.service"))
    }
}

/// `MainPID` value; 0 means the unit has no running main process
fn parse_main_pid(output: &str) -> Option<u32> {
    match output.trim().parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(pid) => Some(pid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("nginx", Some("nginx.service"))]
    #[case("nginx.service", Some("nginx.service"))]
    #[case(" sshd ", Some("sshd.service"))]
    #[case("node.js", Some("node.js.service"))]
    #[case("--help", None)]
    #[case("../etc", None)]
    #[case("two words", None)]
    #[case("", None)]
    fn test_unit_name(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(unit_name(input).as_deref(), expected);
    }

    #[rstest]
    #[case("812\n", Some(812))]
    #[case("0\n", None)]
    #[case("", None)]
    fn test_parse_main_pid(#[case] output: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_main_pid(output), expected);
    }

    #[test]
    #[ignore] // needs a systemd host
    fn test_unknown_unit_is_not_running() {
        let err = service_main_pid("witr-no-such-unit", &ProbeConfig::default()).unwrap_err();
        assert!(matches!(err, ProbeError::NotRunning { .. }));
    }
}
