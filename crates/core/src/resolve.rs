//! Target resolution
//!
//! Turns a [`Query`] into the ordered list of PIDs it refers to. Resolution
//! never picks between several matches; callers receive the full list.

use crate::config::AnalysisConfig;
use crate::error::{ProbeError, WitrError, WitrResult};
use crate::models::{Query, TargetKind};
use crate::probe::{port_strategies, PlatformProbe};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolves queries against a probe
pub struct Resolver<'a, P: PlatformProbe + ?Sized> {
    probe: &'a P,
    config: &'a AnalysisConfig,
}

impl<'a, P: PlatformProbe + ?Sized> Resolver<'a, P> {
    pub fn new(probe: &'a P, config: &'a AnalysisConfig) -> Self {
        Self { probe, config }
    }

    /// Candidate PIDs for `query`, never empty on success
    pub fn resolve(&self, query: &Query) -> WitrResult<Vec<u32>> {
        let pids = match query.kind {
            TargetKind::Pid => return parse_pid(&query.value).map(|pid| vec![pid]),
            TargetKind::Port => {
                let port = parse_port(&query.value)?;
                return self.resolve_port(port, query);
            }
            TargetKind::Name => self.resolve_name(&query.value, query.exact)?,
            TargetKind::File => self.resolve_file(&query.value)?,
        };

        if pids.is_empty() {
            return Err(WitrError::NotFound {
                query: query.clone(),
            });
        }
        Ok(pids)
    }

    /// Walk the strategy list until one attributes an owner
    fn resolve_port(&self, port: u16, query: &Query) -> WitrResult<Vec<u32>> {
        let mut saw_socket = false;

        for strategy in port_strategies(self.probe) {
            let sockets = match strategy.lookup(port) {
                Ok(sockets) => sockets,
                Err(e) => {
                    debug!(strategy = strategy.name(), error = %e, "port strategy failed");
                    continue;
                }
            };
            if sockets.is_empty() {
                debug!(strategy = strategy.name(), port, "no listener");
                continue;
            }
            saw_socket = true;

            if let Some(pid) = sockets.iter().filter_map(|s| s.pid).min() {
                debug!(strategy = strategy.name(), port, pid, "resolved port owner");
                return Ok(vec![pid]);
            }
            debug!(strategy = strategy.name(), port, "listener without visible owner");
        }

        if saw_socket {
            Err(WitrError::SocketFoundNoOwner { port })
        } else {
            Err(WitrError::NotFound {
                query: query.clone(),
            })
        }
    }

    fn resolve_name(&self, name: &str, exact: bool) -> WitrResult<Vec<u32>> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Err(WitrError::invalid(TargetKind::Name, name, "empty name"));
        }

        let mut result = Vec::new();
        let service_pid = self.service_pid(name.trim());
        if let Some(pid) = service_pid {
            result.push(pid);
        }

        let mut matches: Vec<u32> = Vec::new();
        for entry in self.probe.snapshot()? {
            if self.config.is_self(entry.pid)
                || Some(entry.pid) == service_pid
                || entry.pid.to_string() == needle
                || self.config.is_helper(&entry.command_name)
            {
                continue;
            }

            let comm = entry.command_name.to_lowercase();
            let comm_hit = if exact {
                comm == needle
            } else {
                comm.contains(&needle)
            };
            if comm_hit {
                matches.push(entry.pid);
                continue;
            }

            // Exited between snapshot and read: just not a match
            let cmdline = match self.probe.command_line(entry.pid) {
                Ok(c) => c.to_lowercase(),
                Err(_) => continue,
            };
            if cmdline_matches(&cmdline, &needle, exact) {
                matches.push(entry.pid);
            }
        }

        matches.sort_unstable();
        matches.dedup();
        result.extend(matches);
        Ok(result)
    }

    /// Main PID of `<name>` as a service unit, if one is running
    fn service_pid(&self, name: &str) -> Option<u32> {
        match self.probe.service_main_pid(name) {
            Ok(pid) if pid > 0 && !self.config.is_self(pid) => Some(pid),
            Ok(_) => None,
            Err(ProbeError::NotRunning { .. }) => None,
            Err(e) => {
                debug!(unit = name, error = %e, "service lookup failed");
                None
            }
        }
    }

    fn resolve_file(&self, value: &str) -> WitrResult<Vec<u32>> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(WitrError::invalid(TargetKind::File, value, "empty path"));
        }

        let absolute = absolutize(Path::new(trimmed))
            .map_err(|e| WitrError::invalid(TargetKind::File, value, e.to_string()))?;
        let canonical = std::fs::canonicalize(&absolute).unwrap_or_else(|_| absolute.clone());

        let mut pids = self.probe.open_file_holders(&canonical)?;
        if canonical != absolute {
            pids.extend(self.probe.open_file_holders(&absolute)?);
        }

        let mut seen = HashSet::new();
        pids.retain(|pid| seen.insert(*pid));
        Ok(pids)
    }
}

/// Parse a PID string; zero and non-numbers are rejected
pub fn parse_pid(value: &str) -> WitrResult<u32> {
    match value.trim().parse::<u32>() {
        Ok(0) => Err(WitrError::invalid(TargetKind::Pid, value, "PID must be positive")),
        Ok(pid) => Ok(pid),
        Err(_) => Err(WitrError::invalid(
            TargetKind::Pid,
            value,
            "not a positive integer",
        )),
    }
}

/// Parse a TCP port in 1..=65535
pub fn parse_port(value: &str) -> WitrResult<u16> {
    match value.trim().parse::<u32>() {
        Ok(port @ 1..=65535) => Ok(port as u16),
        Ok(_) => Err(WitrError::invalid(
            TargetKind::Port,
            value,
            "port must be between 1 and 65535",
        )),
        Err(_) => Err(WitrError::invalid(TargetKind::Port, value, "not a number")),
    }
}

/// Exact mode compares the first token (or its file name); fuzzy mode
/// looks for a substring anywhere
fn cmdline_matches(cmdline: &str, needle: &str, exact: bool) -> bool {
    if !exact {
        return cmdline.contains(needle);
    }
    let Some(first) = cmdline.split_whitespace().next() else {
        return false;
    };
    first == needle || first.rsplit('/').next() == Some(needle)
}

fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeProbe, FakeStrategy};
    use crate::models::ListeningSocket;
    use rstest::rstest;

    fn config() -> AnalysisConfig {
        AnalysisConfig::new(9000, 8999)
    }

    fn resolve(probe: &FakeProbe, query: Query) -> WitrResult<Vec<u32>> {
        let config = config();
        Resolver::new(probe, &config).resolve(&query)
    }

    #[rstest]
    #[case("42", 42)]
    #[case(" 7 ", 7)]
    #[case("4294967295", u32::MAX)]
    fn test_pid_resolves_without_lookup(#[case] value: &str, #[case] expected: u32) {
        // empty probe: no process exists, yet the PID is returned as-is
        let pids = resolve(&FakeProbe::new(), Query::pid(value)).unwrap();
        assert_eq!(pids, vec![expected]);
    }

    #[rstest]
    #[case("0")]
    #[case("-3")]
    #[case("abc")]
    #[case("")]
    fn test_invalid_pid(#[case] value: &str) {
        let err = resolve(&FakeProbe::new(), Query::pid(value)).unwrap_err();
        assert!(matches!(err, WitrError::InvalidInput { kind: TargetKind::Pid, .. }));
    }

    #[rstest]
    #[case("0")]
    #[case("65536")]
    #[case("http")]
    fn test_invalid_port(#[case] value: &str) {
        let err = resolve(&FakeProbe::new(), Query::port(value)).unwrap_err();
        assert!(matches!(err, WitrError::InvalidInput { kind: TargetKind::Port, .. }));
    }

    #[test]
    fn test_port_lowest_pid_wins() {
        let probe = FakeProbe::new()
            .with_listener(8080, "0.0.0.0", Some(150))
            .with_listener(8080, "::", Some(100))
            .with_listener(9090, "0.0.0.0", Some(50));
        assert_eq!(resolve(&probe, Query::port("8080")).unwrap(), vec![100]);
    }

    #[test]
    fn test_port_falls_back_to_next_strategy() {
        let probe = FakeProbe::new()
            .with_listener(5432, "127.0.0.1", None)
            .with_fallback(FakeStrategy {
                name: "broken",
                result: Err("not installed".to_string()),
            })
            .with_fallback(FakeStrategy {
                name: "ss",
                result: Ok(vec![ListeningSocket {
                    port: 5432,
                    address: "127.0.0.1".to_string(),
                    pid: Some(733),
                }]),
            });
        assert_eq!(resolve(&probe, Query::port("5432")).unwrap(), vec![733]);
    }

    #[test]
    fn test_port_without_owner_needs_privileges() {
        let probe = FakeProbe::new().with_listener(443, "0.0.0.0", None);
        let err = resolve(&probe, Query::port("443")).unwrap_err();
        assert!(matches!(err, WitrError::SocketFoundNoOwner { port: 443 }));
        assert!(err.needs_privileges());
    }

    #[test]
    fn test_port_nothing_listening() {
        let err = resolve(&FakeProbe::new(), Query::port("1234")).unwrap_err();
        assert!(matches!(err, WitrError::NotFound { .. }));
    }

    fn named() -> FakeProbe {
        FakeProbe::new()
            .with(1, 0, "systemd")
            .with(300, 1, "bash")
            .with(301, 1, "sh")
            .with_cmdline(302, 1, "python3", "/usr/bin/python3 /srv/app/server.py")
            .with_cmdline(303, 1, "node", "node /opt/sh-tools/index.js")
            .with(304, 300, "grep")
            .with(9000, 300, "witr")
            .with_cmdline(8999, 1, "zsh", "zsh")
    }

    #[test]
    fn test_exact_sh_never_matches_bash() {
        let pids = resolve(&named(), Query::name("sh").with_exact(true)).unwrap();
        assert_eq!(pids, vec![301]);
    }

    #[test]
    fn test_fuzzy_sh_matches_bash_and_cmdline() {
        let pids = resolve(&named(), Query::name("sh")).unwrap();
        assert_eq!(pids, vec![300, 301, 303]);
    }

    #[test]
    fn test_exact_matches_cmdline_basename() {
        let probe = FakeProbe::new().with_cmdline(55, 1, "python3.11", "/usr/bin/gunicorn -w 4");
        let pids = resolve(&probe, Query::name("gunicorn").with_exact(true)).unwrap();
        assert_eq!(pids, vec![55]);
    }

    #[test]
    fn test_name_is_case_insensitive() {
        let pids = resolve(&named(), Query::name("PYTHON3")).unwrap();
        assert_eq!(pids, vec![302]);
    }

    #[test]
    fn test_self_and_helpers_excluded() {
        assert!(matches!(
            resolve(&named(), Query::name("witr")),
            Err(WitrError::NotFound { .. })
        ));
        assert!(matches!(
            resolve(&named(), Query::name("zsh")),
            Err(WitrError::NotFound { .. })
        ));
        assert!(matches!(
            resolve(&named(), Query::name("grep").with_exact(true)),
            Err(WitrError::NotFound { .. })
        ));
    }

    #[test]
    fn test_pid_text_is_not_a_name_match() {
        let probe = FakeProbe::new()
            .with_cmdline(300, 1, "worker", "worker --id 300")
            .with_cmdline(301, 1, "worker", "worker --id 300");
        let pids = resolve(&probe, Query::name("300")).unwrap();
        assert_eq!(pids, vec![301]);
    }

    #[test]
    fn test_service_pid_goes_first() {
        let probe = FakeProbe::new()
            .with(1, 0, "systemd")
            .with(120, 1, "nginx")
            .with(900, 1, "nginx")
            .with(50, 1, "nginx")
            .with_service("nginx", 900);
        let pids = resolve(&probe, Query::name("nginx")).unwrap();
        assert_eq!(pids, vec![900, 50, 120]);
    }

    #[test]
    fn test_file_holders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"x").unwrap();
        let canonical = std::fs::canonicalize(&path).unwrap();

        let probe = FakeProbe::new().with_holders(canonical, &[410, 220]);
        let pids = resolve(&probe, Query::file(path.to_string_lossy())).unwrap();
        let set: HashSet<u32> = pids.into_iter().collect();
        assert_eq!(set, HashSet::from([220, 410]));
    }

    #[test]
    fn test_file_symlink_checks_both_paths() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.db");
        std::fs::write(&target, b"x").unwrap();
        let link = dir.path().join("link.db");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let canonical = std::fs::canonicalize(&target).unwrap();

        let probe = FakeProbe::new()
            .with_holders(canonical, &[10, 11])
            .with_holders(link.clone(), &[11, 12]);
        let pids = resolve(&probe, Query::file(link.to_string_lossy())).unwrap();
        assert_eq!(pids, vec![10, 11, 12]);
    }

    #[test]
    fn test_file_not_held() {
        let err = resolve(&FakeProbe::new(), Query::file("/nonexistent/witr-test")).unwrap_err();
        assert!(matches!(err, WitrError::NotFound { .. }));

        let err = resolve(&FakeProbe::new(), Query::file("  ")).unwrap_err();
        assert!(matches!(err, WitrError::InvalidInput { .. }));
    }
}
