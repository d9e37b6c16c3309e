//! Process source classification
//!
//! Decides what launched a process by looking at its ancestry chain and its
//! control-group membership. Each check yields a scored candidate; the first
//! candidate that clears the confidence threshold wins, otherwise the best
//! one is returned with a low-confidence warning.

use crate::ancestry::AncestryChain;
use crate::models::{
    Confidence, Evidence, EvidenceSource, ProcessHealth, ProcessRecord, SourceClassification,
    SourceKind, Warning,
};
use crate::probe::PlatformProbe;
use tracing::debug;

/// Confidence scores for each heuristic
mod scores {
    /// Control group names a container runtime
    pub const CONTAINER: f32 = 0.90;
    /// Service manager is the direct parent
    pub const MANAGER_PARENT: f32 = 0.90;
    /// Service manager further up with nothing interactive in between
    pub const MANAGER_ANCESTOR: f32 = 0.80;
    /// Service manager at the top but a shell or session sits in between
    pub const MANAGER_INDIRECT: f32 = 0.30;
    /// Scheduler daemon in the ancestry
    pub const SCHEDULER: f32 = 0.80;
    /// Parent is a shell
    pub const SHELL_PARENT: f32 = 0.85;
    /// A shell further up the chain
    pub const SHELL_ANCESTOR: f32 = 0.45;
}

/// Chains longer than this are flagged as unusual
const DEEP_CHAIN: usize = 32;

/// Restart counts above this are flagged
const RESTART_WARNING: usize = 5;

const SERVICE_MANAGERS: &[&str] = &[
    "systemd",
    "init",
    "launchd",
    "openrc",
    "openrc-init",
    "runit",
    "runsv",
    "s6-supervise",
    "supervisord",
    "upstart",
];

const SCHEDULERS: &[&str] = &["cron", "crond", "anacron", "atd", "fcron"];

const SHELLS: &[&str] = &[
    "bash", "zsh", "sh", "dash", "fish", "ksh", "tcsh", "csh", "nu", "pwsh", "elvish", "xonsh",
];

const SESSION_LEADERS: &[&str] = &[
    "sshd",
    "login",
    "su",
    "sudo",
    "doas",
    "tmux",
    "tmux: server",
    "screen",
    "gdm",
    "gdm-session-worker",
    "sddm",
    "lightdm",
    "gnome-terminal-",
    "gnome-terminal-server",
    "konsole",
    "xterm",
    "alacritty",
    "kitty",
    "wezterm-gui",
    "foot",
];

/// Control-group keywords and the runtime they identify
const CONTAINER_RUNTIMES: &[(&str, &str)] = &[
    ("kubepods", "kubernetes"),
    ("libpod", "podman"),
    ("podman", "podman"),
    ("docker", "docker"),
    ("containerd", "containerd"),
    ("lxc", "lxc"),
];

/// Result of classifying a chain
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub classification: SourceClassification,
    /// Facts that fed the decision, in the order they were found
    pub evidence: Vec<Evidence>,
    /// Only ever a low-confidence warning
    pub warnings: Vec<Warning>,
}

struct ClassificationContext<'a, P: ?Sized> {
    probe: &'a P,
    chain: &'a AncestryChain,
    evidence: Vec<Evidence>,
}

impl<P: ?Sized> ClassificationContext<'_, P> {
    fn add_evidence(&mut self, fact: String, score: f32, source: EvidenceSource, details: Option<String>) {
        self.evidence.push(Evidence {
            fact,
            confidence: Confidence::from_score(score),
            source,
            details,
        });
    }
}

/// Classify the origin of the chain's target
pub fn classify<P: PlatformProbe + ?Sized>(
    probe: &P,
    chain: &AncestryChain,
    threshold: f32,
) -> ClassificationResult {
    let mut ctx = ClassificationContext {
        probe,
        chain,
        evidence: Vec::new(),
    };

    let checks: [fn(&mut ClassificationContext<'_, P>) -> Option<SourceClassification>; 4] = [
        check_container,
        check_service_manager,
        check_scheduler,
        check_shell,
    ];

    let mut best: Option<SourceClassification> = None;
    for check in checks {
        let Some(candidate) = check(&mut ctx) else {
            continue;
        };
        if candidate.is_confident(threshold) {
            return ClassificationResult {
                classification: candidate,
                evidence: ctx.evidence,
                warnings: Vec::new(),
            };
        }
        if best
            .as_ref()
            .map_or(true, |b| candidate.confidence > b.confidence)
        {
            best = Some(candidate);
        }
    }

    match best {
        Some(classification) => {
            let warning = Warning::LowConfidence {
                kind: classification.kind,
                confidence: classification.confidence,
            };
            ClassificationResult {
                classification,
                evidence: ctx.evidence,
                warnings: vec![warning],
            }
        }
        None => {
            ctx.add_evidence(
                "Could not determine process origin".to_string(),
                0.0,
                EvidenceSource::Heuristic,
                Some("No container, service manager, scheduler or shell in the lineage".to_string()),
            );
            ClassificationResult {
                classification: SourceClassification::unknown(),
                evidence: ctx.evidence,
                warnings: vec![Warning::LowConfidence {
                    kind: SourceKind::Unknown,
                    confidence: 0.0,
                }],
            }
        }
    }
}

/// Check 1: does any member of the chain live in a container's cgroup?
fn check_container<P: PlatformProbe + ?Sized>(
    ctx: &mut ClassificationContext<'_, P>,
) -> Option<SourceClassification> {
    let chain = ctx.chain;
    let probe = ctx.probe;
    // Nearest first: the target's own cgroup is the strongest signal
    let found = chain
        .records
        .iter()
        .rev()
        .filter(|r| !r.synthetic)
        .find_map(|r| match probe.cgroup_membership(r.pid) {
            Ok(cgroup) => container_runtime(&cgroup).map(|rt| (r.pid, rt, cgroup)),
            Err(e) => {
                debug!(pid = r.pid, error = %e, "cgroup unreadable");
                None
            }
        });

    let (pid, runtime, cgroup) = found?;
    ctx.add_evidence(
        format!("PID {} runs inside a {} control group", pid, runtime),
        scores::CONTAINER,
        EvidenceSource::ControlGroup,
        Some(cgroup.trim().to_string()),
    );

    Some(SourceClassification {
        kind: SourceKind::Container,
        label: runtime.to_string(),
        confidence: scores::CONTAINER,
        description: format!("Running inside a {} container", runtime),
    })
}

/// Check 2: is there an init system or supervisor above the target?
fn check_service_manager<P: PlatformProbe + ?Sized>(
    ctx: &mut ClassificationContext<'_, P>,
) -> Option<SourceClassification> {
    let chain = ctx.chain;
    let ancestors: Vec<&ProcessRecord> = chain.ancestors().collect();
    let position = ancestors
        .iter()
        .position(|r| is_service_manager(r.name()) || r.pid == 1)?;
    let manager = ancestors[position];
    let label = if manager.command_name.is_empty() {
        "init".to_string()
    } else {
        manager.command_name.clone()
    };

    let interposed = ancestors[..position]
        .iter()
        .find(|r| is_shell(r.name()) || is_session_leader(r.name()) || is_scheduler(r.name()));

    let score = match interposed {
        Some(_) => scores::MANAGER_INDIRECT,
        None if position == 0 => scores::MANAGER_PARENT,
        None => scores::MANAGER_ANCESTOR,
    };

    let details = match interposed {
        Some(r) => Some(format!(
            "{} (PID {}) sits between the manager and the process",
            r.name(),
            r.pid
        )),
        None if position == 0 => Some("Direct child of the service manager".to_string()),
        None => Some(format!("{} levels below the service manager", position + 1)),
    };
    ctx.add_evidence(
        format!("Ancestry includes {} (PID {})", label, manager.pid),
        score,
        EvidenceSource::ProcessTable,
        details,
    );

    Some(SourceClassification {
        kind: SourceKind::ServiceManager,
        description: format!("Managed by {}", label),
        label,
        confidence: score,
    })
}

/// Check 3: was it spawned under a scheduler daemon?
fn check_scheduler<P: PlatformProbe + ?Sized>(
    ctx: &mut ClassificationContext<'_, P>,
) -> Option<SourceClassification> {
    let chain = ctx.chain;
    let scheduler = chain.ancestors().find(|r| is_scheduler(r.name()))?;
    let label = scheduler.command_name.clone();
    let pid = scheduler.pid;

    ctx.add_evidence(
        format!("Ancestry includes scheduler {} (PID {})", label, pid),
        scores::SCHEDULER,
        EvidenceSource::ProcessTable,
        None,
    );

    Some(SourceClassification {
        kind: SourceKind::Cron,
        description: format!("Scheduled job started by {}", label),
        label,
        confidence: scores::SCHEDULER,
    })
}

/// Check 4: was it started from a shell?
fn check_shell<P: PlatformProbe + ?Sized>(
    ctx: &mut ClassificationContext<'_, P>,
) -> Option<SourceClassification> {
    let chain = ctx.chain;
    let (position, shell) = chain
        .ancestors()
        .enumerate()
        .find(|(_, r)| is_shell(r.name()))?;
    let label = shell.command_name.clone();
    let pid = shell.pid;

    let (score, fact, description) = if position == 0 {
        (
            scores::SHELL_PARENT,
            format!("Parent process is shell {} (PID {})", label, pid),
            format!("Started interactively from {}", label),
        )
    } else {
        (
            scores::SHELL_ANCESTOR,
            format!("Ancestry includes shell {} (PID {})", label, pid),
            format!("Descendant of a {} session", label),
        )
    };
    ctx.add_evidence(fact, score, EvidenceSource::ProcessTable, None);

    Some(SourceClassification {
        kind: SourceKind::InteractiveShell,
        label,
        confidence: score,
        description,
    })
}

/// Advisory warnings about the chain and its target
///
/// Independent of classification; a low-confidence warning comes from
/// [`classify`] instead.
pub fn detect_warnings(chain: &AncestryChain) -> Vec<Warning> {
    let mut warnings = Vec::new();

    if let Some(stop) = chain.stop {
        warnings.push(stop.warning());
    }

    let Some(target) = chain.target() else {
        return warnings;
    };

    if chain.len() == 1 && target.pid != 1 {
        warnings.push(Warning::ShallowAncestry);
    }
    if chain.len() > DEEP_CHAIN {
        warnings.push(Warning::DeepAncestry { depth: chain.len() });
    }
    if chain.is_complete() {
        if let Some(root) = chain.root() {
            if root.pid != 1 {
                warnings.push(Warning::RootNotInit {
                    pid: root.pid,
                    name: root.name().to_string(),
                });
            }
        }
    }

    for record in chain.ancestors().filter(|r| !r.synthetic) {
        if record.cmdline.trim().is_empty() {
            warnings.push(Warning::MissingCommandLine {
                pid: record.pid,
                name: record.name().to_string(),
            });
        }
    }

    if target.user.as_deref() == Some("root") {
        warnings.push(Warning::RunningAsRoot);
    }

    if let Some(address) = target.public_address() {
        warnings.push(Warning::PublicListener {
            address: address.to_string(),
        });
    }

    let restarts = chain.restart_count();
    if restarts > RESTART_WARNING {
        warnings.push(Warning::Restarted { count: restarts });
    }

    if !target.health.is_healthy() && target.health != ProcessHealth::Unknown {
        warnings.push(Warning::Unhealthy {
            health: target.health,
        });
    }

    warnings
}

/// Container runtime named by a cgroup membership string
///
/// Unit names ending in `.service` belong to the runtime daemons themselves
/// and are ignored.
pub fn container_runtime(cgroup: &str) -> Option<&'static str> {
    cgroup
        .lines()
        .filter_map(|line| line.splitn(3, ':').nth(2))
        .flat_map(|path| path.split('/'))
        .filter(|segment| !segment.ends_with(".service"))
        .find_map(|segment| {
            let lower = segment.to_lowercase();
            CONTAINER_RUNTIMES
                .iter()
                .find(|(keyword, _)| lower.contains(keyword))
                .map(|(_, runtime)| *runtime)
        })
}

fn base_name(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_lowercase()
}

fn is_service_manager(name: &str) -> bool {
    SERVICE_MANAGERS.contains(&base_name(name).as_str())
}

fn is_scheduler(name: &str) -> bool {
    SCHEDULERS.contains(&base_name(name).as_str())
}

/// Login shells show up with a leading dash (`-bash`)
fn is_shell(name: &str) -> bool {
    let name = base_name(name);
    SHELLS.contains(&name.trim_start_matches('-'))
}

fn is_session_leader(name: &str) -> bool {
    let name = base_name(name);
    SESSION_LEADERS.contains(&name.as_str()) || name.starts_with("sshd:")
}
