//! Native checkers for each generated artifact class

use super::{ArtifactChecker, ArtifactFindings, ValidationContext, ValidationError};
use crate::transport::{CommandLine, ExecOptions, TransportError};
use std::path::Path;
use stig_runtime::log_debug;

/// Run `program args.. path` elevated and turn a non-zero exit into an error
fn native_check(
    ctx: &ValidationContext<'_>,
    findings: &mut ArtifactFindings,
    program: &str,
    args: &[&str],
    path: &Path,
) {
    let command = CommandLine::new(program)
        .args(args.iter().copied())
        .arg(path.to_string_lossy().to_string());
    log_debug!("Running native check", "command" => command);

    match ctx.transport.execute(&command, ExecOptions::elevated(ctx.timeout)) {
        Ok(output) if output.success() => {}
        Ok(output) => {
            let stderr = output.stderr.trim();
            findings.error(ValidationError::ArtifactInvalid {
                artifact: findings.artifact.clone(),
                reason: if stderr.is_empty() {
                    format!("{} exited with {}", program, output.exit_code)
                } else {
                    stderr.to_string()
                },
            });
        }
        Err(TransportError::ProgramNotFound { .. }) => {
            findings.warn(format!("{} not available; syntax not checked", program));
        }
        Err(e) => {
            let artifact = findings.artifact.clone();
            findings.error(ValidationError::from_transport(&artifact, e));
        }
    }
}

fn missing(findings: &ArtifactFindings, path: &Path) -> ValidationError {
    ValidationError::ArtifactMissing {
        artifact: findings.artifact.clone(),
        path: path.display().to_string(),
    }
}

// ============================================================================
// SSH DAEMON
// ============================================================================

/// `sshd -t -f <config>`; hosts without an SSH daemon only get a warning
pub struct SshdChecker;

impl ArtifactChecker for SshdChecker {
    fn artifact(&self) -> &'static str {
        "sshd_config"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> ArtifactFindings {
        let mut findings = ArtifactFindings::new(self.artifact());
        let path = &ctx.settings.sshd_config;
        if !path.exists() {
            findings.warn(format!("{} not present; SSH daemon not installed", path.display()));
            return findings;
        }
        native_check(ctx, &mut findings, "sshd", &["-t", "-f"], path);
        findings
    }
}

// ============================================================================
// SUDOERS
// ============================================================================

pub struct SudoersChecker;

impl ArtifactChecker for SudoersChecker {
    fn artifact(&self) -> &'static str {
        "sudoers"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> ArtifactFindings {
        let mut findings = ArtifactFindings::new(self.artifact());
        let path = &ctx.settings.sudoers;
        if !path.exists() {
            let err = missing(&findings, path);
            findings.error(err);
            return findings;
        }
        native_check(ctx, &mut findings, "visudo", &["-c", "-f"], path);
        findings
    }
}

// ============================================================================
// PAM
// ============================================================================

/// PAM has no native checker; the common stack files must exist and
/// `common-auth` must still load `pam_unix.so`
pub struct PamChecker;

impl ArtifactChecker for PamChecker {
    fn artifact(&self) -> &'static str {
        "pam"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> ArtifactFindings {
        let mut findings = ArtifactFindings::new(self.artifact());

        for name in &ctx.settings.pam_files {
            let path = ctx.settings.pam_dir.join(name);
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    let err = missing(&findings, &path);
                    findings.error(err);
                    continue;
                }
                Err(e) => {
                    findings.error(ValidationError::CheckerFailed {
                        artifact: format!("pam/{}", name),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if content.contains("nullok") {
                findings.warn(format!("{} still allows empty passwords (nullok)", name));
            }
            if name == "common-auth" && !content.contains("pam_unix.so") {
                findings.error(ValidationError::ArtifactInvalid {
                    artifact: format!("pam/{}", name),
                    reason: "pam_unix.so is not loaded".to_string(),
                });
            }
        }
        findings
    }
}

// ============================================================================
// GRUB
// ============================================================================

/// Reads the GRUB defaults file and looks for `audit=1` on the kernel command line.
/// The defaults file is a shell fragment, so no native syntax checker applies.
pub struct GrubChecker;

impl ArtifactChecker for GrubChecker {
    fn artifact(&self) -> &'static str {
        "grub"
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> ArtifactFindings {
        let mut findings = ArtifactFindings::new(self.artifact());
        let path = &ctx.settings.grub_defaults;

        match std::fs::read_to_string(path) {
            Ok(content) => {
                if !content.contains("audit=1") {
                    findings.warn("kernel command line lacks audit=1");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                findings.warn(format!("{} not present; boot loader may not be GRUB", path.display()));
            }
            Err(e) => findings.error(ValidationError::CheckerFailed {
                artifact: self.artifact().to_string(),
                reason: e.to_string(),
            }),
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationSettings;
    use crate::transport::{ScriptedResponse, ScriptedTransport};
    use std::time::Duration;

    fn settings(dir: &Path) -> ValidationSettings {
        let pam_dir = dir.join("pam.d");
        std::fs::create_dir_all(&pam_dir).unwrap();
        for name in ["common-password", "common-account", "common-session"] {
            std::fs::write(pam_dir.join(name), "session required pam_unix.so\n").unwrap();
        }
        std::fs::write(pam_dir.join("common-auth"), "auth [success=1 default=ignore] pam_unix.so\n").unwrap();
        std::fs::write(dir.join("sshd_config"), "PermitRootLogin no\n").unwrap();
        std::fs::write(dir.join("sudoers"), "root ALL=(ALL:ALL) ALL\n").unwrap();
        std::fs::write(dir.join("grub"), "GRUB_CMDLINE_LINUX=\"audit=1\"\n").unwrap();

        ValidationSettings {
            sshd_config: dir.join("sshd_config"),
            sudoers: dir.join("sudoers"),
            pam_dir,
            grub_defaults: dir.join("grub"),
            ..ValidationSettings::default()
        }
    }

    fn ctx<'a>(transport: &'a ScriptedTransport, settings: &'a ValidationSettings) -> ValidationContext<'a> {
        ValidationContext {
            transport,
            settings,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_clean_host() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let transport = ScriptedTransport::new("h");

        let outcome = crate::validation::ConfigPostValidator::standard().validate_all(&ctx(&transport, &settings));
        assert!(outcome.all_valid, "{:?}", outcome.errors);
        assert!(outcome.warnings.is_empty());

        let executed = transport.executed();
        assert!(executed[0].starts_with("sshd -t -f "));
        assert!(executed[1].starts_with("visudo -c -f "));
        assert!(transport.calls().iter().all(|c| c.elevated));
    }

    #[test]
    fn test_sshd_syntax_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let transport = ScriptedTransport::new("h").respond(
            "sshd -t",
            ScriptedResponse::exit(255, "", "line 3: Bad configuration option: PermitRootLgin"),
        );

        let findings = SshdChecker.check(&ctx(&transport, &settings));
        assert!(!findings.valid());
        assert!(findings.errors[0].contains("Bad configuration option"));
    }

    #[test]
    fn test_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.sshd_config = dir.path().join("absent_sshd");
        settings.sudoers = dir.path().join("absent_sudoers");
        settings.grub_defaults = dir.path().join("absent_grub");
        let transport = ScriptedTransport::new("h");
        let ctx = ctx(&transport, &settings);

        let sshd = SshdChecker.check(&ctx);
        assert!(sshd.valid());
        assert_eq!(sshd.warnings.len(), 1);

        assert!(!SudoersChecker.check(&ctx).valid());

        let grub = GrubChecker.check(&ctx);
        assert!(grub.valid());
        assert_eq!(grub.warnings.len(), 1);
        assert!(transport.executed().is_empty());
    }

    #[test]
    fn test_pam_findings() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        std::fs::write(settings.pam_dir.join("common-auth"), "auth required pam_deny.so nullok\n").unwrap();
        std::fs::remove_file(settings.pam_dir.join("common-session")).unwrap();
        let transport = ScriptedTransport::new("h");

        let findings = PamChecker.check(&ctx(&transport, &settings));
        assert_eq!(findings.errors.len(), 2);
        assert_eq!(findings.warnings.len(), 1);
    }

    #[test]
    fn test_grub_without_audit() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        std::fs::write(&settings.grub_defaults, "GRUB_CMDLINE_LINUX=\"quiet\"\n").unwrap();
        let transport = ScriptedTransport::new("h");

        let findings = GrubChecker.check(&ctx(&transport, &settings));
        assert!(findings.valid());
        assert_eq!(findings.warnings, vec!["kernel command line lacks audit=1".to_string()]);
        assert!(transport.executed().is_empty());
    }

    #[test]
    fn test_checker_timeout_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let transport = ScriptedTransport::new("h").respond("visudo", ScriptedResponse::timeout(10));

        let findings = SudoersChecker.check(&ctx(&transport, &settings));
        assert!(!findings.valid());
        assert!(findings.errors[0].starts_with("Cannot check sudoers"));
    }
}
