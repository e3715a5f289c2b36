//! Controls that run commands on the host

use super::{Category, Control, ControlContext, ControlError, ControlOutcome};
use crate::transport::{ArtifactClass, CommandLine, CommandVerdict, ExecOptions};
use stig_runtime::{log_debug, log_info};

/// Runs an optional audit command, then the apply commands in order
///
/// A zero exit from the audit means the host is already compliant. Each apply
/// command is judged by its [`ArtifactClass`]; the first failure stops the
/// control.
#[derive(Debug, Clone)]
pub struct CommandControl {
    id: String,
    description: String,
    category: Category,
    high_risk: bool,
    audit: Option<CommandLine>,
    commands: Vec<CommandLine>,
    class: Option<ArtifactClass>,
}

impl CommandControl {
    pub fn new(id: &str, description: &str, category: Category) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            category,
            high_risk: false,
            audit: None,
            commands: Vec::new(),
            class: None,
        }
    }

    pub fn with_audit(mut self, audit: CommandLine) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_command(mut self, command: CommandLine) -> Self {
        self.commands.push(command);
        self
    }

    /// Judge every command by this class instead of deriving it from the program name
    pub fn with_class(mut self, class: ArtifactClass) -> Self {
        self.class = Some(class);
        self
    }

    pub fn high_risk(mut self) -> Self {
        self.high_risk = true;
        self
    }

    pub fn commands(&self) -> &[CommandLine] {
        &self.commands
    }

    fn class_for(&self, command: &CommandLine) -> ArtifactClass {
        self.class
            .unwrap_or_else(|| ArtifactClass::for_program(&command.program))
    }

    fn transport_error(&self, source: crate::transport::TransportError) -> ControlError {
        ControlError::Transport {
            control: self.id.clone(),
            source,
        }
    }

    fn is_compliant(&self, ctx: &ControlContext<'_>) -> Result<bool, ControlError> {
        let Some(audit) = &self.audit else {
            return Ok(false);
        };
        let output = ctx
            .transport
            .execute(audit, ExecOptions::elevated(ctx.timeout()))
            .map_err(|e| self.transport_error(e))?;
        log_debug!("Audit result", "control" => self.id, "exit" => output.exit_code);
        Ok(output.success())
    }
}

impl Control for CommandControl {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> Category {
        self.category
    }

    fn high_risk(&self) -> bool {
        self.high_risk
    }

    fn apply(&self, ctx: &ControlContext<'_>) -> Result<ControlOutcome, ControlError> {
        if self.is_compliant(ctx)? {
            log_debug!("Already compliant", "control" => self.id);
            return Ok(ControlOutcome::already_compliant());
        }

        let mut outcome = ControlOutcome {
            applied: true,
            ..ControlOutcome::default()
        };

        for command in &self.commands {
            if ctx.dry_run() {
                log_info!(&format!("[DRY RUN] Would run: {}", command), "control" => self.id);
                outcome.changes.push(format!("would run: {}", command));
                continue;
            }

            let output = ctx
                .transport
                .execute(command, ExecOptions::elevated(ctx.timeout()))
                .map_err(|e| self.transport_error(e))?;

            match self.class_for(command).classify(&output) {
                CommandVerdict::Success => outcome.changes.push(format!("ran: {}", command)),
                CommandVerdict::Warning(reason) => outcome.warnings.push(format!("{}: {}", command, reason)),
                CommandVerdict::Failure(reason) => {
                    return Err(ControlError::CommandFailed {
                        control: self.id.clone(),
                        command: command.to_string(),
                        reason,
                    })
                }
            }
        }
        Ok(outcome)
    }
}
