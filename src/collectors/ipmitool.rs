use crate::collectors::IpmiSource;
use crate::error::CollectorError;
use log::{debug, info};
use std::io::ErrorKind;
use std::process::Command;

/// Exit status bash reports for a missing command
const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Prefix ipmitool prints when the BMC device node cannot be opened
const DEVICE_OPEN_ERROR: &str = "Could not open device at ";

/// Runs `ipmitool` against the local BMC
#[derive(Debug, Clone)]
pub struct IpmiTool {
    program: String,
    use_sudo: bool,
}

impl IpmiTool {
    pub fn new(use_sudo: bool) -> Self {
        Self::with_program("ipmitool", use_sudo)
    }

    pub fn with_program(program: &str, use_sudo: bool) -> Self {
        Self {
            program: program.to_string(),
            use_sudo,
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = if self.use_sudo {
            let mut sudo = Command::new("sudo");
            sudo.arg(&self.program);
            sudo
        } else {
            Command::new(&self.program)
        };
        command.args(args);
        command
    }

    /// Run one ipmitool subcommand and return its stdout
    fn run(&self, args: &[&str]) -> Result<String, CollectorError> {
        let description = format!("{} {}", self.program, args.join(" "));
        debug!("Executing: {}", description);

        let output = self.command(args).output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                CollectorError::DependencyMissing(format!("{}: {}", self.program, e))
            } else {
                CollectorError::SubprocessSpawn(format!("{}: {}", description, e))
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        interpret_exit(&description, output.status.code(), stdout, &stderr)
    }
}

/// Map an ipmitool exit status onto the collector error taxonomy
pub(crate) fn interpret_exit(
    description: &str,
    code: Option<i32>,
    stdout: String,
    stderr: &str,
) -> Result<String, CollectorError> {
    match code {
        Some(0) => Ok(stdout),
        Some(EXIT_COMMAND_NOT_FOUND) => Err(CollectorError::DependencyMissing(format!(
            "required ipmitool missing on node ({})",
            description
        ))),
        Some(1)
            if stderr.trim_start().starts_with(DEVICE_OPEN_ERROR)
                || stdout.trim_start().starts_with(DEVICE_OPEN_ERROR) =>
        {
            Err(CollectorError::DependencyMissing(format!(
                "ipmitool cannot reach the BMC: {}",
                stderr.trim()
            )))
        }
        Some(_) if stderr.contains("command not found") => Err(
            CollectorError::DependencyMissing(format!("{}: {}", description, stderr.trim())),
        ),
        Some(code) => Err(CollectorError::CommandFailed {
            command: description.to_string(),
            code,
            output: stderr.trim().to_string(),
        }),
        None => Err(CollectorError::CommandFailed {
            command: description.to_string(),
            code: -1,
            output: "terminated by signal".to_string(),
        }),
    }
}

impl IpmiSource for IpmiTool {
    fn sel_list(&self) -> Result<String, CollectorError> {
        self.run(&["sel", "list"])
    }

    fn sel_info(&self) -> Result<String, CollectorError> {
        self.run(&["sel", "info"])
    }

    fn sel_clear(&self) -> Result<(), CollectorError> {
        self.run(&["sel", "clear"]).map(|_| ())
    }

    fn sdr_type(&self, device_type: &str) -> Result<String, CollectorError> {
        self.run(&["sdr", "type", device_type])
    }

    fn sensor_get(&self, sensor_id: &str) -> Result<String, CollectorError> {
        self.run(&["sensor", "get", sensor_id])
    }

    fn sdr_get(&self, sensor_id: &str) -> Result<String, CollectorError> {
        self.run(&["sdr", "get", sensor_id])
    }
}

/// Whether we run inside a virtual machine, where no BMC is reachable
pub fn detect_virtualization() -> bool {
    match Command::new("systemd-detect-virt").output() {
        Ok(output) if output.status.success() => {
            info!(
                "Virtualised environment detected: {}",
                String::from_utf8_lossy(&output.stdout).trim()
            );
            true
        }
        Ok(_) => false,
        Err(e) => {
            debug!("systemd-detect-virt unavailable: {}", e);
            false
        }
    }
}
