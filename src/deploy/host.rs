// ABOUTME: Deploys to a provisioned EC2 host over SSH.
// ABOUTME: Runs the app as a systemd unit, or as a Docker container for the container shape.

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{DeployError, DeployStep};
use super::firewall::Firewall;
use super::target::{DeployTarget, PortStatus, ProbeStatus};
use crate::decision::Runtime;
use crate::patch::{ENV_FILE, PreparedSource, SourceTree};
use crate::process::CommandOutput;
use crate::ssh::RemoteShell;
use crate::types::{AppName, SecurityGroupId};

const APP_ROOT: &str = "/opt";

/// How the service is supervised on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMode {
    Systemd,
    Docker,
}

/// What to run and where to expose it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub app: AppName,
    pub mode: HostMode,
    pub runtime: Runtime,
    pub entry_point: Option<PathBuf>,
    pub start_command: Option<String>,
    /// Every port the app listens on. The first one is the public URL's.
    pub ports: Vec<u16>,
}

impl Launch {
    fn app_dir(&self) -> String {
        format!("{APP_ROOT}/{}", self.app)
    }

    fn image(&self) -> String {
        format!("{}:latest", self.app)
    }

    /// The process systemd supervises.
    fn exec_start(&self) -> Result<String, DeployError> {
        let dir = self.app_dir();
        if let Some(command) = &self.start_command {
            return Ok(format!("/bin/sh -c \"{}\"", command.replace('"', "\\\"")));
        }
        let entry = self.entry_point.as_deref().ok_or_else(|| {
            DeployError::new(DeployStep::Install, "no entry point or start command to run")
        })?;
        let entry = entry.display();
        match self.runtime {
            Runtime::Python311 => Ok(format!("{dir}/.venv/bin/python {dir}/{entry}")),
            Runtime::Nodejs18 => Ok(format!("/usr/bin/env node {dir}/{entry}")),
            Runtime::Custom => Ok(format!("{dir}/{entry}")),
        }
    }

    fn unit_file(&self) -> Result<String, DeployError> {
        let dir = self.app_dir();
        Ok(format!(
            "[Unit]\n\
             Description={app} (autodeploy)\n\
             After=network-online.target\n\
             \n\
             [Service]\n\
             WorkingDirectory={dir}\n\
             EnvironmentFile=-{dir}/{ENV_FILE}\n\
             Environment=PATH={dir}/.venv/bin:/usr/local/bin:/usr/bin:/bin\n\
             ExecStart={exec}\n\
             Restart=on-failure\n\
             RestartSec=3\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            app = self.app,
            exec = self.exec_start()?,
        ))
    }

    fn install_command(&self) -> String {
        let dir = self.app_dir();
        match (self.mode, self.runtime) {
            (HostMode::Docker, _) => {
                format!("cd {dir} && sudo docker build -q -t {} .", self.image())
            }
            (HostMode::Systemd, Runtime::Python311) => format!(
                "cd {dir} && (test -d .venv || python3 -m venv .venv) && \
                 if [ -f requirements.txt ]; then .venv/bin/pip install -q -r requirements.txt; fi"
            ),
            (HostMode::Systemd, Runtime::Nodejs18) => {
                format!("cd {dir} && if [ -f package.json ]; then npm install --omit=dev; fi")
            }
            (HostMode::Systemd, Runtime::Custom) => "true".to_string(),
        }
    }

    fn probe_command(&self) -> String {
        match self.mode {
            HostMode::Systemd => format!("systemctl is-active --quiet {}", self.app),
            HostMode::Docker => format!(
                "test -n \"$(sudo docker ps -q --filter name=^{}$ --filter status=running)\"",
                self.app
            ),
        }
    }

    fn start_command(&self) -> String {
        match self.mode {
            HostMode::Systemd => format!(
                "sudo systemctl enable {app} && sudo systemctl start {app} && \
                 sleep 2 && systemctl is-active --quiet {app}",
                app = self.app
            ),
            HostMode::Docker => {
                let publish: String = self
                    .ports
                    .iter()
                    .map(|p| format!(" -p {p}:{p}"))
                    .collect();
                format!(
                    "sudo docker rm -f {app} >/dev/null 2>&1; \
                     sudo docker run -d --name {app} --restart unless-stopped \
                     --env-file {dir}/{ENV_FILE}{publish} {image}",
                    app = self.app,
                    dir = self.app_dir(),
                    image = self.image(),
                )
            }
        }
    }
}

pub struct HostTarget {
    shell: Box<dyn RemoteShell>,
    host: String,
    launch: Launch,
    security_group: Option<SecurityGroupId>,
    firewall: Arc<dyn Firewall>,
}

impl std::fmt::Debug for HostTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostTarget")
            .field("host", &self.host)
            .field("launch", &self.launch)
            .field("security_group", &self.security_group)
            .finish()
    }
}

impl HostTarget {
    pub fn new(
        shell: Box<dyn RemoteShell>,
        host: impl Into<String>,
        launch: Launch,
        security_group: Option<SecurityGroupId>,
        firewall: Arc<dyn Firewall>,
    ) -> Self {
        Self {
            shell,
            host: host.into(),
            launch,
            security_group,
            firewall,
        }
    }

    async fn exec(&self, step: DeployStep, command: &str) -> Result<CommandOutput, DeployError> {
        let output = self
            .shell
            .exec(command)
            .await
            .map_err(|e| DeployError::ssh(step, e))?;
        if output.success() {
            Ok(output)
        } else {
            Err(DeployError::command(step, first_word(command), &output))
        }
    }

    async fn exec_with_stdin(
        &self,
        step: DeployStep,
        command: &str,
        input: &[u8],
    ) -> Result<(), DeployError> {
        let output = self
            .shell
            .exec_with_stdin(command, input)
            .await
            .map_err(|e| DeployError::ssh(step, e))?;
        if output.success() {
            Ok(())
        } else {
            Err(DeployError::command(step, first_word(command), &output))
        }
    }
}

fn first_word(command: &str) -> &str {
    command
        .split_whitespace()
        .find(|w| *w != "sudo" && *w != "cd")
        .unwrap_or(command)
}

/// Gzipped tarball of the tree, paths relative to the archive root.
pub fn archive(tree: &SourceTree) -> std::io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in tree.iter() {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(file_mode(path));
        header.set_cksum();
        builder.append_data(&mut header, path, content)?;
    }
    builder.into_inner()?.finish()
}

fn file_mode(path: &Path) -> u32 {
    match path.extension().and_then(|e| e.to_str()) {
        Some("sh") => 0o755,
        _ => 0o644,
    }
}

#[async_trait]
impl DeployTarget for HostTarget {
    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.launch.app_dir())
    }

    async fn transfer(&self, source: &PreparedSource) -> Result<(), DeployError> {
        let tree = source.tree.clone();
        let bytes = tokio::task::spawn_blocking(move || archive(&tree))
            .await
            .map_err(|e| DeployError::new(DeployStep::Transfer, e.to_string()))?
            .map_err(|e| DeployError::io(DeployStep::Transfer, e))?;

        let dir = self.launch.app_dir();
        let command = format!(
            "sudo mkdir -p {dir} && sudo chown \"$(id -u):$(id -g)\" {dir} && tar -xzf - -C {dir}"
        );
        self.exec_with_stdin(DeployStep::Transfer, &command, &bytes)
            .await
    }

    async fn install(&self) -> Result<(), DeployError> {
        self.exec(DeployStep::Install, &self.launch.install_command())
            .await?;

        if self.launch.mode == HostMode::Systemd {
            let unit = self.launch.unit_file()?;
            let command = format!(
                "sudo tee /etc/systemd/system/{}.service >/dev/null && sudo systemctl daemon-reload",
                self.launch.app
            );
            self.exec_with_stdin(DeployStep::Install, &command, unit.as_bytes())
                .await?;
        }
        Ok(())
    }

    async fn probe(&self) -> Result<ProbeStatus, DeployError> {
        let output = self
            .shell
            .exec(&self.launch.probe_command())
            .await
            .map_err(|e| DeployError::ssh(DeployStep::Probe, e))?;
        Ok(if output.success() {
            ProbeStatus::Running
        } else {
            ProbeStatus::Stopped
        })
    }

    async fn start(&self, _source: &PreparedSource) -> Result<(), DeployError> {
        self.exec(DeployStep::Start, &self.launch.start_command())
            .await?;
        Ok(())
    }

    async fn open_port(&self, port: u16) -> Result<PortStatus, DeployError> {
        let group = self.security_group.as_ref().ok_or_else(|| {
            DeployError::new(DeployStep::OpenPort, "environment has no security group")
        })?;
        self.firewall.open(group, port).await
    }

    fn public_url(&self) -> Result<String, DeployError> {
        Ok(match self.launch.ports.first().copied() {
            None | Some(80) => format!("http://{}", self.host),
            Some(port) => format!("http://{}:{port}", self.host),
        })
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.shell.disconnect().await {
            tracing::debug!("ssh disconnect from {} failed: {}", self.host, e);
        }
    }
}
