//! ssh/rsync implementation of the Remote Directory Service.
//!
//! All capture directories live under one archive root on the fleet host and
//! are named `<STATION>_<YYYYMMDD>_...`. Every process runs with
//! `kill_on_drop` under a hard timeout.

use crate::{RemoteDirectoryService, RemoteError, RemoteResult, check_directory_name, count_local_captures};
use async_trait::async_trait;
use cams_proto::{StationDir, StationId, directory_date, directory_station, latest_directory_name};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

// ─── Configuration ────────────────────────────────────────────────────────────

/// How to reach the station fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// ssh destination of the fleet host (e.g. pi@10.10.0.113)
    pub host: String,

    /// Directory on the host holding the capture directories
    #[serde(default = "default_archive_root")]
    pub archive_root: String,

    #[serde(default = "default_ssh_binary")]
    pub ssh_binary: String,

    #[serde(default = "default_rsync_binary")]
    pub rsync_binary: String,

    /// ssh connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Hard limit for listing/counting commands in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Hard limit for one directory transfer in seconds
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,
}

fn default_archive_root() -> String {
    "RMS_data/ArchivedFiles".to_string()
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

fn default_rsync_binary() -> String {
    "rsync".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_command_timeout() -> u64 {
    30
}

fn default_transfer_timeout() -> u64 {
    900
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "pi@10.10.0.113".to_string(),
            archive_root: default_archive_root(),
            ssh_binary: default_ssh_binary(),
            rsync_binary: default_rsync_binary(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            transfer_timeout_secs: default_transfer_timeout(),
        }
    }
}

// ─── Service ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SshDirectoryService {
    config: RemoteConfig,
}

impl SshDirectoryService {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }

    fn ssh_options(&self) -> Vec<String> {
        vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
        ]
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_secs)
    }

    /// Run `remote_cmd` on the fleet host and return its stdout.
    async fn remote(&self, operation: &str, remote_cmd: &str, limit: Duration) -> RemoteResult<String> {
        let mut cmd = Command::new(&self.config.ssh_binary);
        cmd.args(self.ssh_options())
            .arg(&self.config.host)
            .arg(remote_cmd);
        run(operation, cmd, limit).await
    }

    /// All capture directory names in the archive root.
    async fn archive_listing(&self) -> RemoteResult<Vec<String>> {
        let cmd = format!("ls -1 {}", shell_quote(&self.config.archive_root));
        let out = self.remote("list directories", &cmd, self.command_timeout()).await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn station_directories(&self, station: &StationId) -> RemoteResult<Vec<String>> {
        let listing = self.archive_listing().await?;
        Ok(listing
            .into_iter()
            .filter(|name| directory_station(name).as_ref() == Some(station))
            .collect())
    }

    async fn count_captures(&self, directory: &str) -> RemoteResult<u32> {
        check_directory_name("count captures", directory)?;
        let path = format!("{}/{}", self.config.archive_root, directory);
        let cmd = format!(
            "find {} -maxdepth 1 -type f -name '*.fits' | wc -l",
            shell_quote(&path)
        );
        let out = self.remote("count captures", &cmd, self.command_timeout()).await?;
        out.trim().parse::<u32>().map_err(|e| RemoteError::Protocol {
            operation: "count captures".to_string(),
            message: format!("{:?}: {e}", out.trim()),
        })
    }

    async fn describe(&self, directory: Option<&str>) -> RemoteResult<Option<StationDir>> {
        match directory {
            Some(name) => {
                let count = self.count_captures(name).await?;
                Ok(Some(StationDir::new(name, count)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RemoteDirectoryService for SshDirectoryService {
    fn name(&self) -> &str {
        &self.config.host
    }

    async fn ping(&self) -> RemoteResult<()> {
        let out = self.remote("ping", "echo ok", self.command_timeout()).await?;
        if out.trim() == "ok" {
            Ok(())
        } else {
            Err(RemoteError::Protocol {
                operation: "ping".to_string(),
                message: format!("expected \"ok\", got {:?}", out.trim()),
            })
        }
    }

    async fn list_stations(&self) -> RemoteResult<BTreeSet<StationId>> {
        let listing = self.archive_listing().await?;
        Ok(listing
            .iter()
            .filter(|name| directory_date(name).is_some())
            .filter_map(|name| directory_station(name))
            .collect())
    }

    async fn latest_directory(&self, station: &StationId) -> RemoteResult<Option<StationDir>> {
        let dirs = self.station_directories(station).await?;
        let latest = latest_directory_name(dirs.iter().map(String::as_str));
        debug!(%station, latest = ?latest, "latest directory");
        self.describe(latest).await
    }

    async fn directory_for_date(
        &self,
        station: &StationId,
        date: NaiveDate,
    ) -> RemoteResult<Option<StationDir>> {
        let dirs = self.station_directories(station).await?;
        // several directories for one night means the station restarted; the
        // last one holds the bulk of the night
        let chosen = dirs
            .iter()
            .filter(|name| directory_date(name) == Some(date))
            .map(String::as_str)
            .max();
        self.describe(chosen).await
    }

    async fn fetch_directory(
        &self,
        station: &StationId,
        directory: &str,
        dest: &Path,
    ) -> RemoteResult<u32> {
        check_directory_name("fetch", directory)?;
        tokio::fs::create_dir_all(dest).await?;

        let source = format!(
            "{}:{}/{}/",
            self.config.host, self.config.archive_root, directory
        );
        let mut target = dest.as_os_str().to_os_string();
        target.push("/");

        let mut cmd = Command::new(&self.config.rsync_binary);
        cmd.args(["-a", "--delete", "--include=*.fits", "--exclude=*", "-e"])
            .arg(format!("{} {}", self.config.ssh_binary, self.ssh_options().join(" ")))
            .arg(&source)
            .arg(&target);

        debug!(%station, %directory, dest = %dest.display(), "rsync");
        run(
            "fetch",
            cmd,
            Duration::from_secs(self.config.transfer_timeout_secs),
        )
        .await?;

        Ok(count_local_captures(dest)?)
    }
}

// ─── Process plumbing ─────────────────────────────────────────────────────────

async fn run(operation: &str, mut cmd: Command, limit: Duration) -> RemoteResult<String> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(limit, cmd.output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(RemoteError::Timeout {
                operation: operation.to_string(),
                timeout: limit,
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RemoteError::Command {
            operation: operation.to_string(),
            message: format!("{}: {}", output.status, stderr.trim()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Quote a value for the remote POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
