// ABOUTME: Errors from logging into and running commands on provisioned hosts.
// ABOUTME: Separates "host not ready yet" from failures a retry will not fix.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot reach {host}: {reason}")]
    Unreachable { host: String, reason: String },

    #[error("host rejected every key offered for user {user}")]
    Rejected { user: String },

    #[error("no usable SSH credentials: {0}")]
    NoCredentials(String),

    #[error("unreadable private key {path}: {reason}")]
    UnreadableKey { path: PathBuf, reason: String },

    #[error("remote channel error: {0}")]
    Channel(String),

    #[error("remote command still running after {0:?}")]
    TimedOut(Duration),

    #[error("connection dropped before the command reported an exit status")]
    Dropped,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Fresh instances refuse connections until sshd is up, and may drop
    /// the first sessions while cloud-init restarts it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Unreachable { .. } | Error::TimedOut(_) | Error::Dropped | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booting_hosts_are_retried() {
        let refused = Error::Unreachable {
            host: "203.0.113.10".into(),
            reason: "Connection refused".into(),
        };
        assert!(refused.is_transient());
        assert!(Error::Dropped.is_transient());
    }

    #[test]
    fn credential_problems_are_not() {
        assert!(!Error::Rejected { user: "ec2-user".into() }.is_transient());
        assert!(!Error::NoCredentials("agent down".into()).is_transient());
    }
}
