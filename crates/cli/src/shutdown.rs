use crate::error::CliError;
use engine_config::report::summary::{SyncStatus, SyncSummary};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Listens for SIGINT and SIGTERM and cancels the running sync pass.
///
/// The executor checks the token before each stage and before dispatching
/// writes, so batches already in flight are allowed to finish.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self { cancel_token }
    }

    pub fn register_handlers(&self) {
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    error!("Failed to install SIGINT handler: {e}");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        error!("Failed to install SIGTERM handler: {e}");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received SIGINT (Ctrl+C), cancelling the sync pass");
                }
                _ = terminate => {
                    info!("Received SIGTERM, cancelling the sync pass");
                }
            }

            cancel_token.cancel();
        });
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

/// Exit codes for the CLI application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// The pass finished but its failure rate exceeded the degraded threshold.
    Degraded = 3,
    ShutdownRequested = 130, // Standard exit code for SIGINT
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Partial passes still exit 0; the failed rows are in the report.
    pub fn from_summary(summary: &SyncSummary) -> Self {
        match summary.status {
            SyncStatus::Degraded => ExitCode::Degraded,
            SyncStatus::Completed | SyncStatus::Partial | SyncStatus::DryRun => ExitCode::Success,
        }
    }

    pub fn from_error(err: &CliError) -> Self {
        if err.is_cancelled() {
            ExitCode::ShutdownRequested
        } else {
            ExitCode::GeneralError
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_runtime::error::SyncError;

    #[test]
    fn exit_codes_follow_status() {
        let mut summary = SyncSummary::default();
        assert_eq!(ExitCode::from_summary(&summary), ExitCode::Success);

        summary.status = SyncStatus::Partial;
        assert_eq!(ExitCode::from_summary(&summary).as_i32(), 0);

        summary.status = SyncStatus::Degraded;
        assert_eq!(ExitCode::from_summary(&summary).as_i32(), 3);
    }

    #[test]
    fn cancellation_maps_to_130() {
        let err = CliError::Sync(SyncError::Cancelled {
            stage: "default".into(),
        });
        assert_eq!(ExitCode::from_error(&err).as_i32(), 130);

        let err = CliError::Env("bad".into());
        assert_eq!(ExitCode::from_error(&err), ExitCode::GeneralError);
    }
}
