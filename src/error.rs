use crate::camera::CameraError;
use crate::ledger::LedgerError;
use crate::prediction::PredictionError;
use crate::upload::UploadError;
use crate::wallet::WalletError;
use thiserror::Error;

/// Broad class of a failed user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing wallet provider, camera or page element.
    Environment,
    /// The user declined camera or account access.
    Permission,
    /// Backend unreachable or answered with something unusable.
    Transport,
    /// Transaction rejected, reverted, or a ledger read failed.
    Ledger,
    /// The user's input was incomplete.
    Input,
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Video element not found on page.")]
    MissingVideoElement,
    #[error("Could not access camera: {0}")]
    Camera(#[source] CameraError),
    #[error("Could not capture frame: {0}")]
    Capture(#[source] CameraError),
    #[error("{0}")]
    Upload(#[from] UploadError),
    #[error("Detection failed: {0}")]
    Prediction(#[from] PredictionError),
    #[error("Wallet connection failed: {0}")]
    Wallet(#[from] WalletError),
    #[error("Connect a wallet first.")]
    NotConnected,
    #[error("Blockchain error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("No login credentials given.")]
    MissingCredentials,
    #[error("Login failed: {0}")]
    Login(#[source] PredictionError),
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::MissingVideoElement => ErrorKind::Environment,
            ActionError::Camera(err) | ActionError::Capture(err) => match err {
                CameraError::PermissionDenied(_) => ErrorKind::Permission,
                _ => ErrorKind::Environment,
            },
            ActionError::Upload(UploadError::NoFileChosen) => ErrorKind::Input,
            ActionError::Upload(UploadError::ReadFailed { .. }) => ErrorKind::Environment,
            ActionError::Prediction(_) => ErrorKind::Transport,
            ActionError::Wallet(err) => match err {
                WalletError::Rejected(_) => ErrorKind::Permission,
                WalletError::Rpc(_) => ErrorKind::Transport,
                _ => ErrorKind::Environment,
            },
            ActionError::NotConnected | ActionError::Ledger(_) => ErrorKind::Ledger,
            ActionError::MissingCredentials => ErrorKind::Input,
            ActionError::Login(PredictionError::InvalidCredentials) => ErrorKind::Permission,
            ActionError::Login(_) => ErrorKind::Transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RpcError;

    #[test]
    fn test_classification() {
        assert_eq!(
            ActionError::Upload(UploadError::NoFileChosen).kind(),
            ErrorKind::Input
        );
        assert_eq!(
            ActionError::Camera(CameraError::PermissionDenied("denied".into())).kind(),
            ErrorKind::Permission
        );
        assert_eq!(
            ActionError::Camera(CameraError::NoDevice("none".into())).kind(),
            ErrorKind::Environment
        );
        assert_eq!(
            ActionError::Wallet(WalletError::NoProvider).kind(),
            ErrorKind::Environment
        );
        assert_eq!(
            ActionError::Ledger(LedgerError::Rpc(RpcError::Rpc {
                code: -32000,
                message: "insufficient funds".into()
            }))
            .kind(),
            ErrorKind::Ledger
        );
    }

    #[test]
    fn test_messages_name_the_failing_step() {
        assert_eq!(
            ActionError::Upload(UploadError::NoFileChosen).to_string(),
            "Please choose an image first."
        );
        assert_eq!(
            ActionError::Camera(CameraError::PermissionDenied("Permission dismissed".into()))
                .to_string(),
            "Could not access camera: Permission denied: Permission dismissed"
        );
    }
}
