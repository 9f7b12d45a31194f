use crate::abi::{self, AbiError, Address};
use crate::config::{ContractConfig, WalletConfig};
use crate::ledger::DetectionContract;
use crate::rpc::{JsonRpcClient, RpcError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("No compatible wallet provider found.")]
    NoProvider,
    #[error("No detection contract is configured.")]
    NoContract,
    #[error("Invalid contract address: {0}")]
    InvalidContract(AbiError),
    #[error("A wallet connection is already in progress.")]
    ConnectInProgress,
    #[error("Account access was rejected: {0}")]
    Rejected(String),
    #[error("Wallet exposes no account at index {index} ({available} available)")]
    NoAccount { index: usize, available: usize },
    #[error("Wallet provider error: {0}")]
    Rpc(RpcError),
    #[error("Wallet returned an invalid account: {0}")]
    InvalidAccount(AbiError),
}

impl From<RpcError> for WalletError {
    fn from(err: RpcError) -> Self {
        if err.is_user_rejection() {
            WalletError::Rejected(err.to_string())
        } else {
            WalletError::Rpc(err)
        }
    }
}

/// An account whose transactions are signed by the wallet provider.
#[derive(Debug, Clone)]
pub struct Signer {
    address: Address,
    rpc: Arc<JsonRpcClient>,
}

impl Signer {
    pub fn new(address: Address, rpc: Arc<JsonRpcClient>) -> Self {
        Self { address, rpc }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn rpc(&self) -> &JsonRpcClient {
        &self.rpc
    }

    /// Asks the provider to sign and broadcast a call; returns the transaction hash.
    #[instrument(skip(self, data), fields(from = %self.address))]
    pub async fn send_transaction(&self, to: &Address, data: &[u8]) -> Result<String, RpcError> {
        self.rpc
            .request(
                "eth_sendTransaction",
                json!([{
                    "from": self.address.to_string(),
                    "to": to.to_string(),
                    "data": abi::to_hex(data),
                }]),
            )
            .await
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompts the user to grant account access.
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;
    async fn list_accounts(&self) -> Result<Vec<Address>, WalletError>;
    async fn signer(&self, index: usize) -> Result<Signer, WalletError>;
}

/// EIP-1193 provider reached over JSON-RPC.
pub struct Eip1193Provider {
    rpc: Arc<JsonRpcClient>,
}

impl Eip1193Provider {
    pub fn new(url: &str) -> Self {
        Self {
            rpc: Arc::new(JsonRpcClient::new(url)),
        }
    }

    async fn accounts(&self, method: &str) -> Result<Vec<Address>, WalletError> {
        let raw: Vec<String> = self.rpc.request(method, json!([])).await?;
        raw.iter()
            .map(|account| account.parse().map_err(WalletError::InvalidAccount))
            .collect()
    }
}

#[async_trait]
impl WalletProvider for Eip1193Provider {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.accounts("eth_requestAccounts").await
    }

    async fn list_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.accounts("eth_accounts").await
    }

    async fn signer(&self, index: usize) -> Result<Signer, WalletError> {
        let accounts = self.list_accounts().await?;
        let address = accounts.get(index).copied().ok_or(WalletError::NoAccount {
            index,
            available: accounts.len(),
        })?;
        Ok(Signer::new(address, self.rpc.clone()))
    }
}

#[derive(Debug)]
pub struct Session {
    pub signer: Signer,
    pub contract: DetectionContract,
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected(Arc<Session>),
}

/// The page's wallet session. Once connected it stays connected.
pub struct Wallet {
    provider: Option<Arc<dyn WalletProvider>>,
    contract: Option<ContractConfig>,
    account_index: usize,
    state: Mutex<SessionState>,
}

impl Wallet {
    pub fn new(
        provider: Option<Arc<dyn WalletProvider>>,
        account_index: usize,
        contract: Option<ContractConfig>,
    ) -> Self {
        Self {
            provider,
            contract,
            account_index,
            state: Mutex::new(SessionState::Disconnected),
        }
    }

    pub fn from_config(wallet: Option<&WalletConfig>, contract: Option<&ContractConfig>) -> Self {
        let provider = wallet.map(|w| {
            Arc::new(Eip1193Provider::new(&w.provider_url)) as Arc<dyn WalletProvider>
        });
        let account_index = wallet.map(|w| w.account_index).unwrap_or_default();
        Self::new(provider, account_index, contract.cloned())
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        match &*self.state.lock() {
            SessionState::Connected(session) => Some(session.clone()),
            _ => None,
        }
    }

    /// Moves `Disconnected -> Connecting -> Connected`, falling back to
    /// `Disconnected` on any failure.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<Arc<Session>, WalletError> {
        let provider = self.provider.clone().ok_or(WalletError::NoProvider)?;
        let contract = self.contract.clone().ok_or(WalletError::NoContract)?;

        {
            let mut state = self.state.lock();
            match &*state {
                SessionState::Connected(session) => return Ok(session.clone()),
                SessionState::Connecting => return Err(WalletError::ConnectInProgress),
                SessionState::Disconnected => *state = SessionState::Connecting,
            }
        }

        let result = self.establish(provider.as_ref(), &contract).await;

        let mut state = self.state.lock();
        match result {
            Ok(session) => {
                let session = Arc::new(session);
                tracing::info!("Wallet connected as {}", session.signer.address());
                *state = SessionState::Connected(session.clone());
                Ok(session)
            }
            Err(err) => {
                tracing::warn!("Wallet connection failed: {}", err);
                *state = SessionState::Disconnected;
                Err(err)
            }
        }
    }

    async fn establish(
        &self,
        provider: &dyn WalletProvider,
        contract: &ContractConfig,
    ) -> Result<Session, WalletError> {
        let contract_address: Address = contract
            .address
            .parse()
            .map_err(WalletError::InvalidContract)?;

        let granted = provider.request_accounts().await?;
        if granted.is_empty() {
            return Err(WalletError::Rejected("no account was granted".into()));
        }

        let signer = provider.signer(self.account_index).await?;
        let contract = DetectionContract::new(
            contract_address,
            signer.clone(),
            Duration::from_millis(contract.confirmation_poll_ms),
        );

        Ok(Session { signer, contract })
    }
}
