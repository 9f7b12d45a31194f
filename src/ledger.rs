use crate::abi::{self, AbiError, Address, Token};
use crate::rpc::RpcError;
use crate::wallet::Signer;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::instrument;

const RECORD_DETECTION: &str = "recordDetection(string)";
const DETECTIONS: &str = "detections(address,uint256)";
const GET_MY_DETECTIONS: &str = "getMyDetections()";
const DETECTION_RECORDED: &str = "DetectionRecorded(address,string)";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{0}")]
    Rpc(#[from] RpcError),
    #[error("{0}")]
    Abi(#[from] AbiError),
    #[error("Transaction {0} was reverted")]
    Reverted(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.as_deref() != Some("0x0")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionRecorded {
    pub user: Address,
    pub logo_name: String,
}

/// Handle on the detection contract, bound to the session signer.
#[derive(Debug, Clone)]
pub struct DetectionContract {
    address: Address,
    signer: Signer,
    poll_interval: Duration,
}

impl DetectionContract {
    pub fn new(address: Address, signer: Signer, poll_interval: Duration) -> Self {
        Self {
            address,
            signer,
            poll_interval,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Submits `recordDetection(logo_name)` and waits for its inclusion.
    #[instrument(skip(self))]
    pub async fn record_detection(
        &self,
        logo_name: &str,
    ) -> Result<TransactionReceipt, LedgerError> {
        let data = abi::encode_call(RECORD_DETECTION, &[Token::String(logo_name.to_string())]);
        let tx_hash = self.signer.send_transaction(&self.address, &data).await?;
        tracing::info!("Submitted transaction {}", tx_hash);

        let receipt = self.wait_for_inclusion(&tx_hash).await?;
        if !receipt.succeeded() {
            return Err(LedgerError::Reverted(tx_hash));
        }
        Ok(receipt)
    }

    /// Polls for the receipt until the transaction is included. No timeout.
    pub async fn wait_for_inclusion(&self, tx_hash: &str) -> Result<TransactionReceipt, LedgerError> {
        loop {
            let receipt: Option<TransactionReceipt> = self
                .signer
                .rpc()
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;

            match receipt {
                Some(receipt) if receipt.block_number.is_some() => {
                    tracing::info!(
                        "Transaction {} included in block {}",
                        tx_hash,
                        receipt.block_number.as_deref().unwrap_or_default()
                    );
                    return Ok(receipt);
                }
                _ => {
                    tracing::debug!("Transaction {} pending", tx_hash);
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// `DetectionRecorded` events emitted by this contract in `receipt`.
    pub fn recorded_events(
        &self,
        receipt: &TransactionReceipt,
    ) -> Result<Vec<DetectionRecorded>, LedgerError> {
        let topic = abi::to_hex(&abi::event_topic(DETECTION_RECORDED));
        let contract = self.address.to_string();

        receipt
            .logs
            .iter()
            .filter(|log| log.address.eq_ignore_ascii_case(&contract))
            .filter(|log| log.topics.first().is_some_and(|t| t.eq_ignore_ascii_case(&topic)))
            .map(|log| -> Result<DetectionRecorded, LedgerError> {
                let user_word = log
                    .topics
                    .get(1)
                    .ok_or_else(|| AbiError::InvalidHex("missing indexed user".into()))?;
                let user_bytes = abi::from_hex(user_word)?;
                let user = Address::try_from_word(&user_bytes)?;
                let logo_name = abi::decode_string(&abi::from_hex(&log.data)?)?;
                Ok(DetectionRecorded { user, logo_name })
            })
            .collect()
    }

    async fn call(&self, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        let result: String = self
            .signer
            .rpc()
            .request(
                "eth_call",
                json!([
                    {
                        "from": self.signer.address().to_string(),
                        "to": self.address.to_string(),
                        "data": abi::to_hex(&data),
                    },
                    "latest"
                ]),
            )
            .await?;
        Ok(abi::from_hex(&result)?)
    }

    #[instrument(skip(self))]
    pub async fn get_my_detections(&self) -> Result<Vec<String>, LedgerError> {
        let output = self.call(abi::encode_call(GET_MY_DETECTIONS, &[])).await?;
        Ok(abi::decode_string_array(&output)?)
    }

    #[instrument(skip(self))]
    pub async fn detection_at(&self, user: Address, index: u64) -> Result<String, LedgerError> {
        let output = self
            .call(abi::encode_call(
                DETECTIONS,
                &[Token::Address(user), Token::Uint(index)],
            ))
            .await?;
        Ok(abi::decode_string(&output)?)
    }
}
