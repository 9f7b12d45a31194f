use crate::abi::Address;
use crate::camera::{Camera, ZoomControl};
use crate::config::{BackendConfig, Credentials};
use crate::encoder::DataUri;
use crate::error::ActionError;
use crate::ledger::DetectionRecorded;
use crate::page::{Notice, Page};
use crate::prediction::{PredictionClient, PredictionResult};
use crate::upload::FileChooser;
use crate::wallet::{Session, Wallet};
use std::{path::PathBuf, sync::Arc};
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotValid,
    NoLogoName,
    NoSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    NotAttempted(SkipReason),
    Recorded {
        tx_hash: String,
        events: Vec<DetectionRecorded>,
    },
    Failed(String),
}

/// Terminal outcome of a successful prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub result: PredictionResult,
    pub ledger: LedgerOutcome,
}

/// Drives one user action at a time through capture, prediction and the
/// optional ledger step, reporting every failure on the page.
pub struct LogoDetector {
    page: Page,
    camera: Camera,
    files: FileChooser,
    prediction: PredictionClient,
    wallet: Wallet,
    images_url: String,
    credentials: Option<Credentials>,
}

impl LogoDetector {
    pub fn new(
        page: Page,
        camera: Camera,
        prediction: PredictionClient,
        wallet: Wallet,
        backend: &BackendConfig,
    ) -> Self {
        Self {
            page,
            camera,
            files: FileChooser::new(),
            prediction,
            wallet,
            images_url: backend.images_url(),
            credentials: backend.credentials.clone(),
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    fn fail(&self, err: ActionError) -> ActionError {
        self.page.notify(Notice::error(err.to_string()));
        err
    }

    #[instrument(skip(self))]
    pub async fn start_camera(&self) -> Result<Option<ZoomControl>, ActionError> {
        if !self.page.has_video() {
            return Err(self.fail(ActionError::MissingVideoElement));
        }

        match self.camera.start().await {
            Ok(zoom) => {
                match &zoom {
                    Some(control) => self.page.show_zoom_control(control),
                    None => self.page.hide_zoom_control(),
                }
                Ok(zoom)
            }
            Err(err) => Err(self.fail(ActionError::Camera(err))),
        }
    }

    /// Best effort: failures are only logged.
    pub async fn set_zoom(&self, zoom: f64) {
        if let Err(err) = self.camera.apply_zoom(zoom).await {
            tracing::warn!("Zoom apply error: {}", err);
        }
    }

    #[instrument(skip(self))]
    pub async fn detect_logo(&self) -> Result<Detection, ActionError> {
        if !self.page.has_video() {
            return Err(self.fail(ActionError::MissingVideoElement));
        }

        let payload = match self.camera.capture_frame().await {
            Ok(payload) => payload,
            Err(err) => return Err(self.fail(ActionError::Capture(err))),
        };
        self.submit_for_prediction(&payload).await
    }

    pub fn choose_file(&self, path: impl Into<PathBuf>) {
        self.files.choose(path);
    }

    #[instrument(skip(self))]
    pub async fn upload_and_detect(&self) -> Result<Detection, ActionError> {
        let payload = match self.files.read_as_data_uri().await {
            Ok(payload) => payload,
            Err(err) => return Err(self.fail(err.into())),
        };
        self.submit_for_prediction(&payload).await
    }

    /// Sends `payload` to the backend, shows the verdict, then records valid
    /// detections when a wallet session is connected.
    pub async fn submit_for_prediction(&self, payload: &DataUri) -> Result<Detection, ActionError> {
        let result = match self.prediction.submit(payload).await {
            Ok(result) => result,
            Err(err) => return Err(self.fail(err.into())),
        };

        self.page.show_result(result.display_message());
        if let Some(url) = result.image_url() {
            self.page.show_captured_image(url);
        }

        let ledger = self.record_if_warranted(&result).await;
        Ok(Detection { result, ledger })
    }

    async fn record_if_warranted(&self, result: &PredictionResult) -> LedgerOutcome {
        if !result.is_valid() {
            return LedgerOutcome::NotAttempted(SkipReason::NotValid);
        }
        let Some(logo_name) = result.recordable_logo() else {
            return LedgerOutcome::NotAttempted(SkipReason::NoLogoName);
        };
        let Some(session) = self.wallet.session() else {
            return LedgerOutcome::NotAttempted(SkipReason::NoSession);
        };

        match session.contract.record_detection(logo_name).await {
            Ok(receipt) => {
                let events = match session.contract.recorded_events(&receipt) {
                    Ok(events) => events,
                    Err(err) => {
                        tracing::warn!("Could not decode DetectionRecorded logs: {}", err);
                        Vec::new()
                    }
                };
                for event in &events {
                    tracing::info!("DetectionRecorded {} by {}", event.logo_name, event.user);
                }

                self.page.notify(Notice::success("Detection recorded on-chain"));
                LedgerOutcome::Recorded {
                    tx_hash: receipt.transaction_hash,
                    events,
                }
            }
            Err(err) => {
                let err = ActionError::from(err);
                self.page.notify(Notice::warning(err.to_string()));
                LedgerOutcome::Failed(err.to_string())
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn connect_wallet(&self) -> Result<Address, ActionError> {
        match self.wallet.connect().await {
            Ok(session) => {
                let address = session.signer.address();
                self.page
                    .notify(Notice::success(format!("Wallet connected: {}", address)));
                Ok(address)
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    fn require_session(&self) -> Result<Arc<Session>, ActionError> {
        self.wallet
            .session()
            .ok_or_else(|| self.fail(ActionError::NotConnected))
    }

    #[instrument(skip(self))]
    pub async fn list_my_detections(&self) -> Result<Vec<String>, ActionError> {
        let session = self.require_session()?;
        match session.contract.get_my_detections().await {
            Ok(detections) => {
                let text = if detections.is_empty() {
                    "No detections recorded yet.".to_string()
                } else {
                    format!("My detections: {}", detections.join(", "))
                };
                self.page.notify(Notice::info(text));
                Ok(detections)
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    #[instrument(skip(self))]
    pub async fn detection_at(&self, user: Address, index: u64) -> Result<String, ActionError> {
        let session = self.require_session()?;
        match session.contract.detection_at(user, index).await {
            Ok(logo_name) => {
                self.page
                    .notify(Notice::info(format!("Detection #{} of {}: {}", index, user, logo_name)));
                Ok(logo_name)
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    pub fn view_detections(&self) {
        self.page.navigate(&self.images_url);
    }

    #[instrument(skip(self, credentials))]
    pub async fn login(&self, credentials: Option<Credentials>) -> Result<(), ActionError> {
        let Some(credentials) = credentials.or_else(|| self.credentials.clone()) else {
            return Err(self.fail(ActionError::MissingCredentials));
        };

        match self.prediction.login(&credentials).await {
            Ok(()) => {
                self.page.notify(Notice::success("Logged in"));
                Ok(())
            }
            Err(err) => Err(self.fail(ActionError::Login(err))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{self, Token};
    use crate::camera::{CameraConstraints, CameraError, ZoomCapability};
    use crate::config::{CameraConfig, ContractConfig, ElementIds, WalletConfig};
    use crate::error::ErrorKind;
    use crate::page::NoticeLevel;
    use crate::test_support::{FakeDevice, FakeTrack, PageEvent, RecordingDisplay};
    use mockito::{Matcher, ServerGuard};
    use serde_json::json;

    const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
    const ACCOUNT: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const TX: &str = "0x8f3c5c2b0d1e4f6a7b9c0d1e2f3a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c";

    struct Harness {
        detector: LogoDetector,
        display: Arc<RecordingDisplay>,
        backend: ServerGuard,
        chain: ServerGuard,
        mocks: Vec<mockito::Mock>,
    }

    async fn harness_with(device: FakeDevice, ids: ElementIds) -> Harness {
        let backend = mockito::Server::new_async().await;
        let chain = mockito::Server::new_async().await;
        let display = Arc::new(RecordingDisplay::default());

        let backend_config = BackendConfig {
            base_url: backend.url(),
            predict_path: "/predict".into(),
            images_path: "/images".into(),
            login_path: "/login".into(),
            credentials: None,
        };
        let wallet = Wallet::from_config(
            Some(&WalletConfig {
                provider_url: chain.url(),
                account_index: 0,
            }),
            Some(&ContractConfig {
                address: CONTRACT.into(),
                confirmation_poll_ms: 5,
            }),
        );
        let camera = Camera::new(
            Box::new(device),
            CameraConstraints::from_config(&CameraConfig::default()),
        );

        let detector = LogoDetector::new(
            Page::new(display.clone(), ids),
            camera,
            PredictionClient::new(&backend_config).unwrap(),
            wallet,
            &backend_config,
        );

        Harness {
            detector,
            display,
            backend,
            chain,
            mocks: Vec::new(),
        }
    }

    async fn harness() -> Harness {
        harness_with(
            FakeDevice::with_track(FakeTrack::new(64, 48)),
            ElementIds::default(),
        )
        .await
    }

    async fn mock_predict(h: &mut Harness, body: serde_json::Value) {
        let mock = h
            .backend
            .mock("POST", "/predict")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;
        h.mocks.push(mock);
    }

    async fn mock_rpc(h: &mut Harness, method: &str, result: serde_json::Value) {
        let mock = h
            .chain
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": method })))
            .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
            .create_async()
            .await;
        h.mocks.push(mock);
    }

    async fn connect(h: &mut Harness) {
        mock_rpc(h, "eth_requestAccounts", json!([ACCOUNT])).await;
        mock_rpc(h, "eth_accounts", json!([ACCOUNT])).await;
        h.detector.connect_wallet().await.unwrap();
    }

    fn text_events(display: &RecordingDisplay) -> Vec<PageEvent> {
        display
            .events()
            .into_iter()
            .filter(|e| matches!(e, PageEvent::Text(..)))
            .collect()
    }

    #[tokio::test]
    async fn test_upload_without_file_issues_no_request() {
        let mut h = harness().await;
        let predict = h
            .backend
            .mock("POST", "/predict")
            .expect(0)
            .create_async()
            .await;

        let err = h.detector.upload_and_detect().await.unwrap_err();

        predict.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::Input);
        assert_eq!(
            h.display.notices(),
            vec![Notice::error("Please choose an image first.")]
        );
    }

    #[tokio::test]
    async fn test_camera_denied_reports_reason_and_keeps_zoom_hidden() {
        let h = harness_with(
            FakeDevice::failing(|| CameraError::PermissionDenied("NotAllowedError".into())),
            ElementIds::default(),
        )
        .await;

        let err = h.detector.start_camera().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Permission);
        let notices = h.display.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(notices[0].text.contains("NotAllowedError"));
        assert!(!h
            .display
            .events()
            .iter()
            .any(|e| matches!(e, PageEvent::Zoom(_, Some(_)))));
        assert!(h.detector.detect_logo().await.is_err());
    }

    #[tokio::test]
    async fn test_zoom_control_shown_when_supported() {
        let track = FakeTrack::new(64, 48).with_zoom(ZoomCapability {
            min: Some(1.0),
            max: Some(4.0),
            step: Some(0.5),
        });
        let h = harness_with(FakeDevice::with_track(track), ElementIds::default()).await;

        h.detector.start_camera().await.unwrap();
        h.detector.set_zoom(2.0).await;

        assert_eq!(
            h.display.events(),
            vec![PageEvent::Zoom(
                "zoomSlider".into(),
                Some(ZoomControl {
                    min: 1.0,
                    max: 4.0,
                    step: 0.5,
                    value: 1.0
                })
            )]
        );
    }

    #[tokio::test]
    async fn test_valid_detection_is_recorded_on_chain() {
        let mut h = harness().await;
        connect(&mut h).await;
        mock_predict(
            &mut h,
            json!({"valid": true, "logoName": "Acme", "message": "Logo Acme detected"}),
        )
        .await;
        let record_acme = abi::to_hex(&abi::encode_call(
            "recordDetection(string)",
            &[Token::String("Acme".into())],
        ));
        // ABI-encoded return of the string "Acme".
        let mut acme_string = vec![0u8; 64];
        acme_string[31] = 0x20;
        acme_string[63] = 4;
        acme_string.extend(b"Acme");
        acme_string.resize(96, 0);
        let send = h
            .chain
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "eth_sendTransaction",
                "params": [{ "from": ACCOUNT, "to": CONTRACT, "data": record_acme }],
            })))
            .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": TX }).to_string())
            .expect(1)
            .create_async()
            .await;
        mock_rpc(
            &mut h,
            "eth_getTransactionReceipt",
            json!({
                "transactionHash": TX,
                "blockNumber": "0x2",
                "status": "0x1",
                "logs": [{
                    "address": CONTRACT,
                    "topics": [
                        abi::to_hex(&abi::event_topic("DetectionRecorded(address,string)")),
                        format!("0x{:0>64}", &ACCOUNT[2..]),
                    ],
                    "data": abi::to_hex(&acme_string),
                }],
            }),
        )
        .await;

        h.detector.start_camera().await.unwrap();
        let detection = h.detector.detect_logo().await.unwrap();

        send.assert_async().await;
        assert_eq!(
            detection.ledger,
            LedgerOutcome::Recorded {
                tx_hash: TX.into(),
                events: vec![DetectionRecorded {
                    user: ACCOUNT.parse().unwrap(),
                    logo_name: "Acme".into(),
                }],
            }
        );
        assert_eq!(
            text_events(&h.display),
            vec![PageEvent::Text("result".into(), "Logo Acme detected".into())]
        );
        assert_eq!(
            h.display.notices().last(),
            Some(&Notice::success("Detection recorded on-chain"))
        );
    }

    #[tokio::test]
    async fn test_backend_failure_shows_error_and_skips_ledger() {
        let mut h = harness().await;
        connect(&mut h).await;
        let _mock = h
            .backend
            .mock("POST", "/predict")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        let send = h
            .chain
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_sendTransaction" })))
            .expect(0)
            .create_async()
            .await;

        h.detector.start_camera().await.unwrap();
        let err = h.detector.detect_logo().await.unwrap_err();

        send.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(text_events(&h.display).is_empty());
        let last = h.display.notices().pop().unwrap();
        assert_eq!(last.level, NoticeLevel::Error);
        assert!(last.text.starts_with("Detection failed:"));
    }

    #[tokio::test]
    async fn test_non_json_response_shows_error() {
        let mut h = harness().await;
        let _mock = h
            .backend
            .mock("POST", "/predict")
            .with_status(200)
            .with_body("<!doctype html>")
            .create_async()
            .await;

        h.detector.start_camera().await.unwrap();

        assert!(h.detector.detect_logo().await.is_err());
        assert!(text_events(&h.display).is_empty());
    }

    #[tokio::test]
    async fn test_no_session_never_sends_transaction() {
        let mut h = harness().await;
        mock_predict(
            &mut h,
            json!({"valid": true, "logoName": "Acme", "message": "Logo Acme detected"}),
        )
        .await;
        let chain = h.chain.mock("POST", "/").expect(0).create_async().await;

        h.detector.start_camera().await.unwrap();
        let detection = h.detector.detect_logo().await.unwrap();

        chain.assert_async().await;
        assert_eq!(
            detection.ledger,
            LedgerOutcome::NotAttempted(SkipReason::NoSession)
        );
    }

    #[tokio::test]
    async fn test_invalid_or_unnamed_results_are_not_recorded() {
        let mut h = harness().await;
        connect(&mut h).await;
        let send = h
            .chain
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_sendTransaction" })))
            .expect(0)
            .create_async()
            .await;
        h.detector.start_camera().await.unwrap();

        let not_valid = h
            .backend
            .mock("POST", "/predict")
            .with_body(json!({"valid": false, "logoName": "Acme"}).to_string())
            .create_async()
            .await;
        let detection = h.detector.detect_logo().await.unwrap();
        assert_eq!(detection.ledger, LedgerOutcome::NotAttempted(SkipReason::NotValid));
        not_valid.remove_async().await;

        mock_predict(&mut h, json!({"valid": true, "logoName": ""})).await;
        let detection = h.detector.detect_logo().await.unwrap();
        assert_eq!(
            detection.ledger,
            LedgerOutcome::NotAttempted(SkipReason::NoLogoName)
        );

        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_message_and_image_url() {
        let mut h = harness().await;
        mock_predict(&mut h, json!({"valid": false})).await;
        h.detector.start_camera().await.unwrap();

        h.detector.detect_logo().await.unwrap();

        let events = h.display.events();
        assert!(events.contains(&PageEvent::Text(
            "result".into(),
            crate::prediction::FALLBACK_MESSAGE.into()
        )));
        assert!(!events.iter().any(|e| matches!(e, PageEvent::Image(..))));
    }

    #[tokio::test]
    async fn test_image_url_updates_preview() {
        let mut h = harness().await;
        mock_predict(
            &mut h,
            json!({"message": "This is not a valid logo", "valid": false, "image_url": "https://cdn/x.jpg"}),
        )
        .await;
        h.detector.start_camera().await.unwrap();

        h.detector.detect_logo().await.unwrap();

        assert!(h.display.events().contains(&PageEvent::Image(
            "captured_image".into(),
            "https://cdn/x.jpg".into()
        )));
    }

    #[tokio::test]
    async fn test_capture_sends_png_at_native_size() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        // PNG signature followed by the IHDR chunk header for a 64x48 image;
        // 24 bytes encode to a base64 prefix without padding.
        let mut header = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        header.extend([0, 0, 0, 13]);
        header.extend(b"IHDR");
        header.extend(64u32.to_be_bytes());
        header.extend(48u32.to_be_bytes());
        let prefix = STANDARD.encode(&header).replace('+', r"\+");

        let mut h = harness().await;
        let predict = h
            .backend
            .mock("POST", "/predict")
            .match_body(Matcher::Regex(format!(
                r#""image":"data:image/png;base64,{}"#,
                prefix
            )))
            .with_body(r#"{"message": "ok"}"#)
            .create_async()
            .await;
        h.detector.start_camera().await.unwrap();

        h.detector.detect_logo().await.unwrap();

        predict.assert_async().await;
    }

    #[tokio::test]
    async fn test_ledger_failure_keeps_prediction() {
        let mut h = harness().await;
        connect(&mut h).await;
        mock_predict(
            &mut h,
            json!({"valid": true, "logoName": "Acme", "message": "Logo Acme detected"}),
        )
        .await;
        let _mock = h
            .chain
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_sendTransaction" })))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"insufficient funds for gas"}}"#)
            .create_async()
            .await;
        h.detector.start_camera().await.unwrap();

        let detection = h.detector.detect_logo().await.unwrap();

        assert!(matches!(detection.ledger, LedgerOutcome::Failed(ref msg) if msg.contains("insufficient funds")));
        assert_eq!(detection.result.display_message(), "Logo Acme detected");
        let last = h.display.notices().pop().unwrap();
        assert_eq!(last.level, NoticeLevel::Warning);
        assert!(last.text.starts_with("Blockchain error:"));
    }

    #[tokio::test]
    async fn test_listing_without_session_makes_no_call() {
        let mut h = harness().await;
        let chain = h.chain.mock("POST", "/").expect(0).create_async().await;

        let err = h.detector.list_my_detections().await.unwrap_err();

        chain.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::Ledger);
        assert_eq!(h.display.notices(), vec![Notice::error("Connect a wallet first.")]);
    }

    #[tokio::test]
    async fn test_listing_with_session_decodes_names() {
        let mut h = harness().await;
        connect(&mut h).await;
        // getMyDetections() -> ["Acme"]
        let mut output = vec![0u8; 128];
        output[31] = 0x20;
        output[63] = 1;
        output[95] = 0x20;
        output[127] = 4;
        let mut name = b"Acme".to_vec();
        name.resize(32, 0);
        output.extend(name);
        mock_rpc(&mut h, "eth_call", json!(abi::to_hex(&output))).await;

        let detections = h.detector.list_my_detections().await.unwrap();

        assert_eq!(detections, vec!["Acme".to_string()]);
        assert_eq!(
            h.display.notices().last(),
            Some(&Notice::info("My detections: Acme"))
        );
    }

    #[tokio::test]
    async fn test_missing_video_element_aborts_capture() {
        let h = harness_with(
            FakeDevice::with_track(FakeTrack::new(64, 48)),
            ElementIds {
                video: None,
                ..ElementIds::default()
            },
        )
        .await;

        assert!(matches!(
            h.detector.start_camera().await,
            Err(ActionError::MissingVideoElement)
        ));
        assert!(matches!(
            h.detector.detect_logo().await,
            Err(ActionError::MissingVideoElement)
        ));
        assert_eq!(
            h.display.notices(),
            vec![
                Notice::error("Video element not found on page."),
                Notice::error("Video element not found on page.")
            ]
        );
    }

    #[tokio::test]
    async fn test_view_detections_navigates_to_gallery() {
        let h = harness().await;

        h.detector.view_detections();

        assert_eq!(
            h.display.events(),
            vec![PageEvent::Navigate(format!("{}/images", h.backend.url()))]
        );
    }

    #[tokio::test]
    async fn test_login_without_credentials_is_input_error() {
        let h = harness().await;

        let err = h.detector.login(None).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[tokio::test]
    async fn test_connect_wallet_notifies_address() {
        let mut h = harness().await;

        connect(&mut h).await;

        assert_eq!(
            h.display.notices(),
            vec![Notice::success(format!("Wallet connected: {}", ACCOUNT))]
        );
    }
}
