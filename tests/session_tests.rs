//! End-to-end session tests: select, preview, validate, present.


use pdf_notary::bridge::{BridgeError, BridgeMode, WalletBridge};
use pdf_notary::digest::DigestHex;
use pdf_notary::present::{JsonPresenter, ResultPanel, STATUS_SIGNED, STATUS_STORED, TextPresenter};
use pdf_notary::session::{BUSY_LABEL, Session, SessionOptions};
use pdf_notary::wallet::eth::{self, Address};
use pdf_notary::wallet::{DynWalletProvider, ProviderError};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use test_utils::*;

fn session_with(provider: Option<Arc<MockProvider>>, mode: BridgeMode) -> Session {
    let provider = provider.map(|p| -> DynWalletProvider { p });
    let options = SessionOptions {
        mode,
        ..SessionOptions::default()
    };
    Session::new(options, Arc::new(WalletBridge::new(provider)))
}

fn output(presenter: TextPresenter<Vec<u8>>) -> String {
    String::from_utf8(presenter.into_inner()).unwrap()
}

// ============================================================================
// Selection and preview
// ============================================================================

#[tokio::test]
async fn test_two_page_paper_preview() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "paper.pdf", &two_page_paper());
    let mut session = session_with(None, BridgeMode::Sign);
    let mut presenter = TextPresenter::new(Vec::new());

    session.select_path(&path, &mut presenter).await.unwrap();
    assert_eq!(session.current_page(), Some(1));

    let second = session.next_page(&mut presenter).unwrap();
    assert_eq!(second.indicator(), "Page 2 of 2");
    assert!(!second.can_go_next());
    assert!(session.next_page(&mut presenter).is_none());
    assert_eq!(session.current_page(), Some(2));

    let text = output(presenter);
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("paper.pdf ("));
    assert!(lines[0].ends_with(" KB)"));
    assert_eq!(lines[1], "Page 1 of 2  [next]");
    assert_eq!(lines[2], "Page 2 of 2  [prev]");
    assert_eq!(lines.len(), 3);
}

#[test]
fn test_go_to_page_ignores_out_of_range() {
    let mut session = session_with(None, BridgeMode::Sign);
    let mut presenter = TextPresenter::new(Vec::new());
    session
        .select_bytes("three.pdf", "application/pdf", multi_page_pdf(3, 0), &mut presenter)
        .unwrap();

    assert!(session.go_to_page(4, &mut presenter).is_none());
    assert!(session.go_to_page(0, &mut presenter).is_none());
    assert_eq!(session.go_to_page(3, &mut presenter).unwrap().indicator(), "Page 3 of 3");
    assert_eq!(session.previous_page(&mut presenter).unwrap().page_number, 2);
}

#[test]
fn test_remove_and_replace_reset_state() {
    let mut session = session_with(None, BridgeMode::Sign);
    let mut presenter = TextPresenter::new(Vec::new());
    session
        .select_bytes("a.pdf", "application/pdf", multi_page_pdf(3, 0), &mut presenter)
        .unwrap();
    session.next_page(&mut presenter);
    assert_eq!(session.current_page(), Some(2));

    session
        .select_bytes("b.pdf", "application/pdf", two_page_paper(), &mut presenter)
        .unwrap();
    assert_eq!(session.file().unwrap().name(), "b.pdf");
    assert_eq!(session.current_page(), Some(1));
    assert_eq!(session.preview().unwrap().page_count(), 2);

    session.remove_file();
    assert!(session.file().is_none());
    assert!(session.preview().is_none());
    assert!(session.last_panel().is_none());
    assert!(session.next_page(&mut presenter).is_none());
}

// ============================================================================
// Wallet outcomes
// ============================================================================

#[tokio::test]
async fn test_absent_wallet_reports_and_records_nothing() {
    let mut session = session_with(None, BridgeMode::Transact);
    let mut presenter = TextPresenter::new(Vec::new());
    session
        .select_bytes("paper.pdf", "application/pdf", two_page_paper(), &mut presenter)
        .unwrap();

    let panel = session.validate(&mut presenter).await;
    assert_eq!(
        panel,
        ResultPanel::error("Web3 not available. Please install a wallet provider.")
    );
    assert_eq!(session.busy_label(), None);

    let text = output(presenter);
    assert!(text.contains(BUSY_LABEL));
    assert!(text.contains("✗ Validation Failed"));
    assert!(!text.contains("Transaction:"));
}

#[tokio::test]
async fn test_sign_shows_recovered_signer() {
    let provider = Arc::new(MockProvider::new());
    let mut session = session_with(Some(provider.clone()), BridgeMode::Sign);
    let mut presenter = TextPresenter::new(Vec::new());
    let bytes = two_page_paper();
    session
        .select_bytes("paper.pdf", "application/pdf", bytes.clone(), &mut presenter)
        .unwrap();

    let ResultPanel::Success(panel) = session.validate(&mut presenter).await else {
        panic!("expected a success panel");
    };
    assert_eq!(panel.digest, DigestHex::compute(&bytes));
    assert_eq!(panel.status, STATUS_SIGNED);
    assert_eq!(panel.signer, Some(provider.address()));
    assert_eq!(panel.signer.unwrap().to_string(), DEV_ADDRESS);
    assert_eq!(panel.signature.as_ref().map(String::len), Some(2 + 130));
    assert_eq!(provider.calls(), vec!["request_accounts", "personal_sign"]);
    assert!(provider.sent().is_empty());

    let text = output(presenter);
    assert!(text.contains("✓ Research Paper Validated Successfully!"));
    assert!(text.contains(&format!("Signer: {}", DEV_ADDRESS)));
}

#[tokio::test]
async fn test_transact_stores_ascii_hex_digest() {
    let provider = Arc::new(MockProvider::new());
    let mut session = session_with(Some(provider.clone()), BridgeMode::Transact);
    let mut presenter = TextPresenter::new(Vec::new());
    let bytes = two_page_paper();
    session
        .select_bytes("paper.pdf", "application/pdf", bytes.clone(), &mut presenter)
        .unwrap();

    let ResultPanel::Success(panel) = session.validate(&mut presenter).await else {
        panic!("expected a success panel");
    };
    let digest = DigestHex::compute(&bytes);
    assert_eq!(panel.status, STATUS_STORED);

    let sent = provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, provider.address());
    assert_eq!(sent[0].to, provider.address());
    assert_eq!(sent[0].value, 0);
    assert_eq!(sent[0].gas, 21_000);
    assert_eq!(sent[0].data, eth::ascii_to_hex(digest.as_str()));
    assert_eq!(sent[0].data.len(), 2 + 128);

    let expected_tx = format!("0x{}", hex::encode(eth::keccak256(sent[0].data.as_bytes())));
    assert_eq!(panel.transaction, Some(expected_tx));
}

#[tokio::test]
async fn test_denied_access_stops_before_transaction() {
    let provider = Arc::new(MockProvider::new());
    provider.push_accounts(Err(ProviderError::UserRejected));
    let mut session = session_with(Some(provider.clone()), BridgeMode::Transact);
    let mut presenter = TextPresenter::new(Vec::new());
    session
        .select_bytes("paper.pdf", "application/pdf", two_page_paper(), &mut presenter)
        .unwrap();

    let panel = session.validate(&mut presenter).await;
    assert_eq!(panel, ResultPanel::error("User denied account access."));
    assert_eq!(provider.calls(), vec!["request_accounts"]);
    assert!(session.bridge().account().is_none());
}

#[tokio::test]
async fn test_empty_account_list() {
    let provider = Arc::new(MockProvider::new());
    provider.push_accounts(Ok(Vec::new()));
    let mut session = session_with(Some(provider.clone()), BridgeMode::Sign);
    let mut presenter = TextPresenter::new(Vec::new());
    session
        .select_bytes("paper.pdf", "application/pdf", two_page_paper(), &mut presenter)
        .unwrap();

    let panel = session.validate(&mut presenter).await;
    assert_eq!(panel, ResultPanel::error("No account connected. Please connect your wallet."));
}

#[tokio::test]
async fn test_provider_messages_are_appended() {
    let provider = Arc::new(MockProvider::new());
    provider.push_transaction(Err(ProviderError::Rpc {
        code: -32000,
        message: "insufficient funds".to_string(),
    }));
    provider.push_signature_failure(ProviderError::UserRejected);

    let mut session = session_with(Some(provider.clone()), BridgeMode::Transact);
    let mut presenter = TextPresenter::new(Vec::new());
    session
        .select_bytes("paper.pdf", "application/pdf", two_page_paper(), &mut presenter)
        .unwrap();

    let panel = session.validate(&mut presenter).await;
    assert_eq!(
        panel,
        ResultPanel::error("Failed to store hash on blockchain: insufficient funds")
    );
    assert!(provider.sent().is_empty());

    session.set_mode(BridgeMode::Sign);
    let panel = session.validate(&mut presenter).await;
    assert_eq!(panel, ResultPanel::error("Signature failed: User rejected the request."));
    assert_eq!(session.last_panel(), Some(&panel));
}

#[tokio::test]
async fn test_connect_reports_account() {
    let provider = Arc::new(MockProvider::new());
    let mut session = session_with(Some(provider.clone()), BridgeMode::Sign);
    let mut presenter = TextPresenter::new(Vec::new());

    let account = session.connect(&mut presenter).await.unwrap();
    assert_eq!(account, provider.address());
    assert_eq!(session.bridge().account(), Some(account));
    assert_eq!(output(presenter), format!("Connected: {}\n", DEV_ADDRESS));
}

#[tokio::test]
async fn test_overlapping_requests_are_refused() {
    let provider = Arc::new(MockProvider::new().with_delay(Duration::from_millis(50)));
    let dyn_provider: DynWalletProvider = provider.clone();
    let bridge = Arc::new(WalletBridge::new(Some(dyn_provider)));
    let digest = DigestHex::compute(b"paper");

    let (first, second) = tokio::join!(bridge.sign(&digest), bridge.sign(&digest));
    assert!(first.is_ok());
    assert_eq!(second, Err(BridgeError::Busy));
    assert_eq!(provider.calls(), vec!["request_accounts", "personal_sign"]);
    assert!(!bridge.is_busy());
}

// ============================================================================
// JSON output
// ============================================================================

#[tokio::test]
async fn test_json_session_events() {
    let provider = Arc::new(MockProvider::new());
    let mut session = session_with(Some(provider), BridgeMode::Sign);
    let mut presenter = JsonPresenter::new(Vec::new());
    session
        .select_bytes("paper.pdf", "application/pdf", two_page_paper(), &mut presenter)
        .unwrap();
    session.validate(&mut presenter).await;

    let text = String::from_utf8(presenter.into_inner()).unwrap();
    let events: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(events[0]["event"], "file");
    assert_eq!(events[0]["name"], "paper.pdf");
    assert_eq!(events[1]["event"], "page");
    assert_eq!(events[1]["indicator"], "Page 1 of 2");
    assert_eq!(events[2]["message"], BUSY_LABEL);
    assert_eq!(events[3]["result"], "success");
    assert_eq!(events[3]["signer"], DEV_ADDRESS);
    assert!(events[3].get("transaction").is_none());

    let signer: Address = events[3]["signer"].as_str().unwrap().parse().unwrap();
    assert_eq!(signer.to_string(), DEV_ADDRESS);
}
