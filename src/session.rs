//! Session controller: the state one user works with, from picking a file to
//! seeing the validation result.

use crate::bridge::{BridgeError, BridgeMode, WalletBridge};
use crate::digest::DigestHex;
use crate::intake::{IntakeError, MAX_FILE_SIZE, SelectedFile};
use crate::preview::{Preview, PreviewError, PreviewOptions};
use crate::present::{Presenter, ResultPanel};
use crate::render::RenderedPage;
use crate::wallet::Address;
use std::path::Path;
use std::sync::Arc;

pub const BUSY_LABEL: &str = "Processing...";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Please select a PDF file first.")]
    NoFile,

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Preview(#[from] PreviewError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    pub max_file_size: u64,
    pub preview: PreviewOptions,
    pub mode: BridgeMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            max_file_size: MAX_FILE_SIZE,
            preview: PreviewOptions::default(),
            mode: BridgeMode::default(),
        }
    }
}

/// Owns the selected file, its preview and the last result.
///
/// Everything is reset together when the file is removed or replaced; the
/// wallet bridge is shared and keeps its connection across files.
pub struct Session {
    options: SessionOptions,
    bridge: Arc<WalletBridge>,
    file: Option<SelectedFile>,
    preview: Option<Preview>,
    last_panel: Option<ResultPanel>,
    processing: bool,
}

impl Session {
    pub fn new(options: SessionOptions, bridge: Arc<WalletBridge>) -> Self {
        Session {
            options,
            bridge,
            file: None,
            preview: None,
            last_panel: None,
            processing: false,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Switches between recording and signing for later validations.
    pub fn set_mode(&mut self, mode: BridgeMode) {
        self.options.mode = mode;
    }

    pub fn bridge(&self) -> &Arc<WalletBridge> {
        &self.bridge
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    /// 1-based current page, `None` while nothing is previewed.
    pub fn current_page(&self) -> Option<u32> {
        self.preview.as_ref().map(|p| p.current_page())
    }

    pub fn last_panel(&self) -> Option<&ResultPanel> {
        self.last_panel.as_ref()
    }

    /// Label shown on the validate action while a wallet sequence runs.
    pub fn busy_label(&self) -> Option<&'static str> {
        (self.processing || self.bridge.is_busy()).then_some(BUSY_LABEL)
    }

    /// Non-fatal wallet check at start-up.
    pub async fn probe_wallet(&self) {
        if !self.bridge.has_provider() {
            tracing::warn!("Web3 not detected. Configure an RPC URL or a development key.");
            return;
        }
        match self.bridge.connect().await {
            Ok(account) => tracing::info!(%account, "wallet reachable"),
            Err(e) => tracing::warn!(error = %e, "wallet probe failed"),
        }
    }

    fn report(&mut self, presenter: &mut dyn Presenter, panel: ResultPanel) {
        presenter.present(&panel);
        self.last_panel = Some(panel);
    }

    /// Selects a file from disk, replacing any current selection.
    pub async fn select_path(
        &mut self,
        path: impl AsRef<Path>,
        presenter: &mut dyn Presenter,
    ) -> Result<(), SessionError> {
        match SelectedFile::open(path, self.options.max_file_size).await {
            Ok(file) => self.accept(file, presenter),
            Err(e) => {
                self.report(presenter, ResultPanel::error(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Selects an in-memory file, replacing any current selection.
    pub fn select_bytes(
        &mut self,
        name: &str,
        mime: &str,
        bytes: impl Into<Arc<[u8]>>,
        presenter: &mut dyn Presenter,
    ) -> Result<(), SessionError> {
        match SelectedFile::from_bytes(name, mime, bytes, self.options.max_file_size) {
            Ok(file) => self.accept(file, presenter),
            Err(e) => {
                self.report(presenter, ResultPanel::error(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Shows the file and its first page. The file stays selected when the
    /// preview fails, so it can still be hashed.
    fn accept(&mut self, file: SelectedFile, presenter: &mut dyn Presenter) -> Result<(), SessionError> {
        self.remove_file();
        presenter.show_file(file.descriptor());
        let bytes = file.shared_bytes();
        self.file = Some(file);

        let mut preview = match Preview::load(bytes, self.options.preview) {
            Ok(preview) => preview,
            Err(e) => {
                self.report(presenter, ResultPanel::error(e.to_string()));
                return Err(e.into());
            }
        };
        match preview.render_page(1) {
            Ok(page) => presenter.show_page(&page),
            Err(e) => {
                self.report(presenter, ResultPanel::error(e.to_string()));
                return Err(e.into());
            }
        }
        self.preview = Some(preview);
        Ok(())
    }

    /// Clears the file, its preview and the last result.
    pub fn remove_file(&mut self) {
        if let Some(file) = self.file.take() {
            tracing::debug!(name = file.name(), "file removed");
        }
        self.preview = None;
        self.last_panel = None;
    }

    fn navigate(
        &mut self,
        presenter: &mut dyn Presenter,
        step: impl FnOnce(&mut Preview) -> Option<Result<RenderedPage, PreviewError>>,
    ) -> Option<RenderedPage> {
        let preview = self.preview.as_mut()?;
        match step(preview)? {
            Ok(page) => {
                presenter.show_page(&page);
                Some(page)
            }
            Err(e) => {
                tracing::warn!(error = %e, "page render failed");
                self.report(presenter, ResultPanel::error(e.to_string()));
                None
            }
        }
    }

    /// Moves to the next page; a no-op on the last page or without a preview.
    pub fn next_page(&mut self, presenter: &mut dyn Presenter) -> Option<RenderedPage> {
        self.navigate(presenter, Preview::next)
    }

    /// Moves to the previous page; a no-op on the first page or without a preview.
    pub fn previous_page(&mut self, presenter: &mut dyn Presenter) -> Option<RenderedPage> {
        self.navigate(presenter, Preview::previous)
    }

    /// Jumps to page `page` (1-based); out-of-range pages are ignored.
    pub fn go_to_page(&mut self, page: u32, presenter: &mut dyn Presenter) -> Option<RenderedPage> {
        let count = self.preview.as_ref()?.page_count();
        if page < 1 || page > count {
            tracing::debug!(page, count, "page request out of range ignored");
            return None;
        }
        self.navigate(presenter, |preview| Some(preview.render_page(page)))
    }

    /// The current page without notifying the presenter; served from the
    /// render cache when possible.
    pub fn current_rendering(&mut self) -> Option<Result<RenderedPage, PreviewError>> {
        let preview = self.preview.as_mut()?;
        let page = preview.current_page();
        Some(preview.render_page(page))
    }

    /// Digest of the selected file's raw bytes.
    pub fn digest(&self) -> Option<DigestHex> {
        self.file.as_ref().map(|f| DigestHex::compute(f.bytes()))
    }

    /// Explicit wallet connection; reports "Connected: <account>".
    pub async fn connect(&mut self, presenter: &mut dyn Presenter) -> Result<Address, SessionError> {
        match self.bridge.connect().await {
            Ok(account) => {
                presenter.show_notice(&format!("Connected: {}", account));
                Ok(account)
            }
            Err(e) => {
                self.report(presenter, ResultPanel::error(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Hashes the selected file and runs the configured wallet sequence.
    ///
    /// Every outcome, including failures, becomes the returned panel.
    pub async fn validate(&mut self, presenter: &mut dyn Presenter) -> ResultPanel {
        let Some(file) = self.file.as_ref() else {
            let panel = ResultPanel::error(SessionError::NoFile.to_string());
            self.report(presenter, panel.clone());
            return panel;
        };

        self.processing = true;
        presenter.show_notice(BUSY_LABEL);

        let digest = DigestHex::compute(file.bytes());
        if let Some(preview) = &self.preview {
            let decoded = preview.document_digest();
            if decoded != digest {
                tracing::error!(%digest, %decoded, "document bytes diverged from the selected file");
            }
        }
        tracing::info!(%digest, mode = ?self.options.mode, "validating");

        let panel = match self.options.mode {
            BridgeMode::Transact => match self.bridge.transact(&digest).await {
                Ok(receipt) => ResultPanel::from(&receipt),
                Err(e) => ResultPanel::error(e.to_string()),
            },
            BridgeMode::Sign => match self.bridge.sign(&digest).await {
                Ok(signed) => ResultPanel::from(&signed),
                Err(e) => ResultPanel::error(e.to_string()),
            },
        };

        self.processing = false;
        self.report(presenter, panel.clone());
        panel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::present::TextPresenter;

    #[tokio::test]
    async fn test_validate_without_file() {
        let mut session = Session::new(SessionOptions::default(), Arc::new(WalletBridge::new(None)));
        let mut presenter = TextPresenter::new(Vec::new());
        let panel = session.validate(&mut presenter).await;
        assert_eq!(panel, ResultPanel::error("Please select a PDF file first."));
        assert_eq!(session.busy_label(), None);
    }

    #[test]
    fn test_rejected_bytes_leave_session_empty() {
        let mut session = Session::new(SessionOptions::default(), Arc::new(WalletBridge::new(None)));
        let mut presenter = TextPresenter::new(Vec::new());
        let result = session.select_bytes("notes.txt", "text/plain", vec![1u8, 2, 3], &mut presenter);
        assert!(matches!(result, Err(SessionError::Intake(IntakeError::NotPdf { .. }))));
        assert!(session.file().is_none());
        assert_eq!(
            session.last_panel(),
            Some(&ResultPanel::error("Please select a valid PDF file."))
        );
    }

    #[test]
    fn test_undecodable_pdf_keeps_file_without_preview() {
        let mut session = Session::new(SessionOptions::default(), Arc::new(WalletBridge::new(None)));
        let mut presenter = TextPresenter::new(Vec::new());
        let result = session.select_bytes("bad.pdf", "application/pdf", b"%PDF-1.4 junk".to_vec(), &mut presenter);
        assert!(matches!(result, Err(SessionError::Preview(PreviewError::Decode(_)))));
        assert!(session.file().is_some());
        assert!(session.preview().is_none());
        assert!(session.next_page(&mut presenter).is_none());
        assert_eq!(session.last_panel(), Some(&ResultPanel::error("Error loading PDF file.")));
    }
}
