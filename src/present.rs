//! Result presentation.
//!
//! Every outcome of a validation ends up as a [`ResultPanel`]; presenters
//! turn panels and the intermediate notices (file info, page indicator,
//! busy label) into output. Presenting never fails upward.

use crate::bridge::{SignedDigest, TransactReceipt};
use crate::digest::DigestHex;
use crate::intake::{FileDescriptor, format_file_size};
use crate::render::RenderedPage;
use crate::wallet::Address;
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const STATUS_STORED: &str = "Stored on Blockchain";
pub const STATUS_SIGNED: &str = "Signed with wallet";

const SUCCESS_HEADER: &str = "✓ Research Paper Validated Successfully!";
const ERROR_HEADER: &str = "✗ Validation Failed";
const DIGEST_NOTE: &str = "This hash uniquely identifies your research paper and can be used to verify its authenticity and integrity.";

fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| timestamp.unix_timestamp().to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessPanel {
    pub digest: DigestHex,
    pub status: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<Address>,
}

impl From<&TransactReceipt> for SuccessPanel {
    fn from(receipt: &TransactReceipt) -> Self {
        SuccessPanel {
            digest: receipt.digest.clone(),
            status: STATUS_STORED.to_string(),
            timestamp: format_timestamp(receipt.timestamp),
            transaction: Some(receipt.transaction.to_string()),
            signature: None,
            signer: None,
        }
    }
}

impl From<&SignedDigest> for SuccessPanel {
    fn from(signed: &SignedDigest) -> Self {
        SuccessPanel {
            digest: signed.digest.clone(),
            status: STATUS_SIGNED.to_string(),
            timestamp: format_timestamp(signed.timestamp),
            transaction: None,
            signature: Some(signed.signature.to_hex()),
            signer: Some(signed.signer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPanel {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum ResultPanel {
    Success(SuccessPanel),
    Error(ErrorPanel),
}

impl ResultPanel {
    pub fn error(message: impl Into<String>) -> Self {
        ResultPanel::Error(ErrorPanel {
            message: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultPanel::Success(_))
    }
}

impl From<&TransactReceipt> for ResultPanel {
    fn from(receipt: &TransactReceipt) -> Self {
        ResultPanel::Success(receipt.into())
    }
}

impl From<&SignedDigest> for ResultPanel {
    fn from(signed: &SignedDigest) -> Self {
        ResultPanel::Success(signed.into())
    }
}

pub trait Presenter: Send {
    fn present(&mut self, panel: &ResultPanel);

    /// Name and size of the selected file.
    fn show_file(&mut self, _file: &FileDescriptor) {}

    /// A freshly rendered page.
    fn show_page(&mut self, _page: &RenderedPage) {}

    /// Short status line such as "Connected: 0x…" or "Processing...".
    fn show_notice(&mut self, _notice: &str) {}

    /// Digest computed without a wallet step.
    fn show_digest(&mut self, _digest: &DigestHex) {}
}

/// Human-readable output.
pub struct TextPresenter<W> {
    out: W,
}

impl<W: Write + Send> TextPresenter<W> {
    pub fn new(out: W) -> Self {
        TextPresenter { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            tracing::warn!(error = %e, "failed to write output");
        }
    }
}

impl<W: Write + Send> Presenter for TextPresenter<W> {
    fn present(&mut self, panel: &ResultPanel) {
        let text = match panel {
            ResultPanel::Success(success) => {
                let mut lines = vec![
                    SUCCESS_HEADER.to_string(),
                    format!("Document Hash: {}", success.digest),
                    format!("Status: {}", success.status),
                    format!("Timestamp: {}", success.timestamp),
                ];
                if let Some(tx) = &success.transaction {
                    lines.push(format!("Transaction: {}", tx));
                }
                if let Some(signature) = &success.signature {
                    lines.push(format!("Signature: {}", signature));
                }
                if let Some(signer) = &success.signer {
                    lines.push(format!("Signer: {}", signer));
                }
                lines.push(DIGEST_NOTE.to_string());
                lines.join("\n")
            }
            ResultPanel::Error(error) => format!("{}\n{}", ERROR_HEADER, error.message),
        };
        self.emit(&text);
    }

    fn show_file(&mut self, file: &FileDescriptor) {
        let line = format!("{} ({})", file.name, format_file_size(file.size));
        self.emit(&line);
    }

    fn show_page(&mut self, page: &RenderedPage) {
        let mut line = page.indicator();
        if page.can_go_previous() {
            line.push_str("  [prev]");
        }
        if page.can_go_next() {
            line.push_str("  [next]");
        }
        self.emit(&line);
    }

    fn show_notice(&mut self, notice: &str) {
        self.emit(notice);
    }

    fn show_digest(&mut self, digest: &DigestHex) {
        let line = format!("Document Hash: {}", digest);
        self.emit(&line);
    }
}

/// One JSON object per line.
pub struct JsonPresenter<W> {
    out: W,
    embed_images: bool,
}

impl<W: Write + Send> JsonPresenter<W> {
    pub fn new(out: W) -> Self {
        JsonPresenter {
            out,
            embed_images: false,
        }
    }

    /// Include rendered pages as base64 PNG in `page` events.
    pub fn embed_images(mut self, embed: bool) -> Self {
        self.embed_images = embed;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, value: &serde_json::Value) {
        let written = serde_json::to_writer(&mut self.out, value)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(self.out))
            .and_then(|_| self.out.flush());
        if let Err(e) = written {
            tracing::warn!(error = %e, "failed to write output");
        }
    }
}

impl<W: Write + Send> Presenter for JsonPresenter<W> {
    fn present(&mut self, panel: &ResultPanel) {
        match serde_json::to_value(panel) {
            Ok(value) => self.emit(&value),
            Err(e) => tracing::warn!(error = %e, "failed to serialize result panel"),
        }
    }

    fn show_file(&mut self, file: &FileDescriptor) {
        self.emit(&json!({
            "event": "file",
            "name": file.name,
            "mime": file.mime,
            "size": file.size,
            "size_label": format_file_size(file.size),
        }));
    }

    fn show_page(&mut self, page: &RenderedPage) {
        let mut value = json!({
            "event": "page",
            "page": page.page_number,
            "page_count": page.page_count,
            "indicator": page.indicator(),
            "can_go_previous": page.can_go_previous(),
            "can_go_next": page.can_go_next(),
            "width": page.width(),
            "height": page.height(),
        });
        if self.embed_images {
            match page.to_base64_png() {
                Ok(image) => value["image_png_base64"] = json!(image),
                Err(e) => tracing::warn!(error = %e, "failed to encode page image"),
            }
        }
        self.emit(&value);
    }

    fn show_notice(&mut self, notice: &str) {
        self.emit(&json!({ "event": "notice", "message": notice }));
    }

    fn show_digest(&mut self, digest: &DigestHex) {
        self.emit(&json!({ "event": "digest", "digest": digest }));
    }
}
