pub mod bridge;
pub mod config;
pub mod core;
pub mod digest;
pub mod intake;
pub mod logging;
pub mod present;
pub mod preview;
pub mod render;
pub mod session;
pub mod wallet;

// Re-export main types for convenience
pub use bridge::{BridgeError, BridgeMode, SignedDigest, TransactReceipt, WalletBridge};
pub use config::{ConfigError, NotaryConfig};
pub use core::{PDFDocument, PDFError, PDFObject, Page};
pub use digest::DigestHex;
pub use intake::{FileDescriptor, IntakeError, SelectedFile};
pub use present::{JsonPresenter, Presenter, ResultPanel, TextPresenter};
pub use preview::{Preview, PreviewError, PreviewOptions};
pub use render::{RenderedPage, Viewport};
pub use session::{Session, SessionError, SessionOptions};
pub use wallet::{DynWalletProvider, ProviderError, WalletProvider};
