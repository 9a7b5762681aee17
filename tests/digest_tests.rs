//! Digest tests: the hash covers exactly the selected file's bytes.


use pdf_notary::digest::{DigestError, DigestHex};
use pdf_notary::intake::{MAX_FILE_SIZE, SelectedFile};
use pdf_notary::preview::{Preview, PreviewOptions};
use proptest::prelude::*;
use test_utils::*;

// ============================================================================
// Known values
// ============================================================================

#[test]
fn test_sha256_vectors() {
    assert_eq!(
        DigestHex::compute(b"").as_str(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(
        DigestHex::compute(b"abc").as_str(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn test_parse_accepts_prefix_and_rejects_garbage() {
    let digest = DigestHex::compute(b"abc");
    assert_eq!(DigestHex::parse(&digest.to_prefixed()).unwrap(), digest);
    assert_eq!(DigestHex::parse("abcd"), Err(DigestError::Length(4)));
    assert_eq!(DigestHex::parse(&"zz".repeat(32)), Err(DigestError::NotHex));
}

// ============================================================================
// Raw bytes vs decoded document
// ============================================================================

#[test]
fn test_file_and_document_digests_agree() {
    let bytes = two_page_paper();
    let file = SelectedFile::from_bytes("paper.pdf", "application/pdf", bytes.clone(), MAX_FILE_SIZE).unwrap();
    let preview = Preview::load(file.shared_bytes(), PreviewOptions::default()).unwrap();

    let raw = DigestHex::compute(file.bytes());
    assert_eq!(raw, DigestHex::compute(&bytes));
    assert_eq!(raw, preview.document_digest());
}

#[test]
fn test_one_byte_changes_digest() {
    let original = two_page_paper();
    let mut edited = original.clone();
    let last = edited.len() - 1;
    edited[last] ^= 0x01;
    assert_ne!(DigestHex::compute(&original), DigestHex::compute(&edited));
}

proptest! {
    #[test]
    fn prop_digest_is_deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let first = DigestHex::compute(&bytes);
        let second = DigestHex::compute(&bytes);
        prop_assert_eq!(first.as_str().len(), 64);
        prop_assert!(first.as_str().chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(DigestHex::parse(first.as_str()).unwrap(), first);
    }
}
