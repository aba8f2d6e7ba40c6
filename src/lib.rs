//! # bunyfsb
//!
//! `bunyfsb` is a library for reading and patching "Buny" game asset archives and the FMOD sound banks stored in them.
//!
//! - [`window`] provides [`ByteWindow`](window::ByteWindow), a cursor over a file or buffer that can be sliced,
//!   resized and copied between without loading whole files.
//! - [`buny`] opens archives, extracts entries, redirects entries to replacement content,
//!   and resets patched archives from a table of contents snapshot.
//! - [`fsb5`] reads FSB5 containers (standalone or embedded in `.bank` files) and builds new ones.

#![warn(clippy::pedantic, future_incompatible)]
#![deny(
    let_underscore_drop,
    macro_use_extern_crate,
    meta_variable_misuse,
    missing_abi,
    missing_debug_implementations,
    missing_docs,
    non_ascii_idents,
    nonstandard_style,
    noop_method_call,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unsafe_op_in_unsafe_fn,
    unused_crate_dependencies,
    unused_import_braces,
    unused_lifetimes,
    unused_macro_rules,
    unused_qualifications,
    unused_results
)]

pub mod buny;
mod error;
pub mod fsb5;
mod read;
pub mod window;

pub use error::{Error, ErrorCategory};
pub use read::{Needed, ReadError, ReadErrorKind};

#[cfg(test)]
mod test {
    use crate::{
        buny::ArchiveErrorKind,
        fsb5::ContainerErrorKind,
        window::{Access, ByteWindow},
        Error, ErrorCategory,
    };
    use std::error::Error as _;

    #[test]
    fn unified_error() {
        let mut window = ByteWindow::from_vec(vec![0; 2], Access::ReadOnly);
        let error = Error::from(window.read_u32().unwrap_err());
        assert_eq!(error.category(), ErrorCategory::Bounds);
        assert!(error.as_archive_error().is_none());

        let error: Error = crate::buny::BunyArchive::from_window(ByteWindow::from_vec(
            b"not an archive".to_vec(),
            Access::ReadOnly,
        ))
        .unwrap_err()
        .into();
        assert_eq!(error.category(), ErrorCategory::Format);
        assert!(error
            .as_archive_error()
            .is_some_and(|e| e.kind() == ArchiveErrorKind::Magic));

        let mut window = ByteWindow::from_vec(vec![0; 64], Access::ReadOnly);
        let error: Error = crate::fsb5::find_fsb5_magic(&mut window).unwrap_err().into();
        assert_eq!(error.category(), ErrorCategory::NotFound);
        assert!(error
            .as_container_error()
            .is_some_and(|e| e.kind() == ContainerErrorKind::BankMagicNotFound));
        assert!(error.source().is_none());
        assert!(!error.to_string().is_empty());
    }
}
