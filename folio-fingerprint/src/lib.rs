//! Content fingerprints for e-book files.
//!
//! A fingerprint identifies a file by a handful of small byte windows sampled
//! at fixed offsets rather than by hashing the whole file, so computing one
//! costs a constant number of seeks no matter how large the file is.
//!
//! ```no_run
//! let fingerprint = folio_fingerprint::fingerprint("book.epub")?;
//! println!("{fingerprint}");
//! # Ok::<(), folio_fingerprint::FingerprintError>(())
//! ```

mod algorithm;
mod engine;
mod error;
mod value;

pub use algorithm::AlgorithmVersion;
pub use engine::{fingerprint, fingerprint_reader, sample_offsets, SAMPLE_OFFSETS, SAMPLE_SIZE};
pub use error::FingerprintError;
pub use value::{Fingerprint, InvalidFingerprint};
