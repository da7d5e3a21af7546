//! # fsbwav
//!
//! `fsbwav` extracts the audio streams of FMOD sound banks into WAV files. It reads FSB5 banks
//! (`.fsb`) directly and FMOD Studio banks (`.bank`) by first copying out the FSB5 banks they
//! embed.
//!
//! Streams are read through the [`Engine`] traits; [`FsbEngine`] is the native implementation.
//! PCM streams are written losslessly. Compressed streams are written unchanged and labelled as
//! 16-bit PCM.
//!
//! ```no_run
//! use fsbwav::{Config, Extractor, FsbEngine};
//!
//! let config = Config::builder("Master.bank").verbose(true).build()?;
//! let summary = Extractor::new(FsbEngine::new())?.run(&config, |event| println!("{event:?}"))?;
//! println!("{} streams written", summary.streams_written());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

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
    unused_import_braces,
    unused_lifetimes,
    unused_macro_rules,
    unused_qualifications,
    unused_results
)]

pub mod bank;
pub mod config;
pub mod descriptor;
pub mod diag;
pub mod engine;
mod error;
pub mod extract;
mod header;
mod read;
pub mod sanitize;
pub mod scan;
pub mod transcribe;
pub mod wav;

pub use config::{Config, OutputLocation};
pub use engine::fsb::FsbEngine;
pub use engine::Engine;
pub use error::{ExtractError, ExtractErrorKind, StreamFailure, StreamFailureKind};
pub use extract::{ContainerReport, Event, Extractor, RunSummary};
