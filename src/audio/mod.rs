//! # Audio Pipeline Module
//!
//! Everything between a binary wire frame and a transcript ready for the
//! chat pipeline.
//!
//! ## Key Components:
//! - **Aggregator**: reorder buffer merging sequence-tagged fragments
//!   into one ordered byte stream (`aggregator`)
//! - **Transcoder**: ffmpeg-backed conversion of container audio to PCM
//!   WAV, 16 kHz mono (`transcode`)
//! - **Finalizer**: the merge, transcode, recognize, pipeline-run steps
//!   that end every recording (`finalize`)

pub mod aggregator;
pub mod finalize;
pub mod transcode;
